// ── Device record ──

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::bus::{DeviceExport, SIGNATURE_MANUFACTURER, SIGNATURE_MODEL, SIGNATURE_THING_TYPE};
use crate::capability::CapabilityKind;
use crate::channel::ChannelRuntime;
use crate::channel::batch::BatchGroup;
use crate::model::{Device, DeviceAddress, EndpointDescriptor, ThingType};

/// Manufacturer / model pair read from the basic cluster.
///
/// `None` fields were not reported by the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

impl Identity {
    pub fn manufacturer_or_default(&self) -> String {
        self.manufacturer
            .clone()
            .unwrap_or_else(|| "Unknown".to_owned())
    }

    pub fn model_or_default(&self, address: DeviceAddress) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| format!("MAC:{:X}", address.as_u64()))
    }
}

/// Everything the bridge holds for one device.
///
/// Created on first discovery and never removed. Rediscovery replaces
/// the endpoint list; channels keep their identity.
#[derive(Clone)]
pub struct DeviceRecord {
    address: DeviceAddress,
    name: String,
    manufacturer: String,
    model: String,
    thing_type: Option<ThingType>,
    export: DeviceExport,
    endpoints: Vec<EndpointDescriptor>,
    channels: Vec<ChannelRuntime>,
    batch: Option<BatchGroup>,
    discovered_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

impl DeviceRecord {
    pub(crate) fn new(
        address: DeviceAddress,
        identity: &Identity,
        thing_type: Option<ThingType>,
        endpoints: Vec<EndpointDescriptor>,
    ) -> Self {
        let manufacturer = identity.manufacturer_or_default();
        let model = identity.model_or_default(address);
        let name = format!("{model} by {manufacturer}");
        let export = build_export(address, &name, identity, thing_type);
        let now = Utc::now();
        Self {
            address,
            name,
            manufacturer,
            model,
            thing_type,
            export,
            endpoints,
            channels: Vec::new(),
            batch: None,
            discovered_at: now,
            last_seen_at: now,
        }
    }

    pub(crate) fn with_channels(
        mut self,
        channels: Vec<ChannelRuntime>,
        batch: Option<BatchGroup>,
    ) -> Self {
        self.channels = channels;
        self.batch = batch;
        self
    }

    /// Copy of this record with a fresh endpoint list. Existing channels
    /// are rebound to the new descriptor of their endpoint.
    pub(crate) fn rediscovered(&self, endpoints: Vec<EndpointDescriptor>) -> Self {
        for channel in &self.channels {
            let endpoint_id = channel.endpoint().endpoint_id;
            if let Some(descriptor) = endpoints.iter().find(|e| e.endpoint_id == endpoint_id) {
                channel.refresh_endpoint(descriptor.clone());
            }
        }
        Self {
            endpoints,
            last_seen_at: Utc::now(),
            ..self.clone()
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn thing_type(&self) -> Option<ThingType> {
        self.thing_type
    }

    pub fn export(&self) -> &DeviceExport {
        &self.export
    }

    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    pub fn channels(&self) -> &[ChannelRuntime] {
        &self.channels
    }

    pub fn channel(&self, id: &str) -> Option<&ChannelRuntime> {
        self.channels.iter().find(|c| c.id() == id)
    }

    pub fn channels_of(&self, kind: CapabilityKind) -> impl Iterator<Item = &ChannelRuntime> {
        self.channels.iter().filter(move |c| c.kind() == kind)
    }

    pub fn batch(&self) -> Option<&BatchGroup> {
        self.batch.as_ref()
    }

    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }

    pub fn last_seen_at(&self) -> DateTime<Utc> {
        self.last_seen_at
    }

    /// Snapshot view published to subscribers.
    pub fn to_device(&self) -> Device {
        Device {
            address: self.address,
            name: self.name.clone(),
            manufacturer: self.manufacturer.clone(),
            model: self.model.clone(),
            thing_type: self.thing_type,
            endpoints: self.endpoints.clone(),
            channels: self.channels.iter().map(ChannelRuntime::summary).collect(),
            discovered_at: self.discovered_at,
            last_seen_at: self.last_seen_at,
        }
    }
}

impl std::fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("address", &self.address)
            .field("name", &self.name)
            .field("channels", &self.channels)
            .field("batch", &self.batch.is_some())
            .finish_non_exhaustive()
    }
}

/// Only values actually reported by the device become signatures.
fn build_export(
    address: DeviceAddress,
    name: &str,
    identity: &Identity,
    thing_type: Option<ThingType>,
) -> DeviceExport {
    let mut signatures = BTreeMap::new();
    if let Some(manufacturer) = &identity.manufacturer {
        signatures.insert(SIGNATURE_MANUFACTURER.to_owned(), manufacturer.clone());
    }
    if let Some(model) = &identity.model {
        signatures.insert(SIGNATURE_MODEL.to_owned(), model.clone());
    }
    if let Some(thing_type) = thing_type {
        signatures.insert(SIGNATURE_THING_TYPE.to_owned(), thing_type.to_string());
    }
    DeviceExport {
        natural_id: address.natural_id(),
        name: name.to_owned(),
        signatures,
    }
}

/// Shared handle to a registered record.
pub type DeviceHandle = Arc<DeviceRecord>;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_identity_falls_back_to_synthetic_name() {
        let address = DeviceAddress::new(0x0013_A200_1234_5678);
        let record = DeviceRecord::new(address, &Identity::default(), None, Vec::new());
        assert_eq!(record.manufacturer(), "Unknown");
        assert_eq!(record.model(), "MAC:13A20012345678");
        assert_eq!(record.name(), "MAC:13A20012345678 by Unknown");
        assert!(record.export().signatures.is_empty());
        assert_eq!(record.export().natural_id, "13A20012345678");
    }

    #[test]
    fn reported_identity_becomes_signatures() {
        let identity = Identity {
            manufacturer: Some("Acme".into()),
            model: Some("Bulb".into()),
        };
        let record = DeviceRecord::new(
            DeviceAddress::new(1),
            &identity,
            Some(ThingType::Light),
            Vec::new(),
        );
        assert_eq!(record.name(), "Bulb by Acme");
        let sigs = &record.export().signatures;
        assert_eq!(sigs.get(SIGNATURE_MANUFACTURER).map(String::as_str), Some("Acme"));
        assert_eq!(sigs.get(SIGNATURE_MODEL).map(String::as_str), Some("Bulb"));
        assert_eq!(sigs.get(SIGNATURE_THING_TYPE).map(String::as_str), Some("light"));
    }
}

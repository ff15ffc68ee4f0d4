// ── Discovery pipeline ──
//
// Turns a device announcement from the network stack into a registered,
// exported device with running channels. Announcements of known devices
// only refresh their endpoint descriptors.

use std::sync::Arc;

use meshbridge_api::{Destination, NwkDeviceInfo, Request, ResponseBody, attribute, cluster};
use tracing::{debug, error, info, warn};

use crate::capability;
use crate::channel::ChannelRuntime;
use crate::channel::batch::BatchGroup;
use crate::error::CoreError;
use crate::model::{BridgeEvent, DeviceAddress, EndpointDescriptor};
use crate::services::Services;
use crate::store::{DeviceHandle, DeviceRecord, DeviceRegistry, Identity, RegistryEntry};

/// Result of handling one announcement.
#[derive(Debug, Clone)]
pub enum DiscoveryOutcome {
    /// First sighting: the device was exported and its channels started.
    Created(DeviceHandle),
    /// Known device: descriptors refreshed, channels untouched.
    Refreshed(DeviceHandle),
}

impl DiscoveryOutcome {
    pub fn record(&self) -> &DeviceHandle {
        match self {
            Self::Created(record) | Self::Refreshed(record) => record,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

pub(crate) struct DiscoveryPipeline {
    services: Services,
    registry: Arc<DeviceRegistry>,
}

impl DiscoveryPipeline {
    pub fn new(services: Services, registry: Arc<DeviceRegistry>) -> Self {
        Self { services, registry }
    }

    /// Register or refresh the announced device.
    ///
    /// Announcements of the same address are handled one at a time. Fails
    /// only when the bus refuses the device export; nothing is registered
    /// in that case.
    pub async fn on_device_found(&self, info: NwkDeviceInfo) -> Result<DiscoveryOutcome, CoreError> {
        let address = DeviceAddress::from(info.ieee_address);
        let endpoints: Vec<EndpointDescriptor> = info
            .simple_descriptors
            .into_iter()
            .map(EndpointDescriptor::from)
            .collect();
        debug!(%address, endpoints = endpoints.len(), "device announced");

        match self.registry.entry(address).await {
            RegistryEntry::Occupied(entry) => {
                let record = entry.get().rediscovered(endpoints);
                let handle = entry.replace(record);
                info!(%address, name = handle.name(), "device rediscovered");
                self.services
                    .emit(BridgeEvent::DeviceRediscovered { address })
                    .await;
                Ok(DiscoveryOutcome::Refreshed(handle))
            }
            RegistryEntry::Vacant(entry) => {
                let record = self.build(address, endpoints).await?;
                let handle = entry.insert(record);
                info!(
                    %address,
                    name = handle.name(),
                    channels = handle.channels().len(),
                    batch = handle.batch().is_some(),
                    "device discovered"
                );
                self.services
                    .emit(BridgeEvent::DeviceDiscovered {
                        address,
                        name: handle.name().to_owned(),
                    })
                    .await;
                Ok(DiscoveryOutcome::Created(handle))
            }
        }
    }

    /// Identity, export, channels and batch group of a new device.
    async fn build(
        &self,
        address: DeviceAddress,
        endpoints: Vec<EndpointDescriptor>,
    ) -> Result<DeviceRecord, CoreError> {
        let identity = match self.read_identity(address, &endpoints).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(%address, error = %e, "basic information unavailable, using fallback identity");
                Identity::default()
            }
        };
        let thing_type = capability::device_thing_type(&endpoints);
        let record = DeviceRecord::new(address, &identity, thing_type, endpoints);

        if let Err(e) = self.services.bus.export_device(record.export()).await {
            error!(%address, name = record.name(), error = %e, "failed to export device");
            return Err(e);
        }

        let channels = self.start_channels(address, record.endpoints()).await;
        let batch = self.start_batch(address, &channels).await;
        Ok(record.with_channels(channels, batch))
    }

    /// Manufacturer and model in one basic-cluster read.
    async fn read_identity(
        &self,
        address: DeviceAddress,
        endpoints: &[EndpointDescriptor],
    ) -> Result<Identity, CoreError> {
        let endpoint_id = endpoints.first().map_or(1, |e| e.endpoint_id);
        let request = Request::ReadAttributes {
            dst: Destination::new(address.to_ieee(), endpoint_id),
            cluster: cluster::BASIC,
            attributes: vec![
                attribute::BASIC_MANUFACTURER_NAME,
                attribute::BASIC_MODEL_IDENTIFIER,
            ],
        };
        let body = self
            .services
            .stack
            .call(request, self.services.config.basic_info_timeout)
            .await
            .map_err(|e| CoreError::MetadataUnavailable {
                address,
                reason: e.to_string(),
            })?;

        let ResponseBody::Attributes(records) = body else {
            return Err(CoreError::MetadataUnavailable {
                address,
                reason: format!("unexpected {} response", body.kind()),
            });
        };

        let mut identity = Identity::default();
        for record in records {
            match record.attribute_id {
                attribute::BASIC_MANUFACTURER_NAME => {
                    identity.manufacturer = non_empty(record.value.as_text());
                }
                attribute::BASIC_MODEL_IDENTIFIER => {
                    identity.model = non_empty(record.value.as_text());
                }
                other => debug!(%address, attribute = other, "ignoring basic attribute"),
            }
        }
        Ok(identity)
    }

    /// Create and initialize one runtime per capability, in endpoint then
    /// table order. Channels the bus refuses are skipped.
    async fn start_channels(
        &self,
        address: DeviceAddress,
        endpoints: &[EndpointDescriptor],
    ) -> Vec<ChannelRuntime> {
        let mut channels = Vec::new();
        for endpoint in endpoints {
            for cap in capability::classify(endpoint) {
                let channel =
                    ChannelRuntime::new(self.services.clone(), address, endpoint.clone(), cap);
                match channel.init().await {
                    Ok(()) => channels.push(channel),
                    Err(e) => {
                        error!(%address, channel = channel.id(), error = %e, "failed to export channel, skipping");
                    }
                }
            }
        }
        channels
    }

    async fn start_batch(
        &self,
        address: DeviceAddress,
        channels: &[ChannelRuntime],
    ) -> Option<BatchGroup> {
        let group = BatchGroup::assemble(self.services.clone(), address, channels)?;
        match group.init().await {
            Ok(()) => Some(group),
            Err(e) => {
                warn!(%address, error = %e, "failed to export batch channel");
                None
            }
        }
    }
}

/// Blank basic-cluster strings count as not reported.
fn non_empty(text: Option<&str>) -> Option<String> {
    text.filter(|s| !s.is_empty()).map(str::to_owned)
}

// ── Capability bus abstraction ──
//
// The bus is where devices and channels are announced, state events are
// published and inbound commands arrive. The engine only depends on this
// trait; the binary supplies a concrete transport.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::CoreError;
use crate::model::{BridgeEvent, DeviceAddress};

/// Suggested capacity of the per-channel inbound command queue.
pub const COMMAND_QUEUE_SIZE: usize = 16;

/// Signature key carrying the basic-cluster manufacturer name.
pub const SIGNATURE_MANUFACTURER: &str = "zigbee:ManufacturerName";
/// Signature key carrying the basic-cluster model identifier.
pub const SIGNATURE_MODEL: &str = "zigbee:ModelIdentifier";
/// Signature key carrying the derived thing type.
pub const SIGNATURE_THING_TYPE: &str = "ninja:thingType";

/// Identity of a device as announced on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceExport {
    pub natural_id: String,
    pub name: String,
    pub signatures: BTreeMap<String, String>,
}

/// A channel as announced on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelExport {
    pub id: String,
    pub protocol: String,
    pub methods: Vec<String>,
    pub events: Vec<String>,
}

impl ChannelExport {
    pub fn new(
        id: impl Into<String>,
        protocol: &str,
        methods: &[&str],
        events: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            protocol: protocol.to_owned(),
            methods: methods.iter().map(|m| (*m).to_owned()).collect(),
            events: events.iter().map(|e| (*e).to_owned()).collect(),
        }
    }
}

/// A command delivered to a channel, with its reply slot.
#[derive(Debug)]
pub struct InboundCall {
    pub method: String,
    pub params: Value,
    pub reply: oneshot::Sender<Result<Value, CoreError>>,
}

impl InboundCall {
    pub fn new(
        method: impl Into<String>,
        params: Value,
    ) -> (Self, oneshot::Receiver<Result<Value, CoreError>>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                method: method.into(),
                params,
                reply,
            },
            rx,
        )
    }

    /// Send the result back. A caller that stopped waiting is ignored.
    pub fn respond(self, result: Result<Value, CoreError>) {
        let _ = self.reply.send(result);
    }
}

/// The higher-level bus devices are exported to.
#[async_trait]
pub trait CapabilityBus: Send + Sync + 'static {
    /// Announce a device. Required before any of its channels.
    async fn export_device(&self, device: &DeviceExport) -> Result<(), CoreError>;

    /// Announce a channel of an exported device. Returns the bounded queue
    /// inbound commands for the channel arrive on.
    async fn export_channel(
        &self,
        device: DeviceAddress,
        channel: &ChannelExport,
    ) -> Result<mpsc::Receiver<InboundCall>, CoreError>;

    /// Publish an event of one channel.
    async fn publish(
        &self,
        device: DeviceAddress,
        channel: &str,
        event: &str,
        payload: Value,
    ) -> Result<(), CoreError>;

    /// Publish a bridge-level event (pairing, discovery).
    async fn publish_bridge_event(&self, event: &BridgeEvent) -> Result<(), CoreError>;
}

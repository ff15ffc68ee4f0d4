// Shared fixtures for meshbridge-core integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use meshbridge_api::{IeeeAddress, SimDevice, SimpleDescriptor, SimulatedStack};
use meshbridge_core::bus::COMMAND_QUEUE_SIZE;
use meshbridge_core::{
    Bridge, BridgeConfig, BridgeEvent, CapabilityBus, ChannelExport, CoreError, DeviceAddress,
    DeviceExport, InboundCall,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

pub const LIGHT: u64 = 0x0013_A200_1234_5678;
pub const HA_PROFILE: u16 = 0x0104;

// ── RecordingBus ────────────────────────────────────────────────────

/// One `publish` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub device: DeviceAddress,
    pub channel: String,
    pub event: String,
    pub payload: Value,
}

/// In-memory bus that records everything the bridge sends it.
#[derive(Default)]
pub struct RecordingBus {
    devices: Mutex<Vec<DeviceExport>>,
    channels: Mutex<Vec<(DeviceAddress, ChannelExport)>>,
    senders: Mutex<HashMap<(DeviceAddress, String), mpsc::Sender<InboundCall>>>,
    published: Mutex<Vec<Published>>,
    bridge_events: Mutex<Vec<BridgeEvent>>,
    fail_devices: AtomicBool,
    fail_channels: Mutex<HashSet<String>>,
}

impl RecordingBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse every device export from now on.
    pub fn fail_device_exports(&self) {
        self.fail_devices.store(true, Ordering::SeqCst);
    }

    /// Refuse exports of channels with this id.
    pub fn fail_channel_export(&self, channel_id: &str) {
        self.fail_channels.lock().insert(channel_id.to_owned());
    }

    pub fn devices(&self) -> Vec<DeviceExport> {
        self.devices.lock().clone()
    }

    /// Ids of the channels exported for `device`, in export order.
    pub fn channel_ids(&self, device: DeviceAddress) -> Vec<String> {
        self.channels
            .lock()
            .iter()
            .filter(|(d, _)| *d == device)
            .map(|(_, c)| c.id.clone())
            .collect()
    }

    pub fn channel(&self, device: DeviceAddress, id: &str) -> Option<ChannelExport> {
        self.channels
            .lock()
            .iter()
            .find(|(d, c)| *d == device && c.id == id)
            .map(|(_, c)| c.clone())
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().clone()
    }

    /// Payloads published on one channel under one event name.
    pub fn payloads(&self, device: DeviceAddress, channel: &str, event: &str) -> Vec<Value> {
        self.published
            .lock()
            .iter()
            .filter(|p| p.device == device && p.channel == channel && p.event == event)
            .map(|p| p.payload.clone())
            .collect()
    }

    pub fn bridge_events(&self) -> Vec<BridgeEvent> {
        self.bridge_events.lock().clone()
    }

    /// Send an inbound call to an exported channel and wait for the reply.
    pub async fn call(
        &self,
        device: DeviceAddress,
        channel: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, CoreError> {
        let sender = self
            .senders
            .lock()
            .get(&(device, channel.to_owned()))
            .cloned()
            .unwrap();
        let (call, reply) = InboundCall::new(method, params);
        sender.send(call).await.unwrap();
        reply.await.unwrap()
    }
}

#[async_trait]
impl CapabilityBus for RecordingBus {
    async fn export_device(&self, device: &DeviceExport) -> Result<(), CoreError> {
        if self.fail_devices.load(Ordering::SeqCst) {
            return Err(CoreError::Bus {
                message: "device export refused".into(),
            });
        }
        self.devices.lock().push(device.clone());
        Ok(())
    }

    async fn export_channel(
        &self,
        device: DeviceAddress,
        channel: &ChannelExport,
    ) -> Result<mpsc::Receiver<InboundCall>, CoreError> {
        if self.fail_channels.lock().contains(&channel.id) {
            return Err(CoreError::Bus {
                message: format!("channel {} refused", channel.id),
            });
        }
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        self.senders.lock().insert((device, channel.id.clone()), tx);
        self.channels.lock().push((device, channel.clone()));
        Ok(rx)
    }

    async fn publish(
        &self,
        device: DeviceAddress,
        channel: &str,
        event: &str,
        payload: Value,
    ) -> Result<(), CoreError> {
        self.published.lock().push(Published {
            device,
            channel: channel.to_owned(),
            event: event.to_owned(),
            payload,
        });
        Ok(())
    }

    async fn publish_bridge_event(&self, event: &BridgeEvent) -> Result<(), CoreError> {
        self.bridge_events.lock().push(event.clone());
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Config for tests: no join window or device fetch on start.
pub fn quiet_config() -> BridgeConfig {
    BridgeConfig {
        join_on_start_secs: None,
        fetch_devices_on_start: false,
        ..BridgeConfig::default()
    }
}

pub fn bridge(stack: &SimulatedStack, bus: &Arc<RecordingBus>, config: BridgeConfig) -> Bridge {
    let bus: Arc<dyn CapabilityBus> = Arc::clone(bus) as Arc<dyn CapabilityBus>;
    Bridge::new(Arc::new(stack.clone()), bus, config)
}

pub fn endpoint(id: u8, device_id: u16, input: &[u16], output: &[u16]) -> SimpleDescriptor {
    SimpleDescriptor {
        endpoint_id: id,
        profile_id: HA_PROFILE,
        device_id,
        input_clusters: input.to_vec(),
        output_clusters: output.to_vec(),
    }
}

/// Dimmable light: basic, on/off and level on endpoint 1.
pub fn dimmable_light(address: u64) -> SimDevice {
    SimDevice::new(IeeeAddress(address))
        .identity("Acme", "Dimmer")
        .endpoint(endpoint(1, 0x0101, &[0x0000, 0x0006, 0x0008], &[]))
}

/// Color light: on/off, level and color on endpoint 11.
pub fn color_light(address: u64) -> SimDevice {
    SimDevice::new(IeeeAddress(address))
        .identity("Acme", "Color")
        .endpoint(endpoint(11, 0x0102, &[0x0000, 0x0006, 0x0008, 0x0300], &[]))
}

/// Smart plug: on/off and metering.
pub fn plug(address: u64) -> SimDevice {
    SimDevice::new(IeeeAddress(address))
        .identity("Acme", "Plug")
        .endpoint(endpoint(1, 0x0051, &[0x0000, 0x0006, 0x0702], &[]))
}

pub fn addr(address: u64) -> DeviceAddress {
    DeviceAddress::new(address)
}

/// Poll `condition` every 10 ms of (paused) time until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..6_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

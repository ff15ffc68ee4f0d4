//! In-memory simulated mesh network.
//!
//! [`SimulatedStack`] implements [`NetworkStack`] over a set of
//! [`SimDevice`]s whose attribute state answers gateway requests the way
//! real devices would. It records every request, join and binding for
//! inspection, and supports failure injection: unresponsive devices
//! (requests run into their timeout), rejected request kinds, devices
//! without reporting support or basic-cluster metadata.
//!
//! # Example
//!
//! ```rust,ignore
//! let stack = SimulatedStack::new();
//! let mut announcements = stack.device_announcements();
//! stack.join(SimDevice::new(IeeeAddress(0x0013_A200_1234_5678)).endpoint(light)).await;
//! let info = announcements.recv().await;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::Error;
use crate::stack::{NetworkStack, SUBSCRIPTION_CAPACITY};
use crate::types::{
    AttributeRecord, AttributeReport, AttributeValue, Binding, BoundClusterEvent, Destination,
    IeeeAddress, NwkDeviceInfo, OnOffCommand, Request, Response, ResponseBody, SimpleDescriptor,
    Status, ZoneStateEvent, attribute, cluster,
};

/// Default coordinator address (TI OUI prefix).
const DEFAULT_LOCAL_ADDRESS: IeeeAddress = IeeeAddress(0x0012_4B00_0000_0001);

/// On/off cluster "toggle" command id, sent by momentary buttons.
const ON_OFF_TOGGLE_COMMAND: u8 = 0x02;

// ── SimState ────────────────────────────────────────────────────────

/// Raw attribute state of a simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimState {
    pub on: bool,
    pub level: u8,
    /// Highest level the device accepts; larger set values are clamped.
    pub max_level: u8,
    pub hue: u8,
    pub saturation: u8,
    /// Hundredths of a degree Celsius.
    pub temperature: i16,
    /// Hundredths of a percent.
    pub humidity: u16,
    pub power: i32,
    pub zone_status: u16,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            on: false,
            level: 0,
            max_level: u8::MAX,
            hue: 0,
            saturation: 0,
            temperature: 2150,
            humidity: 4500,
            power: 0,
            zone_status: 0,
        }
    }
}

// ── SimDevice ───────────────────────────────────────────────────────

/// A simulated mesh device.
#[derive(Debug, Clone)]
pub struct SimDevice {
    pub info: NwkDeviceInfo,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub state: SimState,
    pub reporting_supported: bool,
    pub unresponsive: bool,
    rejected: HashMap<&'static str, Status>,
}

impl SimDevice {
    pub fn new(address: IeeeAddress) -> Self {
        Self {
            info: NwkDeviceInfo {
                ieee_address: address,
                network_address: 0,
                simple_descriptors: Vec::new(),
            },
            manufacturer: None,
            model: None,
            state: SimState::default(),
            reporting_supported: true,
            unresponsive: false,
            rejected: HashMap::new(),
        }
    }

    pub fn address(&self) -> IeeeAddress {
        self.info.ieee_address
    }

    pub fn network_address(mut self, nwk: u16) -> Self {
        self.info.network_address = nwk;
        self
    }

    pub fn endpoint(mut self, descriptor: SimpleDescriptor) -> Self {
        self.info.simple_descriptors.push(descriptor);
        self
    }

    /// Basic-cluster manufacturer name and model identifier.
    pub fn identity(mut self, manufacturer: impl Into<String>, model: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self.model = Some(model.into());
        self
    }

    pub fn state(mut self, state: SimState) -> Self {
        self.state = state;
        self
    }

    /// Reject attribute-reporting configuration.
    pub fn without_reporting(mut self) -> Self {
        self.reporting_supported = false;
        self
    }

    /// Never answer requests; every call runs into its timeout.
    pub fn unresponsive(mut self) -> Self {
        self.unresponsive = true;
        self
    }

    /// Answer every request named `request` (see [`Request::name`]) with `status`.
    pub fn reject(mut self, request: &'static str, status: Status) -> Self {
        self.rejected.insert(request, status);
        self
    }

    fn respond(&mut self, request: &Request) -> Option<Response> {
        if self.unresponsive {
            return None;
        }
        if let Some(status) = self.rejected.get(request.name()) {
            return Some(Response::with_status(*status));
        }

        let state = &mut self.state;
        let body = match request {
            Request::SetAttributeReporting { .. } => {
                if !self.reporting_supported {
                    return Some(Response::with_status(Status::UnsupportedAttribute));
                }
                ResponseBody::Ack
            }
            Request::ReadAttributes {
                cluster: read_cluster,
                attributes,
                ..
            } => {
                if *read_cluster != cluster::BASIC {
                    return Some(Response::with_status(Status::UnsupportedAttribute));
                }
                let records: Vec<AttributeRecord> = attributes
                    .iter()
                    .filter_map(|id| {
                        let text = match *id {
                            attribute::BASIC_MANUFACTURER_NAME => self.manufacturer.clone(),
                            attribute::BASIC_MODEL_IDENTIFIER => self.model.clone(),
                            _ => None,
                        }?;
                        Some(AttributeRecord {
                            attribute_id: *id,
                            value: AttributeValue::Text(text),
                        })
                    })
                    .collect();
                if records.is_empty() {
                    return Some(Response::with_status(Status::UnsupportedAttribute));
                }
                ResponseBody::Attributes(records)
            }
            Request::GetOnOff { .. } => ResponseBody::OnOff(state.on),
            Request::SetOnOff { command, .. } => {
                state.on = match command {
                    OnOffCommand::On => true,
                    OnOffCommand::Off => false,
                    OnOffCommand::Toggle => !state.on,
                };
                ResponseBody::Ack
            }
            Request::GetLevel { .. } => ResponseBody::Level(state.level),
            Request::SetLevel { level, .. } => {
                state.level = (*level).min(state.max_level);
                ResponseBody::Ack
            }
            Request::GetColor { .. } => ResponseBody::Color {
                hue: state.hue,
                saturation: state.saturation,
            },
            Request::SetColor {
                hue, saturation, ..
            } => {
                state.hue = *hue;
                state.saturation = *saturation;
                ResponseBody::Ack
            }
            Request::GetTemperature { .. } => ResponseBody::Temperature(state.temperature),
            Request::GetHumidity { .. } => ResponseBody::Humidity(state.humidity),
            Request::GetPower { .. } => ResponseBody::Power(state.power),
        };
        Some(Response::ok(body))
    }
}

// ── SimulatedStack ──────────────────────────────────────────────────

/// In-memory [`NetworkStack`]. Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct SimulatedStack {
    inner: Arc<SimInner>,
}

struct SimInner {
    local_address: IeeeAddress,
    devices: Mutex<BTreeMap<IeeeAddress, SimDevice>>,
    announcement_txs: Mutex<Vec<mpsc::Sender<NwkDeviceInfo>>>,
    bound_txs: Mutex<Vec<(Destination, u16, mpsc::Sender<BoundClusterEvent>)>>,
    zone_txs: Mutex<Vec<(IeeeAddress, mpsc::Sender<ZoneStateEvent>)>>,
    report_txs: Mutex<Vec<(IeeeAddress, mpsc::Sender<AttributeReport>)>>,
    requests: Mutex<Vec<Request>>,
    permit_joins: Mutex<Vec<u8>>,
    permit_join_status: Mutex<Status>,
    bindings: Mutex<Vec<Binding>>,
}

impl Default for SimulatedStack {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedStack {
    pub fn new() -> Self {
        Self::with_local_address(DEFAULT_LOCAL_ADDRESS)
    }

    pub fn with_local_address(local_address: IeeeAddress) -> Self {
        Self {
            inner: Arc::new(SimInner {
                local_address,
                devices: Mutex::new(BTreeMap::new()),
                announcement_txs: Mutex::new(Vec::new()),
                bound_txs: Mutex::new(Vec::new()),
                zone_txs: Mutex::new(Vec::new()),
                report_txs: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
                permit_joins: Mutex::new(Vec::new()),
                permit_join_status: Mutex::new(Status::Success),
                bindings: Mutex::new(Vec::new()),
            }),
        }
    }

    // ── Device management ───────────────────────────────────────────

    /// Register a device as already part of the network, without announcing it.
    pub fn add_device(&self, device: SimDevice) {
        self.inner.devices.lock().insert(device.address(), device);
    }

    /// Add a device and announce it, as if it had just joined.
    pub async fn join(&self, device: SimDevice) {
        let info = device.info.clone();
        self.add_device(device);
        debug!(address = %info.ieee_address, "simulated device joined");
        self.inner.announce(info).await;
    }

    /// Re-announce a known device. Returns `false` for unknown addresses.
    pub async fn announce(&self, address: IeeeAddress) -> bool {
        let info = self
            .inner
            .devices
            .lock()
            .get(&address)
            .map(|d| d.info.clone());
        match info {
            Some(info) => {
                self.inner.announce(info).await;
                true
            }
            None => false,
        }
    }

    /// Replace a known device's endpoint list (takes effect on next announce).
    pub fn set_endpoints(&self, address: IeeeAddress, descriptors: Vec<SimpleDescriptor>) {
        if let Some(device) = self.inner.devices.lock().get_mut(&address) {
            device.info.simple_descriptors = descriptors;
        }
    }

    pub fn set_unresponsive(&self, address: IeeeAddress, unresponsive: bool) {
        if let Some(device) = self.inner.devices.lock().get_mut(&address) {
            device.unresponsive = unresponsive;
        }
    }

    /// Mutate a device's raw attribute state in place.
    pub fn update_state(&self, address: IeeeAddress, f: impl FnOnce(&mut SimState)) {
        if let Some(device) = self.inner.devices.lock().get_mut(&address) {
            f(&mut device.state);
        }
    }

    pub fn device_state(&self, address: IeeeAddress) -> Option<SimState> {
        self.inner
            .devices
            .lock()
            .get(&address)
            .map(|d| d.state.clone())
    }

    /// Answer future permit-join requests with `status`.
    pub fn fail_permit_join(&self, status: Status) {
        *self.inner.permit_join_status.lock() = status;
    }

    // ── Device-originated traffic ───────────────────────────────────

    /// Simulate a momentary button press on a bound on/off output cluster.
    pub async fn press(&self, address: IeeeAddress, endpoint: u8) -> usize {
        let event = BoundClusterEvent {
            source: address,
            endpoint,
            cluster: cluster::ON_OFF,
            command_id: ON_OFF_TOGGLE_COMMAND,
        };
        let txs = {
            let mut txs = self.inner.bound_txs.lock();
            txs.retain(|(_, _, tx)| !tx.is_closed());
            txs.iter()
                .filter(|(dst, c, _)| {
                    dst.address == address && dst.endpoint == endpoint && *c == cluster::ON_OFF
                })
                .map(|(_, _, tx)| tx.clone())
                .collect::<Vec<_>>()
        };
        deliver(txs, event).await
    }

    /// Change a device's zone status and notify zone subscribers.
    pub async fn set_zone_status(&self, address: IeeeAddress, endpoint: u8, zone_status: u16) {
        self.update_state(address, |s| s.zone_status = zone_status);
        let event = ZoneStateEvent {
            source: address,
            endpoint,
            zone_status,
        };
        let txs = subscribers_for(&self.inner.zone_txs, address);
        deliver(txs, event).await;
    }

    /// Push an attribute report from a device.
    pub async fn report(
        &self,
        address: IeeeAddress,
        endpoint: u8,
        cluster_id: u16,
        records: Vec<AttributeRecord>,
    ) -> usize {
        let report = AttributeReport {
            source: address,
            endpoint,
            cluster: cluster_id,
            records,
        };
        let txs = subscribers_for(&self.inner.report_txs, address);
        deliver(txs, report).await
    }

    // ── Inspection ──────────────────────────────────────────────────

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.inner.requests.lock().clone()
    }

    pub fn clear_requests(&self) {
        self.inner.requests.lock().clear();
    }

    /// Durations passed to every permit-join call, in order.
    pub fn permit_join_requests(&self) -> Vec<u8> {
        self.inner.permit_joins.lock().clone()
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.inner.bindings.lock().clone()
    }
}

impl SimInner {
    async fn announce(&self, info: NwkDeviceInfo) {
        let txs = {
            let mut txs = self.announcement_txs.lock();
            txs.retain(|tx| !tx.is_closed());
            txs.clone()
        };
        deliver(txs, info).await;
    }
}

fn subscribers_for<T>(
    registry: &Mutex<Vec<(IeeeAddress, mpsc::Sender<T>)>>,
    address: IeeeAddress,
) -> Vec<mpsc::Sender<T>> {
    let mut txs = registry.lock();
    txs.retain(|(_, tx)| !tx.is_closed());
    txs.iter()
        .filter(|(a, _)| *a == address)
        .map(|(_, tx)| tx.clone())
        .collect()
}

/// Send `item` to every subscriber, waiting for queue space. Returns the
/// number of subscribers reached.
async fn deliver<T: Clone + Send>(txs: Vec<mpsc::Sender<T>>, item: T) -> usize {
    let mut delivered = 0;
    for tx in txs {
        if tx.send(item.clone()).await.is_ok() {
            delivered += 1;
        }
    }
    delivered
}

#[async_trait]
impl NetworkStack for SimulatedStack {
    async fn send(&self, request: Request, timeout: Duration) -> Result<Response, Error> {
        let name = request.name();
        let dst = request.destination();
        trace!(request = name, address = %dst.address, endpoint = dst.endpoint, "simulated request");

        let response = {
            let mut devices = self.inner.devices.lock();
            match devices.get_mut(&dst.address) {
                Some(device) => device.respond(&request),
                None => {
                    return Err(Error::UnknownDevice {
                        address: dst.address,
                    });
                }
            }
        };
        self.inner.requests.lock().push(request);

        if let Some(response) = response {
            Ok(response)
        } else {
            tokio::time::sleep(timeout).await;
            Err(Error::Timeout {
                request: name,
                timeout_secs: timeout.as_secs(),
            })
        }
    }

    async fn permit_join(&self, duration_secs: u8) -> Result<(), Error> {
        self.inner.permit_joins.lock().push(duration_secs);
        let status = *self.inner.permit_join_status.lock();
        if status == Status::Success {
            Ok(())
        } else {
            Err(Error::Status {
                request: "PermitJoin",
                status,
            })
        }
    }

    async fn fetch_device_list(&self) -> Result<(), Error> {
        let infos: Vec<NwkDeviceInfo> = self
            .inner
            .devices
            .lock()
            .values()
            .map(|d| d.info.clone())
            .collect();
        for info in infos {
            self.inner.announce(info).await;
        }
        Ok(())
    }

    async fn bind(&self, binding: Binding, timeout: Duration) -> Result<(), Error> {
        let unresponsive = self
            .inner
            .devices
            .lock()
            .get(&binding.source.address)
            .map(|d| d.unresponsive)
            .ok_or(Error::UnknownDevice {
                address: binding.source.address,
            })?;
        if unresponsive {
            tokio::time::sleep(timeout).await;
            return Err(Error::Timeout {
                request: "Bind",
                timeout_secs: timeout.as_secs(),
            });
        }
        self.inner.bindings.lock().push(binding);
        Ok(())
    }

    fn local_address(&self) -> IeeeAddress {
        self.inner.local_address
    }

    fn device_announcements(&self) -> mpsc::Receiver<NwkDeviceInfo> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        self.inner.announcement_txs.lock().push(tx);
        rx
    }

    fn bound_cluster_events(
        &self,
        address: IeeeAddress,
        endpoint: u8,
        cluster_id: u16,
    ) -> mpsc::Receiver<BoundClusterEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        self.inner
            .bound_txs
            .lock()
            .push((Destination::new(address, endpoint), cluster_id, tx));
        rx
    }

    fn zone_state_events(&self, address: IeeeAddress) -> mpsc::Receiver<ZoneStateEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        self.inner.zone_txs.lock().push((address, tx));
        rx
    }

    fn attribute_reports(&self, address: IeeeAddress) -> mpsc::Receiver<AttributeReport> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        self.inner.report_txs.lock().push((address, tx));
        rx
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const ADDR: IeeeAddress = IeeeAddress(0x0013_A200_1234_5678);
    const TIMEOUT: Duration = Duration::from_secs(2);

    fn light() -> SimDevice {
        SimDevice::new(ADDR)
            .endpoint(SimpleDescriptor {
                endpoint_id: 1,
                profile_id: 0x0104,
                device_id: 0x0102,
                input_clusters: vec![cluster::ON_OFF, cluster::LEVEL_CONTROL],
                output_clusters: vec![],
            })
            .identity("Acme", "Bulb")
    }

    fn dst() -> Destination {
        Destination::new(ADDR, 1)
    }

    #[tokio::test]
    async fn join_announces_to_subscribers() {
        let stack = SimulatedStack::new();
        let mut rx = stack.device_announcements();
        stack.join(light()).await;

        let info = rx.recv().await.unwrap();
        assert_eq!(info.ieee_address, ADDR);
        assert_eq!(info.simple_descriptors.len(), 1);
    }

    #[tokio::test]
    async fn set_then_get_reflects_state() {
        let stack = SimulatedStack::new();
        stack.add_device(light());

        stack
            .call(
                Request::SetOnOff {
                    dst: dst(),
                    command: OnOffCommand::Toggle,
                },
                TIMEOUT,
            )
            .await
            .unwrap();
        let body = stack
            .call(Request::GetOnOff { dst: dst() }, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(body, ResponseBody::OnOff(true));
        assert_eq!(stack.requests().len(), 2);
    }

    #[tokio::test]
    async fn level_is_clamped_to_device_maximum() {
        let stack = SimulatedStack::new();
        stack.add_device(light().state(SimState {
            max_level: 200,
            ..SimState::default()
        }));

        stack
            .call(
                Request::SetLevel {
                    dst: dst(),
                    level: 254,
                    transition_time: 0,
                },
                TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(stack.device_state(ADDR).unwrap().level, 200);
    }

    #[tokio::test]
    async fn basic_read_without_metadata_fails() {
        let stack = SimulatedStack::new();
        stack.add_device(SimDevice::new(ADDR));

        let err = stack
            .call(
                Request::ReadAttributes {
                    dst: dst(),
                    cluster: cluster::BASIC,
                    attributes: vec![
                        attribute::BASIC_MANUFACTURER_NAME,
                        attribute::BASIC_MODEL_IDENTIFIER,
                    ],
                },
                TIMEOUT,
            )
            .await
            .unwrap_err();
        assert!(err.is_protocol());
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_device_times_out() {
        let stack = SimulatedStack::new();
        stack.add_device(light().unresponsive());

        let err = stack
            .send(Request::GetLevel { dst: dst() }, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Timeout {
                request: "GetLevel",
                timeout_secs: 2
            }
        ));
    }

    #[tokio::test]
    async fn rejected_request_returns_status() {
        let stack = SimulatedStack::new();
        stack.add_device(light().reject("SetLevel", Status::Busy));

        let response = stack
            .send(
                Request::SetLevel {
                    dst: dst(),
                    level: 1,
                    transition_time: 0,
                },
                TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(response.status, Status::Busy);
    }

    #[tokio::test]
    async fn press_reaches_only_matching_binding() {
        let stack = SimulatedStack::new();
        stack.add_device(light());
        let mut bound = stack.bound_cluster_events(ADDR, 1, cluster::ON_OFF);
        let _other = stack.bound_cluster_events(ADDR, 2, cluster::ON_OFF);

        assert_eq!(stack.press(ADDR, 1).await, 1);
        let event = bound.recv().await.unwrap();
        assert_eq!(event.command_id, ON_OFF_TOGGLE_COMMAND);
    }

    #[tokio::test]
    async fn permit_join_failure_is_recorded() {
        let stack = SimulatedStack::new();
        stack.fail_permit_join(Status::Failure);

        assert!(stack.permit_join(30).await.is_err());
        assert_eq!(stack.permit_join_requests(), vec![30]);
    }
}

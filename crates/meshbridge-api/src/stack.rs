// ── Network stack abstraction ──
//
// The boundary between the bridge engine and the network processor.
// A production implementation speaks to the network-manager and gateway
// services; `SimulatedStack` implements it in memory.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::types::{
    AttributeReport, Binding, BoundClusterEvent, IeeeAddress, NwkDeviceInfo, Request, Response,
    ResponseBody, ZoneStateEvent,
};

/// Capacity of every subscription queue handed out by a stack.
pub const SUBSCRIPTION_CAPACITY: usize = 64;

/// Request/response and subscription surface of the mesh network.
///
/// All subscription methods return bounded queues; a slow consumer
/// applies backpressure to the stack rather than dropping events.
#[async_trait]
pub trait NetworkStack: Send + Sync + 'static {
    /// Send a gateway request and wait up to `timeout` for its confirmation.
    ///
    /// A non-success status is returned as part of the response; use
    /// [`call`](Self::call) to have it checked.
    async fn send(&self, request: Request, timeout: Duration) -> Result<Response, Error>;

    /// Send a request and turn a non-success status into [`Error::Status`].
    async fn call(&self, request: Request, timeout: Duration) -> Result<ResponseBody, Error> {
        let name = request.name();
        self.send(request, timeout).await?.into_result(name)
    }

    /// Open (or with `0`, close) the join window for `duration_secs` seconds.
    async fn permit_join(&self, duration_secs: u8) -> Result<(), Error>;

    /// Ask the network manager to re-announce every known device.
    async fn fetch_device_list(&self) -> Result<(), Error>;

    /// Bind a cluster on a remote endpoint to another endpoint.
    async fn bind(&self, binding: Binding, timeout: Duration) -> Result<(), Error>;

    /// The coordinator's own address, used as the binding destination.
    fn local_address(&self) -> IeeeAddress;

    /// Devices joining or being re-announced.
    fn device_announcements(&self) -> mpsc::Receiver<NwkDeviceInfo>;

    /// Commands arriving on `cluster` from a remote endpoint bound to us.
    fn bound_cluster_events(
        &self,
        address: IeeeAddress,
        endpoint: u8,
        cluster: u16,
    ) -> mpsc::Receiver<BoundClusterEvent>;

    /// Zone-status change notifications from one device.
    fn zone_state_events(&self, address: IeeeAddress) -> mpsc::Receiver<ZoneStateEvent>;

    /// Pushed attribute reports from one device.
    fn attribute_reports(&self, address: IeeeAddress) -> mpsc::Receiver<AttributeReport>;
}

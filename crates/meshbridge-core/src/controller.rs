// ── Bridge facade ──
//
// Lifecycle owner of one bridge instance. Subscribes to device
// announcements, dispatches discovery, drives pairing windows and vends
// reactive views of the registry.

use std::sync::Arc;

use meshbridge_api::{NetworkStack, NwkDeviceInfo};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::CapabilityBus;
use crate::channel::ChannelRuntime;
use crate::command::Command;
use crate::config::BridgeConfig;
use crate::discovery::{DiscoveryOutcome, DiscoveryPipeline};
use crate::error::CoreError;
use crate::model::{BatchState, BridgeEvent, ChannelState, Device, DeviceAddress};
use crate::pairing::PairingController;
use crate::services::Services;
use crate::store::{DeviceHandle, DeviceRegistry};
use crate::stream::DeviceStream;

// ── BridgeState ──────────────────────────────────────────────────────

/// Lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Running,
    Stopped,
}

// ── Bridge ───────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<BridgeInner>`.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    services: Services,
    registry: Arc<DeviceRegistry>,
    discovery: Arc<DiscoveryPipeline>,
    pairing: PairingController,
    state: watch::Sender<BridgeState>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    /// Create a bridge. Does NOT touch the network: call
    /// [`start()`](Self::start) to begin discovery.
    pub fn new(
        stack: Arc<dyn NetworkStack>,
        bus: Arc<dyn CapabilityBus>,
        config: BridgeConfig,
    ) -> Self {
        let services = Services::new(stack, bus, config);
        let registry = Arc::new(DeviceRegistry::new());
        let discovery = Arc::new(DiscoveryPipeline::new(
            services.clone(),
            Arc::clone(&registry),
        ));
        let pairing = PairingController::new(services.clone(), Arc::clone(&registry));
        let (state, _) = watch::channel(BridgeState::Idle);

        Self {
            inner: Arc::new(BridgeInner {
                services,
                registry,
                discovery,
                pairing,
                state,
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.services.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Subscribe to announcements, ask the network for its device list
    /// and open the join-on-start window.
    ///
    /// Device-list and join failures are logged; the bridge keeps
    /// listening for announcements either way.
    pub async fn start(&self) -> Result<(), CoreError> {
        let state = self.state();
        match state {
            BridgeState::Idle => {}
            BridgeState::Running => {
                debug!("bridge already running");
                return Ok(());
            }
            BridgeState::Stopped => return Err(CoreError::ShuttingDown),
        }

        let services = &self.inner.services;
        // Subscribe before fetching so no announcement is missed.
        let announcements = services.stack.device_announcements();
        {
            let mut handles = self.inner.task_handles.lock().await;
            handles.push(tokio::spawn(dispatch_task(
                Arc::clone(&self.inner.discovery),
                announcements,
                services.cancel.clone(),
            )));
        }
        self.inner.state.send_replace(BridgeState::Running);
        info!("bridge started");

        if services.config.fetch_devices_on_start {
            if let Err(e) = services.stack.fetch_device_list().await {
                warn!(error = %CoreError::from(e), "failed to fetch device list");
            }
        }

        if let Some(secs) = services.config.join_on_start_secs {
            if let Err(e) = self.inner.pairing.start_window(secs).await {
                warn!(error = %e, "failed to open join-on-start window");
            }
        }
        Ok(())
    }

    /// Cancel every background loop and wait for the dispatcher to exit.
    /// In-flight network requests are abandoned.
    pub async fn shutdown(&self) {
        self.inner.services.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        self.inner.state.send_replace(BridgeState::Stopped);
        debug!("bridge stopped");
    }

    /// Token cancelled by [`shutdown()`](Self::shutdown).
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.services.cancel.clone()
    }

    // ── Pairing ──────────────────────────────────────────────────────

    /// Open a join window. Returns the duration actually requested.
    pub async fn start_pairing(&self, secs: u16) -> Result<u8, CoreError> {
        self.ensure_running()?;
        self.inner.pairing.start_window(secs).await
    }

    /// Close the join window.
    pub async fn end_pairing(&self) -> Result<u8, CoreError> {
        self.ensure_running()?;
        self.inner.pairing.end_window().await
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Handle an announcement directly, bypassing the announcement queue.
    pub async fn discover(&self, info: NwkDeviceInfo) -> Result<DiscoveryOutcome, CoreError> {
        self.ensure_running()?;
        self.inner.discovery.on_device_found(info).await
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Run a command against one channel of a device.
    pub async fn execute(
        &self,
        address: DeviceAddress,
        channel_id: &str,
        command: Command,
    ) -> Result<ChannelState, CoreError> {
        let channel = self
            .channel(address, channel_id)
            .ok_or_else(|| CoreError::ChannelNotFound {
                address,
                channel: channel_id.to_owned(),
            })?;
        channel.execute(command).await
    }

    /// Apply a batch update through the device's batch channel.
    pub async fn apply_batch(
        &self,
        address: DeviceAddress,
        batch: &BatchState,
    ) -> Result<(), CoreError> {
        let record = self
            .inner
            .registry
            .get(address)
            .ok_or(CoreError::DeviceNotFound { address })?;
        let group = record.batch().ok_or_else(|| CoreError::ChannelNotFound {
            address,
            channel: crate::capability::BATCH_CHANNEL_ID.to_owned(),
        })?;
        group.apply_batch(batch).await
    }

    // ── State observation ────────────────────────────────────────────

    pub fn state(&self) -> BridgeState {
        *self.inner.state.borrow()
    }

    /// Subscribe to lifecycle state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<BridgeState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to the bridge event broadcast.
    pub fn events(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.services.events.subscribe()
    }

    // ── Registry accessors ───────────────────────────────────────────

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    pub fn device(&self, address: DeviceAddress) -> Option<DeviceHandle> {
        self.inner.registry.get(address)
    }

    pub fn channel(&self, address: DeviceAddress, channel_id: &str) -> Option<ChannelRuntime> {
        self.inner.registry.get(address)?.channel(channel_id).cloned()
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.registry.snapshot()
    }

    pub fn devices(&self) -> DeviceStream {
        self.inner.registry.devices()
    }

    pub fn devices_found(&self) -> u64 {
        self.inner.registry.devices_found()
    }

    fn ensure_running(&self) -> Result<(), CoreError> {
        if self.state() == BridgeState::Stopped || self.inner.services.cancel.is_cancelled() {
            return Err(CoreError::ShuttingDown);
        }
        Ok(())
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Spawn one discovery task per announcement. Announcements of the same
/// device are serialized by the registry, not here.
async fn dispatch_task(
    discovery: Arc<DiscoveryPipeline>,
    mut announcements: mpsc::Receiver<NwkDeviceInfo>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            info = announcements.recv() => {
                let Some(info) = info else {
                    warn!("announcement queue closed");
                    break;
                };
                let discovery = Arc::clone(&discovery);
                let address = DeviceAddress::from(info.ieee_address);
                tokio::spawn(async move {
                    if let Err(e) = discovery.on_device_found(info).await {
                        warn!(%address, error = %e, "device discovery failed");
                    }
                });
            }
        }
    }
    debug!("announcement dispatcher stopped");
}

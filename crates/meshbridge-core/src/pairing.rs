// ── Pairing window controller ──
//
// Opens a bounded join window on the network, then reports how many new
// devices were registered while it was open.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::model::BridgeEvent;
use crate::services::Services;
use crate::store::DeviceRegistry;

/// Longest window the controller will request. 255 means "stay open
/// forever" to the join protocol and is never sent.
pub const MAX_WINDOW_SECS: u8 = 254;

pub(crate) struct PairingController {
    services: Services,
    registry: Arc<DeviceRegistry>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl PairingController {
    pub fn new(services: Services, registry: Arc<DeviceRegistry>) -> Self {
        Self {
            services,
            registry,
            pending: Mutex::new(None),
        }
    }

    /// Open a join window of `secs` seconds (clamped to
    /// [`MAX_WINDOW_SECS`]). Returns the duration actually requested.
    ///
    /// The window ends with a `pairing-ended` event counting the devices
    /// registered since it opened. Earlier windows keep their own timers
    /// unless `supersede_pending_windows` is set.
    pub async fn start_window(&self, secs: u16) -> Result<u8, CoreError> {
        let duration = u8::try_from(secs).map_or(MAX_WINDOW_SECS, |s| s.min(MAX_WINDOW_SECS));

        self.services.stack.permit_join(duration).await?;
        info!(duration, "join window opened");
        self.services
            .emit(BridgeEvent::PairingStarted { duration })
            .await;

        let baseline = self.registry.devices_found();
        let task = tokio::spawn(window_task(
            self.services.clone(),
            Arc::clone(&self.registry),
            Duration::from_secs(u64::from(duration)),
            baseline,
            self.services.cancel.child_token(),
        ));

        let previous = self.pending.lock().replace(task);
        if let Some(previous) = previous {
            if self.services.config.supersede_pending_windows && !previous.is_finished() {
                debug!("superseding pending join window");
                previous.abort();
            }
        }
        Ok(duration)
    }

    /// Close the join window. Same as opening a zero-second window.
    pub async fn end_window(&self) -> Result<u8, CoreError> {
        self.start_window(0).await
    }
}

async fn window_task(
    services: Services,
    registry: Arc<DeviceRegistry>,
    duration: Duration,
    baseline: u64,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        () = tokio::time::sleep(duration) => {}
    }
    let devices_found = registry.devices_found().saturating_sub(baseline);
    info!(devices_found, "join window elapsed");
    services
        .emit(BridgeEvent::PairingEnded { devices_found })
        .await;
}

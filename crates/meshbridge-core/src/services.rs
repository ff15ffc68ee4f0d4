// ── Shared engine services ──
//
// Handles every component of one bridge needs: the network stack, the
// capability bus, configuration, the shutdown token and the local event
// broadcast.

use std::sync::Arc;

use meshbridge_api::NetworkStack;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::CapabilityBus;
use crate::config::BridgeConfig;
use crate::model::BridgeEvent;

#[derive(Clone)]
pub(crate) struct Services {
    pub stack: Arc<dyn NetworkStack>,
    pub bus: Arc<dyn CapabilityBus>,
    pub config: Arc<BridgeConfig>,
    pub cancel: CancellationToken,
    pub events: broadcast::Sender<BridgeEvent>,
}

impl Services {
    pub fn new(
        stack: Arc<dyn NetworkStack>,
        bus: Arc<dyn CapabilityBus>,
        config: BridgeConfig,
    ) -> Self {
        let config = config.normalized();
        let (events, _) = broadcast::channel(config.event_channel_size);
        Self {
            stack,
            bus,
            config: Arc::new(config),
            cancel: CancellationToken::new(),
            events,
        }
    }

    /// Broadcast locally and publish on the bus. Bus failures are logged.
    pub async fn emit(&self, event: BridgeEvent) {
        debug!(event = event.name(), "bridge event");
        // No local subscribers is fine.
        let _ = self.events.send(event.clone());
        if let Err(e) = self.bus.publish_bridge_event(&event).await {
            warn!(event = event.name(), error = %e, "failed to publish bridge event");
        }
    }
}

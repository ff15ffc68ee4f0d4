// ── Channel runtime ──
//
// One `ChannelRuntime` per (endpoint, cluster, direction) of a device.
// It configures reporting (or binding / zone subscription), exports
// itself on the bus, then runs its poll, command and feed loops until
// the bridge shuts down.

pub mod batch;

use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use meshbridge_api::{
    AttributeReport, Binding, BoundClusterEvent, Destination, OnOffCommand, Request,
    ZoneStateEvent,
};
use serde_json::{Value, json};
use strum::Display;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{ChannelExport, InboundCall};
use crate::capability::{Capability, CapabilityKind};
use crate::command::Command;
use crate::convert::{self, ZoneStatus};
use crate::error::CoreError;
use crate::model::{
    ChannelState, ChannelSummary, ColorMode, ColorState, DeviceAddress, EndpointDescriptor,
};
use crate::services::Services;

/// Level transition time sent with brightness changes, in tenths of a second.
const LEVEL_TRANSITION_TIME: u16 = 1;

// ── Lifecycle ────────────────────────────────────────────────────────

/// Initialization progress of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Lifecycle {
    Uninitialized,
    /// Reporting, binding or zone subscription attempted. Kinds with
    /// nothing to configure pass through this state too.
    ReportingConfigured,
    /// Exported; loops running.
    Active,
}

/// Asynchronous input a channel listens to besides polling.
enum Feed {
    Reports(mpsc::Receiver<AttributeReport>),
    Presses(mpsc::Receiver<BoundClusterEvent>),
    Zones(mpsc::Receiver<ZoneStateEvent>),
}

// ── ChannelRuntime ───────────────────────────────────────────────────

/// Live state of one capability channel.
///
/// Cheaply cloneable via `Arc<ChannelInner>`; clones share state.
#[derive(Clone)]
pub struct ChannelRuntime {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    id: String,
    address: DeviceAddress,
    capability: Capability,
    endpoint: ArcSwap<EndpointDescriptor>,
    services: Services,
    state: watch::Sender<Option<ChannelState>>,
    lifecycle: watch::Sender<Lifecycle>,
}

/// Lookup-only handle that does not keep a channel alive.
#[derive(Clone)]
pub(crate) struct WeakChannel(Weak<ChannelInner>);

impl WeakChannel {
    pub fn upgrade(&self) -> Option<ChannelRuntime> {
        self.0.upgrade().map(|inner| ChannelRuntime { inner })
    }
}

impl ChannelRuntime {
    pub(crate) fn new(
        services: Services,
        address: DeviceAddress,
        endpoint: EndpointDescriptor,
        capability: Capability,
    ) -> Self {
        let id = capability.channel_id(endpoint.endpoint_id);
        let (state, _) = watch::channel(None);
        let (lifecycle, _) = watch::channel(Lifecycle::Uninitialized);
        Self {
            inner: Arc::new(ChannelInner {
                id,
                address,
                capability,
                endpoint: ArcSwap::from_pointee(endpoint),
                services,
                state,
                lifecycle,
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> CapabilityKind {
        self.inner.capability.kind
    }

    pub fn capability(&self) -> Capability {
        self.inner.capability
    }

    pub fn address(&self) -> DeviceAddress {
        self.inner.address
    }

    /// Current endpoint binding (refreshed on rediscovery).
    pub fn endpoint(&self) -> Arc<EndpointDescriptor> {
        self.inner.endpoint.load_full()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.inner.lifecycle.borrow()
    }

    /// Last published state, if any.
    pub fn state(&self) -> Option<ChannelState> {
        self.inner.state.borrow().clone()
    }

    /// Watch every state change.
    pub fn subscribe(&self) -> watch::Receiver<Option<ChannelState>> {
        self.inner.state.subscribe()
    }

    pub fn export(&self) -> ChannelExport {
        let kind = self.kind();
        ChannelExport::new(self.id(), kind.protocol(), kind.methods(), kind.events())
    }

    pub fn summary(&self) -> ChannelSummary {
        ChannelSummary {
            id: self.inner.id.clone(),
            kind: self.kind(),
            protocol: self.kind().protocol().to_owned(),
        }
    }

    pub(crate) fn refresh_endpoint(&self, endpoint: EndpointDescriptor) {
        self.inner.endpoint.store(Arc::new(endpoint));
    }

    pub(crate) fn downgrade(&self) -> WeakChannel {
        WeakChannel(Arc::downgrade(&self.inner))
    }

    fn destination(&self) -> Destination {
        Destination::new(self.inner.address.to_ieee(), self.inner.endpoint.load().endpoint_id)
    }

    // ── Initialization ───────────────────────────────────────────────

    /// Configure reporting (best effort), export on the bus and start
    /// the channel's loops.
    ///
    /// Fails only when the bus refuses the export; the caller skips the
    /// channel in that case.
    pub async fn init(&self) -> Result<(), CoreError> {
        debug!(address = %self.inner.address, channel = self.id(), kind = %self.kind(), "initialising channel");

        let feed = self.prepare().await;
        self.inner.lifecycle.send_replace(Lifecycle::ReportingConfigured);

        let calls = self
            .inner
            .services
            .bus
            .export_channel(self.inner.address, &self.export())
            .await?;
        self.inner.lifecycle.send_replace(Lifecycle::Active);

        self.spawn_tasks(calls, feed);
        Ok(())
    }

    /// Reporting configuration, binding or zone subscription, depending on
    /// the kind. Failures are logged and never abort initialization.
    async fn prepare(&self) -> Option<Feed> {
        let services = &self.inner.services;
        let ieee = self.inner.address.to_ieee();
        match self.kind() {
            CapabilityKind::Button => {
                if let Err(e) = self.bind_to_coordinator().await {
                    warn!(address = %self.inner.address, channel = self.id(), error = %e, "failed to bind button cluster");
                }
                let endpoint_id = self.inner.endpoint.load().endpoint_id;
                Some(Feed::Presses(services.stack.bound_cluster_events(
                    ieee,
                    endpoint_id,
                    self.inner.capability.cluster,
                )))
            }
            CapabilityKind::Presence => Some(Feed::Zones(services.stack.zone_state_events(ieee))),
            kind => {
                let config = kind.reporting()?;
                // Subscribe first so no report sent right after configuration is lost.
                let reports = services.stack.attribute_reports(ieee);
                let request = Request::SetAttributeReporting {
                    dst: self.destination(),
                    cluster: self.inner.capability.cluster,
                    reports: vec![config],
                };
                match services
                    .stack
                    .call(request, services.config.reporting_timeout)
                    .await
                {
                    Ok(_) => debug!(address = %self.inner.address, channel = self.id(), "attribute reporting enabled"),
                    Err(e) => warn!(address = %self.inner.address, channel = self.id(), error = %e, "failed to enable attribute reporting"),
                }
                Some(Feed::Reports(reports))
            }
        }
    }

    async fn bind_to_coordinator(&self) -> Result<(), CoreError> {
        let services = &self.inner.services;
        let binding = Binding {
            source: self.destination(),
            cluster: self.inner.capability.cluster,
            target: Destination::new(
                services.stack.local_address(),
                services.config.local_endpoint,
            ),
        };
        services
            .stack
            .bind(binding, services.config.bind_timeout)
            .await?;
        Ok(())
    }

    fn spawn_tasks(&self, calls: mpsc::Receiver<InboundCall>, feed: Option<Feed>) {
        let services = &self.inner.services;
        let kind = self.kind();

        if kind.is_polled() {
            tokio::spawn(poll_task(
                self.clone(),
                services.config.poll_interval,
                services.cancel.child_token(),
            ));
        }
        if !kind.methods().is_empty() {
            tokio::spawn(command_task(self.clone(), calls, services.cancel.child_token()));
        }
        if let Some(feed) = feed {
            tokio::spawn(feed_task(self.clone(), feed, services.cancel.child_token()));
        }
    }

    // ── State ────────────────────────────────────────────────────────

    /// Fetch the current value from the device and publish it.
    pub async fn fetch_state(&self) -> Result<ChannelState, CoreError> {
        let dst = self.destination();
        let request = match self.kind() {
            CapabilityKind::OnOff => Request::GetOnOff { dst },
            CapabilityKind::Brightness => Request::GetLevel { dst },
            CapabilityKind::Color => Request::GetColor { dst },
            CapabilityKind::Temperature => Request::GetTemperature { dst },
            CapabilityKind::Humidity => Request::GetHumidity { dst },
            CapabilityKind::Power => Request::GetPower { dst },
            kind @ (CapabilityKind::Presence | CapabilityKind::Button) => {
                return Err(CoreError::Unsupported {
                    operation: format!("fetching {kind} state"),
                });
            }
        };
        let services = &self.inner.services;
        let body = services
            .stack
            .call(request, services.config.get_timeout)
            .await?;
        let state = convert::state_from_response(self.kind(), body)?;
        self.publish_state(state.clone()).await;
        Ok(state)
    }

    async fn publish_state(&self, state: ChannelState) {
        let payload = state.to_payload();
        self.inner.state.send_replace(Some(state));
        self.publish_event("state", payload).await;
    }

    async fn publish_event(&self, event: &str, payload: Value) {
        if let Err(e) = self
            .inner
            .services
            .bus
            .publish(self.inner.address, &self.inner.id, event, payload)
            .await
        {
            warn!(address = %self.inner.address, channel = self.id(), event, error = %e, "failed to publish channel event");
        }
    }

    // ── Setters ──────────────────────────────────────────────────────

    /// Send a set request with the short set timeout, then re-fetch so the
    /// published state is what the device confirms.
    async fn set_then_refetch(&self, request: Request) -> Result<ChannelState, CoreError> {
        let services = &self.inner.services;
        debug!(address = %self.inner.address, channel = self.id(), request = request.name(), "sending set request");
        services
            .stack
            .call(request, services.config.set_timeout)
            .await?;
        self.fetch_state().await
    }

    fn ensure_kind(&self, expected: CapabilityKind, operation: &str) -> Result<(), CoreError> {
        if self.kind() == expected {
            Ok(())
        } else {
            Err(CoreError::Unsupported {
                operation: format!("{operation} on {} channel {}", self.kind(), self.id()),
            })
        }
    }

    async fn send_on_off(&self, command: OnOffCommand) -> Result<ChannelState, CoreError> {
        self.ensure_kind(CapabilityKind::OnOff, "switching")?;
        self.set_then_refetch(Request::SetOnOff {
            dst: self.destination(),
            command,
        })
        .await
    }

    pub async fn turn_on(&self) -> Result<ChannelState, CoreError> {
        self.send_on_off(OnOffCommand::On).await
    }

    pub async fn turn_off(&self) -> Result<ChannelState, CoreError> {
        self.send_on_off(OnOffCommand::Off).await
    }

    pub async fn toggle(&self) -> Result<ChannelState, CoreError> {
        self.send_on_off(OnOffCommand::Toggle).await
    }

    pub async fn set_on_off(&self, on: bool) -> Result<ChannelState, CoreError> {
        self.send_on_off(if on { OnOffCommand::On } else { OnOffCommand::Off })
            .await
    }

    /// Set brightness from a 0.0..=1.0 fraction.
    pub async fn set_brightness(&self, fraction: f64) -> Result<ChannelState, CoreError> {
        self.ensure_kind(CapabilityKind::Brightness, "setting brightness")?;
        self.set_then_refetch(Request::SetLevel {
            dst: self.destination(),
            level: convert::fraction_to_level(fraction),
            transition_time: LEVEL_TRANSITION_TIME,
        })
        .await
    }

    /// Set color. Only hue mode is supported.
    pub async fn set_color(&self, color: &ColorState) -> Result<ChannelState, CoreError> {
        self.ensure_kind(CapabilityKind::Color, "setting color")?;
        if color.mode != ColorMode::Hue {
            return Err(CoreError::Unsupported {
                operation: format!("color mode {}", color.mode),
            });
        }
        let (Some(hue), Some(saturation)) = (color.hue, color.saturation) else {
            return Err(CoreError::InvalidParams {
                method: "set".into(),
                message: "hue mode requires hue and saturation".into(),
            });
        };
        self.set_then_refetch(Request::SetColor {
            dst: self.destination(),
            hue: convert::fraction_to_hue_sat(hue),
            saturation: convert::fraction_to_hue_sat(saturation),
        })
        .await
    }

    /// Run a parsed command against this channel.
    pub async fn execute(&self, command: Command) -> Result<ChannelState, CoreError> {
        match command {
            Command::TurnOn => self.turn_on().await,
            Command::TurnOff => self.turn_off().await,
            Command::Toggle => self.toggle().await,
            Command::SetOnOff(on) => self.set_on_off(on).await,
            Command::SetBrightness(fraction) => self.set_brightness(fraction).await,
            Command::SetColor(color) => self.set_color(&color).await,
            Command::SetBatch(_) => Err(CoreError::Unsupported {
                operation: format!("batch update on {} channel {}", self.kind(), self.id()),
            }),
        }
    }

    async fn handle_call(&self, call: InboundCall) {
        debug!(address = %self.inner.address, channel = self.id(), method = %call.method, "inbound call");
        let result = match Command::parse(self.kind(), &call.method, &call.params) {
            Ok(command) => self.execute(command).await.map(|state| state.to_payload()),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!(address = %self.inner.address, channel = self.id(), method = %call.method, error = %e, "inbound call failed");
        }
        call.respond(result);
    }

    // ── Feeds ────────────────────────────────────────────────────────

    /// Handle the next feed item. Returns `false` once the feed closed.
    async fn next_feed_item(&self, feed: &mut Feed) -> bool {
        let endpoint_id = self.inner.endpoint.load().endpoint_id;
        match feed {
            Feed::Reports(rx) => {
                let Some(report) = rx.recv().await else {
                    return false;
                };
                if report.endpoint == endpoint_id && report.cluster == self.inner.capability.cluster
                {
                    if let Some(state) = convert::state_from_report(self.kind(), &report.records) {
                        debug!(address = %self.inner.address, channel = self.id(), "attribute report");
                        self.publish_state(state).await;
                    }
                }
            }
            Feed::Presses(rx) => {
                let Some(event) = rx.recv().await else {
                    return false;
                };
                debug!(address = %self.inner.address, channel = self.id(), command = event.command_id, "button pressed");
                self.publish_event("pressed", json!(true)).await;
            }
            Feed::Zones(rx) => {
                let Some(event) = rx.recv().await else {
                    return false;
                };
                if event.endpoint == endpoint_id {
                    let status = ZoneStatus::from_bits(event.zone_status);
                    info!(address = %self.inner.address, channel = self.id(), flags = ?status.active_flags(), "zone status changed");
                    self.publish_state(ChannelState::Presence(status.alarm1()))
                        .await;
                }
            }
        }
        true
    }
}

impl std::fmt::Debug for ChannelRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRuntime")
            .field("id", &self.inner.id)
            .field("address", &self.inner.address)
            .field("kind", &self.kind())
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Poll immediately, then on every interval tick. Errors are logged and
/// retried on the next tick.
async fn poll_task(channel: ChannelRuntime, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = channel.fetch_state() => {
                        if let Err(e) = result {
                            warn!(address = %channel.address(), channel = channel.id(), error = %e, "state poll failed");
                        }
                    }
                }
            }
        }
    }
    debug!(address = %channel.address(), channel = channel.id(), "poll task stopped");
}

async fn command_task(
    channel: ChannelRuntime,
    mut calls: mpsc::Receiver<InboundCall>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            call = calls.recv() => {
                let Some(call) = call else { break };
                channel.handle_call(call).await;
            }
        }
    }
    debug!(address = %channel.address(), channel = channel.id(), "command task stopped");
}

async fn feed_task(channel: ChannelRuntime, mut feed: Feed, cancel: CancellationToken) {
    loop {
        let open = tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            open = channel.next_feed_item(&mut feed) => open,
        };
        if !open {
            break;
        }
    }
    debug!(address = %channel.address(), channel = channel.id(), "feed task stopped");
}

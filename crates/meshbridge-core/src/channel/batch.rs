// ── Batch composer ──
//
// Fans a single "set many properties" command out to a device's on/off,
// brightness and color channels. Holds only weak references: the device
// record owns the channels.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChannelRuntime, WeakChannel};
use crate::bus::{ChannelExport, InboundCall};
use crate::capability::{BATCH_CHANNEL_ID, CapabilityKind};
use crate::command::{BATCH_METHOD, BATCH_PROTOCOL, Command};
use crate::error::{BatchFailure, CoreError};
use crate::model::{BatchState, ChannelState, DeviceAddress};
use crate::services::Services;

/// Batch channel of one device.
#[derive(Clone)]
pub struct BatchGroup {
    address: DeviceAddress,
    on_off: Option<WeakChannel>,
    brightness: Option<WeakChannel>,
    color: Option<WeakChannel>,
    services: Services,
}

impl BatchGroup {
    /// Group the first on/off, brightness and color channel of a device.
    ///
    /// A batch channel only makes sense for dimmable or color devices:
    /// returns `None` when there is neither a brightness nor a color channel.
    pub(crate) fn assemble(
        services: Services,
        address: DeviceAddress,
        channels: &[ChannelRuntime],
    ) -> Option<Self> {
        let first = |kind: CapabilityKind| {
            channels
                .iter()
                .find(|c| c.kind() == kind)
                .map(ChannelRuntime::downgrade)
        };
        let brightness = first(CapabilityKind::Brightness);
        let color = first(CapabilityKind::Color);
        if brightness.is_none() && color.is_none() {
            return None;
        }
        Some(Self {
            address,
            on_off: first(CapabilityKind::OnOff),
            brightness,
            color,
            services,
        })
    }

    pub fn id(&self) -> &'static str {
        BATCH_CHANNEL_ID
    }

    pub fn export(&self) -> ChannelExport {
        ChannelExport::new(BATCH_CHANNEL_ID, BATCH_PROTOCOL, &[BATCH_METHOD], &[])
    }

    /// Kinds this group can drive.
    pub fn members(&self) -> Vec<CapabilityKind> {
        [
            (CapabilityKind::OnOff, &self.on_off),
            (CapabilityKind::Brightness, &self.brightness),
            (CapabilityKind::Color, &self.color),
        ]
        .into_iter()
        .filter(|(_, weak)| weak.as_ref().and_then(WeakChannel::upgrade).is_some())
        .map(|(kind, _)| kind)
        .collect()
    }

    /// Export on the bus and start the command loop.
    pub(crate) async fn init(&self) -> Result<(), CoreError> {
        let calls = self
            .services
            .bus
            .export_channel(self.address, &self.export())
            .await?;
        tokio::spawn(batch_task(
            self.clone(),
            calls,
            self.services.cancel.child_token(),
        ));
        Ok(())
    }

    /// Apply every requested property, on/off first, then brightness, then
    /// color. Each property is attempted even when an earlier one failed;
    /// failures are collected into a single [`CoreError::BatchFailed`].
    pub async fn apply_batch(&self, batch: &BatchState) -> Result<(), CoreError> {
        debug!(address = %self.address, ?batch, "applying batch");
        let mut failures = Vec::new();

        if let Some(on) = batch.on_off {
            let result = match self.member(self.on_off.as_ref(), CapabilityKind::OnOff) {
                Ok(channel) => channel.set_on_off(on).await,
                Err(e) => Err(e),
            };
            record(&mut failures, CapabilityKind::OnOff, result);
        }
        if let Some(fraction) = batch.brightness {
            let result = match self.member(self.brightness.as_ref(), CapabilityKind::Brightness) {
                Ok(channel) => channel.set_brightness(fraction).await,
                Err(e) => Err(e),
            };
            record(&mut failures, CapabilityKind::Brightness, result);
        }
        if let Some(color) = &batch.color {
            let result = match self.member(self.color.as_ref(), CapabilityKind::Color) {
                Ok(channel) => channel.set_color(color).await,
                Err(e) => Err(e),
            };
            record(&mut failures, CapabilityKind::Color, result);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CoreError::BatchFailed { failures })
        }
    }

    fn member(
        &self,
        weak: Option<&WeakChannel>,
        kind: CapabilityKind,
    ) -> Result<ChannelRuntime, CoreError> {
        weak.and_then(WeakChannel::upgrade)
            .ok_or_else(|| CoreError::ChannelNotFound {
                address: self.address,
                channel: kind.protocol().to_owned(),
            })
    }

    async fn handle_call(&self, call: InboundCall) {
        let result = match Command::parse_batch(&call.method, &call.params) {
            Ok(Command::SetBatch(batch)) => self.apply_batch(&batch).await.map(|()| Value::Null),
            Ok(other) => Err(CoreError::Unsupported {
                operation: format!("{other:?} on batch channel"),
            }),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!(address = %self.address, method = %call.method, error = %e, "batch call failed");
        }
        call.respond(result);
    }
}

fn record(
    failures: &mut Vec<BatchFailure>,
    kind: CapabilityKind,
    result: Result<ChannelState, CoreError>,
) {
    if let Err(e) = result {
        info!(property = kind.protocol(), error = %e, "batch property failed");
        failures.push(BatchFailure {
            property: kind.protocol(),
            error: e.to_string(),
        });
    }
}

async fn batch_task(
    group: BatchGroup,
    mut calls: mpsc::Receiver<InboundCall>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            call = calls.recv() => {
                let Some(call) = call else { break };
                group.handle_call(call).await;
            }
        }
    }
    debug!(address = %group.address, "batch task stopped");
}

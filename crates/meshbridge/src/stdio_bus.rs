// ── Line-delimited JSON capability bus ──
//
// Every export and publish becomes one JSON object on the writer (stdout
// in the binary). Inbound calls are read as JSON lines, routed to the
// addressed channel's queue, and answered with a `reply` frame carrying
// the caller's `id`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use meshbridge_core::bus::COMMAND_QUEUE_SIZE;
use meshbridge_core::{
    BridgeEvent, CapabilityBus, ChannelExport, CoreError, DeviceAddress, DeviceExport, InboundCall,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// ── Frames ──────────────────────────────────────────────────────────

/// One outbound line.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum Frame<'a> {
    Device {
        device: &'a DeviceExport,
    },
    Channel {
        device: DeviceAddress,
        channel: &'a ChannelExport,
    },
    Event {
        device: DeviceAddress,
        channel: &'a str,
        event: &'a str,
        payload: Value,
    },
    Bridge {
        event: &'static str,
        payload: Value,
    },
    Reply {
        id: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// One inbound line.
#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    device: DeviceAddress,
    channel: String,
    method: String,
    #[serde(default)]
    params: Value,
}

// ── StdioBus ────────────────────────────────────────────────────────

pub struct StdioBus<W> {
    writer: Mutex<W>,
    channels: DashMap<(DeviceAddress, String), mpsc::Sender<InboundCall>>,
}

impl<W: AsyncWrite + Unpin + Send + 'static> StdioBus<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            channels: DashMap::new(),
        }
    }

    async fn write_frame(&self, frame: &Frame<'_>) -> Result<(), CoreError> {
        let mut line = serde_json::to_vec(frame).map_err(bus_error)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await.map_err(bus_error)?;
        writer.flush().await.map_err(bus_error)
    }

    /// Read requests from `reader` until EOF or cancellation. Each request
    /// is answered on its own task so a slow device never blocks the rest.
    pub async fn serve<R>(self: Arc<Self>, reader: R, cancel: CancellationToken)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    let bus = Arc::clone(&self);
                    tokio::spawn(async move { bus.handle_line(&line).await });
                }
                Ok(None) => {
                    debug!("inbound stream closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "failed to read inbound request");
                    break;
                }
            }
        }
    }

    async fn handle_line(&self, line: &str) {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "malformed inbound request");
                self.reply(Value::Null, Err(format!("malformed request: {e}")))
                    .await;
                return;
            }
        };

        let result = self.dispatch(&request).await.map_err(|e| e.to_string());
        self.reply(request.id, result).await;
    }

    async fn dispatch(&self, request: &Request) -> Result<Value, CoreError> {
        let sender = self
            .channels
            .get(&(request.device, request.channel.clone()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CoreError::ChannelNotFound {
                address: request.device,
                channel: request.channel.clone(),
            })?;

        let (call, reply) = InboundCall::new(request.method.clone(), request.params.clone());
        sender.send(call).await.map_err(|_| CoreError::ShuttingDown)?;
        reply.await.map_err(|_| CoreError::ShuttingDown)?
    }

    async fn reply(&self, id: Value, result: Result<Value, String>) {
        let (result, error) = match result {
            Ok(value) => (Some(value), None),
            Err(message) => (None, Some(message)),
        };
        if let Err(e) = self.write_frame(&Frame::Reply { id, result, error }).await {
            warn!(error = %e, "failed to write reply");
        }
    }
}

fn bus_error(err: impl std::fmt::Display) -> CoreError {
    CoreError::Bus {
        message: err.to_string(),
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> CapabilityBus for StdioBus<W> {
    async fn export_device(&self, device: &DeviceExport) -> Result<(), CoreError> {
        self.write_frame(&Frame::Device { device }).await
    }

    async fn export_channel(
        &self,
        device: DeviceAddress,
        channel: &ChannelExport,
    ) -> Result<mpsc::Receiver<InboundCall>, CoreError> {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        self.channels.insert((device, channel.id.clone()), tx);
        self.write_frame(&Frame::Channel { device, channel }).await?;
        Ok(rx)
    }

    async fn publish(
        &self,
        device: DeviceAddress,
        channel: &str,
        event: &str,
        payload: Value,
    ) -> Result<(), CoreError> {
        self.write_frame(&Frame::Event {
            device,
            channel,
            event,
            payload,
        })
        .await
    }

    async fn publish_bridge_event(&self, event: &BridgeEvent) -> Result<(), CoreError> {
        self.write_frame(&Frame::Bridge {
            event: event.name(),
            payload: event.payload(),
        })
        .await
    }
}

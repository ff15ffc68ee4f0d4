// ── Core error types ──
//
// Errors surfaced by the engine. Consumers never see raw wire types:
// the `From<meshbridge_api::Error>` impl sorts network-stack failures
// into transport and protocol variants.

use meshbridge_api::Status;
use thiserror::Error;

use crate::model::DeviceAddress;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Transport errors ─────────────────────────────────────────────
    #[error("Network stack request timed out after {timeout_secs}s ({request})")]
    Timeout {
        request: &'static str,
        timeout_secs: u64,
    },

    #[error("Network stack unavailable: {reason}")]
    Transport { reason: String },

    // ── Protocol errors ──────────────────────────────────────────────
    #[error("Device rejected {request} with status {status}")]
    Rejected {
        request: &'static str,
        status: Status,
    },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Invalid device address: {input:?}")]
    InvalidAddress { input: String },

    #[error("Device not found: {address}")]
    DeviceNotFound { address: DeviceAddress },

    #[error("Channel {channel} not found on device {address}")]
    ChannelNotFound {
        address: DeviceAddress,
        channel: String,
    },

    #[error("Basic information unavailable for {address}: {reason}")]
    MetadataUnavailable {
        address: DeviceAddress,
        reason: String,
    },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },

    #[error("Unknown method {method:?} on {protocol} channel")]
    UnknownMethod {
        protocol: &'static str,
        method: String,
    },

    #[error("Invalid parameters for {method}: {message}")]
    InvalidParams { method: String, message: String },

    #[error("Batch update failed: {}", format_failures(.failures))]
    BatchFailed { failures: Vec<BatchFailure> },

    // ── Bus errors ───────────────────────────────────────────────────
    #[error("Capability bus error: {message}")]
    Bus { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Bridge is shutting down")]
    ShuttingDown,
}

/// One failed property of a batch update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub property: &'static str,
    pub error: String,
}

fn format_failures(failures: &[BatchFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.property, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl CoreError {
    /// The request never produced a usable answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }

    /// The device answered, but not with success.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Protocol { .. })
    }
}

// ── Conversion from network-stack errors ─────────────────────────────

impl From<meshbridge_api::Error> for CoreError {
    fn from(err: meshbridge_api::Error) -> Self {
        match err {
            meshbridge_api::Error::Timeout {
                request,
                timeout_secs,
            } => CoreError::Timeout {
                request,
                timeout_secs,
            },
            meshbridge_api::Error::ConnectionLost { service, reason } => CoreError::Transport {
                reason: format!("connection to {service} lost: {reason}"),
            },
            meshbridge_api::Error::SubscriptionClosed(what) => CoreError::Transport {
                reason: format!("{what} subscription closed"),
            },
            meshbridge_api::Error::Status { request, status } => {
                CoreError::Rejected { request, status }
            }
            meshbridge_api::Error::UnexpectedResponse { request, got } => CoreError::Protocol {
                message: format!("unexpected {got} response to {request}"),
            },
            meshbridge_api::Error::UnknownDevice { address } => CoreError::DeviceNotFound {
                address: address.into(),
            },
        }
    }
}

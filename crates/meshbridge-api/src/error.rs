use thiserror::Error;

use crate::types::{IeeeAddress, Status};

/// Top-level error type for the `meshbridge-api` crate.
///
/// Splits into transport failures (the request never got a usable answer)
/// and protocol failures (the device answered, but not with success).
/// `meshbridge-core` maps these into its own error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// No response arrived within the request timeout.
    #[error("{request} timed out after {timeout_secs}s")]
    Timeout {
        request: &'static str,
        timeout_secs: u64,
    },

    /// Connection to one of the network-processor services dropped.
    #[error("Connection to {service} lost: {reason}")]
    ConnectionLost { service: String, reason: String },

    /// A subscription queue was closed by the stack.
    #[error("Subscription closed: {0}")]
    SubscriptionClosed(&'static str),

    // ── Protocol ────────────────────────────────────────────────────
    /// The device or gateway answered with a non-success status.
    #[error("{request} failed with status {status}")]
    Status {
        request: &'static str,
        status: Status,
    },

    /// The response body did not match the request that was sent.
    #[error("Unexpected response to {request}: got {got}")]
    UnexpectedResponse {
        request: &'static str,
        got: &'static str,
    },

    /// The addressed device is not known to the network manager.
    #[error("Unknown device {address}")]
    UnknownDevice { address: IeeeAddress },
}

impl Error {
    /// Returns `true` if the request never produced a usable answer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ConnectionLost { .. } | Self::SubscriptionClosed(_)
        )
    }

    /// Returns `true` if the device answered with a failure.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Status { .. } | Self::UnexpectedResponse { .. } | Self::UnknownDevice { .. }
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ConnectionLost { .. } => true,
            Self::Status { status, .. } => matches!(status, Status::Busy | Status::Timeout),
            _ => false,
        }
    }
}

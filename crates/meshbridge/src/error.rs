//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with help text
//! and a stable process exit code.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use meshbridge_config::ConfigError;
use meshbridge_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 3;
    pub const NOT_READY: i32 = 4;
    pub const TRANSPORT: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Startup ──────────────────────────────────────────────────────
    #[error("Network processor not ready: {} did not appear within {waited_secs}s", .path.display())]
    #[diagnostic(
        code(meshbridge::not_ready),
        help(
            "The stable flag file is written once the network processor has started.\n\
             Check the processor service, or pass --zigbee-stable-file with the right path."
        )
    )]
    NotReady { path: PathBuf, waited_secs: u64 },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(meshbridge::config),
        help("Run: meshbridge config path  to see which file is loaded")
    )]
    Config(#[from] ConfigError),

    // ── Bridge ───────────────────────────────────────────────────────
    #[error("Network stack request timed out")]
    #[diagnostic(code(meshbridge::timeout))]
    Timeout {
        #[source]
        source: CoreError,
    },

    #[error("Network stack unavailable")]
    #[diagnostic(code(meshbridge::transport))]
    Transport {
        #[source]
        source: CoreError,
    },

    #[error(transparent)]
    #[diagnostic(code(meshbridge::bridge))]
    Bridge(CoreError),

    // ── I/O ──────────────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    #[diagnostic(code(meshbridge::io))]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotReady { .. } => exit_code::NOT_READY,
            Self::Config(_) => exit_code::CONFIG,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Transport { .. } => exit_code::TRANSPORT,
            Self::Bridge(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Timeout { .. } => Self::Timeout { source: err },
            CoreError::Transport { .. } => Self::Transport { source: err },
            other => Self::Bridge(other),
        }
    }
}

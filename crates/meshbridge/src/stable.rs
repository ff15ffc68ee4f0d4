// ── Stable-flag gate ──
//
// The network processor writes a flag file once it is up. Nothing talks
// to the stack before that file exists.

use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::CliError;

/// How often the flag file is checked.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Wait until `path` exists, checking every `poll`. With a `timeout`,
/// gives up with `CliError::NotReady` once it elapses.
pub async fn wait_for_flag(
    path: &Path,
    poll: Duration,
    timeout: Option<Duration>,
) -> Result<(), CliError> {
    let started = Instant::now();
    let mut announced = false;

    loop {
        if path.exists() {
            debug!(path = %path.display(), "stable flag present");
            return Ok(());
        }
        if !announced {
            info!(path = %path.display(), "waiting for network processor stable flag");
            announced = true;
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                return Err(CliError::NotReady {
                    path: path.to_path_buf(),
                    waited_secs: limit.as_secs(),
                });
            }
        }
        tokio::time::sleep(poll).await;
    }
}

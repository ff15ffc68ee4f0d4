// ── Runtime engine configuration ──
//
// These values tune how the bridge talks to the network stack. They
// never touch disk: `meshbridge-config` builds a `BridgeConfig` and
// hands it to `Bridge::new`.

use std::time::Duration;

/// Shortest poll interval a bridge will run with.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Timeouts, intervals and queue sizes for one bridge instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Interval between state polls of every pollable channel.
    pub poll_interval: Duration,
    /// Timeout of get-state requests.
    pub get_timeout: Duration,
    /// Timeout of set-state requests.
    pub set_timeout: Duration,
    /// Timeout of attribute-reporting configuration.
    pub reporting_timeout: Duration,
    /// Timeout of the basic-information read on first discovery.
    pub basic_info_timeout: Duration,
    /// Timeout of cluster binding for button channels.
    pub bind_timeout: Duration,
    /// Endpoint on the coordinator that button clusters are bound to.
    pub local_endpoint: u8,
    /// Open a join window of this many seconds once started.
    pub join_on_start_secs: Option<u16>,
    /// Ask the network manager to re-announce known devices on start.
    pub fetch_devices_on_start: bool,
    /// Cancel the pending end-of-window timer when a new window opens.
    pub supersede_pending_windows: bool,
    /// Local event broadcast capacity.
    pub event_channel_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            get_timeout: Duration::from_secs(10),
            set_timeout: Duration::from_secs(2),
            reporting_timeout: Duration::from_secs(20),
            basic_info_timeout: Duration::from_secs(10),
            bind_timeout: Duration::from_secs(10),
            local_endpoint: 5,
            join_on_start_secs: Some(120),
            fetch_devices_on_start: true,
            supersede_pending_windows: false,
            event_channel_size: 256,
        }
    }
}

impl BridgeConfig {
    /// Raise values the runtime cannot work with to their minimum.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.poll_interval = self.poll_interval.max(MIN_POLL_INTERVAL);
        self.event_channel_size = self.event_channel_size.max(1);
        self
    }
}

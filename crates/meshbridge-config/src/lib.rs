//! Configuration for the meshbridge binary.
//!
//! A TOML file (platform config dir, or an explicit path) merged with
//! `MESHBRIDGE_`-prefixed environment variables, validated, then
//! translated into `meshbridge_core::BridgeConfig` and simulator seed
//! devices.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use meshbridge_api::{IeeeAddress, SimDevice, SimpleDescriptor};
use meshbridge_core::BridgeConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix. Nested keys use `__`, e.g.
/// `MESHBRIDGE_BRIDGE__POLL_INTERVAL_SECS=5`.
pub const ENV_PREFIX: &str = "MESHBRIDGE_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    /// Startup waits until this file exists (network processor ready).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_flag_file: Option<PathBuf>,

    #[serde(default)]
    pub bridge: BridgeSection,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Where the network-stack services listen.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub gateway_port: u16,

    #[serde(default = "default_nwkmgr_port")]
    pub nwkmgr_port: u16,

    #[serde(default = "default_ota_port")]
    pub ota_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            gateway_port: default_gateway_port(),
            nwkmgr_port: default_nwkmgr_port(),
            ota_port: default_ota_port(),
        }
    }
}

fn default_host() -> String {
    "localhost".into()
}
fn default_gateway_port() -> u16 {
    2541
}
fn default_nwkmgr_port() -> u16 {
    2540
}
fn default_ota_port() -> u16 {
    2525
}

/// Engine tuning. Durations are in whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BridgeSection {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_get_timeout")]
    pub get_timeout_secs: u64,

    #[serde(default = "default_set_timeout")]
    pub set_timeout_secs: u64,

    #[serde(default = "default_reporting_timeout")]
    pub reporting_timeout_secs: u64,

    #[serde(default = "default_get_timeout")]
    pub basic_info_timeout_secs: u64,

    #[serde(default = "default_get_timeout")]
    pub bind_timeout_secs: u64,

    #[serde(default = "default_local_endpoint")]
    pub local_endpoint: u8,

    /// `0` disables the join window on start.
    #[serde(default = "default_join_on_start")]
    pub join_on_start_secs: u16,

    #[serde(default = "default_true")]
    pub fetch_devices_on_start: bool,

    #[serde(default)]
    pub supersede_pending_windows: bool,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            get_timeout_secs: default_get_timeout(),
            set_timeout_secs: default_set_timeout(),
            reporting_timeout_secs: default_reporting_timeout(),
            basic_info_timeout_secs: default_get_timeout(),
            bind_timeout_secs: default_get_timeout(),
            local_endpoint: default_local_endpoint(),
            join_on_start_secs: default_join_on_start(),
            fetch_devices_on_start: true,
            supersede_pending_windows: false,
        }
    }
}

fn default_poll_interval() -> u64 {
    10
}
fn default_get_timeout() -> u64 {
    10
}
fn default_set_timeout() -> u64 {
    2
}
fn default_reporting_timeout() -> u64 {
    20
}
fn default_local_endpoint() -> u8 {
    5
}
fn default_join_on_start() -> u16 {
    120
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}

/// Devices the simulated network starts with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub devices: Vec<SimDeviceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SimDeviceConfig {
    /// IEEE address as hex, with or without `0x`.
    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub id: u8,

    #[serde(default = "default_profile")]
    pub profile: u16,

    #[serde(default)]
    pub device_type: u16,

    #[serde(default)]
    pub input: Vec<u16>,

    #[serde(default)]
    pub output: Vec<u16>,
}

fn default_profile() -> u16 {
    meshbridge_core::capability::PROFILE_HOME_AUTOMATION
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "meshbridge", "meshbridge").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("meshbridge");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load and validate the config at the default path. A missing file
/// yields the defaults.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load and validate the config at `path`, merged with the environment.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment_for(path)
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    config.validate()?;
    Ok(config)
}

/// Defaults merged with the TOML file only.
fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
}

/// Serialize config to pretty TOML.
pub fn to_toml(config: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

// ── Validation & translation ────────────────────────────────────────

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.host.trim().is_empty() {
            return Err(invalid("network.host", "must not be empty"));
        }
        for (field, port) in [
            ("network.gateway_port", self.network.gateway_port),
            ("network.nwkmgr_port", self.network.nwkmgr_port),
            ("network.ota_port", self.network.ota_port),
        ] {
            if port == 0 {
                return Err(invalid(field, "port must be non-zero"));
            }
        }

        let bridge = &self.bridge;
        if bridge.poll_interval_secs == 0 {
            return Err(invalid("bridge.poll_interval_secs", "must be at least 1"));
        }
        for (field, secs) in [
            ("bridge.get_timeout_secs", bridge.get_timeout_secs),
            ("bridge.set_timeout_secs", bridge.set_timeout_secs),
            ("bridge.reporting_timeout_secs", bridge.reporting_timeout_secs),
            ("bridge.basic_info_timeout_secs", bridge.basic_info_timeout_secs),
            ("bridge.bind_timeout_secs", bridge.bind_timeout_secs),
        ] {
            if secs == 0 {
                return Err(invalid(field, "timeout must be at least 1 second"));
            }
        }

        if !matches!(self.log.format.as_str(), "pretty" | "json") {
            return Err(invalid(
                "log.format",
                format!("expected 'pretty' or 'json', got '{}'", self.log.format),
            ));
        }

        for device in &self.simulator.devices {
            device.to_sim_device()?;
        }
        Ok(())
    }

    /// Engine configuration for these settings.
    pub fn bridge_config(&self) -> BridgeConfig {
        let b = &self.bridge;
        BridgeConfig {
            poll_interval: Duration::from_secs(b.poll_interval_secs),
            get_timeout: Duration::from_secs(b.get_timeout_secs),
            set_timeout: Duration::from_secs(b.set_timeout_secs),
            reporting_timeout: Duration::from_secs(b.reporting_timeout_secs),
            basic_info_timeout: Duration::from_secs(b.basic_info_timeout_secs),
            bind_timeout: Duration::from_secs(b.bind_timeout_secs),
            local_endpoint: b.local_endpoint,
            join_on_start_secs: (b.join_on_start_secs > 0).then_some(b.join_on_start_secs),
            fetch_devices_on_start: b.fetch_devices_on_start,
            supersede_pending_windows: b.supersede_pending_windows,
            ..BridgeConfig::default()
        }
    }

    /// Seed devices for the simulated network.
    pub fn sim_devices(&self) -> Result<Vec<SimDevice>, ConfigError> {
        self.simulator
            .devices
            .iter()
            .map(SimDeviceConfig::to_sim_device)
            .collect()
    }
}

impl SimDeviceConfig {
    pub fn to_sim_device(&self) -> Result<SimDevice, ConfigError> {
        let address: IeeeAddress = self.address.parse().map_err(|_| {
            invalid(
                "simulator.devices.address",
                format!("'{}' is not a 64-bit hex address", self.address),
            )
        })?;
        if self.endpoints.is_empty() {
            return Err(invalid(
                "simulator.devices.endpoints",
                format!("device {address} has no endpoints"),
            ));
        }

        let mut device = SimDevice::new(address);
        device.manufacturer.clone_from(&self.manufacturer);
        device.model.clone_from(&self.model);
        for ep in &self.endpoints {
            device = device.endpoint(SimpleDescriptor {
                endpoint_id: ep.id,
                profile_id: ep.profile,
                device_id: ep.device_type,
                input_clusters: ep.input.clone(),
                output_clusters: ep.output.clone(),
            });
        }
        Ok(device)
    }
}

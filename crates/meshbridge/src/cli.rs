//! Clap derive structures for the `meshbridge` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// meshbridge -- expose mesh network devices as capability channels
#[derive(Debug, Parser)]
#[command(
    name = "meshbridge",
    version,
    about = "Bridge a mesh home-automation network onto a capability bus",
    long_about = "Discovers devices on a mesh network, classifies their clusters into\n\
        capability channels, and exports them as JSON lines on stdout.\n\
        Commands for exported channels are read as JSON lines from stdin.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "MESHBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format for listings
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Log format (overrides `log.format` in the config file)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Channel ids, one per line
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bridge over a simulated mesh, bus traffic on stdio
    #[command(alias = "sim")]
    Simulate(SimulateArgs),

    /// Show the capability channels an endpoint would expose
    Classify(ClassifyArgs),

    /// Inspect configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Simulate ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Network stack host (overrides `network.host`)
    #[arg(long = "zstack-host", env = "MESHBRIDGE_ZSTACK_HOST")]
    pub host: Option<String>,

    /// Wait for this file before starting (overrides `stable_flag_file`)
    #[arg(long = "zigbee-stable-file")]
    pub stable_flag_file: Option<PathBuf>,

    /// Give up waiting for the stable flag after this many seconds
    #[arg(long, value_name = "SECS")]
    pub stable_timeout: Option<u64>,

    /// Join window opened on start, in seconds (0 disables it)
    #[arg(long, value_name = "SECS")]
    pub join_secs: Option<u16>,

    /// Seed the network with a dimmable light, a color light, a plug and a sensor
    #[arg(long)]
    pub demo: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long, value_name = "SECS")]
    pub run_for: Option<u64>,
}

// ── Classify ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Endpoint id
    #[arg(long, default_value_t = 1)]
    pub endpoint: u8,

    /// Application profile id (decimal or 0x-hex)
    #[arg(long, default_value = "0x0104", value_parser = parse_u16)]
    pub profile: u16,

    /// Device type id (decimal or 0x-hex)
    #[arg(long, default_value = "0", value_parser = parse_u16)]
    pub device_type: u16,

    /// Input (server) cluster ids, comma separated
    #[arg(long, value_delimiter = ',', value_parser = parse_u16)]
    pub input_clusters: Vec<u16>,

    /// Output (client) cluster ids, comma separated
    #[arg(long, value_delimiter = ',', value_parser = parse_u16)]
    pub output_clusters: Vec<u16>,
}

/// Accepts `6`, `0x0006` or `0X6`.
pub fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("'{s}' is not a 16-bit id: {e}"))
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

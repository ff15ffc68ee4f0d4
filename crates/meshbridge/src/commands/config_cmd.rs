//! Config subcommand handlers.

use meshbridge_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Config file in effect: `--config`, else the platform default.
pub fn effective_path(global: &GlobalOpts) -> std::path::PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

/// Load and validate the effective config, merged with the environment.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(config::load_config_from(&effective_path(global))?)
}

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&effective_path(global).display().to_string());
        }
        ConfigCommand::Show => {
            let cfg = load(global)?;
            output::print_output(config::to_toml(&cfg)?.trim_end());
        }
    }
    Ok(())
}

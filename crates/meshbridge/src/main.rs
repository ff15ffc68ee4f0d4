mod cli;
mod commands;
mod error;
mod output;
mod stable;
mod stdio_bus;

use clap::{CommandFactory, Parser};
use meshbridge_config::LogConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, GlobalOpts, LogFormat};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Exit explicitly: a pending stdin read would otherwise hold the
    // runtime open until the next line arrives.
    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            std::process::exit(code);
        }
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over everything else.
fn init_tracing(global: &GlobalOpts, log: Option<&LogConfig>) {
    let level = match global.verbose {
        0 => log.map_or("warn", |l| l.level.as_str()),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let json = match global.log_format {
        Some(format) => format == LogFormat::Json,
        None => log.is_some_and(|l| l.format == "json"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "meshbridge", &mut std::io::stdout());
            Ok(())
        }

        Command::Classify(args) => {
            init_tracing(&cli.global, None);
            commands::classify::handle(&args, &cli.global);
            Ok(())
        }

        Command::Config(args) => {
            init_tracing(&cli.global, None);
            commands::config_cmd::handle(&args, &cli.global)
        }

        Command::Simulate(args) => {
            let config = commands::config_cmd::load(&cli.global)?;
            init_tracing(&cli.global, Some(&config.log));
            tracing::debug!(?args, "starting simulation");
            commands::simulate::handle(args, config).await
        }
    }
}

mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use switchyard_config::Settings;

use crate::cli::{Cli, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    let settings = match load_settings(&cli.global) {
        Ok(settings) => settings,
        Err(err) => exit_with(err),
    };

    init_tracing(cli.global.verbose, settings.log_filter.as_deref());

    if let Err(err) = commands::dispatch(cli.command, &cli.global, &settings).await {
        exit_with(err);
    }
}

fn exit_with(err: CliError) -> ! {
    let code = err.exit_code();
    eprintln!("{:?}", miette::Report::new(err));
    std::process::exit(code);
}

fn load_settings(global: &GlobalOpts) -> Result<Settings, CliError> {
    let settings = match &global.settings {
        Some(path) => switchyard_config::load_settings_from(path)?,
        None => switchyard_config::load_settings()?,
    };
    Ok(settings)
}

/// `RUST_LOG` wins; otherwise `-v` picks the level, and with no `-v` the
/// settings file's `log_filter` (or "warn") applies.
fn init_tracing(verbosity: u8, configured: Option<&str>) {
    let filter = match verbosity {
        0 => configured.unwrap_or("warn"),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

//! Command dispatch: CLI args -> runtime load -> output formatting.

pub mod check;
pub mod devices;
pub mod join_map;
pub mod run;
pub mod settings_cmd;
pub mod show_config;
pub mod tie_lines;
pub mod types;
pub mod util;

use switchyard_config::Settings;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a parsed command to its handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts, settings: &Settings) -> Result<(), CliError> {
    tracing::debug!(command = ?cmd, "dispatching command");
    match cmd {
        Command::Check(args) => check::handle(&args, global, settings),
        Command::Devices(args) => devices::handle(&args, global, settings),
        Command::TieLines(args) => tie_lines::handle(&args, global, settings),
        Command::JoinMap(args) => join_map::handle(&args, global, settings),
        Command::ShowConfig(args) => show_config::handle(&args, global, settings),
        Command::Types => types::handle(global),
        Command::Settings(args) => settings_cmd::handle(&args, global, settings),
        Command::Run(args) => run::handle(&args, global, settings).await,
    }
}

//! Clap derive structures for the `switchyard` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// switchyard -- load and inspect AV control systems
#[derive(Debug, Parser)]
#[command(
    name = "switchyard",
    version,
    about = "Load, inspect and run AV control system configurations",
    long_about = "Builds every device described by a system file, links them to each\n\
        other and to their control-surface bridges, and reports what loaded.\n\n\
        Inspection commands load the system, print, and tear it down again.\n\
        `run` keeps it loaded until interrupted.",
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
    /// Settings file (defaults to the platform config directory)
    #[arg(long, env = "SWITCHYARD_SETTINGS", global = true)]
    pub settings: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SWITCHYARD_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a system file and report every entry that failed
    Check(CheckArgs),

    /// List loaded devices and their lifecycle state
    #[command(alias = "dev", alias = "d")]
    Devices(SystemArgs),

    /// List the tie lines of the routing graph
    #[command(alias = "tl")]
    TieLines(SystemArgs),

    /// Show the effective joins of a device on a bridge
    #[command(alias = "jm")]
    JoinMap(JoinMapArgs),

    /// Print the configuration the system was loaded from
    ShowConfig(SystemArgs),

    /// List every device type the factory chain can build
    Types,

    /// Show or initialise runtime settings
    Settings(SettingsArgs),

    /// Load a system and keep it running until Ctrl-C
    Run(SystemArgs),
}

// ── Arguments ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SystemArgs {
    /// System file (JSON). Falls back to `system_file` in settings.
    #[arg(long, short = 'f', env = "SWITCHYARD_SYSTEM_FILE")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub system: SystemArgs,

    /// Exit non-zero when any entry failed to load
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct JoinMapArgs {
    /// Key of the bridge device
    pub bridge: String,

    /// Key of the device linked to that bridge
    pub device: String,

    #[command(flatten)]
    pub system: SystemArgs,
}

#[derive(Debug, Args)]
pub struct SettingsArgs {
    /// Write default settings to the settings file
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing settings file with --init
    #[arg(long, requires = "init")]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }
}

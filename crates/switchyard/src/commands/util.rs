//! Shared helpers for command handlers.

use std::path::PathBuf;

use tracing::debug;

use switchyard_config::Settings;
use switchyard_core::{LoadReport, Runtime};

use crate::cli::{GlobalOpts, SystemArgs};
use crate::error::CliError;

/// The settings file in effect: `--settings` or the platform default.
pub fn settings_path(global: &GlobalOpts) -> PathBuf {
    global
        .settings
        .clone()
        .unwrap_or_else(switchyard_config::settings_path)
}

/// The system file to load: `--file`, else `system_file` from settings.
pub fn system_path(
    args: &SystemArgs,
    global: &GlobalOpts,
    settings: &Settings,
) -> Result<PathBuf, CliError> {
    args.file
        .clone()
        .or_else(|| settings.system_file.clone())
        .ok_or_else(|| CliError::NoSystemFile {
            settings_path: settings_path(global).display().to_string(),
        })
}

/// Read the system file and load it into a fresh runtime.
///
/// Per-entry failures end up in the report; only an unreadable file or
/// unusable settings are errors.
pub fn load_system(
    args: &SystemArgs,
    global: &GlobalOpts,
    settings: &Settings,
) -> Result<(Runtime, LoadReport), CliError> {
    let path = system_path(args, global, settings)?;
    let snapshot = switchyard_config::load_snapshot(&path)?;
    let runtime = Runtime::new(settings.runtime_settings()?);
    let report = runtime.load(snapshot)?;
    debug!(
        path = %path.display(),
        devices = report.devices.len(),
        failures = report.failures.len(),
        "system file loaded"
    );
    Ok((runtime, report))
}

/// "-" for absent values in tables.
pub fn or_dash(value: Option<impl ToString>) -> String {
    value.map_or_else(|| "-".into(), |v| v.to_string())
}

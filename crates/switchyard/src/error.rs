//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use switchyard_config::ConfigError;
use switchyard_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const LOAD_FAILED: i32 = 5;
    pub const CONFLICT: i32 = 6;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("No system file given")]
    #[diagnostic(
        code(switchyard::no_system_file),
        help(
            "Pass one with --file <path>, set SWITCHYARD_SYSTEM_FILE,\n\
             or set system_file in {settings_path}"
        )
    )]
    NoSystemFile { settings_path: String },

    #[error(transparent)]
    #[diagnostic(
        code(switchyard::config),
        help("Check the file exists and is valid JSON (system) or TOML (settings).")
    )]
    Config(#[from] ConfigError),

    #[error("Settings file already exists at {path}")]
    #[diagnostic(
        code(switchyard::settings_exist),
        help("Use --force to overwrite it.")
    )]
    SettingsExist { path: String },

    // ── Load ─────────────────────────────────────────────────────────

    #[error("{count} configuration entries failed to load")]
    #[diagnostic(
        code(switchyard::load_failed),
        help("The first failure was: {first}\nRun without --strict to accept a partial load.")
    )]
    LoadFailed { count: usize, first: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(switchyard::not_found),
        help("Run: switchyard {list_command} to see what was loaded")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(switchyard::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(switchyard::core))]
    Core(CoreError),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render JSON output: {0}")]
    #[diagnostic(code(switchyard::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoSystemFile { .. } | Self::Validation { .. } => exit_code::USAGE,
            Self::Config(_) => exit_code::CONFIG,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::LoadFailed { .. } => exit_code::LOAD_FAILED,
            Self::SettingsExist { .. } => exit_code::CONFLICT,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DeviceNotFound { key } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: key,
                list_command: "devices".into(),
            },
            CoreError::UnknownJoinSchema { schema } => CliError::NotFound {
                resource_type: "join map".into(),
                identifier: schema,
                list_command: "types".into(),
            },
            other => CliError::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_devices_map_to_not_found() {
        let err = CliError::from(CoreError::DeviceNotFound { key: "d9".into() });
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
        assert_eq!(err.to_string(), "device 'd9' not found");
    }

    #[test]
    fn other_core_errors_are_general() {
        let err = CliError::from(CoreError::AlreadyLoaded);
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}

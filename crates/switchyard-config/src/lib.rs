//! Settings and system-file loading for switchyard.
//!
//! Runtime settings come from compiled defaults, then a TOML settings
//! file, then `SWITCHYARD_*` environment variables. The system file is
//! JSON and parses straight into `switchyard_core::ConfigSnapshot`; core
//! itself never touches disk.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use switchyard_core::{ConfigSnapshot, RuntimeSettings};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a valid system file: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("settings loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Host-level settings for the switchyard binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    /// Model of the processor the runtime runs on.
    #[serde(default = "default_processor_type")]
    pub processor_type: String,

    /// Key under which the processor device is registered.
    #[serde(default = "default_processor_key")]
    pub processor_key: String,

    /// System file used when a command is not given one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_file: Option<PathBuf>,

    /// Default tracing filter (e.g. "switchyard_core=debug"). `RUST_LOG`
    /// and `-v` flags take precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            processor_type: default_processor_type(),
            processor_key: default_processor_key(),
            system_file: None,
            log_filter: None,
        }
    }
}

fn default_processor_type() -> String {
    RuntimeSettings::default().processor_type
}
fn default_processor_key() -> String {
    RuntimeSettings::default().processor_key
}

impl Settings {
    /// Translate into the settings core consumes.
    pub fn runtime_settings(&self) -> Result<RuntimeSettings, ConfigError> {
        if self.processor_key.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "processor_key".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.processor_type.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "processor_type".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(RuntimeSettings {
            processor_type: self.processor_type.trim().to_ascii_lowercase(),
            processor_key: self.processor_key.trim().to_owned(),
        })
    }
}

// ── Settings file path ──────────────────────────────────────────────

/// Resolve the settings file path via XDG / platform conventions.
pub fn settings_path() -> PathBuf {
    ProjectDirs::from("", "switchyard", "switchyard").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("settings.toml");
            p
        },
        |dirs| dirs.config_dir().join("settings.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("switchyard");
    p
}

// ── Settings loading ────────────────────────────────────────────────

/// Load settings from the canonical path plus environment.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from(&settings_path())
}

/// Load settings from `path` plus environment. A missing file is fine.
pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    let settings: Settings = Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SWITCHYARD_"))
        .extract()?;
    Ok(settings)
}

/// Serialize settings to TOML at `path`, creating parent directories.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(settings)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── System file ─────────────────────────────────────────────────────

/// Read and parse a JSON system file.
pub fn load_snapshot(path: &Path) -> Result<ConfigSnapshot, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_owned(),
        source,
    })?;
    parse_snapshot(path, &raw)
}

/// Parse system file contents; `path` is only used in errors.
pub fn parse_snapshot(path: &Path, raw: &str) -> Result<ConfigSnapshot, ConfigError> {
    serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_core() {
        let runtime = Settings::default().runtime_settings().unwrap();
        assert_eq!(runtime, RuntimeSettings::default());
    }

    #[test]
    fn settings_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "processor_type = \"CP4\"\nlog_filter = \"debug\"\n").unwrap();

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.processor_type, "CP4");
        assert_eq!(settings.processor_key, "processor");
        assert_eq!(settings.log_filter.as_deref(), Some("debug"));
        assert_eq!(settings.runtime_settings().unwrap().processor_type, "cp4");
    }

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.processor_key, "processor");
    }

    #[test]
    fn empty_processor_key_is_rejected() {
        let settings = Settings {
            processor_key: "  ".into(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.runtime_settings(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let settings = Settings {
            system_file: Some(PathBuf::from("/etc/switchyard/system.json")),
            ..Settings::default()
        };

        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings_from(&path).unwrap().system_file, settings.system_file);
    }

    #[test]
    fn system_file_parses_into_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.json");
        std::fs::write(
            &path,
            r#"{ "devices": [ { "key": "display1", "type": "display" } ],
                 "joinMaps": { "custom": "{\"name\":{\"offset\":4}}" } }"#,
        )
        .unwrap();

        let snapshot = load_snapshot(&path).unwrap();
        assert_eq!(snapshot.devices[0].key, "display1");
        assert!(snapshot.join_maps.contains_key("custom"));
    }

    #[test]
    fn system_file_errors_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ devices: ").unwrap();

        let err = load_snapshot(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.json"));

        let missing = load_snapshot(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}

// ── Core error types ──
//
// Every failure the runtime can report. Most of these are absorbed by
// the orchestrator (logged and recorded in the `LoadReport`); only
// `AlreadyLoaded` aborts a load outright.

use thiserror::Error;

use crate::signal::SignalKind;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Registry errors ──────────────────────────────────────────────
    #[error("Device key must not be empty")]
    EmptyKey,

    #[error("Device key '{key}' is already registered")]
    DuplicateKey { key: String },

    #[error("Device not found: {key}")]
    DeviceNotFound { key: String },

    // ── Factory errors ───────────────────────────────────────────────
    #[error("Cannot load unknown device type '{device_type}', key '{key}'")]
    UnknownDeviceType { device_type: String, key: String },

    #[error("Invalid properties for device '{key}': {source}")]
    InvalidProperties {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot build device '{key}': {reason}")]
    Construction { key: String, reason: String },

    // ── Feedback errors ──────────────────────────────────────────────
    #[error("Feedback '{name}' not found")]
    FeedbackNotFound { name: String },

    #[error("Feedback '{name}' is already present in this collection")]
    DuplicateFeedback { name: String },

    // ── Join map errors ──────────────────────────────────────────────
    #[error("No join map schema named '{schema}'")]
    UnknownJoinSchema { schema: String },

    #[error("Join map override '{key}' rejected: {reason}")]
    JoinMapOverride { key: String, reason: String },

    #[error("Join field '{field}' is {expected}, cannot bind a {actual} signal")]
    JoinKindMismatch {
        field: String,
        expected: SignalKind,
        actual: SignalKind,
    },

    #[error("{kind} join {join} is claimed twice; field '{field}' overlaps an earlier field")]
    JoinCollision {
        field: String,
        kind: SignalKind,
        join: u32,
    },

    // ── Routing errors ───────────────────────────────────────────────
    #[error("Device '{key}' has no routing ports")]
    NotRoutable { key: String },

    #[error("Port '{port}' not found on device '{key}'")]
    PortNotFound { key: String, port: String },

    #[error("Tie line {source_port} --> {destination_port} is invalid: {reason}")]
    InvalidTieLine {
        source_port: String,
        destination_port: String,
        reason: String,
    },

    #[error("Route {input} -> {output} is out of range on '{key}'")]
    RouteOutOfRange { key: String, input: u32, output: u32 },

    // ── Link errors ──────────────────────────────────────────────────
    #[error("'{owner}' cannot resolve its reference to '{target}'")]
    UnresolvedReference { owner: String, target: String },

    #[error("'{owner}' does not accept {link} links")]
    UnsupportedLink { owner: String, link: String },

    // ── Activation errors ────────────────────────────────────────────
    #[error("Activation of '{key}' failed: {reason}")]
    Activation { key: String, reason: String },

    // ── Fatal ────────────────────────────────────────────────────────
    #[error("A configuration is already loaded; tear it down before loading another")]
    AlreadyLoaded,
}

impl CoreError {
    /// Wrap a properties parse failure with the owning device key.
    pub fn properties(key: &str, source: serde_json::Error) -> Self {
        Self::InvalidProperties {
            key: key.to_owned(),
            source,
        }
    }

    pub fn construction(key: &str, reason: impl Into<String>) -> Self {
        Self::Construction {
            key: key.to_owned(),
            reason: reason.into(),
        }
    }
}

// ── Configuration snapshot ──
//
// The in-memory object graph handed over by an external loader.
// Core never touches disk: devices copy what they need out of these
// records at construction time and keep no reference back.

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Resolved system configuration: devices, rooms, tie lines, bridges,
/// and optional join map overrides keyed by `joinMapKey`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub rooms: Vec<DeviceConfig>,
    #[serde(default)]
    pub tie_lines: Vec<TieLineConfig>,
    #[serde(default)]
    pub bridges: Vec<BridgeRecord>,
    #[serde(default)]
    pub join_maps: IndexMap<String, Value>,
}

/// One configured device (or room). `device_type` selects the factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub properties: Value,
}

impl DeviceConfig {
    pub fn new(key: impl Into<String>, device_type: impl Into<String>, properties: Value) -> Self {
        Self {
            key: key.into(),
            name: String::new(),
            device_type: device_type.into(),
            group: None,
            properties,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Name to show for the device; falls back to the key.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.key
        } else {
            &self.name
        }
    }

    /// Parse the opaque properties payload into the schema `T` expects.
    ///
    /// A missing payload is treated as an empty object so property
    /// structs made entirely of defaults still parse.
    pub fn properties<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        let parsed = if self.properties.is_null() {
            T::deserialize(&Value::Object(serde_json::Map::new()))
        } else {
            T::deserialize(&self.properties)
        };
        parsed.map_err(|e| CoreError::properties(&self.key, e))
    }
}

/// A directed signal path from `sourceKey.sourcePort` to
/// `destinationKey.destinationPort`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TieLineConfig {
    pub source_key: String,
    pub source_port: String,
    pub destination_key: String,
    pub destination_port: String,
}

impl fmt::Display for TieLineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} --> {}.{}",
            self.source_key, self.source_port, self.destination_key, self.destination_port
        )
    }
}

/// Devices a bridge should expose, keyed by the bridge device's key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRecord {
    pub key: String,
    #[serde(default)]
    pub devices: Vec<BridgeDeviceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeDeviceEntry {
    pub device_key: String,
    /// Absolute base join for this device on the bridge.
    pub join_start: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_map_key: Option<String>,
}

/// Connection details shared by hardware-facing devices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlProperties {
    #[serde(default, deserialize_with = "deserialize_ip_id")]
    pub ip_id: Option<u8>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIpId {
    Number(u64),
    Text(String),
}

/// IP-IDs are written either as numbers or as hex strings (`"0x1A"`, `"1a"`).
fn deserialize_ip_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
    let Some(raw) = Option::<RawIpId>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match raw {
        RawIpId::Number(n) => u8::try_from(n)
            .map(Some)
            .map_err(|_| de::Error::custom(format!("ipId {n} does not fit in one byte"))),
        RawIpId::Text(s) => {
            let trimmed = s.trim();
            let digits = trimmed
                .strip_prefix("0x")
                .or_else(|| trimmed.strip_prefix("0X"))
                .unwrap_or(trimmed);
            u8::from_str_radix(digits, 16)
                .map(Some)
                .map_err(|_| de::Error::custom(format!("ipId '{s}' is not a hex byte")))
        }
    }
}

// ── Routing graph ──
//
// Ports are named, typed endpoints owned by a device; tie lines are the
// directed edges between an output port and an input port. The tie-line
// set is shared by the whole load and rebuilt from scratch on reload.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::watch;

use crate::config::TieLineConfig;
use crate::error::CoreError;
use crate::registry::DeviceRegistry;

/// What a port carries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum SignalType {
    Audio,
    Video,
    AudioVideo,
    UsbInput,
    UsbOutput,
}

impl SignalType {
    /// Whether a path of this type can carry `other`.
    pub fn carries(self, other: Self) -> bool {
        self == other || (self == Self::AudioVideo && matches!(other, Self::Audio | Self::Video))
    }
}

/// Physical or logical transport tag of a port.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum ConnectionType {
    Hdmi,
    DmCat,
    DmMmFiber,
    DmSmFiber,
    Dvi,
    Vga,
    Composite,
    Component,
    LineAudio,
    DigitalAudio,
    Sdi,
    Usb,
    Streaming,
    BackplaneOnly,
    Logical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

/// One endpoint on a device. `parent_key` is a back-reference only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingPort {
    pub name: String,
    pub direction: PortDirection,
    pub signal_type: SignalType,
    pub connection_type: ConnectionType,
    /// 1-based ordinal within the owning device.
    pub index: u32,
    pub parent_key: String,
}

impl RoutingPort {
    pub fn input(
        parent_key: &str,
        name: impl Into<String>,
        index: u32,
        signal_type: SignalType,
        connection_type: ConnectionType,
    ) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
            signal_type,
            connection_type,
            index,
            parent_key: parent_key.to_owned(),
        }
    }

    pub fn output(
        parent_key: &str,
        name: impl Into<String>,
        index: u32,
        signal_type: SignalType,
        connection_type: ConnectionType,
    ) -> Self {
        Self {
            direction: PortDirection::Output,
            ..Self::input(parent_key, name, index, signal_type, connection_type)
        }
    }
}

impl fmt::Display for RoutingPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.parent_key, self.name)
    }
}

/// Ports of one direction on one device, by name and by index.
#[derive(Debug, Clone, Default)]
pub struct RoutingPortCollection {
    ports: IndexMap<String, RoutingPort>,
}

impl RoutingPortCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, port: RoutingPort) {
        self.ports.insert(port.name.clone(), port);
    }

    pub fn get(&self, name: &str) -> Option<&RoutingPort> {
        self.ports.get(name)
    }

    pub fn by_index(&self, index: u32) -> Option<&RoutingPort> {
        self.ports.values().find(|p| p.index == index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoutingPort> {
        self.ports.values()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

/// Device capability: owns routing ports.
pub trait RoutingPorts {
    fn input_ports(&self) -> &RoutingPortCollection;

    fn output_ports(&self) -> &RoutingPortCollection;
}

/// What `execute_switch` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched,
    AlreadyRouted,
}

/// Device capability: can connect an input to an output.
///
/// Implementations compare the output's current source before switching:
/// asking hardware to reconfirm an existing route toggles it off on some
/// units, so a redundant request must be a no-op.
pub trait Routing: RoutingPorts {
    fn execute_switch(
        &self,
        input: u32,
        output: u32,
        signal_type: SignalType,
    ) -> Result<SwitchOutcome, CoreError>;
}

// ── Tie lines ────────────────────────────────────────────────────

/// An immutable directed edge from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TieLine {
    source: RoutingPort,
    destination: RoutingPort,
}

impl TieLine {
    pub fn new(source: RoutingPort, destination: RoutingPort) -> Result<Self, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidTieLine {
            source_port: source.to_string(),
            destination_port: destination.to_string(),
            reason: reason.into(),
        };
        if source.direction != PortDirection::Output {
            return Err(invalid("source must be an output port"));
        }
        if destination.direction != PortDirection::Input {
            return Err(invalid("destination must be an input port"));
        }
        if source.parent_key == destination.parent_key {
            return Err(invalid("source and destination are on the same device"));
        }
        Ok(Self {
            source,
            destination,
        })
    }

    pub fn source(&self) -> &RoutingPort {
        &self.source
    }

    pub fn destination(&self) -> &RoutingPort {
        &self.destination
    }

    /// The signal both ends can carry, if any.
    pub fn signal_type(&self) -> Option<SignalType> {
        let (a, b) = (self.source.signal_type, self.destination.signal_type);
        if a.carries(b) {
            Some(b)
        } else if b.carries(a) {
            Some(a)
        } else {
            None
        }
    }
}

impl fmt::Display for TieLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --> {}", self.source, self.destination)
    }
}

/// Resolve a configured tie line against the registry's devices.
pub fn resolve_tie_line(
    config: &TieLineConfig,
    registry: &DeviceRegistry,
) -> Result<TieLine, CoreError> {
    let source = find_port(registry, &config.source_key, &config.source_port, PortDirection::Output)?;
    let destination = find_port(
        registry,
        &config.destination_key,
        &config.destination_port,
        PortDirection::Input,
    )?;
    TieLine::new(source, destination)
}

fn find_port(
    registry: &DeviceRegistry,
    key: &str,
    port: &str,
    direction: PortDirection,
) -> Result<RoutingPort, CoreError> {
    let device = registry
        .get(key)
        .ok_or_else(|| CoreError::DeviceNotFound { key: key.into() })?;
    let ports = device
        .as_routing_ports()
        .ok_or_else(|| CoreError::NotRoutable { key: key.into() })?;
    let collection = match direction {
        PortDirection::Input => ports.input_ports(),
        PortDirection::Output => ports.output_ports(),
    };
    collection
        .get(port)
        .cloned()
        .ok_or_else(|| CoreError::PortNotFound {
            key: key.into(),
            port: port.into(),
        })
}

/// The set of tie lines for the current load.
///
/// Reads are wait-free snapshots; mutation only happens on the control
/// thread during load and teardown.
pub struct TieLineCollection {
    lines: watch::Sender<Arc<Vec<TieLine>>>,
}

impl TieLineCollection {
    pub fn new() -> Self {
        let (lines, _) = watch::channel(Arc::new(Vec::new()));
        Self { lines }
    }

    /// Record an edge. Returns `false` if the identical edge already exists.
    pub fn add(&self, line: TieLine) -> bool {
        self.lines.send_if_modified(|lines| {
            if lines.contains(&line) {
                return false;
            }
            let mut next = Vec::with_capacity(lines.len() + 1);
            next.extend(lines.iter().cloned());
            next.push(line);
            *lines = Arc::new(next);
            true
        })
    }

    pub fn clear(&self) {
        self.lines.send_modify(|lines| *lines = Arc::new(Vec::new()));
    }

    pub fn snapshot(&self) -> Arc<Vec<TieLine>> {
        self.lines.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<TieLine>>> {
        self.lines.subscribe()
    }

    pub fn len(&self) -> usize {
        self.lines.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.borrow().is_empty()
    }

    /// Edges arriving at the given input port.
    pub fn feeding(&self, device_key: &str, port: &str) -> Vec<TieLine> {
        self.snapshot()
            .iter()
            .filter(|l| l.destination.parent_key == device_key && l.destination.name == port)
            .cloned()
            .collect()
    }
}

impl Default for TieLineCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn hdmi_out(parent: &str, name: &str) -> RoutingPort {
        RoutingPort::output(parent, name, 1, SignalType::AudioVideo, ConnectionType::Hdmi)
    }

    fn hdmi_in(parent: &str, name: &str) -> RoutingPort {
        RoutingPort::input(parent, name, 1, SignalType::AudioVideo, ConnectionType::Hdmi)
    }

    #[test]
    fn tie_line_requires_output_to_input() {
        assert!(TieLine::new(hdmi_out("a", "out"), hdmi_in("b", "in")).is_ok());
        assert!(TieLine::new(hdmi_in("a", "in"), hdmi_in("b", "in")).is_err());
        assert!(TieLine::new(hdmi_out("a", "out"), hdmi_out("b", "out")).is_err());
        assert!(TieLine::new(hdmi_out("a", "out"), hdmi_in("a", "in")).is_err());
    }

    #[test]
    fn tie_line_displays_as_arrow() {
        let line = TieLine::new(hdmi_out("display1", "hdmiOut"), hdmi_in("switcher1", "hdmiIn1"))
            .unwrap();
        assert_eq!(line.to_string(), "display1.hdmiOut --> switcher1.hdmiIn1");
    }

    #[test]
    fn collection_stores_identical_edges_once() {
        let tie_lines = TieLineCollection::new();
        let line = TieLine::new(hdmi_out("a", "out"), hdmi_in("b", "in")).unwrap();

        assert!(tie_lines.add(line.clone()));
        assert!(!tie_lines.add(line));
        assert_eq!(tie_lines.len(), 1);
        assert_eq!(tie_lines.feeding("b", "in").len(), 1);
    }

    #[test]
    fn clear_empties_the_set_and_notifies() {
        let tie_lines = TieLineCollection::new();
        tie_lines.add(TieLine::new(hdmi_out("a", "out"), hdmi_in("b", "in")).unwrap());
        let mut rx = tie_lines.subscribe();

        tie_lines.clear();
        assert!(tie_lines.is_empty());
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn signal_type_intersection() {
        let audio_in =
            RoutingPort::input("b", "audio", 1, SignalType::Audio, ConnectionType::LineAudio);
        let line = TieLine::new(hdmi_out("a", "out"), audio_in).unwrap();
        assert_eq!(line.signal_type(), Some(SignalType::Audio));

        let usb = RoutingPort::input("b", "usb", 2, SignalType::UsbInput, ConnectionType::Usb);
        let line = TieLine::new(hdmi_out("a", "out"), usb).unwrap();
        assert_eq!(line.signal_type(), None);
    }

    #[test]
    fn port_collection_looks_up_by_name_and_index() {
        let mut ports = RoutingPortCollection::new();
        ports.add(RoutingPort::input("sw", "hdmiIn1", 1, SignalType::AudioVideo, ConnectionType::Hdmi));
        ports.add(RoutingPort::input("sw", "hdmiIn2", 2, SignalType::AudioVideo, ConnectionType::Hdmi));

        assert_eq!(ports.get("hdmiIn2").unwrap().index, 2);
        assert_eq!(ports.by_index(1).unwrap().name, "hdmiIn1");
        assert!(ports.get("hdmiIn3").is_none());
    }
}

// ── Signal surface ──
//
// The lower-level transport a bridge talks through: three independently
// numbered channels (boolean, numeric, text) per connection, plus an
// inbound event stream. `LoopbackSurface` is the in-memory transport used
// when no hardware is attached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::{mpsc, watch};
use tracing::trace;

use crate::config::ControlProperties;
use crate::error::CoreError;

/// The three signal channels of a join address space.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SignalKind {
    Boolean,
    Numeric,
    Text,
}

/// A typed value carried on one join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalValue {
    Boolean(bool),
    Numeric(u16),
    Text(String),
}

impl SignalValue {
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::Boolean(_) => SignalKind::Boolean,
            Self::Numeric(_) => SignalKind::Numeric,
            Self::Text(_) => SignalKind::Text,
        }
    }
}

/// An inbound change on one join, e.g. a touch panel button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEvent {
    pub join: u32,
    pub value: SignalValue,
}

impl SignalEvent {
    pub fn boolean(join: u32, value: bool) -> Self {
        Self {
            join,
            value: SignalValue::Boolean(value),
        }
    }

    pub fn numeric(join: u32, value: u16) -> Self {
        Self {
            join,
            value: SignalValue::Numeric(value),
        }
    }

    pub fn text(join: u32, value: impl Into<String>) -> Self {
        Self {
            join,
            value: SignalValue::Text(value.into()),
        }
    }

    pub fn kind(&self) -> SignalKind {
        self.value.kind()
    }
}

/// Everything a surface reports back to its bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Signal(SignalEvent),
    Online(bool),
}

/// A live connection to an external control surface.
///
/// Outbound setters must not block: they are called from feedback
/// updates, which may run on any dispatch context.
pub trait SignalSurface: Send + Sync {
    fn id(&self) -> &str;

    fn set_bool(&self, join: u32, value: bool);

    fn set_numeric(&self, join: u32, value: u16);

    fn set_text(&self, join: u32, value: &str);

    /// Begin connecting. Completion is reported as `SurfaceEvent::Online(true)`.
    fn connect(&self);

    fn disconnect(&self);

    fn is_online(&self) -> bool;

    /// Hand out the inbound event stream. Only the first caller gets it.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SurfaceEvent>>;
}

/// Opens surfaces for bridge devices as they are constructed.
pub trait SurfaceProvider: Send + Sync {
    fn open(
        &self,
        key: &str,
        control: &ControlProperties,
    ) -> Result<Arc<dyn SignalSurface>, CoreError>;
}

// ── Loopback transport ───────────────────────────────────────────

/// In-memory surface that records every outbound value and lets callers
/// inject inbound events.
pub struct LoopbackSurface {
    id: String,
    online: AtomicBool,
    booleans: DashMap<u32, bool>,
    numerics: DashMap<u32, u16>,
    texts: DashMap<u32, String>,
    pushes: DashMap<(SignalKind, u32), u64>,
    version: watch::Sender<u64>,
    events_tx: mpsc::UnboundedSender<SurfaceEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SurfaceEvent>>>,
}

impl LoopbackSurface {
    pub fn new(id: impl Into<String>) -> Self {
        let (version, _) = watch::channel(0u64);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            id: id.into(),
            online: AtomicBool::new(false),
            booleans: DashMap::new(),
            numerics: DashMap::new(),
            texts: DashMap::new(),
            pushes: DashMap::new(),
            version,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Deliver an inbound signal as if the remote side had changed it.
    pub fn inject(&self, event: SignalEvent) {
        let _ = self.events_tx.send(SurfaceEvent::Signal(event));
    }

    pub fn bool_value(&self, join: u32) -> Option<bool> {
        self.booleans.get(&join).map(|v| *v)
    }

    pub fn numeric_value(&self, join: u32) -> Option<u16> {
        self.numerics.get(&join).map(|v| *v)
    }

    pub fn text_value(&self, join: u32) -> Option<String> {
        self.texts.get(&join).map(|v| v.clone())
    }

    /// How many values have been pushed to one join so far.
    pub fn push_count(&self, kind: SignalKind, join: u32) -> u64 {
        self.pushes.get(&(kind, join)).map_or(0, |v| *v)
    }

    pub fn total_pushes(&self) -> u64 {
        *self.version.borrow()
    }

    /// Wait until `predicate` holds or `timeout` elapses.
    pub async fn wait_for(&self, timeout: Duration, predicate: impl Fn(&Self) -> bool) -> bool {
        let mut changes = self.version.subscribe();
        let waited = tokio::time::timeout(timeout, async {
            while !predicate(self) {
                if changes.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        waited.is_ok() && predicate(self)
    }

    fn record(&self, kind: SignalKind, join: u32) {
        *self.pushes.entry((kind, join)).or_insert(0) += 1;
        self.version.send_modify(|v| *v += 1);
    }

    fn set_online(&self, online: bool) {
        if self.online.swap(online, Ordering::SeqCst) != online {
            let _ = self.events_tx.send(SurfaceEvent::Online(online));
        }
    }
}

impl SignalSurface for LoopbackSurface {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_bool(&self, join: u32, value: bool) {
        trace!(surface = %self.id, join, value, "bool out");
        self.booleans.insert(join, value);
        self.record(SignalKind::Boolean, join);
    }

    fn set_numeric(&self, join: u32, value: u16) {
        trace!(surface = %self.id, join, value, "numeric out");
        self.numerics.insert(join, value);
        self.record(SignalKind::Numeric, join);
    }

    fn set_text(&self, join: u32, value: &str) {
        trace!(surface = %self.id, join, value, "text out");
        self.texts.insert(join, value.to_owned());
        self.record(SignalKind::Text, join);
    }

    fn connect(&self) {
        self.set_online(true);
    }

    fn disconnect(&self) {
        self.set_online(false);
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SurfaceEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Provider that hands out loopback surfaces and keeps them reachable
/// by bridge key.
#[derive(Default)]
pub struct LoopbackProvider {
    surfaces: DashMap<String, Arc<LoopbackSurface>>,
}

impl LoopbackProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently opened surface for a bridge key.
    pub fn surface(&self, key: &str) -> Option<Arc<LoopbackSurface>> {
        self.surfaces.get(key).map(|s| Arc::clone(s.value()))
    }
}

impl SurfaceProvider for LoopbackProvider {
    fn open(
        &self,
        key: &str,
        _control: &ControlProperties,
    ) -> Result<Arc<dyn SignalSurface>, CoreError> {
        let surface = Arc::new(LoopbackSurface::new(key));
        self.surfaces.insert(key.to_owned(), Arc::clone(&surface));
        Ok(surface)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn signal_kind_parses_case_insensitively() {
        assert_eq!("Numeric".parse::<SignalKind>().unwrap(), SignalKind::Numeric);
        assert_eq!(SignalKind::Text.to_string(), "text");
    }

    #[test]
    fn loopback_records_values_and_push_counts() {
        let surface = LoopbackSurface::new("eisc");
        surface.set_bool(1, true);
        surface.set_bool(1, false);
        surface.set_numeric(5, 42);
        surface.set_text(7, "Lobby");

        assert_eq!(surface.bool_value(1), Some(false));
        assert_eq!(surface.numeric_value(5), Some(42));
        assert_eq!(surface.text_value(7).as_deref(), Some("Lobby"));
        assert_eq!(surface.push_count(SignalKind::Boolean, 1), 2);
        assert_eq!(surface.push_count(SignalKind::Numeric, 1), 0);
        assert_eq!(surface.total_pushes(), 4);
    }

    #[test]
    fn connect_reports_online_once() {
        let surface = LoopbackSurface::new("eisc");
        let mut events = surface.take_events().unwrap();
        assert!(surface.take_events().is_none());

        surface.connect();
        surface.connect();
        surface.disconnect();

        assert_eq!(events.try_recv().unwrap(), SurfaceEvent::Online(true));
        assert_eq!(events.try_recv().unwrap(), SurfaceEvent::Online(false));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn provider_replaces_surfaces_on_reopen() {
        let provider = LoopbackProvider::new();
        let first = provider.open("eisc", &ControlProperties::default()).unwrap();
        first.set_bool(1, true);
        provider.open("eisc", &ControlProperties::default()).unwrap();

        assert_eq!(provider.surface("eisc").unwrap().bool_value(1), None);
    }
}

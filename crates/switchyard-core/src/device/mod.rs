// ── Devices ──
//
// A device is a uniquely keyed entity that owns feedbacks. Capabilities
// (routing, bridge linking, power) are exposed through accessor methods
// so the runtime and bridges can discover them structurally.

pub mod display;
pub mod processor;
pub mod room;
pub mod switcher;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use strum::Display;

use crate::bridge::{BridgeLink, SignalBridge};
use crate::config::DeviceConfig;
use crate::error::CoreError;
use crate::feedback::{BoolFeedback, FeedbackList};
use crate::link::{LinkContext, LinkTarget};
use crate::routing::{Routing, RoutingPorts};

pub use display::BasicDisplay;
pub use processor::ControlProcessor;
pub use room::HuddleRoom;
pub use switcher::{Chassis, ChassisEvent, ChassisHandler, MatrixSwitcher, SimulatedChassis};

/// Where a device is in the two-phase load.
///
/// `Constructed → Linked → Activated`, and from any of those to the
/// terminal `Deactivated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LifecycleState {
    Constructed,
    Linked,
    Activated,
    Deactivated,
}

pub trait Device: Send + Sync {
    fn key(&self) -> &str;

    fn name(&self) -> &str;

    /// Configured type discriminator, for listings.
    fn type_name(&self) -> &str;

    fn is_online(&self) -> &Arc<BoolFeedback>;

    fn feedbacks(&self) -> &FeedbackList;

    /// Start hardware-facing work. Called once, after every device in the
    /// load has been constructed and linked.
    fn activate(&self) -> Result<(), CoreError> {
        Ok(())
    }

    /// Must be idempotent and safe on a device that never activated.
    fn deactivate(&self) {}

    /// Resolve one pending link request queued at construction time.
    fn resolve_link(&self, target: &LinkTarget, _ctx: &LinkContext<'_>) -> Result<(), CoreError> {
        Err(CoreError::UnsupportedLink {
            owner: self.key().to_owned(),
            link: target.to_string(),
        })
    }

    fn as_bridge_link(&self) -> Option<&dyn BridgeLink> {
        None
    }

    fn as_routing(&self) -> Option<&dyn Routing> {
        None
    }

    fn as_routing_ports(&self) -> Option<&dyn RoutingPorts> {
        None
    }

    fn as_power(&self) -> Option<&dyn PowerControl> {
        None
    }

    fn as_signal_bridge(&self) -> Option<&SignalBridge> {
        None
    }
}

/// Device capability: switchable power.
pub trait PowerControl {
    fn power_on(&self);

    fn power_off(&self);

    fn power_feedback(&self) -> &Arc<BoolFeedback>;

    fn power_toggle(&self) {
        if self.power_feedback().value() {
            self.power_off();
        } else {
            self.power_on();
        }
    }
}

// ── DeviceBase ───────────────────────────────────────────────────

/// Identity and online state shared by every device kind.
#[derive(Debug)]
pub struct DeviceBase {
    key: String,
    name: String,
    type_name: String,
    online: Arc<AtomicBool>,
    is_online: Arc<BoolFeedback>,
}

impl DeviceBase {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(CoreError::EmptyKey);
        }
        let online = Arc::new(AtomicBool::new(false));
        let read = Arc::clone(&online);
        let is_online = BoolFeedback::shared("IsOnline", move || read.load(Ordering::SeqCst));
        Ok(Self {
            key,
            name: name.into(),
            type_name: type_name.into(),
            online,
            is_online,
        })
    }

    pub fn from_config(config: &DeviceConfig) -> Result<Self, CoreError> {
        Self::new(
            config.key.clone(),
            config.display_name(),
            config.device_type.to_ascii_lowercase(),
        )
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_online(&self) -> &Arc<BoolFeedback> {
        &self.is_online
    }

    pub fn online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Update online state and fire `IsOnline` if it changed.
    pub fn set_online(&self, online: bool) {
        if self.online.swap(online, Ordering::SeqCst) != online {
            self.is_online.fire_update();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_keys_are_rejected() {
        assert!(matches!(DeviceBase::new("", "x", "t"), Err(CoreError::EmptyKey)));
        assert!(matches!(DeviceBase::new("  ", "x", "t"), Err(CoreError::EmptyKey)));
    }

    #[test]
    fn set_online_fires_only_on_change() {
        let base = DeviceBase::new("d1", "Display", "display").unwrap();
        let mut rx = base.is_online().subscribe();

        base.set_online(false);
        assert!(!rx.has_changed().unwrap());

        base.set_online(true);
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
        assert!(base.online());
    }

    #[test]
    fn type_name_is_normalized_from_config() {
        let config = DeviceConfig::new("d1", "GenericDisplay", serde_json::Value::Null);
        let base = DeviceBase::from_config(&config).unwrap();
        assert_eq!(base.type_name(), "genericdisplay");
        assert_eq!(base.name(), "d1");
    }
}

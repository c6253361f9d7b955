// ── Huddle room ──
//
// A room built around one display and an optional default source. Both
// are referenced by key and attached after every device exists.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeLink, JoinBinder};
use crate::config::DeviceConfig;
use crate::device::{Device, DeviceBase, PowerControl};
use crate::error::CoreError;
use crate::factory::{BuildContext, FactoryRegistry};
use crate::feedback::{BoolFeedback, FeedbackList, SinkId, TextFeedback};
use crate::join_map::{JoinMapCatalog, JoinMapSchema};
use crate::link::{LinkContext, LinkTarget};
use crate::signal::SignalKind;

pub const JOIN_SCHEMA: &str = "room";

const DISPLAY_ROLE: &str = "display";
const SOURCE_ROLE: &str = "source";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomProperties {
    #[serde(default)]
    display_key: Option<String>,
    #[serde(default)]
    default_source_key: Option<String>,
}

type PeerSlot = Arc<RwLock<Option<Arc<dyn Device>>>>;

fn peer(slot: &PeerSlot) -> Option<Arc<dyn Device>> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn display_power(slot: &PeerSlot) -> bool {
    peer(slot)
        .and_then(|d| d.as_power().map(|p| p.power_feedback().value()))
        .unwrap_or(false)
}

pub struct HuddleRoom {
    inner: Arc<RoomInner>,
    feedbacks: FeedbackList,
}

struct RoomInner {
    base: DeviceBase,
    display_key: Option<String>,
    default_source_key: Option<String>,
    display: PeerSlot,
    source: PeerSlot,
    room_on_fb: Arc<BoolFeedback>,
    current_source_fb: Arc<TextFeedback>,
    name_fb: Arc<TextFeedback>,
}

impl HuddleRoom {
    pub fn new(config: &DeviceConfig, ctx: &mut BuildContext<'_>) -> Result<Self, CoreError> {
        let props: RoomProperties = config.properties()?;
        let base = DeviceBase::from_config(config)?;

        if let Some(display_key) = &props.display_key {
            ctx.links.peer(base.key(), DISPLAY_ROLE, display_key);
        }
        if let Some(source_key) = &props.default_source_key {
            ctx.links.peer(base.key(), SOURCE_ROLE, source_key);
        }

        let display: PeerSlot = Arc::new(RwLock::new(None));
        let source: PeerSlot = Arc::new(RwLock::new(None));

        let read = Arc::clone(&display);
        let room_on_fb = BoolFeedback::shared("RoomIsOn", move || display_power(&read));
        let (read_display, read_source) = (Arc::clone(&display), Arc::clone(&source));
        let current_source_fb = TextFeedback::shared("CurrentSource", move || {
            if !display_power(&read_display) {
                return String::new();
            }
            peer(&read_source).map(|s| s.name().to_owned()).unwrap_or_default()
        });
        let name = base.name().to_owned();
        let name_fb = TextFeedback::shared("Name", move || name.clone());

        let mut feedbacks = FeedbackList::new();
        feedbacks.add_one(base.is_online());
        feedbacks.add_one(&room_on_fb);
        feedbacks.add_one(&current_source_fb);
        feedbacks.add_one(&name_fb);

        Ok(Self {
            inner: Arc::new(RoomInner {
                base,
                display_key: props.display_key,
                default_source_key: props.default_source_key,
                display,
                source,
                room_on_fb,
                current_source_fb,
                name_fb,
            }),
            feedbacks,
        })
    }

    pub fn display_key(&self) -> Option<&str> {
        self.inner.display_key.as_deref()
    }

    pub fn default_source_key(&self) -> Option<&str> {
        self.inner.default_source_key.as_deref()
    }

    /// The attached display, once linking has run.
    pub fn display(&self) -> Option<Arc<dyn Device>> {
        peer(&self.inner.display)
    }

    pub fn current_source(&self) -> &Arc<TextFeedback> {
        &self.inner.current_source_fb
    }

    fn attach_display(&self, device: Arc<dyn Device>) -> Result<(), CoreError> {
        let Some(power) = device.as_power() else {
            return Err(CoreError::UnresolvedReference {
                owner: self.key().to_owned(),
                target: format!("{} (no power control)", device.key()),
            });
        };
        let room_on = Arc::clone(&self.inner.room_on_fb);
        let current_source = Arc::clone(&self.inner.current_source_fb);
        power.power_feedback().link(
            SinkId::new(self.key(), SignalKind::Boolean, 0),
            Arc::new(move |_: &bool| {
                room_on.fire_update();
                current_source.fire_update();
            }),
        );
        info!(room = %self.key(), display = %device.key(), "display attached");
        *self.inner.display.write().unwrap_or_else(PoisonError::into_inner) = Some(device);
        Ok(())
    }
}

impl RoomInner {
    fn with_display(&self, f: impl FnOnce(&dyn PowerControl)) {
        match peer(&self.display) {
            Some(display) => match display.as_power() {
                Some(power) => f(power),
                None => warn!(room = %self.base.key(), "display has no power control"),
            },
            None => warn!(room = %self.base.key(), "no display attached; power request ignored"),
        }
    }
}

impl Device for HuddleRoom {
    fn key(&self) -> &str {
        self.inner.base.key()
    }

    fn name(&self) -> &str {
        self.inner.base.name()
    }

    fn type_name(&self) -> &str {
        self.inner.base.type_name()
    }

    fn is_online(&self) -> &Arc<BoolFeedback> {
        self.inner.base.is_online()
    }

    fn feedbacks(&self) -> &FeedbackList {
        &self.feedbacks
    }

    fn activate(&self) -> Result<(), CoreError> {
        self.inner.base.set_online(true);
        self.feedbacks.fire_all();
        Ok(())
    }

    /// Detach from peers so nothing keeps the room alive after teardown.
    fn deactivate(&self) {
        let display = self.inner.display.write().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(power) = display.as_deref().and_then(|d| d.as_power()) {
            power.power_feedback().unlink_owner(self.key());
        }
        self.inner.source.write().unwrap_or_else(PoisonError::into_inner).take();
        self.inner.base.set_online(false);
    }

    fn resolve_link(&self, target: &LinkTarget, ctx: &LinkContext<'_>) -> Result<(), CoreError> {
        let LinkTarget::Peer { role, key } = target else {
            return Err(CoreError::UnsupportedLink {
                owner: self.key().to_owned(),
                link: target.to_string(),
            });
        };
        let device = ctx
            .registry
            .get(key)
            .ok_or_else(|| CoreError::UnresolvedReference {
                owner: self.key().to_owned(),
                target: target.to_string(),
            })?;
        match role.as_str() {
            DISPLAY_ROLE => self.attach_display(device),
            SOURCE_ROLE => {
                debug!(room = %self.key(), source = %key, "default source attached");
                *self.inner.source.write().unwrap_or_else(PoisonError::into_inner) = Some(device);
                Ok(())
            }
            _ => Err(CoreError::UnsupportedLink {
                owner: self.key().to_owned(),
                link: target.to_string(),
            }),
        }
    }

    fn as_bridge_link(&self) -> Option<&dyn BridgeLink> {
        Some(self)
    }

    fn as_power(&self) -> Option<&dyn PowerControl> {
        Some(self)
    }
}

impl PowerControl for HuddleRoom {
    fn power_on(&self) {
        self.inner.with_display(|d| d.power_on());
    }

    fn power_off(&self) {
        self.inner.with_display(|d| d.power_off());
    }

    fn power_feedback(&self) -> &Arc<BoolFeedback> {
        &self.inner.room_on_fb
    }
}

impl BridgeLink for HuddleRoom {
    fn join_schema(&self) -> &'static str {
        JOIN_SCHEMA
    }

    fn link_to_bridge(&self, binder: &mut JoinBinder<'_>) -> Result<(), CoreError> {
        let inner = &self.inner;
        binder.feedback("powerOn", &inner.room_on_fb)?;
        binder.complement("powerOff", &inner.room_on_fb)?;
        binder.feedback("powerToggle", &inner.room_on_fb)?;
        binder.feedback("isOnline", inner.base.is_online())?;
        binder.feedback("currentSource", &inner.current_source_fb)?;
        binder.feedback("name", &inner.name_fb)?;

        let on = Arc::clone(inner);
        binder.on_press("powerOn", move || on.with_display(|d| d.power_on()))?;
        let off = Arc::clone(inner);
        binder.on_press("powerOff", move || off.with_display(|d| d.power_off()))?;
        let toggle = Arc::clone(inner);
        binder.on_press("powerToggle", move || toggle.with_display(|d| d.power_toggle()))
    }
}

pub fn join_map_schema() -> JoinMapSchema {
    JoinMapSchema::new(JOIN_SCHEMA)
        .single("powerOn", 0, SignalKind::Boolean, "Room on; reports room on")
        .single("powerOff", 1, SignalKind::Boolean, "Room off; reports room off")
        .single("powerToggle", 2, SignalKind::Boolean, "Toggle room power")
        .single("isOnline", 3, SignalKind::Boolean, "Room online")
        .single("currentSource", 0, SignalKind::Text, "Name of the active source")
        .single("name", 1, SignalKind::Text, "Room name")
}

pub fn register(factories: &mut FactoryRegistry) {
    factories.register(
        "core",
        &["huddle", "huddleroom"],
        "Huddle room with one display",
        |config, ctx| Ok(Arc::new(HuddleRoom::new(config, ctx)?) as Arc<dyn Device>),
    );
}

pub fn register_join_maps(catalog: &mut JoinMapCatalog) {
    catalog.register(join_map_schema());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::{Value, json};

    use super::*;
    use crate::device::BasicDisplay;
    use crate::link::{self, LinkQueue};
    use crate::registry::DeviceRegistry;
    use crate::signal::LoopbackProvider;

    struct Fixture {
        registry: DeviceRegistry,
        room: Arc<HuddleRoom>,
        display: Arc<BasicDisplay>,
        links: LinkQueue,
    }

    fn fixture(props: Value) -> Fixture {
        let provider = LoopbackProvider::new();
        let mut links = LinkQueue::new();
        let mut ctx = BuildContext {
            links: &mut links,
            surfaces: &provider,
        };
        let room = Arc::new(HuddleRoom::new(&DeviceConfig::new("room1", "huddle", props), &mut ctx).unwrap());
        let display = Arc::new(
            BasicDisplay::new(&DeviceConfig::new("display1", "display", Value::Null).with_name("Wall")).unwrap(),
        );
        let registry = DeviceRegistry::new();
        registry.add(Arc::clone(&room) as Arc<dyn Device>).unwrap();
        registry.add(Arc::clone(&display) as Arc<dyn Device>).unwrap();
        Fixture {
            registry,
            room,
            display,
            links,
        }
    }

    fn resolve(fixture: Fixture) -> (Fixture, Vec<(String, CoreError)>) {
        let Fixture {
            registry,
            room,
            display,
            links,
        } = fixture;
        let catalog = JoinMapCatalog::new();
        let overrides = IndexMap::new();
        let failures = link::resolve_all(
            links,
            &LinkContext {
                registry: &registry,
                join_maps: &catalog,
                overrides: &overrides,
            },
        );
        (
            Fixture {
                registry,
                room,
                display,
                links: LinkQueue::new(),
            },
            failures,
        )
    }

    #[test]
    fn construction_queues_peer_links() {
        let fixture = fixture(json!({ "displayKey": "display1", "defaultSourceKey": "display1" }));
        assert_eq!(fixture.links.len(), 2);
        assert!(fixture.room.display().is_none());
    }

    #[test]
    fn room_power_follows_the_display() {
        let (fixture, failures) = resolve(fixture(json!({ "displayKey": "display1" })));
        assert!(failures.is_empty());

        fixture.room.power_on();
        assert!(fixture.display.power_feedback().value());
        assert!(fixture.room.power_feedback().cached());

        fixture.display.power_off();
        assert!(!fixture.room.power_feedback().cached());
    }

    #[test]
    fn current_source_reports_only_while_on() {
        let (fixture, _) = resolve(fixture(json!({
            "displayKey": "display1",
            "defaultSourceKey": "display1"
        })));
        fixture.room.power_on();
        assert_eq!(fixture.room.current_source().cached(), "Wall");
        fixture.room.power_off();
        assert_eq!(fixture.room.current_source().cached(), "");
    }

    #[test]
    fn missing_display_is_reported_and_harmless() {
        let (fixture, failures) = resolve(fixture(json!({ "displayKey": "projector9" })));
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].1, CoreError::UnresolvedReference { .. }));

        fixture.room.power_on();
        assert!(!fixture.room.power_feedback().value());
        assert!(fixture.registry.contains("room1"));
    }

    #[test]
    fn deactivate_detaches_from_the_display() {
        let (fixture, _) = resolve(fixture(json!({ "displayKey": "display1" })));
        assert_eq!(fixture.display.power_feedback().sink_count(), 1);

        fixture.room.deactivate();
        fixture.room.deactivate();

        assert_eq!(fixture.display.power_feedback().sink_count(), 0);
        assert!(fixture.room.display().is_none());
    }
}

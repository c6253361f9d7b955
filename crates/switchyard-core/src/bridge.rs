// ── Bridges ──
//
// A bridge owns one signal surface and exposes linked devices on it.
// Each linked device binds its feedbacks and actions through a
// `JoinBinder`, which turns symbolic join map fields into join numbers
// on this bridge's surface.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{BridgeDeviceEntry, ControlProperties, DeviceConfig};
use crate::device::{Device, DeviceBase};
use crate::error::CoreError;
use crate::factory::{BuildContext, FactoryRegistry};
use crate::feedback::{AnyFeedback, BoolFeedback, Feedback, FeedbackList, FeedbackValue, SinkId};
use crate::join_map::JoinMap;
use crate::link::{LinkContext, LinkTarget};
use crate::signal::{SignalEvent, SignalKind, SignalSurface, SignalValue, SurfaceEvent};

/// Lowest and highest IP-ID a bridge connection may use.
const IP_ID_RANGE: std::ops::RangeInclusive<u8> = 0x03..=0xFE;

/// Device capability: can be exposed on a bridge.
///
/// Any device kind opts in by naming its join map schema and binding
/// what it has; the bridge never needs to know the concrete type.
pub trait BridgeLink {
    fn join_schema(&self) -> &'static str;

    fn link_to_bridge(&self, binder: &mut JoinBinder<'_>) -> Result<(), CoreError>;
}

// ── Inbound actions ──────────────────────────────────────────────

/// Handler for an inbound signal on one join.
#[derive(Clone)]
pub enum InboundAction {
    Bool(Arc<dyn Fn(bool) + Send + Sync>),
    Numeric(Arc<dyn Fn(u16) + Send + Sync>),
    Text(Arc<dyn Fn(&str) + Send + Sync>),
}

impl InboundAction {
    fn invoke(&self, value: &SignalValue) {
        match (self, value) {
            (Self::Bool(f), SignalValue::Boolean(v)) => f(*v),
            (Self::Numeric(f), SignalValue::Numeric(v)) => f(*v),
            (Self::Text(f), SignalValue::Text(v)) => f(v),
            _ => trace!("signal kind does not match bound action"),
        }
    }
}

struct BoundAction {
    device_key: String,
    action: InboundAction,
}

/// What one device left behind on this bridge.
struct BoundDevice {
    join_map: JoinMap,
    feedbacks: Vec<AnyFeedback>,
    actions: Vec<(SignalKind, u32)>,
}

// ── JoinBinder ───────────────────────────────────────────────────

/// Binds one device's feedbacks and actions against its resolved join map.
///
/// Fields the join map does not know are skipped; a field of the wrong
/// kind is an error, and so is a join claimed twice in one direction.
pub struct JoinBinder<'a> {
    bridge_key: &'a str,
    device_key: &'a str,
    join_map: &'a JoinMap,
    surface: Arc<dyn SignalSurface>,
    feedbacks: Vec<AnyFeedback>,
    actions: Vec<(SignalKind, u32, InboundAction)>,
    outbound: HashSet<(SignalKind, u32)>,
    inbound: HashSet<(SignalKind, u32)>,
}

impl<'a> JoinBinder<'a> {
    fn new(
        bridge_key: &'a str,
        device_key: &'a str,
        join_map: &'a JoinMap,
        surface: Arc<dyn SignalSurface>,
    ) -> Self {
        Self {
            bridge_key,
            device_key,
            join_map,
            surface,
            feedbacks: Vec::new(),
            actions: Vec::new(),
            outbound: HashSet::new(),
            inbound: HashSet::new(),
        }
    }

    pub fn device_key(&self) -> &str {
        self.device_key
    }

    pub fn join_map(&self) -> &JoinMap {
        self.join_map
    }

    fn slot(&self, field: &str, index: u32, kind: SignalKind) -> Result<Option<u32>, CoreError> {
        let Some(spec) = self.join_map.field(field) else {
            trace!(device = %self.device_key, field, "field not in join map; skipped");
            return Ok(None);
        };
        if spec.kind != kind {
            return Err(CoreError::JoinKindMismatch {
                field: field.to_owned(),
                expected: spec.kind,
                actual: kind,
            });
        }
        Ok(self.join_map.join_at(field, index))
    }

    /// Outbound join for a feedback, refusing one already pushed to.
    fn outbound_slot(&mut self, field: &str, index: u32, kind: SignalKind) -> Result<Option<u32>, CoreError> {
        let Some(join) = self.slot(field, index, kind)? else {
            return Ok(None);
        };
        claim(&mut self.outbound, field, kind, join)?;
        Ok(Some(join))
    }

    /// Push every update of `feedback` to the field's join.
    pub fn feedback<T: FeedbackValue>(
        &mut self,
        field: &str,
        feedback: &Arc<Feedback<T>>,
    ) -> Result<(), CoreError> {
        self.feedback_at(field, 1, feedback)
    }

    pub fn feedback_at<T: FeedbackValue>(
        &mut self,
        field: &str,
        index: u32,
        feedback: &Arc<Feedback<T>>,
    ) -> Result<(), CoreError> {
        let Some(join) = self.outbound_slot(field, index, T::KIND)? else {
            return Ok(());
        };
        let surface = Arc::clone(&self.surface);
        feedback.link(
            SinkId::new(self.bridge_key, T::KIND, join),
            Arc::new(move |value: &T| value.push_to(surface.as_ref(), join)),
        );
        self.remember(T::wrap(Arc::clone(feedback)));
        Ok(())
    }

    /// Push the inverse of a boolean feedback, e.g. "power is off" next
    /// to "power is on".
    pub fn complement(&mut self, field: &str, feedback: &Arc<BoolFeedback>) -> Result<(), CoreError> {
        self.complement_at(field, 1, feedback)
    }

    pub fn complement_at(
        &mut self,
        field: &str,
        index: u32,
        feedback: &Arc<BoolFeedback>,
    ) -> Result<(), CoreError> {
        let Some(join) = self.outbound_slot(field, index, SignalKind::Boolean)? else {
            return Ok(());
        };
        let surface = Arc::clone(&self.surface);
        feedback.link(
            SinkId::new(self.bridge_key, SignalKind::Boolean, join),
            Arc::new(move |value: &bool| surface.set_bool(join, !*value)),
        );
        self.remember(AnyFeedback::Bool(Arc::clone(feedback)));
        Ok(())
    }

    pub fn on_bool(
        &mut self,
        field: &str,
        action: impl Fn(bool) + Send + Sync + 'static,
    ) -> Result<(), CoreError> {
        self.on_bool_at(field, 1, action)
    }

    pub fn on_bool_at(
        &mut self,
        field: &str,
        index: u32,
        action: impl Fn(bool) + Send + Sync + 'static,
    ) -> Result<(), CoreError> {
        self.action(field, index, SignalKind::Boolean, InboundAction::Bool(Arc::new(action)))
    }

    /// Run `action` on the rising edge of a boolean join (a button press).
    pub fn on_press(&mut self, field: &str, action: impl Fn() + Send + Sync + 'static) -> Result<(), CoreError> {
        self.on_press_at(field, 1, action)
    }

    pub fn on_press_at(
        &mut self,
        field: &str,
        index: u32,
        action: impl Fn() + Send + Sync + 'static,
    ) -> Result<(), CoreError> {
        self.on_bool_at(field, index, move |pressed| {
            if pressed {
                action();
            }
        })
    }

    pub fn on_numeric(
        &mut self,
        field: &str,
        action: impl Fn(u16) + Send + Sync + 'static,
    ) -> Result<(), CoreError> {
        self.on_numeric_at(field, 1, action)
    }

    pub fn on_numeric_at(
        &mut self,
        field: &str,
        index: u32,
        action: impl Fn(u16) + Send + Sync + 'static,
    ) -> Result<(), CoreError> {
        self.action(field, index, SignalKind::Numeric, InboundAction::Numeric(Arc::new(action)))
    }

    pub fn on_text(
        &mut self,
        field: &str,
        action: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<(), CoreError> {
        self.on_text_at(field, 1, action)
    }

    pub fn on_text_at(
        &mut self,
        field: &str,
        index: u32,
        action: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<(), CoreError> {
        self.action(field, index, SignalKind::Text, InboundAction::Text(Arc::new(action)))
    }

    /// Bound feedbacks are re-fired on reconnect, once each.
    fn remember(&mut self, feedback: AnyFeedback) {
        if !self.feedbacks.iter().any(|f| f.same_as(&feedback)) {
            self.feedbacks.push(feedback);
        }
    }

    fn action(
        &mut self,
        field: &str,
        index: u32,
        kind: SignalKind,
        action: InboundAction,
    ) -> Result<(), CoreError> {
        if let Some(join) = self.slot(field, index, kind)? {
            claim(&mut self.inbound, field, kind, join)?;
            self.actions.push((kind, join, action));
        }
        Ok(())
    }
}

fn claim(
    claimed: &mut HashSet<(SignalKind, u32)>,
    field: &str,
    kind: SignalKind,
    join: u32,
) -> Result<(), CoreError> {
    if claimed.insert((kind, join)) {
        Ok(())
    } else {
        Err(CoreError::JoinCollision {
            field: field.to_owned(),
            kind,
            join,
        })
    }
}

// ── SignalBridge ─────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeProperties {
    #[serde(default)]
    control: ControlProperties,
    #[serde(default)]
    devices: Vec<BridgeDeviceEntry>,
}

/// A device that exposes other devices on an external control surface.
pub struct SignalBridge {
    inner: Arc<BridgeInner>,
    feedbacks: FeedbackList,
}

struct BridgeInner {
    base: DeviceBase,
    control: ControlProperties,
    surface: Arc<dyn SignalSurface>,
    bindings: DashMap<String, BoundDevice>,
    actions: DashMap<(SignalKind, u32), BoundAction>,
    cancel: Mutex<Option<CancellationToken>>,
    /// Inbound events not owned by a dispatch task; drained by `pump`.
    parked: Mutex<Option<mpsc::UnboundedReceiver<SurfaceEvent>>>,
}

impl SignalBridge {
    pub fn new(config: &DeviceConfig, ctx: &mut BuildContext<'_>) -> Result<Self, CoreError> {
        let props: BridgeProperties = config.properties()?;
        let ip_id = props
            .control
            .ip_id
            .ok_or_else(|| CoreError::construction(&config.key, "control.ipId is required"))?;
        if !IP_ID_RANGE.contains(&ip_id) {
            return Err(CoreError::construction(
                &config.key,
                format!("ipId 0x{ip_id:02X} is outside 0x03-0xFE"),
            ));
        }

        let base = DeviceBase::from_config(config)?;
        let surface = ctx.surfaces.open(&config.key, &props.control)?;
        ctx.links.bridge_members(&config.key, props.devices);

        let mut feedbacks = FeedbackList::new();
        feedbacks.add_one(base.is_online());

        Ok(Self {
            inner: Arc::new(BridgeInner {
                base,
                control: props.control,
                surface,
                bindings: DashMap::new(),
                actions: DashMap::new(),
                cancel: Mutex::new(None),
                parked: Mutex::new(None),
            }),
            feedbacks,
        })
    }

    pub fn control(&self) -> &ControlProperties {
        &self.inner.control
    }

    pub fn surface(&self) -> &Arc<dyn SignalSurface> {
        &self.inner.surface
    }

    /// The join map a linked device was bound with.
    pub fn join_map(&self, device_key: &str) -> Option<JoinMap> {
        self.inner.bindings.get(device_key).map(|b| b.join_map.clone())
    }

    /// Keys of every device bound to this bridge.
    pub fn bound_devices(&self) -> Vec<String> {
        self.inner.bindings.iter().map(|b| b.key().clone()).collect()
    }

    /// Bind a device at the given join map. Binding the same device again
    /// replaces its earlier subscriptions instead of adding to them.
    ///
    /// A device that fails to bind leaves nothing behind: sinks linked
    /// before the failure are dropped and no action is registered.
    pub fn bind(&self, device_key: &str, join_map: JoinMap, link: &dyn BridgeLink) -> Result<(), CoreError> {
        self.inner.unbind(device_key);

        let mut binder = JoinBinder::new(
            self.inner.base.key(),
            device_key,
            &join_map,
            Arc::clone(&self.inner.surface),
        );
        let linked = link.link_to_bridge(&mut binder);
        let JoinBinder {
            feedbacks, actions, ..
        } = binder;
        if let Err(e) = linked {
            for feedback in &feedbacks {
                feedback.unlink_owner(self.inner.base.key());
            }
            return Err(e);
        }

        let mut action_joins = Vec::with_capacity(actions.len());
        for (kind, join, action) in actions {
            let previous = self.inner.actions.insert(
                (kind, join),
                BoundAction {
                    device_key: device_key.to_owned(),
                    action,
                },
            );
            if let Some(previous) = previous {
                if previous.device_key != device_key {
                    warn!(
                        bridge = %self.inner.base.key(),
                        join,
                        kind = %kind,
                        previous = %previous.device_key,
                        device = %device_key,
                        "join already claimed by another device; replaced"
                    );
                }
            }
            action_joins.push((kind, join));
        }

        info!(
            bridge = %self.inner.base.key(),
            device = %device_key,
            schema = %join_map.schema(),
            base = join_map.base(),
            feedbacks = feedbacks.len(),
            actions = action_joins.len(),
            "device linked to bridge"
        );
        self.inner.bindings.insert(
            device_key.to_owned(),
            BoundDevice {
                join_map,
                feedbacks,
                actions: action_joins,
            },
        );
        Ok(())
    }

    /// Run the action bound to an inbound signal, if any.
    pub fn dispatch(&self, event: &SignalEvent) {
        self.inner.dispatch(event);
    }

    /// Process one surface event as the dispatch task would.
    pub fn handle(&self, event: SurfaceEvent) {
        self.inner.handle(event);
    }

    /// Drain queued surface events when no dispatch task is running.
    /// Returns how many were handled.
    pub fn pump(&self) -> usize {
        let mut parked = self.inner.parked.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(rx) = parked.as_mut() else {
            return 0;
        };
        let mut handled = 0;
        while let Ok(event) = rx.try_recv() {
            self.inner.handle(event);
            handled += 1;
        }
        handled
    }

    fn link_members(&self, entries: &[BridgeDeviceEntry], ctx: &LinkContext<'_>) -> Result<(), CoreError> {
        let mut first_error = None;
        for entry in entries {
            if let Err(e) = self.link_member(entry, ctx) {
                warn!(bridge = %self.inner.base.key(), device = %entry.device_key, error = %e, "bridge member not linked");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn link_member(&self, entry: &BridgeDeviceEntry, ctx: &LinkContext<'_>) -> Result<(), CoreError> {
        let device = ctx
            .registry
            .get(&entry.device_key)
            .ok_or_else(|| CoreError::UnresolvedReference {
                owner: self.inner.base.key().to_owned(),
                target: entry.device_key.clone(),
            })?;
        let Some(link) = device.as_bridge_link() else {
            debug!(
                bridge = %self.inner.base.key(),
                device = %entry.device_key,
                "device has no bridge capability; skipped"
            );
            return Ok(());
        };
        let join_map = ctx.join_maps.resolve_with_override(
            link.join_schema(),
            entry.join_start,
            entry.join_map_key.as_deref(),
            ctx.overrides,
        )?;
        self.bind(&entry.device_key, join_map, link)
    }
}

impl BridgeInner {
    fn dispatch(&self, event: &SignalEvent) {
        let kind = event.kind();
        let action = self
            .actions
            .get(&(kind, event.join))
            .map(|bound| bound.action.clone());
        match action {
            Some(action) => {
                debug!(bridge = %self.base.key(), join = event.join, kind = %kind, "inbound signal");
                action.invoke(&event.value);
            }
            None => trace!(bridge = %self.base.key(), join = event.join, kind = %kind, "no action bound"),
        }
    }

    fn handle(&self, event: SurfaceEvent) {
        match event {
            SurfaceEvent::Signal(signal) => self.dispatch(&signal),
            SurfaceEvent::Online(true) => {
                self.base.set_online(true);
                self.resync();
            }
            SurfaceEvent::Online(false) => self.base.set_online(false),
        }
    }

    /// Re-fire every bound feedback so the remote side catches up.
    fn resync(&self) {
        let feedbacks: Vec<AnyFeedback> = self
            .bindings
            .iter()
            .flat_map(|b| b.feedbacks.clone())
            .collect();
        info!(bridge = %self.base.key(), feedbacks = feedbacks.len(), "surface online; resyncing");
        for feedback in feedbacks {
            feedback.fire_update();
        }
    }

    fn unbind(&self, device_key: &str) {
        let Some((_, bound)) = self.bindings.remove(device_key) else {
            return;
        };
        for feedback in &bound.feedbacks {
            feedback.unlink_owner(self.base.key());
        }
        for slot in &bound.actions {
            self.actions
                .remove_if(slot, |_, action| action.device_key == device_key);
        }
    }
}

async fn dispatch_task(
    inner: Arc<BridgeInner>,
    mut rx: mpsc::UnboundedReceiver<SurfaceEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                inner.handle(event);
            }
        }
    }
    debug!(bridge = %inner.base.key(), "dispatch task stopped");
}

impl Device for SignalBridge {
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

    /// Start inbound dispatch, then connect the surface.
    ///
    /// Inside a Tokio runtime events are handled by a spawned task;
    /// otherwise they queue up for `pump`.
    fn activate(&self) -> Result<(), CoreError> {
        if let Some(rx) = self.inner.surface.take_events() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let cancel = CancellationToken::new();
                    handle.spawn(dispatch_task(Arc::clone(&self.inner), rx, cancel.clone()));
                    *self.inner.cancel.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel);
                }
                Err(_) => {
                    debug!(bridge = %self.key(), "no async runtime; inbound events parked");
                    *self.inner.parked.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
                }
            }
        }
        self.inner.surface.connect();
        Ok(())
    }

    fn deactivate(&self) {
        if let Some(cancel) = self
            .inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            cancel.cancel();
        }
        for key in self.bound_devices() {
            self.inner.unbind(&key);
        }
        self.inner.surface.disconnect();
        self.inner.base.set_online(false);
    }

    fn resolve_link(&self, target: &LinkTarget, ctx: &LinkContext<'_>) -> Result<(), CoreError> {
        match target {
            LinkTarget::BridgeMembers(entries) => self.link_members(entries, ctx),
            LinkTarget::Peer { .. } => Err(CoreError::UnsupportedLink {
                owner: self.key().to_owned(),
                link: target.to_string(),
            }),
        }
    }

    fn as_signal_bridge(&self) -> Option<&SignalBridge> {
        Some(self)
    }
}

/// Factory registration for bridge device types.
pub fn register(factories: &mut FactoryRegistry) {
    factories.register(
        "bridge",
        &["eiscapi", "eiscapiadvanced", "bridge"],
        "Signal bridge exposing linked devices on a control surface",
        |config, ctx| Ok(Arc::new(SignalBridge::new(config, ctx)?) as Arc<dyn Device>),
    );
}

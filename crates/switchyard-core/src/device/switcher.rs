// ── Matrix switcher ──
//
// HDMI matrix switchers in the HD-MD family. The chassis itself is
// reached through the `Chassis` trait; `SimulatedChassis` stands in when
// no hardware transport is attached.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::bridge::{BridgeLink, JoinBinder};
use crate::config::{ControlProperties, DeviceConfig};
use crate::device::{Device, DeviceBase};
use crate::error::CoreError;
use crate::factory::FactoryRegistry;
use crate::feedback::{BoolFeedback, FeedbackCollection, FeedbackList, NumericFeedback, TextFeedback};
use crate::join_map::{JoinMapCatalog, JoinMapSchema};
use crate::routing::{
    ConnectionType, Routing, RoutingPort, RoutingPortCollection, RoutingPorts, SignalType,
    SwitchOutcome,
};
use crate::signal::SignalKind;

pub const JOIN_SCHEMA: &str = "switcher";

/// Joins reserved per port run in the switcher join map. A chassis with
/// more ports than this would spill one run into the next.
pub const PORT_BAND: u32 = 20;

/// State change reported by the chassis itself, e.g. a source plugged in
/// or a route made from the front panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChassisEvent {
    /// Video sync changed on an input.
    InputChange { input: u32 },
    /// The source routed to an output changed.
    OutputChange { output: u32 },
}

pub type ChassisHandler = Arc<dyn Fn(ChassisEvent) + Send + Sync>;

/// Lower-level access to a switcher chassis.
///
/// Inputs and outputs are 1-based; input 0 means "no source".
pub trait Chassis: Send + Sync {
    fn route(&self, input: u32, output: u32) -> Result<(), CoreError>;

    fn routed_input(&self, output: u32) -> u32;

    fn video_sync(&self, input: u32) -> bool;

    fn hdcp_enabled(&self, input: u32) -> bool;

    fn set_hdcp(&self, input: u32, enabled: bool);

    /// Deliver every chassis state change to `handler` until `unwatch`
    /// is called with the same owner. A second watch by one owner
    /// replaces the first.
    fn watch(&self, owner: &str, handler: ChassisHandler);

    fn unwatch(&self, owner: &str);
}

/// In-memory chassis. Counts every switch it is asked to make.
#[derive(Default)]
pub struct SimulatedChassis {
    routes: DashMap<u32, u32>,
    sync: DashMap<u32, bool>,
    hdcp: DashMap<u32, bool>,
    switches: AtomicU64,
    watchers: DashMap<String, ChassisHandler>,
}

impl SimulatedChassis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn switch_count(&self) -> u64 {
        self.switches.load(Ordering::SeqCst)
    }

    /// Pretend a source was plugged in or removed.
    pub fn set_video_sync(&self, input: u32, present: bool) {
        if self.sync.insert(input, present) != Some(present) {
            self.notify(ChassisEvent::InputChange { input });
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    fn notify(&self, event: ChassisEvent) {
        let handlers: Vec<ChassisHandler> = self.watchers.iter().map(|h| Arc::clone(h.value())).collect();
        for handler in handlers {
            handler(event);
        }
    }
}

impl fmt::Debug for SimulatedChassis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedChassis")
            .field("routes", &self.routes)
            .field("switches", &self.switch_count())
            .field("watchers", &self.watchers.len())
            .finish_non_exhaustive()
    }
}

impl Chassis for SimulatedChassis {
    fn route(&self, input: u32, output: u32) -> Result<(), CoreError> {
        self.switches.fetch_add(1, Ordering::SeqCst);
        self.routes.insert(output, input);
        self.notify(ChassisEvent::OutputChange { output });
        Ok(())
    }

    fn routed_input(&self, output: u32) -> u32 {
        self.routes.get(&output).map_or(0, |r| *r)
    }

    fn video_sync(&self, input: u32) -> bool {
        self.sync.get(&input).is_some_and(|s| *s)
    }

    fn hdcp_enabled(&self, input: u32) -> bool {
        self.hdcp.get(&input).is_none_or(|h| *h)
    }

    fn set_hdcp(&self, input: u32, enabled: bool) {
        self.hdcp.insert(input, enabled);
    }

    fn watch(&self, owner: &str, handler: ChassisHandler) {
        self.watchers.insert(owner.to_owned(), handler);
    }

    fn unwatch(&self, owner: &str) {
        self.watchers.remove(owner);
    }
}

// ── Properties ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwitcherProperties {
    /// 1-based input number → friendly name.
    #[serde(default)]
    inputs: BTreeMap<u32, String>,
    #[serde(default)]
    outputs: BTreeMap<u32, String>,
    #[serde(default)]
    control: Option<ControlProperties>,
}

/// Port counts per model; the generic type takes its size from config.
fn model_size(device_type: &str) -> Option<(u32, u32)> {
    match device_type.to_ascii_lowercase().as_str() {
        "hdmd4x14ke" => Some((4, 1)),
        "hdmd4x24ke" => Some((4, 2)),
        "hdmd6x24ke" => Some((6, 2)),
        _ => None,
    }
}

// ── MatrixSwitcher ───────────────────────────────────────────────

pub struct MatrixSwitcher {
    inner: Arc<SwitcherInner>,
    feedbacks: FeedbackList,
}

struct SwitcherInner {
    base: DeviceBase,
    control: Option<ControlProperties>,
    chassis: Arc<dyn Chassis>,
    inputs: RoutingPortCollection,
    outputs: RoutingPortCollection,
    name_fb: Arc<TextFeedback>,
    video_sync: FeedbackCollection<bool>,
    hdcp_enabled: FeedbackCollection<bool>,
    input_names: FeedbackCollection<String>,
    output_routes: FeedbackCollection<u16>,
    output_names: FeedbackCollection<String>,
    output_route_names: FeedbackCollection<String>,
}

impl MatrixSwitcher {
    pub fn new(config: &DeviceConfig) -> Result<Self, CoreError> {
        Self::with_chassis(config, Arc::new(SimulatedChassis::new()))
    }

    pub fn with_chassis(config: &DeviceConfig, chassis: Arc<dyn Chassis>) -> Result<Self, CoreError> {
        let props: SwitcherProperties = config.properties()?;
        let key = config.key.as_str();

        let (input_count, output_count) = match model_size(&config.device_type) {
            Some(size) => size,
            None => {
                let inputs = props.inputs.keys().max().copied().unwrap_or(0);
                let outputs = props.outputs.keys().max().copied().unwrap_or(0);
                if inputs == 0 || outputs == 0 {
                    return Err(CoreError::construction(
                        key,
                        "a generic matrix switcher needs `inputs` and `outputs`",
                    ));
                }
                (inputs, outputs)
            }
        };
        if input_count > PORT_BAND || output_count > PORT_BAND {
            return Err(CoreError::construction(
                key,
                format!("{input_count}x{output_count} exceeds the {PORT_BAND}-port join bands"),
            ));
        }
        check_range(key, "input", &props.inputs, input_count)?;
        check_range(key, "output", &props.outputs, output_count)?;

        let base = DeviceBase::from_config(config)?;
        let name = |names: &BTreeMap<u32, String>, prefix: &str, i: u32| {
            names.get(&i).cloned().unwrap_or_else(|| format!("{prefix} {i}"))
        };

        let mut inputs = RoutingPortCollection::new();
        let mut video_sync = FeedbackCollection::new();
        let mut hdcp_enabled = FeedbackCollection::new();
        let mut input_names = FeedbackCollection::new();
        for i in 1..=input_count {
            let port = format!("hdmiIn{i}");
            inputs.add(RoutingPort::input(key, port.as_str(), i, SignalType::AudioVideo, ConnectionType::Hdmi));

            let read = Arc::clone(&chassis);
            video_sync.add(BoolFeedback::shared(format!("{port}VideoSync"), move || read.video_sync(i)))?;
            let read = Arc::clone(&chassis);
            hdcp_enabled.add(BoolFeedback::shared(format!("{port}HdcpEnabled"), move || read.hdcp_enabled(i)))?;
            let label = name(&props.inputs, "Input", i);
            input_names.add(TextFeedback::shared(format!("{port}Name"), move || label.clone()))?;
        }

        let labels: Arc<BTreeMap<u32, String>> =
            Arc::new((1..=input_count).map(|i| (i, name(&props.inputs, "Input", i))).collect());
        let mut outputs = RoutingPortCollection::new();
        let mut output_routes = FeedbackCollection::new();
        let mut output_names = FeedbackCollection::new();
        let mut output_route_names = FeedbackCollection::new();
        for o in 1..=output_count {
            let port = format!("hdmiOut{o}");
            outputs.add(RoutingPort::output(key, port.as_str(), o, SignalType::AudioVideo, ConnectionType::Hdmi));

            let read = Arc::clone(&chassis);
            output_routes.add(NumericFeedback::shared(format!("{port}Route"), move || {
                u16::try_from(read.routed_input(o)).unwrap_or_default()
            }))?;
            let label = name(&props.outputs, "Output", o);
            output_names.add(TextFeedback::shared(format!("{port}Name"), move || label.clone()))?;
            let read = Arc::clone(&chassis);
            let labels = Arc::clone(&labels);
            output_route_names.add(TextFeedback::shared(format!("{port}RouteName"), move || {
                labels.get(&read.routed_input(o)).cloned().unwrap_or_default()
            }))?;
        }

        let display_name = base.name().to_owned();
        let name_fb = TextFeedback::shared("Name", move || display_name.clone());

        let mut feedbacks = FeedbackList::new();
        feedbacks.add_one(base.is_online());
        feedbacks.add_one(&name_fb);
        feedbacks.add_collection(&video_sync);
        feedbacks.add_collection(&hdcp_enabled);
        feedbacks.add_collection(&input_names);
        feedbacks.add_collection(&output_routes);
        feedbacks.add_collection(&output_names);
        feedbacks.add_collection(&output_route_names);

        debug!(key, inputs = input_count, outputs = output_count, "matrix switcher built");
        Ok(Self {
            inner: Arc::new(SwitcherInner {
                base,
                control: props.control,
                chassis,
                inputs,
                outputs,
                name_fb,
                video_sync,
                hdcp_enabled,
                input_names,
                output_routes,
                output_names,
                output_route_names,
            }),
            feedbacks,
        })
    }

    pub fn control(&self) -> Option<&ControlProperties> {
        self.inner.control.as_ref()
    }

    pub fn output_routes(&self) -> &FeedbackCollection<u16> {
        &self.inner.output_routes
    }

    pub fn output_route_names(&self) -> &FeedbackCollection<String> {
        &self.inner.output_route_names
    }

    pub fn video_sync(&self) -> &FeedbackCollection<bool> {
        &self.inner.video_sync
    }

    pub fn hdcp_enabled(&self) -> &FeedbackCollection<bool> {
        &self.inner.hdcp_enabled
    }

    pub fn set_hdcp(&self, input: u32, enabled: bool) {
        self.inner.set_hdcp(input, enabled);
    }

    /// Refresh everything after a connection change. Nothing is assumed
    /// to have survived while offline.
    pub fn set_online(&self, online: bool) {
        self.inner.base.set_online(online);
        if online {
            info!(key = %self.key(), "switcher online");
            self.feedbacks.fire_all();
        }
    }
}

fn check_range(key: &str, what: &str, names: &BTreeMap<u32, String>, count: u32) -> Result<(), CoreError> {
    match names.keys().find(|&&i| i == 0 || i > count) {
        Some(i) => Err(CoreError::construction(
            key,
            format!("{what} {i} is outside 1..={count}"),
        )),
        None => Ok(()),
    }
}

impl SwitcherInner {
    /// Route `input` to `output`, skipping requests that would reconfirm
    /// the current route. Route feedbacks for the output refresh after a
    /// real switch.
    fn execute_switch(&self, input: u32, output: u32) -> Result<SwitchOutcome, CoreError> {
        let out_of_range = || CoreError::RouteOutOfRange {
            key: self.base.key().to_owned(),
            input,
            output,
        };
        if self.outputs.by_index(output).is_none() {
            return Err(out_of_range());
        }
        if input != 0 && self.inputs.by_index(input).is_none() {
            return Err(out_of_range());
        }
        // The chassis drops a route it is asked to reconfirm.
        if self.chassis.routed_input(output) == input {
            debug!(key = %self.base.key(), input, output, "already routed; skipped");
            return Ok(SwitchOutcome::AlreadyRouted);
        }

        self.chassis.route(input, output)?;
        debug!(key = %self.base.key(), input, output, "switched");
        self.refresh_output(output);
        Ok(SwitchOutcome::Switched)
    }

    /// Fire an output's route feedbacks if the cached route is stale. A
    /// switch may be reported twice, once by the chassis and once by
    /// `execute_switch`; only the first one pushes.
    fn refresh_output(&self, output: u32) {
        let Some(route) = self.output_routes.at(output) else {
            return;
        };
        if route.cached() == route.value() {
            return;
        }
        route.fire_update();
        if let Some(feedback) = self.output_route_names.at(output) {
            feedback.fire_update();
        }
    }

    fn on_chassis_event(&self, event: ChassisEvent) {
        trace!(key = %self.base.key(), ?event, "chassis event");
        match event {
            ChassisEvent::InputChange { input } => {
                if let Some(feedback) = self.video_sync.at(input) {
                    feedback.fire_update();
                }
            }
            ChassisEvent::OutputChange { output } => self.refresh_output(output),
        }
    }

    fn route_from_surface(&self, input: u16, output: u32) {
        if let Err(e) = self.execute_switch(u32::from(input), output) {
            warn!(key = %self.base.key(), error = %e, "route request ignored");
        }
    }

    fn set_hdcp(&self, input: u32, enabled: bool) {
        self.chassis.set_hdcp(input, enabled);
        if let Some(feedback) = self.hdcp_enabled.at(input) {
            feedback.fire_update();
        }
    }
}

impl Device for MatrixSwitcher {
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
        let inner: Weak<SwitcherInner> = Arc::downgrade(&self.inner);
        self.inner.chassis.watch(
            self.key(),
            Arc::new(move |event| {
                if let Some(inner) = inner.upgrade() {
                    inner.on_chassis_event(event);
                }
            }),
        );
        self.set_online(true);
        Ok(())
    }

    fn deactivate(&self) {
        self.inner.chassis.unwatch(self.key());
        self.set_online(false);
    }

    fn as_bridge_link(&self) -> Option<&dyn BridgeLink> {
        Some(self)
    }

    fn as_routing(&self) -> Option<&dyn Routing> {
        Some(self)
    }

    fn as_routing_ports(&self) -> Option<&dyn RoutingPorts> {
        Some(self)
    }
}

impl RoutingPorts for MatrixSwitcher {
    fn input_ports(&self) -> &RoutingPortCollection {
        &self.inner.inputs
    }

    fn output_ports(&self) -> &RoutingPortCollection {
        &self.inner.outputs
    }
}

impl Routing for MatrixSwitcher {
    fn execute_switch(
        &self,
        input: u32,
        output: u32,
        _signal_type: SignalType,
    ) -> Result<SwitchOutcome, CoreError> {
        self.inner.execute_switch(input, output)
    }
}

impl BridgeLink for MatrixSwitcher {
    fn join_schema(&self) -> &'static str {
        JOIN_SCHEMA
    }

    fn link_to_bridge(&self, binder: &mut JoinBinder<'_>) -> Result<(), CoreError> {
        let inner = &self.inner;
        binder.feedback("isOnline", inner.base.is_online())?;
        binder.feedback("name", &inner.name_fb)?;

        for (i, ((sync, hdcp), name)) in
            (1u32..).zip(inner.video_sync.iter().zip(inner.hdcp_enabled.iter()).zip(inner.input_names.iter()))
        {
            binder.feedback_at("videoSync", i, sync)?;
            binder.feedback_at("enableHdcp", i, hdcp)?;
            binder.complement_at("disableHdcp", i, hdcp)?;
            binder.feedback_at("inputName", i, name)?;

            let enable = Arc::clone(inner);
            binder.on_press_at("enableHdcp", i, move || enable.set_hdcp(i, true))?;
            let disable = Arc::clone(inner);
            binder.on_press_at("disableHdcp", i, move || disable.set_hdcp(i, false))?;
        }

        for (o, ((route, name), route_name)) in (1u32..).zip(
            inner
                .output_routes
                .iter()
                .zip(inner.output_names.iter())
                .zip(inner.output_route_names.iter()),
        ) {
            binder.feedback_at("outputRoute", o, route)?;
            binder.feedback_at("outputName", o, name)?;
            binder.feedback_at("outputRouteName", o, route_name)?;

            let switcher = Arc::clone(inner);
            binder.on_numeric_at("outputRoute", o, move |input| switcher.route_from_surface(input, o))?;
        }
        Ok(())
    }
}

pub fn join_map_schema() -> JoinMapSchema {
    JoinMapSchema::new(JOIN_SCHEMA)
        .single("isOnline", 0, SignalKind::Boolean, "Switcher online")
        .per_port("videoSync", 1, SignalKind::Boolean, "Video sync present on input N")
        .per_port("enableHdcp", 21, SignalKind::Boolean, "Enable HDCP on input N; reports enabled")
        .per_port("disableHdcp", 41, SignalKind::Boolean, "Disable HDCP on input N; reports disabled")
        .per_port("outputRoute", 0, SignalKind::Numeric, "Route an input to output N; reports routed input")
        .single("name", 0, SignalKind::Text, "Switcher name")
        .per_port("inputName", 1, SignalKind::Text, "Name of input N")
        .per_port("outputName", 21, SignalKind::Text, "Name of output N")
        .per_port("outputRouteName", 41, SignalKind::Text, "Name of the input routed to output N")
}

pub fn register(factories: &mut FactoryRegistry) {
    factories.register(
        "core",
        &["hdmd4x14ke", "hdmd4x24ke", "hdmd6x24ke", "matrixswitcher"],
        "HDMI matrix switcher",
        |config, _| Ok(Arc::new(MatrixSwitcher::new(config)?) as Arc<dyn Device>),
    );
}

pub fn register_join_maps(catalog: &mut JoinMapCatalog) {
    catalog.register(join_map_schema());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::{Value, json};

    use super::*;
    use crate::feedback::SinkId;

    fn switcher() -> (MatrixSwitcher, Arc<SimulatedChassis>) {
        let chassis = Arc::new(SimulatedChassis::new());
        let config = DeviceConfig::new(
            "switcher1",
            "hdmd4x24ke",
            json!({ "inputs": { "1": "Laptop", "2": "Camera" }, "outputs": { "1": "Projector" } }),
        );
        let switcher = MatrixSwitcher::with_chassis(&config, chassis.clone()).unwrap();
        (switcher, chassis)
    }

    #[test]
    fn model_sets_port_counts() {
        let (switcher, _) = switcher();
        assert_eq!(switcher.input_ports().len(), 4);
        assert_eq!(switcher.output_ports().len(), 2);
        assert_eq!(switcher.input_ports().get("hdmiIn1").unwrap().index, 1);
    }

    #[test]
    fn generic_switcher_sizes_from_properties() {
        let config = DeviceConfig::new(
            "sw",
            "MatrixSwitcher",
            json!({ "inputs": { "1": "a", "8": "h" }, "outputs": { "3": "c" } }),
        );
        let switcher = MatrixSwitcher::new(&config).unwrap();
        assert_eq!(switcher.input_ports().len(), 8);
        assert_eq!(switcher.output_ports().len(), 3);

        let bare = DeviceConfig::new("sw", "matrixswitcher", Value::Null);
        assert!(MatrixSwitcher::new(&bare).is_err());
    }

    #[test]
    fn generic_switcher_wider_than_a_join_band_is_rejected() {
        let config = DeviceConfig::new(
            "sw",
            "MatrixSwitcher",
            json!({ "inputs": { "1": "a", "21": "u" }, "outputs": { "1": "x" } }),
        );
        assert!(matches!(MatrixSwitcher::new(&config), Err(CoreError::Construction { .. })));

        let config = DeviceConfig::new(
            "sw",
            "MatrixSwitcher",
            json!({ "inputs": { "20": "t" }, "outputs": { "20": "t" } }),
        );
        let switcher = MatrixSwitcher::new(&config).unwrap();
        assert_eq!(switcher.input_ports().len(), 20);
    }

    #[test]
    fn names_outside_the_model_are_rejected() {
        let config = DeviceConfig::new("sw", "hdmd4x14ke", json!({ "outputs": { "2": "Nope" } }));
        assert!(matches!(MatrixSwitcher::new(&config), Err(CoreError::Construction { .. })));
    }

    #[test]
    fn redundant_switch_issues_one_chassis_switch() {
        let (switcher, chassis) = switcher();
        let mut route = switcher.output_routes().at(1).unwrap().subscribe();

        let first = switcher.execute_switch(2, 1, SignalType::AudioVideo).unwrap();
        assert_eq!(first, SwitchOutcome::Switched);
        assert!(route.has_changed().unwrap());
        assert_eq!(*route.borrow_and_update(), 2);

        let second = switcher.execute_switch(2, 1, SignalType::AudioVideo).unwrap();
        assert_eq!(second, SwitchOutcome::AlreadyRouted);
        assert!(!route.has_changed().unwrap());
        assert_eq!(chassis.switch_count(), 1);
    }

    #[test]
    fn route_name_follows_the_routed_input() {
        let (switcher, _) = switcher();
        switcher.execute_switch(2, 1, SignalType::AudioVideo).unwrap();
        assert_eq!(switcher.output_route_names().at(1).unwrap().cached(), "Camera");

        switcher.execute_switch(0, 1, SignalType::AudioVideo).unwrap();
        assert_eq!(switcher.output_route_names().at(1).unwrap().cached(), "");
        assert_eq!(switcher.output_routes().at(1).unwrap().cached(), 0);
    }

    #[test]
    fn out_of_range_routes_do_not_reach_the_chassis() {
        let (switcher, chassis) = switcher();
        assert!(switcher.execute_switch(5, 1, SignalType::Video).is_err());
        assert!(switcher.execute_switch(1, 3, SignalType::Video).is_err());
        assert_eq!(chassis.switch_count(), 0);
    }

    #[test]
    fn coming_online_refreshes_every_feedback() {
        let (switcher, chassis) = switcher();
        chassis.set_video_sync(3, true);
        chassis.route(3, 2).unwrap();

        switcher.activate().unwrap();

        assert!(switcher.video_sync().at(3).unwrap().cached());
        assert_eq!(switcher.output_routes().at(2).unwrap().cached(), 3);
        assert!(switcher.is_online().cached());
    }

    #[test]
    fn chassis_changes_fire_feedbacks_while_active() {
        let (switcher, chassis) = switcher();
        switcher.activate().unwrap();
        assert_eq!(chassis.watcher_count(), 1);

        let mut route = switcher.output_routes().at(2).unwrap().subscribe();
        chassis.set_video_sync(2, true);
        chassis.route(1, 2).unwrap();

        assert!(switcher.video_sync().at(2).unwrap().cached());
        assert!(route.has_changed().unwrap());
        assert_eq!(*route.borrow_and_update(), 1);
        assert_eq!(switcher.output_route_names().at(2).unwrap().cached(), "Laptop");
    }

    #[test]
    fn switching_while_active_pushes_once() {
        let (switcher, _) = switcher();
        switcher.activate().unwrap();
        let pushes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pushes);
        switcher.output_routes().at(1).unwrap().link(
            SinkId::new("test", SignalKind::Numeric, 1),
            Arc::new(move |_: &u16| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        switcher.execute_switch(2, 1, SignalType::AudioVideo).unwrap();
        assert_eq!(pushes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deactivation_stops_chassis_events() {
        let (switcher, chassis) = switcher();
        switcher.activate().unwrap();
        switcher.deactivate();
        assert_eq!(chassis.watcher_count(), 0);

        chassis.set_video_sync(1, true);
        assert!(!switcher.video_sync().at(1).unwrap().cached());
    }

    #[test]
    fn hdcp_toggle_updates_feedback() {
        let (switcher, _) = switcher();
        switcher.set_hdcp(2, false);
        assert!(!switcher.hdcp_enabled().at(2).unwrap().cached());
        switcher.set_hdcp(2, true);
        assert!(switcher.hdcp_enabled().at(2).unwrap().cached());
    }

    #[test]
    fn schema_puts_the_first_output_route_at_the_base() {
        let map = join_map_schema().resolve(100);
        assert_eq!(map.join_at("outputRoute", 1), Some(100));
        assert_eq!(map.join_at("outputRoute", 2), Some(101));
    }
}

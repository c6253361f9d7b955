// ── Display ──
//
// A basic display: switchable power, a handful of selectable inputs and a
// loop-out. Selecting an input is modelled as a route to the single
// output so displays sit in the routing graph like any other sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::bridge::{BridgeLink, JoinBinder};
use crate::config::{ControlProperties, DeviceConfig};
use crate::device::{Device, DeviceBase, PowerControl};
use crate::error::CoreError;
use crate::factory::FactoryRegistry;
use crate::feedback::{
    BoolFeedback, FeedbackCollection, FeedbackList, NumericFeedback, TextFeedback,
};
use crate::join_map::{JoinMapCatalog, JoinMapSchema};
use crate::routing::{
    ConnectionType, Routing, RoutingPort, RoutingPortCollection, RoutingPorts, SignalType,
    SwitchOutcome,
};
use crate::signal::SignalKind;

pub const JOIN_SCHEMA: &str = "display";

const OUTPUT_PORT: &str = "hdmiOut";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisplayProperties {
    #[serde(default = "default_inputs")]
    inputs: Vec<String>,
    #[serde(default)]
    control: Option<ControlProperties>,
}

fn default_inputs() -> Vec<String> {
    vec!["hdmiIn1".to_owned(), "hdmiIn2".to_owned()]
}

#[derive(Debug, Default)]
struct DisplayState {
    power: AtomicBool,
    /// 1-based selected input, 0 before the first selection.
    input: AtomicU32,
}

pub struct BasicDisplay {
    inner: Arc<DisplayInner>,
    feedbacks: FeedbackList,
}

struct DisplayInner {
    base: DeviceBase,
    control: Option<ControlProperties>,
    state: Arc<DisplayState>,
    inputs: RoutingPortCollection,
    outputs: RoutingPortCollection,
    power_fb: Arc<BoolFeedback>,
    current_input_fb: Arc<NumericFeedback>,
    name_fb: Arc<TextFeedback>,
    input_active: FeedbackCollection<bool>,
}

impl BasicDisplay {
    pub fn new(config: &DeviceConfig) -> Result<Self, CoreError> {
        let props: DisplayProperties = config.properties()?;
        if props.inputs.is_empty() {
            return Err(CoreError::construction(&config.key, "a display needs at least one input"));
        }
        let base = DeviceBase::from_config(config)?;
        let key = base.key().to_owned();
        let state = Arc::new(DisplayState::default());

        let mut inputs = RoutingPortCollection::new();
        for (port_name, index) in props.inputs.iter().zip(1u32..) {
            inputs.add(RoutingPort::input(
                &key,
                port_name.as_str(),
                index,
                SignalType::AudioVideo,
                ConnectionType::Hdmi,
            ));
        }
        if inputs.len() != props.inputs.len() {
            return Err(CoreError::construction(&key, "input names must be unique"));
        }
        let mut outputs = RoutingPortCollection::new();
        outputs.add(RoutingPort::output(
            &key,
            OUTPUT_PORT,
            1,
            SignalType::AudioVideo,
            ConnectionType::Hdmi,
        ));

        let read = Arc::clone(&state);
        let power_fb = BoolFeedback::shared("PowerIsOn", move || read.power.load(Ordering::SeqCst));
        let read = Arc::clone(&state);
        let current_input_fb = NumericFeedback::shared("CurrentInput", move || {
            u16::try_from(read.input.load(Ordering::SeqCst)).unwrap_or_default()
        });
        let name = base.name().to_owned();
        let name_fb = TextFeedback::shared("Name", move || name.clone());

        let mut input_active = FeedbackCollection::new();
        for port in inputs.iter() {
            let read = Arc::clone(&state);
            let index = port.index;
            input_active.add(BoolFeedback::shared(
                format!("{}Active", port.name),
                move || read.input.load(Ordering::SeqCst) == index,
            ))?;
        }

        let mut feedbacks = FeedbackList::new();
        feedbacks.add_one(base.is_online());
        feedbacks.add_one(&power_fb);
        feedbacks.add_one(&current_input_fb);
        feedbacks.add_one(&name_fb);
        feedbacks.add_collection(&input_active);

        Ok(Self {
            inner: Arc::new(DisplayInner {
                base,
                control: props.control,
                state,
                inputs,
                outputs,
                power_fb,
                current_input_fb,
                name_fb,
                input_active,
            }),
            feedbacks,
        })
    }

    pub fn control(&self) -> Option<&ControlProperties> {
        self.inner.control.as_ref()
    }

    pub fn current_input(&self) -> &Arc<NumericFeedback> {
        &self.inner.current_input_fb
    }

    pub fn input_active(&self) -> &FeedbackCollection<bool> {
        &self.inner.input_active
    }

    pub fn select_input(&self, input: u32) -> Result<SwitchOutcome, CoreError> {
        self.inner.select_input(input)
    }
}

impl DisplayInner {
    fn set_power(&self, on: bool) {
        if self.state.power.swap(on, Ordering::SeqCst) != on {
            debug!(key = %self.base.key(), on, "display power");
            self.power_fb.fire_update();
        }
    }

    fn select_input(&self, input: u32) -> Result<SwitchOutcome, CoreError> {
        if self.inputs.by_index(input).is_none() {
            return Err(CoreError::RouteOutOfRange {
                key: self.base.key().to_owned(),
                input,
                output: 1,
            });
        }
        let previous = self.state.input.load(Ordering::SeqCst);
        if previous == input {
            return Ok(SwitchOutcome::AlreadyRouted);
        }
        self.state.input.store(input, Ordering::SeqCst);
        debug!(key = %self.base.key(), input, "display input selected");
        self.current_input_fb.fire_update();
        for index in [previous, input] {
            if let Some(feedback) = self.input_active.at(index) {
                feedback.fire_update();
            }
        }
        Ok(SwitchOutcome::Switched)
    }

    fn select_from_surface(&self, input: u32) {
        if let Err(e) = self.select_input(input) {
            warn!(key = %self.base.key(), error = %e, "input select ignored");
        }
    }
}

impl Device for BasicDisplay {
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

    fn deactivate(&self) {
        self.inner.base.set_online(false);
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

    fn as_power(&self) -> Option<&dyn PowerControl> {
        Some(self)
    }
}

impl PowerControl for BasicDisplay {
    fn power_on(&self) {
        self.inner.set_power(true);
    }

    fn power_off(&self) {
        self.inner.set_power(false);
    }

    fn power_feedback(&self) -> &Arc<BoolFeedback> {
        &self.inner.power_fb
    }
}

impl RoutingPorts for BasicDisplay {
    fn input_ports(&self) -> &RoutingPortCollection {
        &self.inner.inputs
    }

    fn output_ports(&self) -> &RoutingPortCollection {
        &self.inner.outputs
    }
}

impl Routing for BasicDisplay {
    fn execute_switch(
        &self,
        input: u32,
        output: u32,
        _signal_type: SignalType,
    ) -> Result<SwitchOutcome, CoreError> {
        if output != 1 {
            return Err(CoreError::RouteOutOfRange {
                key: self.key().to_owned(),
                input,
                output,
            });
        }
        self.inner.select_input(input)
    }
}

impl BridgeLink for BasicDisplay {
    fn join_schema(&self) -> &'static str {
        JOIN_SCHEMA
    }

    fn link_to_bridge(&self, binder: &mut JoinBinder<'_>) -> Result<(), CoreError> {
        let inner = &self.inner;
        binder.feedback("isOnline", inner.base.is_online())?;
        binder.feedback("powerOn", &inner.power_fb)?;
        binder.complement("powerOff", &inner.power_fb)?;
        binder.feedback("powerToggle", &inner.power_fb)?;
        binder.feedback("currentInput", &inner.current_input_fb)?;
        binder.feedback("name", &inner.name_fb)?;

        let on = Arc::clone(inner);
        binder.on_press("powerOn", move || on.set_power(true))?;
        let off = Arc::clone(inner);
        binder.on_press("powerOff", move || off.set_power(false))?;
        let toggle = Arc::clone(inner);
        binder.on_press("powerToggle", move || {
            toggle.set_power(!toggle.state.power.load(Ordering::SeqCst));
        })?;
        let select = Arc::clone(inner);
        binder.on_numeric("currentInput", move |input| select.select_from_surface(u32::from(input)))?;

        for port in inner.inputs.iter() {
            let index = port.index;
            binder.feedback_at("inputSelect", index, inner.input_active.get(&format!("{}Active", port.name))?)?;
            let select = Arc::clone(inner);
            binder.on_press_at("inputSelect", index, move || select.select_from_surface(index))?;
        }
        Ok(())
    }
}

pub fn join_map_schema() -> JoinMapSchema {
    JoinMapSchema::new(JOIN_SCHEMA)
        .single("powerOn", 0, SignalKind::Boolean, "Power on; reports power on")
        .single("powerOff", 1, SignalKind::Boolean, "Power off; reports power off")
        .single("powerToggle", 2, SignalKind::Boolean, "Power toggle; reports power on")
        .single("isOnline", 3, SignalKind::Boolean, "Device online")
        .per_port("inputSelect", 10, SignalKind::Boolean, "Select input N; reports input N active")
        .single("currentInput", 0, SignalKind::Numeric, "Select input by number; reports current input")
        .single("name", 0, SignalKind::Text, "Display name")
}

pub fn register(factories: &mut FactoryRegistry) {
    factories.register(
        "core",
        &["display", "genericdisplay", "basicdisplay"],
        "Basic display with power and input select",
        |config, _| Ok(Arc::new(BasicDisplay::new(config)?) as Arc<dyn Device>),
    );
}

pub fn register_join_maps(catalog: &mut JoinMapCatalog) {
    catalog.register(join_map_schema());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn display() -> BasicDisplay {
        BasicDisplay::new(&DeviceConfig::new("display1", "display", Value::Null)).unwrap()
    }

    #[test]
    fn default_ports() {
        let display = display();
        let names: Vec<_> = display.input_ports().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["hdmiIn1", "hdmiIn2"]);
        assert_eq!(display.output_ports().get("hdmiOut").unwrap().index, 1);
    }

    #[test]
    fn configured_inputs_replace_defaults() {
        let config = DeviceConfig::new("d", "display", json!({ "inputs": ["hdmi1", "dp1", "usbc1"] }));
        let display = BasicDisplay::new(&config).unwrap();
        assert_eq!(display.input_ports().len(), 3);
        assert_eq!(display.input_ports().by_index(3).unwrap().name, "usbc1");
    }

    #[test]
    fn rejects_empty_or_duplicate_inputs() {
        for inputs in [json!([]), json!(["a", "a"])] {
            let config = DeviceConfig::new("d", "display", json!({ "inputs": inputs }));
            assert!(matches!(BasicDisplay::new(&config), Err(CoreError::Construction { .. })));
        }
    }

    #[test]
    fn redundant_input_select_is_a_no_op() {
        let display = display();
        let mut rx = display.current_input().subscribe();

        assert_eq!(display.execute_switch(2, 1, SignalType::Video).unwrap(), SwitchOutcome::Switched);
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        assert_eq!(
            display.execute_switch(2, 1, SignalType::Video).unwrap(),
            SwitchOutcome::AlreadyRouted
        );
        assert!(!rx.has_changed().unwrap());
        assert_eq!(display.current_input().cached(), 2);
    }

    #[test]
    fn out_of_range_routes_are_errors() {
        let display = display();
        assert!(display.execute_switch(3, 1, SignalType::Video).is_err());
        assert!(display.execute_switch(1, 2, SignalType::Video).is_err());
        assert!(display.execute_switch(0, 1, SignalType::Video).is_err());
    }

    #[test]
    fn input_active_tracks_selection() {
        let display = display();
        display.select_input(1).unwrap();
        display.select_input(2).unwrap();

        assert!(!display.input_active().at(1).unwrap().cached());
        assert!(display.input_active().at(2).unwrap().cached());
    }

    #[test]
    fn power_toggle_flips_state() {
        let display = display();
        display.power_toggle();
        assert!(display.power_feedback().cached());
        display.power_toggle();
        assert!(!display.power_feedback().value());
    }

    #[test]
    fn activation_fires_every_feedback() {
        let display = display();
        display.activate().unwrap();
        assert!(display.is_online().cached());
        assert_eq!(display.inner.name_fb.cached(), "display1");
    }
}

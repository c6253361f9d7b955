//! Device runtime for AV control systems.
//!
//! This crate assembles a configuration-described set of devices and
//! exposes their state and controls to external control surfaces through
//! numbered signal joins:
//!
//! - **[`Runtime`]**: composition root. [`load()`](Runtime::load) constructs
//!   every configured device, resolves the pending links between them,
//!   builds the tie-line set and activates the registry, in that order.
//!   [`reload()`](Runtime::reload) tears the whole load down first.
//!
//! - **[`DeviceRegistry`]**: keyed device store (`DashMap` plus a
//!   `watch` snapshot in registration order) with bulk activate and
//!   deactivate.
//!
//! - **[`Feedback`]**: named, function-backed values. `fire_update()`
//!   re-evaluates, caches and pushes to every linked sink.
//!
//! - **[`SignalBridge`]** and **[`JoinMap`]**: bind device feedbacks and
//!   actions onto a surface's boolean, numeric and text joins at
//!   `base + offset (+ index - 1)`.
//!
//! - **Routing graph** ([`routing`]): typed ports and the tie lines
//!   between them; routing devices skip redundant switches.
//!
//! Core never reads files. The `switchyard-config` crate turns a system
//! file into a [`ConfigSnapshot`].

pub mod bridge;
pub mod config;
pub mod device;
pub mod error;
pub mod factory;
pub mod feedback;
pub mod join_map;
pub mod link;
pub mod registry;
pub mod routing;
pub mod runtime;
pub mod signal;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{BridgeLink, JoinBinder, SignalBridge};
pub use config::{
    BridgeDeviceEntry, BridgeRecord, ConfigSnapshot, ControlProperties, DeviceConfig,
    TieLineConfig,
};
pub use device::{
    BasicDisplay, Chassis, ChassisEvent, ChassisHandler, ControlProcessor, Device, DeviceBase,
    HuddleRoom, LifecycleState, MatrixSwitcher, PowerControl, SimulatedChassis,
};
pub use error::CoreError;
pub use factory::{BuildContext, FactoryInfo, FactoryRegistry};
pub use feedback::{
    AnyFeedback, BoolFeedback, Feedback, FeedbackCollection, FeedbackList, NumericFeedback,
    SinkId, TextFeedback,
};
pub use join_map::{JoinEntry, JoinField, JoinMap, JoinMapCatalog, JoinMapSchema, JoinSpan};
pub use link::{LinkContext, LinkQueue, LinkTarget, PendingLink};
pub use registry::DeviceRegistry;
pub use routing::{
    ConnectionType, PortDirection, Routing, RoutingPort, RoutingPortCollection, RoutingPorts,
    SignalType, SwitchOutcome, TieLine, TieLineCollection,
};
pub use runtime::{LoadFailure, LoadReport, LoadStage, Runtime, RuntimeSettings};
pub use signal::{
    LoopbackProvider, LoopbackSurface, SignalEvent, SignalKind, SignalSurface, SignalValue,
    SurfaceEvent, SurfaceProvider,
};

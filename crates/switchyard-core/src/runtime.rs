// ── Runtime ──
//
// Composition root for one system load. Owns the registry, the tie-line
// set, the factory and join map registries, and drives a load strictly in
// order: construct, link, tie lines, activate.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{info, warn};

use crate::config::{ConfigSnapshot, DeviceConfig};
use crate::device::{ControlProcessor, Device};
use crate::error::CoreError;
use crate::factory::{BuildContext, FactoryRegistry};
use crate::join_map::JoinMapCatalog;
use crate::link::{self, LinkContext, LinkQueue};
use crate::registry::DeviceRegistry;
use crate::routing::{TieLineCollection, resolve_tie_line};
use crate::signal::{LoopbackProvider, SurfaceProvider};

/// Settings the host hands the runtime before any load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSettings {
    /// Model of the processor this runtime runs on.
    pub processor_type: String,
    pub processor_key: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            processor_type: "rmc3".into(),
            processor_key: "processor".into(),
        }
    }
}

/// Load phase a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LoadStage {
    Construct,
    Link,
    TieLine,
    Activate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    pub key: String,
    pub stage: LoadStage,
    pub message: String,
}

/// What a load did: devices built from configuration and every absorbed
/// failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub devices: Vec<String>,
    pub tie_lines: usize,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    fn fail(&mut self, key: &str, stage: LoadStage, error: &CoreError) {
        self.failures.push(LoadFailure {
            key: key.to_owned(),
            stage,
            message: error.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Runtime {
    settings: RuntimeSettings,
    factories: FactoryRegistry,
    join_maps: JoinMapCatalog,
    surfaces: Arc<dyn SurfaceProvider>,
    registry: Arc<DeviceRegistry>,
    tie_lines: Arc<TieLineCollection>,
    running: ArcSwapOption<ConfigSnapshot>,
}

impl Runtime {
    /// Runtime with every built-in device kind and loopback surfaces.
    pub fn new(settings: RuntimeSettings) -> Self {
        Self::with_parts(
            settings,
            FactoryRegistry::with_builtin(),
            JoinMapCatalog::with_builtin(),
            Arc::new(LoopbackProvider::new()),
        )
    }

    pub fn with_parts(
        settings: RuntimeSettings,
        factories: FactoryRegistry,
        join_maps: JoinMapCatalog,
        surfaces: Arc<dyn SurfaceProvider>,
    ) -> Self {
        Self {
            settings,
            factories,
            join_maps,
            surfaces,
            registry: Arc::new(DeviceRegistry::new()),
            tie_lines: Arc::new(TieLineCollection::new()),
            running: ArcSwapOption::empty(),
        }
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn tie_lines(&self) -> &Arc<TieLineCollection> {
        &self.tie_lines
    }

    pub fn factories(&self) -> &FactoryRegistry {
        &self.factories
    }

    pub fn join_maps(&self) -> &JoinMapCatalog {
        &self.join_maps
    }

    /// The snapshot the current load was built from.
    pub fn running_config(&self) -> Option<Arc<ConfigSnapshot>> {
        self.running.load_full()
    }

    /// Build, link and activate everything in `snapshot`.
    ///
    /// Individual failures are logged, recorded in the report and skipped.
    /// Only loading over an existing load is refused.
    pub fn load(&self, snapshot: ConfigSnapshot) -> Result<LoadReport, CoreError> {
        if !self.registry.is_empty() {
            return Err(CoreError::AlreadyLoaded);
        }
        let mut report = LoadReport::default();
        let mut links = LinkQueue::new();

        let processor = ControlProcessor::new(&self.settings.processor_key, &self.settings.processor_type)?;
        self.registry.add(Arc::new(processor))?;

        for config in &snapshot.devices {
            self.construct(config, &mut links, &mut report);
        }
        info!(devices = report.devices.len(), "all devices loaded");
        for config in &snapshot.rooms {
            self.construct(config, &mut links, &mut report);
        }
        for bridge in &snapshot.bridges {
            links.bridge_members(&bridge.key, bridge.devices.clone());
        }

        let ctx = LinkContext {
            registry: &self.registry,
            join_maps: &self.join_maps,
            overrides: &snapshot.join_maps,
        };
        for (owner, e) in link::resolve_all(links, &ctx) {
            report.fail(&owner, LoadStage::Link, &e);
        }
        self.registry.mark_linked();

        for config in &snapshot.tie_lines {
            match resolve_tie_line(config, &self.registry) {
                Ok(line) => {
                    self.tie_lines.add(line);
                }
                Err(e) => {
                    warn!(tie_line = %config, error = %e, "tie line skipped");
                    report.fail(&config.to_string(), LoadStage::TieLine, &e);
                }
            }
        }
        report.tie_lines = self.tie_lines.len();
        info!(tie_lines = report.tie_lines, "all tie lines loaded");

        for (key, e) in self.registry.activate_all() {
            report.fail(&key, LoadStage::Activate, &e);
        }

        self.running.store(Some(Arc::new(snapshot)));
        info!(
            devices = self.registry.len(),
            failures = report.failures.len(),
            "load complete"
        );
        Ok(report)
    }

    /// Deactivate everything, drop the routing graph and empty the registry.
    /// Safe after a partial load, and when nothing is loaded.
    pub fn teardown(&self) {
        self.registry.deactivate_all();
        self.tie_lines.clear();
        self.registry.remove_all();
        self.running.store(None);
        info!("system torn down");
    }

    pub fn reload(&self, snapshot: ConfigSnapshot) -> Result<LoadReport, CoreError> {
        self.teardown();
        self.load(snapshot)
    }

    fn construct(&self, config: &DeviceConfig, links: &mut LinkQueue, report: &mut LoadReport) {
        let key = config.key.as_str();
        if key == self.settings.processor_key {
            if !config.device_type.eq_ignore_ascii_case(&self.settings.processor_type) {
                warn!(
                    key,
                    configured = %config.device_type,
                    running = %self.settings.processor_type,
                    "processor type does not match this processor"
                );
            }
            return;
        }

        let mut pending = LinkQueue::new();
        let mut ctx = BuildContext {
            links: &mut pending,
            surfaces: self.surfaces.as_ref(),
        };
        let built = match self.factories.build(config, &mut ctx) {
            Ok(Some(device)) => device,
            Ok(None) => {
                let e = CoreError::UnknownDeviceType {
                    device_type: config.device_type.clone(),
                    key: key.to_owned(),
                };
                warn!(key, error = %e, "device skipped");
                report.fail(key, LoadStage::Construct, &e);
                return;
            }
            Err(e) => {
                warn!(key, error = %e, "device skipped");
                report.fail(key, LoadStage::Construct, &e);
                return;
            }
        };
        if let Err(e) = self.registry.add(Arc::clone(&built)) {
            warn!(key, error = %e, "device skipped");
            report.fail(key, LoadStage::Construct, &e);
            return;
        }
        links.append(&mut pending);
        info!(key, type_name = %built.type_name(), "device loaded");
        report.devices.push(key.to_owned());
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            self.teardown();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn snapshot(value: serde_json::Value) -> ConfigSnapshot {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn processor_is_always_present() {
        let runtime = Runtime::new(RuntimeSettings::default());
        runtime.load(ConfigSnapshot::default()).unwrap();
        let processor = runtime.registry().get("processor").unwrap();
        assert_eq!(processor.type_name(), "rmc3");
        assert!(processor.is_online().value());
    }

    #[test]
    fn configured_processor_entry_is_skipped() {
        let runtime = Runtime::new(RuntimeSettings::default());
        let report = runtime
            .load(snapshot(json!({ "devices": [ { "key": "processor", "type": "cp4" } ] })))
            .unwrap();
        assert!(report.devices.is_empty());
        assert!(report.is_clean());
        assert_eq!(runtime.registry().get("processor").unwrap().type_name(), "rmc3");
    }

    #[test]
    fn second_load_is_refused() {
        let runtime = Runtime::new(RuntimeSettings::default());
        runtime.load(ConfigSnapshot::default()).unwrap();
        assert!(matches!(
            runtime.load(ConfigSnapshot::default()),
            Err(CoreError::AlreadyLoaded)
        ));
    }

    #[test]
    fn unknown_types_are_reported_per_entry() {
        let runtime = Runtime::new(RuntimeSettings::default());
        let report = runtime
            .load(snapshot(json!({ "devices": [
                { "key": "d1", "type": "display" },
                { "key": "x1", "type": "fluxcapacitor" }
            ] })))
            .unwrap();
        assert_eq!(report.devices, vec!["d1"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].stage, LoadStage::Construct);
        assert_eq!(report.failures[0].key, "x1");
    }

    #[test]
    fn rooms_link_to_devices_declared_after_them() {
        let runtime = Runtime::new(RuntimeSettings::default());
        let report = runtime
            .load(snapshot(json!({
                "rooms": [ { "key": "room1", "type": "huddle", "properties": { "displayKey": "display1" } } ],
                "devices": [ { "key": "display1", "type": "display" } ]
            })))
            .unwrap();
        assert!(report.is_clean(), "{:?}", report.failures);

        let room = runtime.registry().get("room1").unwrap();
        room.as_power().unwrap().power_on();
        let display = runtime.registry().get("display1").unwrap();
        assert!(display.as_power().unwrap().power_feedback().value());
    }

    #[test]
    fn teardown_resets_everything() {
        let runtime = Runtime::new(RuntimeSettings::default());
        runtime
            .load(snapshot(json!({ "devices": [ { "key": "d1", "type": "display" } ] })))
            .unwrap();
        assert!(runtime.running_config().is_some());

        runtime.teardown();
        runtime.teardown();
        assert!(runtime.registry().is_empty());
        assert!(runtime.running_config().is_none());
        runtime.load(ConfigSnapshot::default()).unwrap();
    }
}

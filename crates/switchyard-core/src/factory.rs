// ── Device factories ──
//
// Maps a normalized type discriminator to a constructor. Each capability
// module registers its own types once at startup; the orchestrator asks
// the registry to build every configured entry.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::DeviceConfig;
use crate::device::Device;
use crate::error::CoreError;
use crate::link::LinkQueue;
use crate::signal::SurfaceProvider;

/// What a constructor may reach while building one device.
pub struct BuildContext<'a> {
    /// Requests to resolve once every device exists.
    pub links: &'a mut LinkQueue,
    pub surfaces: &'a dyn SurfaceProvider,
}

pub type BuildFn =
    Arc<dyn Fn(&DeviceConfig, &mut BuildContext<'_>) -> Result<Arc<dyn Device>, CoreError> + Send + Sync>;

struct FactoryEntry {
    library: &'static str,
    description: &'static str,
    build: BuildFn,
}

/// A registered type, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactoryInfo {
    pub type_name: String,
    pub library: &'static str,
    pub description: &'static str,
}

/// Type discriminator → constructor, in registration order.
#[derive(Default)]
pub struct FactoryRegistry {
    entries: IndexMap<String, FactoryEntry>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in device kind, core types first.
    pub fn with_builtin() -> Self {
        let mut factories = Self::new();
        crate::device::processor::register(&mut factories);
        crate::device::display::register(&mut factories);
        crate::device::switcher::register(&mut factories);
        crate::device::room::register(&mut factories);
        crate::bridge::register(&mut factories);
        factories
    }

    /// Register `build` under every name in `type_names`. Names compare
    /// case-insensitively; a name that is already taken keeps its earlier
    /// constructor.
    pub fn register<F>(
        &mut self,
        library: &'static str,
        type_names: &[&str],
        description: &'static str,
        build: F,
    ) where
        F: Fn(&DeviceConfig, &mut BuildContext<'_>) -> Result<Arc<dyn Device>, CoreError>
            + Send
            + Sync
            + 'static,
    {
        let build: BuildFn = Arc::new(build);
        for name in type_names {
            let normalized = normalize(name);
            if let Some(existing) = self.entries.get(&normalized) {
                warn!(
                    type_name = %normalized,
                    library,
                    registered_by = existing.library,
                    "device type already registered; ignoring"
                );
                continue;
            }
            debug!(type_name = %normalized, library, "device type registered");
            self.entries.insert(
                normalized,
                FactoryEntry {
                    library,
                    description,
                    build: Arc::clone(&build),
                },
            );
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(&normalize(type_name))
    }

    /// Build a device from its configuration.
    ///
    /// `Ok(None)` means no factory claims the type; the caller decides how
    /// loudly to complain.
    pub fn build(
        &self,
        config: &DeviceConfig,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Option<Arc<dyn Device>>, CoreError> {
        let Some(entry) = self.entries.get(&normalize(&config.device_type)) else {
            return Ok(None);
        };
        debug!(key = %config.key, type_name = %config.device_type, library = entry.library, "building device");
        (entry.build)(config, ctx).map(Some)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn describe(&self) -> Vec<FactoryInfo> {
        self.entries
            .iter()
            .map(|(name, entry)| FactoryInfo {
                type_name: name.clone(),
                library: entry.library,
                description: entry.description,
            })
            .collect()
    }
}

fn normalize(type_name: &str) -> String {
    type_name.trim().to_ascii_lowercase()
}

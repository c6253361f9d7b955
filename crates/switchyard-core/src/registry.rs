// ── Device registry ──
//
// Keyed store of every device in the current load. Lookups go through
// a `DashMap`; the registration-ordered list is kept as a snapshot in a
// `watch` channel so readers never block the control thread.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::device::{Device, LifecycleState};
use crate::error::CoreError;

type DeviceSnapshot = Arc<Vec<Arc<dyn Device>>>;

/// Registry of devices for one load.
///
/// Mutated only by the orchestrator during load and teardown; dispatch
/// handlers may read concurrently once activation has finished.
pub struct DeviceRegistry {
    by_key: DashMap<String, Arc<dyn Device>>,
    states: DashMap<String, LifecycleState>,
    snapshot: watch::Sender<DeviceSnapshot>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_key: DashMap::new(),
            states: DashMap::new(),
            snapshot,
        }
    }

    /// Register a device. A duplicate key is rejected and leaves the
    /// existing registration untouched.
    pub fn add(&self, device: Arc<dyn Device>) -> Result<(), CoreError> {
        let key = device.key().to_owned();
        if key.is_empty() {
            return Err(CoreError::EmptyKey);
        }
        match self.by_key.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => return Err(CoreError::DuplicateKey { key }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&device));
            }
        }
        self.states.insert(key.clone(), LifecycleState::Constructed);
        self.snapshot.send_modify(|list| {
            let mut next = Vec::with_capacity(list.len() + 1);
            next.extend(list.iter().cloned());
            next.push(device);
            *list = Arc::new(next);
        });
        debug!(key = %key, "device registered");
        Ok(())
    }

    /// Look up a device. A miss is an ordinary outcome, not an error.
    pub fn get(&self, key: &str) -> Option<Arc<dyn Device>> {
        self.by_key.get(key).map(|d| Arc::clone(d.value()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn state(&self, key: &str) -> Option<LifecycleState> {
        self.states.get(key).map(|s| *s)
    }

    /// All devices in registration order.
    pub fn list(&self) -> DeviceSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.list().iter().map(|d| d.key().to_owned()).collect()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Deactivate (if needed) and remove one device.
    pub fn remove(&self, key: &str) -> Option<Arc<dyn Device>> {
        let (_, device) = self.by_key.remove(key)?;
        if let Some((_, state)) = self.states.remove(key) {
            if state != LifecycleState::Deactivated {
                device.deactivate();
            }
        }
        self.snapshot.send_modify(|list| {
            let next: Vec<_> = list.iter().filter(|d| d.key() != key).cloned().collect();
            *list = Arc::new(next);
        });
        debug!(key = %key, "device removed");
        Some(device)
    }

    /// Move every freshly constructed device to `Linked`. Called once the
    /// pending link queue has been worked off.
    pub fn mark_linked(&self) {
        for device in self.list().iter() {
            self.transition(device.key(), LifecycleState::Constructed, LifecycleState::Linked);
        }
    }

    /// Activate every linked device in registration order.
    ///
    /// A failing device is logged and reported; the rest still activate.
    pub fn activate_all(&self) -> Vec<(String, CoreError)> {
        let mut failures = Vec::new();
        for device in self.list().iter() {
            let key = device.key();
            if self.state(key) != Some(LifecycleState::Linked) {
                continue;
            }
            match device.activate() {
                Ok(()) => {
                    self.states.insert(key.to_owned(), LifecycleState::Activated);
                    debug!(key = %key, "device activated");
                }
                Err(e) => {
                    error!(key = %key, error = %e, "device activation failed");
                    failures.push((key.to_owned(), e));
                }
            }
        }
        info!(devices = self.len(), failed = failures.len(), "activation complete");
        failures
    }

    /// Deactivate every device that is not already dead. Safe after a
    /// partial load.
    pub fn deactivate_all(&self) {
        for device in self.list().iter() {
            let key = device.key();
            match self.state(key) {
                Some(LifecycleState::Deactivated) | None => {}
                Some(_) => {
                    device.deactivate();
                    self.states.insert(key.to_owned(), LifecycleState::Deactivated);
                }
            }
        }
    }

    /// Deactivate and drop every device.
    pub fn remove_all(&self) {
        self.deactivate_all();
        self.by_key.clear();
        self.states.clear();
        self.snapshot.send_modify(|list| *list = Arc::new(Vec::new()));
    }

    fn transition(&self, key: &str, from: LifecycleState, to: LifecycleState) {
        if let Some(mut state) = self.states.get_mut(key) {
            if *state == from {
                *state = to;
            }
        }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::device::DeviceBase;
    use crate::feedback::{BoolFeedback, FeedbackList};

    struct Stub {
        base: DeviceBase,
        feedbacks: FeedbackList,
        fail_activation: bool,
        activations: AtomicUsize,
        deactivations: AtomicUsize,
        log: Option<Arc<Mutex<Vec<String>>>>,
    }

    impl Stub {
        fn new(key: &str) -> Self {
            Self {
                base: DeviceBase::new(key, key, "stub").unwrap(),
                feedbacks: FeedbackList::new(),
                fail_activation: false,
                activations: AtomicUsize::new(0),
                deactivations: AtomicUsize::new(0),
                log: None,
            }
        }
    }

    impl Device for Stub {
        fn key(&self) -> &str {
            self.base.key()
        }

        fn name(&self) -> &str {
            self.base.name()
        }

        fn type_name(&self) -> &str {
            self.base.type_name()
        }

        fn is_online(&self) -> &Arc<BoolFeedback> {
            self.base.is_online()
        }

        fn feedbacks(&self) -> &FeedbackList {
            &self.feedbacks
        }

        fn activate(&self) -> Result<(), CoreError> {
            self.activations.fetch_add(1, Ordering::SeqCst);
            if let Some(log) = &self.log {
                log.lock().unwrap().push(self.key().to_owned());
            }
            if self.fail_activation {
                return Err(CoreError::Activation {
                    key: self.key().to_owned(),
                    reason: "activation refused".into(),
                });
            }
            Ok(())
        }

        fn deactivate(&self) {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn duplicate_keys_are_rejected_without_mutation() {
        let registry = DeviceRegistry::new();
        let first: Arc<dyn Device> = Arc::new(Stub::new("d1"));
        registry.add(Arc::clone(&first)).unwrap();

        let err = registry.add(Arc::new(Stub::new("d1"))).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { ref key } if key == "d1"));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get("d1").unwrap(), &first));
    }

    #[test]
    fn missing_keys_return_none() {
        let registry = DeviceRegistry::new();
        assert!(registry.get("nope").is_none());
        assert!(registry.state("nope").is_none());
    }

    #[test]
    fn list_preserves_registration_order() {
        let registry = DeviceRegistry::new();
        for key in ["c", "a", "b"] {
            registry.add(Arc::new(Stub::new(key))).unwrap();
        }
        assert_eq!(registry.keys(), vec!["c", "a", "b"]);

        registry.remove("a");
        assert_eq!(registry.keys(), vec!["c", "b"]);
    }

    #[test]
    fn activation_runs_in_order_and_survives_failures() {
        let registry = DeviceRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (key, fail) in [("a", false), ("b", true), ("c", false)] {
            let mut stub = Stub::new(key);
            stub.fail_activation = fail;
            stub.log = Some(Arc::clone(&log));
            registry.add(Arc::new(stub)).unwrap();
        }

        registry.mark_linked();
        let failures = registry.activate_all();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "b");
        assert_eq!(registry.state("a"), Some(LifecycleState::Activated));
        assert_eq!(registry.state("b"), Some(LifecycleState::Linked));
        assert_eq!(registry.state("c"), Some(LifecycleState::Activated));
    }

    #[test]
    fn activation_skips_unlinked_devices() {
        let registry = DeviceRegistry::new();
        let stub = Arc::new(Stub::new("a"));
        registry.add(stub.clone()).unwrap();

        registry.activate_all();
        assert_eq!(stub.activations.load(Ordering::SeqCst), 0);
        assert_eq!(registry.state("a"), Some(LifecycleState::Constructed));
    }

    #[test]
    fn deactivate_all_is_idempotent() {
        let registry = DeviceRegistry::new();
        let stub = Arc::new(Stub::new("a"));
        registry.add(stub.clone()).unwrap();
        registry.mark_linked();
        registry.activate_all();

        registry.deactivate_all();
        registry.deactivate_all();
        assert_eq!(stub.deactivations.load(Ordering::SeqCst), 1);
        assert_eq!(registry.state("a"), Some(LifecycleState::Deactivated));
    }

    #[test]
    fn remove_all_handles_never_activated_devices() {
        let registry = DeviceRegistry::new();
        let stub = Arc::new(Stub::new("a"));
        registry.add(stub.clone()).unwrap();

        registry.remove_all();
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
        assert_eq!(stub.deactivations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribers_see_registrations() {
        let registry = DeviceRegistry::new();
        let mut rx = registry.subscribe();
        registry.add(Arc::new(Stub::new("a"))).unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);
    }
}

// ── Control processor ──
//
// The processor the runtime itself runs on. Registered ahead of every
// configured device under the key from `RuntimeSettings`.

use std::sync::Arc;

use crate::device::{Device, DeviceBase};
use crate::error::CoreError;
use crate::factory::FactoryRegistry;
use crate::feedback::{BoolFeedback, FeedbackList};

/// The processor the runtime itself runs on. Always present, always online
/// once activated.
pub struct ControlProcessor {
    base: DeviceBase,
    feedbacks: FeedbackList,
}

impl ControlProcessor {
    pub fn new(key: &str, processor_type: &str) -> Result<Self, CoreError> {
        let base = DeviceBase::new(key, key, processor_type.to_ascii_lowercase())?;
        let mut feedbacks = FeedbackList::new();
        feedbacks.add_one(base.is_online());
        Ok(Self { base, feedbacks })
    }
}

impl Device for ControlProcessor {
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
        self.base.set_online(true);
        Ok(())
    }

    fn deactivate(&self) {
        self.base.set_online(false);
    }
}

/// Processor models. Additional processors (e.g. a secondary unit) may be
/// declared in configuration under their own keys.
pub fn register(factories: &mut FactoryRegistry) {
    factories.register(
        "core",
        &["rmc3", "cp3", "cp3n", "cp4", "cp4n", "pro3", "pro4", "mc4", "processor"],
        "Control processor",
        |config, _| {
            Ok(Arc::new(ControlProcessor::new(&config.key, &config.device_type)?) as Arc<dyn Device>)
        },
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn online_follows_lifecycle() {
        let processor = ControlProcessor::new("processor", "RMC3").unwrap();
        assert_eq!(processor.type_name(), "rmc3");
        assert!(!processor.is_online().value());

        processor.activate().unwrap();
        assert!(processor.is_online().value());

        processor.deactivate();
        processor.deactivate();
        assert!(!processor.is_online().value());
    }
}

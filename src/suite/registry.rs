//! Suite registry and the host interface handed to modules.

use crate::property::PropertySet;
use crate::suite::{
    ImageEffectSuite, MessageSuite, MultiThreadSuite, ParameterSuite, IMAGE_EFFECT_SUITE, MESSAGE_SUITE,
    MULTI_THREAD_SUITE, PARAMETER_SUITE, SUITE_VERSION,
};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// One suite implementation.
#[derive(Clone)]
pub enum Suite {
    /// Image effect services.
    ImageEffect(Arc<dyn ImageEffectSuite>),
    /// Parameter services.
    Parameter(Arc<dyn ParameterSuite>),
    /// Fork-join execution.
    MultiThread(Arc<dyn MultiThreadSuite>),
    /// User messages.
    Message(Arc<dyn MessageSuite>),
}

impl Suite {
    /// Conventional name of this kind of suite.
    pub fn default_name(&self) -> &'static str {
        match self {
            Suite::ImageEffect(_) => IMAGE_EFFECT_SUITE,
            Suite::Parameter(_) => PARAMETER_SUITE,
            Suite::MultiThread(_) => MULTI_THREAD_SUITE,
            Suite::Message(_) => MESSAGE_SUITE,
        }
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Suite({})", self.default_name())
    }
}

/// Suites indexed by name and version.
#[derive(Debug, Clone, Default)]
pub struct SuiteRegistry {
    suites: IndexMap<(String, u32), Suite>,
}

impl SuiteRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a suite under an explicit name and version.
    pub fn register(&mut self, name: impl Into<String>, version: u32, suite: Suite) {
        self.suites.insert((name.into(), version), suite);
    }

    /// Register a suite under its conventional name at the current version.
    pub fn with_suite(mut self, suite: Suite) -> Self {
        self.register(suite.default_name(), SUITE_VERSION, suite);
        self
    }

    /// Look up a suite.
    pub fn fetch(&self, name: &str, version: u32) -> Option<Suite> {
        self.suites.get(&(name.to_string(), version)).cloned()
    }

    /// Registered names and versions, in registration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, u32)> {
        self.suites.keys().map(|(name, version)| (name.as_str(), *version))
    }

    /// Number of registered suites.
    pub fn len(&self) -> usize {
        self.suites.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }
}

/// What a host hands to a module before the first action.
pub trait Host: Send + Sync {
    /// Host description and capability properties.
    fn properties(&self) -> &PropertySet;

    /// Look up a suite; `None` means the host does not provide it.
    fn fetch_suite(&self, name: &str, version: u32) -> Option<Suite>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handle::EffectHandle;
    use crate::core::status::Status;
    use crate::core::types::MessageKind;

    struct Silent;

    impl MessageSuite for Silent {
        fn message(&self, _: Option<EffectHandle>, _: MessageKind, _: &str, _: &str) -> Status {
            Status::Ok
        }
    }

    #[test]
    fn test_fetch_by_name_and_version() {
        let registry = SuiteRegistry::new().with_suite(Suite::Message(Arc::new(Silent)));
        assert_eq!(registry.len(), 1);
        assert!(matches!(registry.fetch(MESSAGE_SUITE, 1), Some(Suite::Message(_))));
        assert!(registry.fetch(MESSAGE_SUITE, 2).is_none());
        assert!(registry.fetch(PARAMETER_SUITE, 1).is_none());
    }

    #[test]
    fn test_entries_in_registration_order() {
        let mut registry = SuiteRegistry::new();
        registry.register("B", 1, Suite::Message(Arc::new(Silent)));
        registry.register("A", 2, Suite::Message(Arc::new(Silent)));
        let entries: Vec<_> = registry.entries().collect();
        assert_eq!(entries, vec![("B", 1), ("A", 2)]);
    }
}

//! Bootstrap: how a host discovers the effects in a module binary.
//!
//! A bundle answers two questions before any suite exists: how many
//! effects it contains, and the entry for effect N. Each entry is handed
//! the host with `set_host` and is then driven only through `main_entry`.

use crate::core::handle::EffectHandle;
use crate::core::status::Status;
use crate::plugin::dispatcher::Dispatcher;
use crate::plugin::effect::PluginFactory;
use crate::property::PropertySet;
use crate::suite::Host;
use semver::Version;
use serde::Serialize;
use std::sync::Arc;

/// API name every entry reports.
pub const API_NAME: &str = "OfxImageEffectPluginAPI";

/// API version every entry reports.
pub const API_VERSION: u32 = 1;

/// Binary interface version of dynamically loaded bundles. Bumped whenever
/// a trait crossing the bundle boundary changes.
pub const ABI_VERSION: u32 = 1;

/// Symbol exporting [`ABI_VERSION`] from a dynamic bundle.
pub const ABI_SYMBOL: &[u8] = b"ofxrs_abi_version";

/// Symbol of the bundle constructor in a dynamic bundle.
pub const BUNDLE_SYMBOL: &[u8] = b"ofxrs_create_bundle";

/// Identity of one effect in a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginEntry {
    /// API implemented; always [`API_NAME`].
    pub api: String,
    /// API version implemented.
    pub api_version: u32,
    /// Reverse-domain identifier.
    pub identifier: String,
    /// Effect version.
    pub version: Version,
}

impl PluginEntry {
    /// An entry for the current API.
    pub fn new(identifier: &str, version: Version) -> Self {
        Self {
            api: API_NAME.to_string(),
            api_version: API_VERSION,
            identifier: identifier.to_string(),
            version,
        }
    }
}

/// The single entry point of one effect.
pub trait PluginMain: Send + Sync {
    /// Identity of the effect.
    fn entry(&self) -> &PluginEntry;

    /// Hand the effect its host. Must precede the first action.
    fn set_host(&self, host: Arc<dyn Host>);

    /// Run one action.
    fn main_entry(
        &self,
        action: &str,
        handle: Option<EffectHandle>,
        in_args: &PropertySet,
        out_args: &mut PropertySet,
    ) -> Status;
}

/// A collection of effects shipped together.
pub trait PluginBundle: Send + Sync {
    /// Number of effects.
    fn number_of_plugins(&self) -> usize;

    /// Effect `index`, or `None` past the end.
    fn get_plugin(&self, index: usize) -> Option<Arc<dyn PluginMain>>;
}

/// A bundle built in code.
#[derive(Default, Clone)]
pub struct StaticBundle {
    plugins: Vec<Arc<dyn PluginMain>>,
}

impl StaticBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an effect, wrapping its factory in a [`Dispatcher`].
    pub fn with_factory<F: PluginFactory>(mut self, factory: F) -> Self {
        self.register(factory);
        self
    }

    /// Add an effect in place.
    pub fn register<F: PluginFactory>(&mut self, factory: F) {
        self.plugins.push(Arc::new(Dispatcher::new(factory)));
    }

    /// Add an already wrapped effect.
    pub fn with_plugin(mut self, plugin: Arc<dyn PluginMain>) -> Self {
        self.plugins.push(plugin);
        self
    }
}

impl PluginBundle for StaticBundle {
    fn number_of_plugins(&self) -> usize {
        self.plugins.len()
    }

    fn get_plugin(&self, index: usize) -> Option<Arc<dyn PluginMain>> {
        self.plugins.get(index).cloned()
    }
}

/// Export a bundle from a `cdylib` so hosts can load it at run time.
///
/// ```ignore
/// ofxrs::declare_bundle!(ofxrs::plugin::StaticBundle::new().with_factory(MyEffect));
/// ```
#[macro_export]
macro_rules! declare_bundle {
    ($bundle:expr) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static ofxrs_abi_version: u32 = $crate::plugin::bundle::ABI_VERSION;

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn ofxrs_create_bundle() -> *mut dyn $crate::plugin::bundle::PluginBundle {
            let bundle: Box<dyn $crate::plugin::bundle::PluginBundle> = Box::new($bundle);
            Box::into_raw(bundle)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_reports_api() {
        let entry = PluginEntry::new("org.ofxrs.invert", Version::new(1, 2, 0));
        assert_eq!(entry.api, "OfxImageEffectPluginAPI");
        assert_eq!(entry.api_version, 1);
        assert_eq!(entry.version.major, 1);
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = StaticBundle::new();
        assert_eq!(bundle.number_of_plugins(), 0);
        assert!(bundle.get_plugin(0).is_none());
    }
}

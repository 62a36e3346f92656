//! The reference host.
//!
//! This module contains:
//! - TOML configuration of host capabilities and limits
//! - Handle tables and the image effect, parameter, multi-thread and
//!   message suites
//! - Upstream frame sources for input clips
//! - Lock-counted image memory
//! - Bundle bootstrap, from code or from shared libraries on disk
//! - [`EffectInstance`], which drives one instance through negotiation,
//!   parameter changes and rendering

pub mod clip;
pub mod config;
pub mod instance;
pub mod loader;
pub mod memory;
pub mod suites;

pub use clip::{FrameSource, SourceFrame, StillSource};
pub use config::{HostConfig, ProjectConfig};
pub use instance::EffectInstance;
pub use loader::{discover_bundles, LoadedBundle};
pub use memory::ImageMemoryPool;
pub use suites::{EffectRole, HostCore, LogMessages, RayonThreads};

use crate::core::error::{OfxError, OfxResult, PluginError};
use crate::core::handle::EffectHandle;
use crate::core::status::Status;
use crate::core::types::{Context, EncodedEnum};
use crate::negotiation::EffectCapabilities;
use crate::param::ParamSet;
use crate::plugin::actions::Action;
use crate::plugin::bundle::{PluginBundle, PluginEntry, PluginMain, API_NAME, API_VERSION};
use crate::property::{Prop, PropertySet};
use crate::suite::{Host, HostCapabilities, Suite, SuiteRegistry};
use indexmap::IndexMap;
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Host interface
// ============================================================================

/// What modules see of the host: its properties and its suites.
pub struct HostInterface {
    props: PropertySet,
    capabilities: HostCapabilities,
    suites: SuiteRegistry,
}

impl HostInterface {
    /// Capability flags, as modules read them.
    pub fn capabilities(&self) -> &HostCapabilities {
        &self.capabilities
    }

    /// Registered suites.
    pub fn suites(&self) -> &SuiteRegistry {
        &self.suites
    }
}

impl Host for HostInterface {
    fn properties(&self) -> &PropertySet {
        &self.props
    }

    fn fetch_suite(&self, name: &str, version: u32) -> Option<Suite> {
        self.suites.fetch(name, version)
    }
}

// ============================================================================
// Loaded plugins
// ============================================================================

/// Summary of a loaded effect.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    /// Identity reported by the bundle.
    pub entry: PluginEntry,
    /// User visible label.
    pub label: String,
    /// Description, if any.
    pub description: String,
    /// Menu grouping, if any.
    pub grouping: String,
    /// Declared capabilities.
    pub capabilities: EffectCapabilities,
}

/// An effect the host refused, and why.
#[derive(Debug, Clone, Serialize)]
pub struct ExcludedPlugin {
    /// Identity reported by the bundle.
    pub entry: PluginEntry,
    /// Why it was refused.
    pub reason: String,
}

/// A plugin that passed Load and Describe.
pub(crate) struct LoadedPlugin {
    pub(crate) main: Arc<dyn PluginMain>,
    pub(crate) info: PluginInfo,
    pub(crate) descriptor: EffectHandle,
    pub(crate) contexts: Mutex<IndexMap<Context, EffectHandle>>,
    pub(crate) render_lock: Mutex<()>,
    pub(crate) live: AtomicUsize,
    _library: Option<Arc<LoadedBundle>>,
}

impl LoadedPlugin {
    /// Run one action, returning its status and out-arguments.
    pub(crate) fn call(&self, action: Action, handle: Option<EffectHandle>, in_args: &PropertySet) -> (Status, PropertySet) {
        let mut out = PropertySet::new();
        let status = self.call_into(action, handle, in_args, &mut out);
        (status, out)
    }

    /// Run one action with out-arguments the host has pre-filled.
    pub(crate) fn call_into(
        &self,
        action: Action,
        handle: Option<EffectHandle>,
        in_args: &PropertySet,
        out: &mut PropertySet,
    ) -> Status {
        let status = self.main.main_entry(action.as_str(), handle, in_args, out);
        trace!("{} {} -> {}", self.identifier(), action, status);
        status
    }

    pub(crate) fn identifier(&self) -> &str {
        &self.info.entry.identifier
    }
}

/// Turn a non-success status into an error.
pub(crate) fn check(status: Status) -> OfxResult<Status> {
    match status {
        Status::Ok | Status::ReplyDefault => Ok(status),
        other => Err(OfxError::Status(other)),
    }
}

// ============================================================================
// Effect host
// ============================================================================

/// The reference host: owns the suites, the loaded plugins and any shared
/// libraries they came from.
pub struct EffectHost {
    core: Arc<HostCore>,
    interface: Arc<HostInterface>,
    plugins: IndexMap<String, Arc<LoadedPlugin>>,
    excluded: Vec<ExcludedPlugin>,
}

impl EffectHost {
    /// Create a host with no plugins.
    pub fn new(config: HostConfig) -> OfxResult<Self> {
        let props = config.host_properties()?;
        let capabilities = HostCapabilities::from_props(&props);
        let core = Arc::new(HostCore::new(config));

        let mut suites = SuiteRegistry::new()
            .with_suite(Suite::ImageEffect(core.clone()))
            .with_suite(Suite::Parameter(core.clone()))
            .with_suite(Suite::Message(Arc::new(LogMessages)));
        match RayonThreads::new(core.config().max_workers) {
            Ok(threads) => suites = suites.with_suite(Suite::MultiThread(Arc::new(threads))),
            Err(e) => warn!("No render thread pool ({}); effects will render single threaded", e),
        }
        info!("Host '{}' ready with {} suite(s)", capabilities.name, suites.len());

        Ok(Self {
            core,
            interface: Arc::new(HostInterface {
                props,
                capabilities,
                suites,
            }),
            plugins: IndexMap::new(),
            excluded: Vec::new(),
        })
    }

    /// Handle tables and suites.
    pub fn core(&self) -> &Arc<HostCore> {
        &self.core
    }

    /// What modules see of the host.
    pub fn interface(&self) -> &Arc<HostInterface> {
        &self.interface
    }

    /// Loaded effects, in load order.
    pub fn plugins(&self) -> impl Iterator<Item = &PluginInfo> {
        self.plugins.values().map(|p| &p.info)
    }

    /// Effects refused at load.
    pub fn excluded(&self) -> &[ExcludedPlugin] {
        &self.excluded
    }

    /// A loaded effect by identifier.
    pub fn plugin(&self, identifier: &str) -> OfxResult<&PluginInfo> {
        Ok(&self.loaded(identifier)?.info)
    }

    fn loaded(&self, identifier: &str) -> OfxResult<&Arc<LoadedPlugin>> {
        self.plugins.get(identifier).ok_or_else(|| {
            PluginError::PluginNotFound {
                name: identifier.to_string(),
            }
            .into()
        })
    }

    // ========================================================================
    // Bootstrap
    // ========================================================================

    /// Load and describe every effect in `bundle`. Returns how many were
    /// accepted.
    pub fn add_bundle(&mut self, bundle: &dyn PluginBundle) -> usize {
        self.add_bundle_from(bundle, None)
    }

    fn add_bundle_from(&mut self, bundle: &dyn PluginBundle, library: Option<Arc<LoadedBundle>>) -> usize {
        let count = bundle.number_of_plugins();
        debug!("Bundle offers {} effect(s)", count);
        (0..count)
            .filter_map(|index| bundle.get_plugin(index))
            .filter(|main| self.register(main.clone(), library.clone()))
            .count()
    }

    /// Scan `dir` for bundle libraries and add every effect they contain.
    /// Returns how many effects were accepted.
    ///
    /// # Safety
    ///
    /// Every library found is loaded and trusted; see
    /// [`loader::load_bundle`].
    pub unsafe fn load_directory(&mut self, dir: &Path) -> usize {
        let mut accepted = 0;
        for result in unsafe { discover_bundles(dir) } {
            match result {
                Ok(loaded) => {
                    let loaded = Arc::new(loaded);
                    accepted += self.add_bundle_from(loaded.bundle(), Some(loaded.clone()));
                }
                Err(e) => warn!("{}", e),
            }
        }
        accepted
    }

    fn exclude(&mut self, entry: &PluginEntry, reason: String) {
        warn!("Excluding {} v{}: {}", entry.identifier, entry.version, reason);
        self.excluded.push(ExcludedPlugin {
            entry: entry.clone(),
            reason,
        });
    }

    /// Load and describe one effect. Of several versions of the same
    /// identifier, only the highest is kept.
    pub fn add_plugin(&mut self, main: Arc<dyn PluginMain>) -> bool {
        self.register(main, None)
    }

    fn register(&mut self, main: Arc<dyn PluginMain>, library: Option<Arc<LoadedBundle>>) -> bool {
        let entry = main.entry().clone();
        if entry.api != API_NAME || entry.api_version != API_VERSION {
            self.exclude(&entry, format!("unsupported API {} v{}", entry.api, entry.api_version));
            return false;
        }
        if let Some(existing) = self.plugins.get(&entry.identifier) {
            if existing.info.entry.version >= entry.version {
                self.exclude(
                    &entry,
                    format!("superseded by v{}", existing.info.entry.version),
                );
                return false;
            }
        }

        main.set_host(self.interface.clone());
        let empty = PropertySet::new();
        let mut out = PropertySet::new();
        let status = main.main_entry(Action::Load.as_str(), None, &empty, &mut out);
        if check(status).is_err() {
            self.exclude(&entry, format!("Load returned {}", status));
            return false;
        }

        let mut props = PropertySet::new();
        if let Err(e) = props.set(&Prop::Name, 0, entry.identifier.as_str()) {
            self.exclude(&entry, e.to_string());
            return false;
        }
        let descriptor = self.core.insert_effect(EffectRole::Descriptor, props, ParamSet::new());
        let status = main.main_entry(Action::Describe.as_str(), Some(descriptor), &empty, &mut out);
        if check(status).is_err() {
            let _ = main.main_entry(Action::Unload.as_str(), None, &empty, &mut out);
            let _ = self.core.remove_effect(descriptor);
            let reason = match status {
                Status::ErrMissingHostFeature => "requires a capability this host lacks".to_string(),
                other => format!("Describe returned {}", other),
            };
            self.exclude(&entry, reason);
            return false;
        }

        let info = match self.core.effect(descriptor) {
            Ok(record) => {
                let props = record.props.read();
                let text = |prop: Prop| props.try_get_string(&prop, 0).unwrap_or_default().to_string();
                PluginInfo {
                    entry: entry.clone(),
                    label: text(Prop::Label),
                    description: text(Prop::PluginDescription),
                    grouping: text(Prop::Grouping),
                    capabilities: EffectCapabilities::from_props(&props),
                }
            }
            Err(e) => {
                self.exclude(&entry, e.to_string());
                return false;
            }
        };

        let plugin = Arc::new(LoadedPlugin {
            main,
            info,
            descriptor,
            contexts: Mutex::new(IndexMap::new()),
            render_lock: Mutex::new(()),
            live: AtomicUsize::new(0),
            _library: library,
        });
        if let Some(old) = self.plugins.insert(entry.identifier.clone(), plugin) {
            let old_entry = old.info.entry.clone();
            self.unload(&old);
            self.exclude(&old_entry, format!("superseded by v{}", entry.version));
        }
        info!("Accepted {} v{}", entry.identifier, entry.version);
        true
    }

    fn unload(&self, plugin: &LoadedPlugin) {
        let (status, _) = plugin.call(Action::Unload, None, &PropertySet::new());
        if check(status).is_err() {
            warn!("Unload of {} returned {}", plugin.identifier(), status);
        }
        let contexts: Vec<EffectHandle> = plugin.contexts.lock().values().copied().collect();
        for handle in contexts.into_iter().chain(std::iter::once(plugin.descriptor)) {
            let _ = self.core.remove_effect(handle);
        }
    }

    /// Describe an effect in `context`, once. Returns the context
    /// descriptor's handle.
    pub(crate) fn context_descriptor(&self, plugin: &LoadedPlugin, context: Context) -> OfxResult<EffectHandle> {
        if let Some(handle) = plugin.contexts.lock().get(&context) {
            return Ok(*handle);
        }
        let unsupported = || PluginError::UnsupportedContext {
            name: plugin.identifier().to_string(),
            context: context.to_string(),
        };
        if !self.interface.capabilities.supported_contexts.contains(&context)
            || !plugin.info.capabilities.supported_contexts.contains(&context)
        {
            return Err(unsupported().into());
        }

        let mut props = self.core.effect(plugin.descriptor)?.props.read().clone();
        props.set_enum(&Prop::Context, 0, context)?;
        let handle = self
            .core
            .insert_effect(EffectRole::ContextDescriptor(context), props, ParamSet::new());
        let mut in_args = PropertySet::new();
        in_args.set_enum(&Prop::Context, 0, context)?;
        let (status, _) = plugin.call(Action::DescribeInContext, Some(handle), &in_args);
        if let Err(e) = check(status) {
            let _ = self.core.remove_effect(handle);
            return Err(e);
        }
        debug!("Described {} in {}", plugin.identifier(), context);
        plugin.contexts.lock().insert(context, handle);
        Ok(handle)
    }

    /// Names of the clips and parameters an effect defines in `context`.
    pub fn describe_context(&self, identifier: &str, context: Context) -> OfxResult<(Vec<String>, Vec<String>)> {
        let plugin = self.loaded(identifier)?;
        let handle = self.context_descriptor(plugin, context)?;
        let record = self.core.effect(handle)?;
        let clips = record.clips.read().keys().cloned().collect();
        let params = record.params.read().iter().map(|p| p.descriptor().name.clone()).collect();
        Ok((clips, params))
    }

    // ========================================================================
    // Instances
    // ========================================================================

    /// Create an instance of `identifier` in `context`, connect `inputs` to
    /// its clips by name and negotiate clip preferences.
    pub fn create_instance(
        &self,
        identifier: &str,
        context: Context,
        inputs: IndexMap<String, Arc<dyn FrameSource>>,
    ) -> OfxResult<EffectInstance> {
        let plugin = self.loaded(identifier)?.clone();
        if plugin.info.capabilities.single_instance && plugin.live.load(Ordering::SeqCst) > 0 {
            return Err(PluginError::Refused {
                name: identifier.to_string(),
                status: Status::ErrExists,
            }
            .into());
        }
        let descriptor = self.context_descriptor(&plugin, context)?;
        let handle = self.instantiate(descriptor, context, inputs)?;

        let (status, _) = plugin.call(Action::CreateInstance, Some(handle), &PropertySet::new());
        if let Err(e) = check(status) {
            let _ = self.core.remove_effect(handle);
            return Err(e);
        }
        plugin.live.fetch_add(1, Ordering::SeqCst);

        let instance = EffectInstance::new(self.core.clone(), self.interface.clone(), plugin, handle, context);
        instance.negotiate()?;
        Ok(instance)
    }

    fn instantiate(
        &self,
        descriptor: EffectHandle,
        context: Context,
        mut inputs: IndexMap<String, Arc<dyn FrameSource>>,
    ) -> OfxResult<EffectHandle> {
        let record = self.core.effect(descriptor)?;
        let project = &self.core.config().project;

        let mut props = record.props.read().clone();
        props.remove(&Prop::InstanceData);
        props.set_enum(&Prop::Context, 0, context)?;
        props.set(&Prop::ProjectSize, 0, project.width)?;
        props.set(&Prop::ProjectSize, 1, project.height)?;
        props.set(&Prop::ProjectOffset, 0, project.offset_x)?;
        props.set(&Prop::ProjectOffset, 1, project.offset_y)?;
        props.set(&Prop::ProjectExtent, 0, project.offset_x + project.width)?;
        props.set(&Prop::ProjectExtent, 1, project.offset_y + project.height)?;
        props.set(&Prop::ProjectPixelAspectRatio, 0, project.pixel_aspect_ratio)?;
        props.set(&Prop::FrameRate, 0, project.frame_rate)?;
        props.set(&Prop::FrameRange, 0, project.first_frame)?;
        props.set(&Prop::FrameRange, 1, project.last_frame)?;
        props.set(&Prop::IsInteractive, 0, false)?;

        let params = ParamSet::from_descriptors(record.params.read().iter().map(|p| p.descriptor()))?;
        let handle = self.core.insert_effect(EffectRole::Instance, props, params);

        let clip_defs: Vec<(String, crate::core::handle::ClipHandle)> =
            record.clips.read().iter().map(|(n, h)| (n.clone(), *h)).collect();
        let result = (|| -> OfxResult<()> {
            for (name, clip_def) in clip_defs {
                let props = self.core.clip(clip_def)?.props.read().clone();
                let clip = self.core.insert_clip(handle, &name, props)?;
                if name == crate::plugin::OUTPUT_CLIP {
                    let record = self.core.clip(clip)?;
                    record.props.write().set(&Prop::Connected, 0, true)?;
                    continue;
                }
                let source = inputs.shift_remove(&name);
                if source.is_none() {
                    let optional = self.core.clip(clip)?.props.read().try_get_bool(&Prop::Optional, 0);
                    if optional != Some(true) {
                        warn!("Mandatory clip '{}' is not connected", name);
                    }
                }
                self.core.connect(clip, source)?;
            }
            if let Some(name) = inputs.keys().next() {
                return Err(crate::core::error::NegotiationError::UnknownClip(name.clone()).into());
            }
            Ok(())
        })();
        if let Err(e) = result {
            let _ = self.core.remove_effect(handle);
            return Err(e);
        }
        Ok(handle)
    }

    /// Unload every plugin. Called on drop.
    pub fn shutdown(&mut self) {
        for (_, plugin) in self.plugins.drain(..).collect::<Vec<_>>() {
            let live = plugin.live.load(Ordering::SeqCst);
            if live > 0 {
                warn!("Unloading {} with {} live instance(s)", plugin.identifier(), live);
            }
            self.unload(&plugin);
        }
    }
}

impl Drop for EffectHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests {
    use super::testing::{filter_inputs, host_with, solid_source, Fixture};
    use super::*;

    #[test]
    fn test_highest_version_wins() {
        let host = host_with(
            HostConfig::default(),
            vec![
                Fixture::new("org.test.a").with_version(1, 0),
                Fixture::new("org.test.a").with_version(2, 1),
                Fixture::new("org.test.a").with_version(1, 5),
            ],
        );
        let info = host.plugin("org.test.a").unwrap();
        assert_eq!(info.entry.version, semver::Version::new(2, 1, 0));
        assert_eq!(host.plugins().count(), 1);
        assert_eq!(host.excluded().len(), 2);
        assert!(host.excluded().iter().all(|e| e.reason.starts_with("superseded")));
    }

    #[test]
    fn test_missing_host_capability_excludes() {
        let config = HostConfig {
            temporal_clip_access: false,
            ..HostConfig::default()
        };
        let host = host_with(
            config,
            vec![Fixture::new("org.test.temporal").with_temporal_access(), Fixture::new("org.test.plain")],
        );
        assert!(host.plugin("org.test.temporal").is_err());
        assert!(host.plugin("org.test.plain").is_ok());
        let excluded = &host.excluded()[0];
        assert_eq!(excluded.entry.identifier, "org.test.temporal");
        assert_eq!(excluded.reason, "requires a capability this host lacks");
    }

    #[test]
    fn test_describe_context_lists_names() {
        let host = host_with(HostConfig::default(), vec![Fixture::new("org.test.a")]);
        let (clips, params) = host.describe_context("org.test.a", Context::Filter).unwrap();
        assert_eq!(clips, vec!["Output".to_string(), "Source".to_string()]);
        assert_eq!(params, vec!["amount", "mirror", "counter", "leak"]);

        let err = host.describe_context("org.test.a", Context::Transition).unwrap_err();
        assert!(matches!(err, OfxError::Plugin(PluginError::UnsupportedContext { .. })));
        let err = host.describe_context("org.test.missing", Context::Filter).unwrap_err();
        assert!(matches!(err, OfxError::Plugin(PluginError::PluginNotFound { .. })));
    }

    #[test]
    fn test_single_instance_refuses_a_second() {
        let host = host_with(HostConfig::default(), vec![Fixture::new("org.test.one").single_instance()]);
        let first = host
            .create_instance("org.test.one", Context::Filter, filter_inputs(solid_source([0.0; 4])))
            .unwrap();
        let err = host
            .create_instance("org.test.one", Context::Filter, filter_inputs(solid_source([0.0; 4])))
            .unwrap_err();
        assert_eq!(err.status(), Status::ErrExists);
        first.destroy().unwrap();
        assert!(host
            .create_instance("org.test.one", Context::Filter, filter_inputs(solid_source([0.0; 4])))
            .is_ok());
    }

    #[test]
    fn test_shutdown_unloads_everything() {
        let mut host = host_with(HostConfig::default(), vec![Fixture::new("org.test.a"), Fixture::new("org.test.b")]);
        assert_eq!(host.plugins().count(), 2);
        assert!(host.core().effect_count() >= 2);
        host.shutdown();
        assert_eq!(host.plugins().count(), 0);
        assert_eq!(host.core().effect_count(), 0);
    }
}

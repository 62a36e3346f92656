//! Action dispatch and the lifecycle state machine.
//!
//! [`Dispatcher`] wraps a [`PluginFactory`] and is the only thing a host
//! talks to. It routes action names to handlers, enforces the legal order
//! of actions, keeps per-instance private state on the instance's own
//! property set, and turns every error or panic into a [`Status`] before
//! returning.
//!
//! Plugin states run `Unloaded -> Loaded -> Described`, with any number of
//! contexts described after that. Instances run `Created -> Ready ->
//! Destroyed`; an instance becomes ready once its clip preferences have
//! been negotiated.

use crate::core::error::{LifecycleError, NegotiationError, OfxError, OfxResult, SuiteError};
use crate::core::handle::EffectHandle;
use crate::core::status::Status;
use crate::core::types::{Context, EncodedEnum};
use crate::negotiation::{check_descriptor, EffectCapabilities};
use crate::plugin::actions::Action;
use crate::plugin::args::{
    ClipPreferences, FramesNeeded, InstanceChangedArguments, IsIdentityArguments, RegionOfDefinitionArguments,
    RegionsOfInterest, RegionsOfInterestArguments, RenderArguments, SequenceArguments,
};
use crate::plugin::bundle::{PluginEntry, PluginMain};
use crate::plugin::descriptor::{ContextDescriptor, EffectDescriptor};
use crate::plugin::effect::{ImageEffect, InstanceContext, PluginFactory};
use crate::property::{OpaquePointer, Prop, PropertySet, Side};
use crate::suite::{Host, PluginContext};
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Deepest nesting of instance-changed notifications on one instance.
pub const MAX_CHANGE_NESTING: usize = 32;

/// What to do when the host breaks the action protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicy {
    /// Log the violation and return a fatal status.
    #[default]
    Report,
    /// Abort the process.
    Abort,
}

/// Plugin-wide lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    /// Not loaded, or unloaded again.
    Unloaded,
    /// Load succeeded.
    Loaded,
    /// Describe succeeded; contexts may now be described.
    Described,
}

/// Per-instance lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Created; clip preferences not yet negotiated.
    Created,
    /// Clip preferences negotiated; every action is legal.
    Ready,
    /// Destroyed.
    Destroyed,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Clip and parameter names defined for one context.
#[derive(Debug, Clone, Default)]
struct ContextNames {
    clips: Vec<String>,
    params: Vec<String>,
}

struct Lifecycle {
    state: PluginState,
    plugin: Option<Arc<PluginContext>>,
    supported_contexts: Vec<Context>,
    contexts: IndexMap<Context, ContextNames>,
    live_instances: usize,
}

#[derive(Debug, Default)]
struct Brackets {
    sequence: usize,
    changed: usize,
    edit: usize,
}

/// Private state attached to an instance's property set.
struct InstanceRecord {
    ctx: InstanceContext,
    effect: Box<dyn ImageEffect>,
    state: Mutex<InstanceState>,
    depth: AtomicUsize,
    changing: AtomicUsize,
    brackets: Mutex<Brackets>,
}

struct DepthGuard<'a>(&'a AtomicUsize);

impl<'a> DepthGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> (Self, usize) {
        let depth = counter.fetch_add(1, Ordering::SeqCst) + 1;
        (Self(counter), depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Routes actions to a [`PluginFactory`] and the instances it creates.
pub struct Dispatcher<F: PluginFactory> {
    factory: F,
    entry: PluginEntry,
    host: RwLock<Option<Arc<dyn Host>>>,
    lifecycle: Mutex<Lifecycle>,
    policy: ViolationPolicy,
}

impl<F: PluginFactory> Dispatcher<F> {
    /// Wrap a factory.
    pub fn new(factory: F) -> Self {
        let entry = PluginEntry::new(factory.identifier(), factory.version());
        Self {
            factory,
            entry,
            host: RwLock::new(None),
            lifecycle: Mutex::new(Lifecycle {
                state: PluginState::Unloaded,
                plugin: None,
                supported_contexts: Vec::new(),
                contexts: IndexMap::new(),
                live_instances: 0,
            }),
            policy: ViolationPolicy::default(),
        }
    }

    /// Set how protocol violations are handled.
    pub fn with_violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current plugin state.
    pub fn state(&self) -> PluginState {
        self.lifecycle.lock().state
    }

    /// Number of instances created and not yet destroyed.
    pub fn live_instances(&self) -> usize {
        self.lifecycle.lock().live_instances
    }

    /// Contexts described so far.
    pub fn described_contexts(&self) -> Vec<Context> {
        self.lifecycle.lock().contexts.keys().copied().collect()
    }

    // ========================================================================
    // Plugin actions
    // ========================================================================

    fn require_state(&self, action: Action, allowed: &[PluginState]) -> OfxResult<()> {
        let state = self.lifecycle.lock().state;
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(LifecycleError::IllegalPluginAction {
                action: action.to_string(),
                state: state.to_string(),
            }
            .into())
        }
    }

    fn plugin_context(&self, action: Action) -> OfxResult<Arc<PluginContext>> {
        self.lifecycle.lock().plugin.clone().ok_or_else(|| {
            LifecycleError::IllegalPluginAction {
                action: action.to_string(),
                state: PluginState::Unloaded.to_string(),
            }
            .into()
        })
    }

    fn load(&self) -> OfxResult<Status> {
        self.require_state(Action::Load, &[PluginState::Unloaded])?;
        let host = self.host.read().clone().ok_or(SuiteError::HostNotSet)?;
        let plugin = Arc::new(PluginContext::from_host(host.as_ref())?);
        self.factory.load(&plugin)?;
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.plugin = Some(plugin);
        lifecycle.state = PluginState::Loaded;
        info!("Loaded {} v{}", self.entry.identifier, self.entry.version);
        Ok(Status::Ok)
    }

    fn describe(&self, handle: EffectHandle) -> OfxResult<Status> {
        self.require_state(Action::Describe, &[PluginState::Loaded])?;
        let plugin = self.plugin_context(Action::Describe)?;
        let props = plugin.suites.image_effect.property_set(handle)?;
        let desc = EffectDescriptor::new(handle, props);
        self.factory.describe(&plugin, &desc)?;

        let capabilities = EffectCapabilities::from_props(&desc.props().read());
        check_descriptor(&plugin.capabilities, &capabilities)?;

        let mut lifecycle = self.lifecycle.lock();
        lifecycle.supported_contexts = capabilities.supported_contexts;
        lifecycle.state = PluginState::Described;
        debug!("Described {}", self.entry.identifier);
        Ok(Status::Ok)
    }

    fn describe_in_context(&self, handle: EffectHandle, in_args: &PropertySet) -> OfxResult<Status> {
        self.require_state(Action::DescribeInContext, &[PluginState::Described])?;
        let context: Context = in_args.get_enum(&Prop::Context, 0)?;
        {
            let lifecycle = self.lifecycle.lock();
            if !lifecycle.supported_contexts.contains(&context) {
                return Err(NegotiationError::NoCommonContext {
                    required: lifecycle.supported_contexts.iter().map(|c| c.as_str().to_string()).collect(),
                }
                .into());
            }
            if lifecycle.contexts.contains_key(&context) {
                return Err(LifecycleError::IllegalPluginAction {
                    action: format!("{} ({})", Action::DescribeInContext, context),
                    state: "already described".to_string(),
                }
                .into());
            }
        }

        let plugin = self.plugin_context(Action::DescribeInContext)?;
        let props = plugin.suites.image_effect.property_set(handle)?;
        let effect = EffectDescriptor::new(handle, props);
        let mut desc = ContextDescriptor::new(&effect, &plugin.suites, context);
        self.factory.describe_in_context(&plugin, &mut desc)?;
        let (clips, params) = desc.into_names();
        debug!(
            "Described {} in {} with {} clip(s) and {} parameter(s)",
            self.entry.identifier,
            context,
            clips.len(),
            params.len()
        );
        self.lifecycle.lock().contexts.insert(context, ContextNames { clips, params });
        Ok(Status::Ok)
    }

    fn unload(&self) -> OfxResult<Status> {
        self.require_state(Action::Unload, &[PluginState::Loaded, PluginState::Described])?;
        let live = self.live_instances();
        if live > 0 {
            return Err(LifecycleError::LiveInstances { live }.into());
        }
        self.factory.unload()?;
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.state = PluginState::Unloaded;
        lifecycle.plugin = None;
        lifecycle.supported_contexts.clear();
        lifecycle.contexts.clear();
        info!("Unloaded {}", self.entry.identifier);
        Ok(Status::Ok)
    }

    // ========================================================================
    // Instance creation
    // ========================================================================

    fn create_instance(&self, handle: EffectHandle) -> OfxResult<Status> {
        self.require_state(Action::CreateInstance, &[PluginState::Described])?;
        let plugin = self.plugin_context(Action::CreateInstance)?;
        let props = plugin.suites.image_effect.property_set(handle)?;
        already_live(&props.read())?;
        let context: Context = props.read().get_enum(&Prop::Context, 0)?;
        let names = self
            .lifecycle
            .lock()
            .contexts
            .get(&context)
            .cloned()
            .ok_or_else(|| LifecycleError::ContextNotDescribed {
                context: context.to_string(),
            })?;

        let ctx = InstanceContext::resolve(plugin, handle, context, &names.clips, &names.params)?;
        let effect = self.factory.create_instance(&ctx)?;
        let record = Arc::new(InstanceRecord {
            ctx,
            effect,
            state: Mutex::new(InstanceState::Created),
            depth: AtomicUsize::new(0),
            changing: AtomicUsize::new(0),
            brackets: Mutex::new(Brackets::default()),
        });
        {
            let mut props = props.write();
            already_live(&props)?;
            props.set_by(Side::Plugin, &Prop::InstanceData, 0, OpaquePointer::new(record))?;
        }
        self.lifecycle.lock().live_instances += 1;
        info!("Created {} instance {} in {}", self.entry.identifier, handle, context);
        Ok(Status::Ok)
    }

    fn record(&self, action: Action, handle: EffectHandle) -> OfxResult<Arc<InstanceRecord>> {
        let plugin = self.plugin_context(action)?;
        let props = plugin.suites.image_effect.property_set(handle)?;
        let pointer = props.read().get_pointer(&Prop::InstanceData, 0).ok();
        pointer
            .and_then(|p| p.downcast::<InstanceRecord>())
            .ok_or_else(|| {
                LifecycleError::NoInstance {
                    action: action.to_string(),
                }
                .into()
            })
    }

    fn destroy_instance(&self, handle: EffectHandle) -> OfxResult<Status> {
        let record = self.record(Action::DestroyInstance, handle)?;
        if record.depth.load(Ordering::SeqCst) > 0 {
            return Err(LifecycleError::IllegalInstanceAction {
                action: Action::DestroyInstance.to_string(),
                state: "inside another action".to_string(),
            }
            .into());
        }
        {
            let brackets = record.brackets.lock();
            if brackets.sequence > 0 {
                warn!("Instance {} destroyed inside a sequence render", handle);
            }
        }
        *record.state.lock() = InstanceState::Destroyed;
        let props = record.ctx.props()?;
        props
            .write()
            .set_by(Side::Plugin, &Prop::InstanceData, 0, OpaquePointer::null())?;
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.live_instances = lifecycle.live_instances.saturating_sub(1);
        info!("Destroyed {} instance {}", self.entry.identifier, handle);
        Ok(Status::Ok)
    }

    // ========================================================================
    // Instance actions
    // ========================================================================

    fn instance_action(
        &self,
        action: Action,
        handle: EffectHandle,
        in_args: &PropertySet,
        out_args: &mut PropertySet,
    ) -> OfxResult<Status> {
        let record = self.record(action, handle)?;
        let state = *record.state.lock();
        let legal = match state {
            InstanceState::Ready => true,
            InstanceState::Created => matches!(
                action,
                Action::GetClipPreferences
                    | Action::InstanceChanged
                    | Action::BeginInstanceChanged
                    | Action::EndInstanceChanged
                    | Action::BeginInstanceEdit
                    | Action::EndInstanceEdit
                    | Action::PurgeCaches
                    | Action::SyncPrivateData
            ),
            InstanceState::Destroyed => false,
        };
        if !legal {
            return Err(LifecycleError::IllegalInstanceAction {
                action: action.to_string(),
                state: state.to_string(),
            }
            .into());
        }

        let (_guard, _) = DepthGuard::enter(&record.depth);
        let ctx = &record.ctx;
        let effect = record.effect.as_ref();
        match action {
            Action::Render => {
                let args = RenderArguments::from_props(in_args)?;
                effect.render(ctx, &args)?;
                Ok(Status::Ok)
            }
            Action::IsIdentity => {
                let args = IsIdentityArguments::from_props(in_args)?;
                match effect.is_identity(ctx, &args)? {
                    Some(identity) => {
                        identity.write_props(out_args)?;
                        Ok(Status::Ok)
                    }
                    None => Ok(Status::ReplyDefault),
                }
            }
            Action::GetRegionOfDefinition => {
                let args = RegionOfDefinitionArguments::from_props(in_args)?;
                match effect.region_of_definition(ctx, &args)? {
                    Some(rod) => {
                        out_args.set_rect_d(&Prop::RegionOfDefinition, rod)?;
                        Ok(Status::Ok)
                    }
                    None => Ok(Status::ReplyDefault),
                }
            }
            Action::GetRegionsOfInterest => {
                let args = RegionsOfInterestArguments::from_props(in_args)?;
                let mut rois = RegionsOfInterest::new(out_args);
                effect.regions_of_interest(ctx, &args, &mut rois)?;
                Ok(if rois.is_empty() { Status::ReplyDefault } else { Status::Ok })
            }
            Action::GetFramesNeeded => {
                let time = in_args.get_double(&Prop::Time, 0)?;
                let mut frames = FramesNeeded::new(out_args);
                effect.frames_needed(ctx, time, &mut frames)?;
                Ok(if frames.is_empty() { Status::ReplyDefault } else { Status::Ok })
            }
            Action::GetTimeDomain => match effect.time_domain(ctx)? {
                Some((first, last)) => {
                    out_args.set(&Prop::FrameRange, 0, first)?;
                    out_args.set(&Prop::FrameRange, 1, last)?;
                    Ok(Status::Ok)
                }
                None => Ok(Status::ReplyDefault),
            },
            Action::GetClipPreferences => {
                let mut prefs = ClipPreferences::new(out_args);
                effect.clip_preferences(ctx, &mut prefs)?;
                let changed = !prefs.is_empty();
                let mut state = record.state.lock();
                if *state == InstanceState::Created {
                    debug!("Instance {} ready", handle);
                    *state = InstanceState::Ready;
                }
                Ok(if changed { Status::Ok } else { Status::ReplyDefault })
            }
            Action::BeginSequenceRender => {
                let args = SequenceArguments::from_props(in_args)?;
                record.brackets.lock().sequence += 1;
                effect.begin_sequence_render(ctx, &args)?;
                Ok(Status::Ok)
            }
            Action::EndSequenceRender => {
                let args = SequenceArguments::from_props(in_args)?;
                close_bracket(&record, action, |b| &mut b.sequence)?;
                effect.end_sequence_render(ctx, &args)?;
                Ok(Status::Ok)
            }
            Action::InstanceChanged => {
                let args = InstanceChangedArguments::from_props(in_args)?;
                let (_change, nesting) = DepthGuard::enter(&record.changing);
                if nesting > MAX_CHANGE_NESTING {
                    error!("Instance {} change notifications nested {} deep", handle, nesting);
                    return Ok(Status::Failed);
                }
                effect.changed(ctx, &args)?;
                Ok(Status::Ok)
            }
            Action::BeginInstanceChanged => {
                record.brackets.lock().changed += 1;
                Ok(Status::Ok)
            }
            Action::EndInstanceChanged => {
                close_bracket(&record, action, |b| &mut b.changed)?;
                Ok(Status::Ok)
            }
            Action::BeginInstanceEdit => {
                record.brackets.lock().edit += 1;
                Ok(Status::Ok)
            }
            Action::EndInstanceEdit => {
                close_bracket(&record, action, |b| &mut b.edit)?;
                Ok(Status::Ok)
            }
            Action::PurgeCaches => {
                effect.purge_caches(ctx)?;
                Ok(Status::Ok)
            }
            Action::SyncPrivateData => {
                effect.sync_private_data(ctx)?;
                Ok(Status::Ok)
            }
            _ => Ok(Status::ReplyDefault),
        }
    }

    fn dispatch(
        &self,
        action: Action,
        handle: Option<EffectHandle>,
        in_args: &PropertySet,
        out_args: &mut PropertySet,
    ) -> OfxResult<Status> {
        let require_handle = || {
            handle.ok_or_else(|| -> OfxError {
                LifecycleError::NoInstance {
                    action: action.to_string(),
                }
                .into()
            })
        };
        match action {
            Action::Load => self.load(),
            Action::Unload => self.unload(),
            Action::Describe => self.describe(require_handle()?),
            Action::DescribeInContext => self.describe_in_context(require_handle()?, in_args),
            Action::CreateInstance => self.create_instance(require_handle()?),
            Action::DestroyInstance => self.destroy_instance(require_handle()?),
            _ => self.instance_action(action, require_handle()?, in_args, out_args),
        }
    }

    fn report(&self, action: &str, err: &OfxError) -> Status {
        let status = err.status();
        if err.is_violation() {
            error!("{}: protocol violation: {}", self.entry.identifier, err);
            if self.policy == ViolationPolicy::Abort {
                std::process::abort();
            }
        } else if status != Status::ErrMissingHostFeature {
            warn!("{}: {} failed: {}", self.entry.identifier, action, err);
        } else {
            info!("{}: {} refused: {}", self.entry.identifier, action, err);
        }
        status
    }
}

/// Refuse to create over an instance that is still alive.
fn already_live(props: &PropertySet) -> OfxResult<()> {
    let existing = props
        .get_pointer(&Prop::InstanceData, 0)
        .ok()
        .and_then(|p| p.downcast::<InstanceRecord>());
    match existing {
        Some(record) => Err(LifecycleError::IllegalInstanceAction {
            action: Action::CreateInstance.to_string(),
            state: (*record.state.lock()).to_string(),
        }
        .into()),
        None => Ok(()),
    }
}

fn close_bracket(
    record: &InstanceRecord,
    end: Action,
    counter: impl FnOnce(&mut Brackets) -> &mut usize,
) -> OfxResult<()> {
    let mut brackets = record.brackets.lock();
    let count = counter(&mut brackets);
    if *count == 0 {
        let begin = match end {
            Action::EndSequenceRender => Action::BeginSequenceRender,
            Action::EndInstanceChanged => Action::BeginInstanceChanged,
            _ => Action::BeginInstanceEdit,
        };
        return Err(LifecycleError::Unbalanced {
            begin: begin.to_string(),
            end: end.to_string(),
        }
        .into());
    }
    *count -= 1;
    Ok(())
}

impl<F: PluginFactory> PluginMain for Dispatcher<F> {
    fn entry(&self) -> &PluginEntry {
        &self.entry
    }

    fn set_host(&self, host: Arc<dyn Host>) {
        *self.host.write() = Some(host);
    }

    fn main_entry(
        &self,
        action: &str,
        handle: Option<EffectHandle>,
        in_args: &PropertySet,
        out_args: &mut PropertySet,
    ) -> Status {
        let Some(parsed) = Action::parse(action) else {
            debug!("{}: unknown action '{}'", self.entry.identifier, action);
            return Status::ReplyDefault;
        };
        debug!("{}: {}", self.entry.identifier, parsed);
        match catch_unwind(AssertUnwindSafe(|| self.dispatch(parsed, handle, in_args, out_args))) {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => self.report(action, &err),
            Err(_) => {
                error!("{}: {} panicked", self.entry.identifier, action);
                Status::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BitDepth, Components};
    use crate::host::testing::{filter_inputs, solid_source};
    use crate::host::{EffectHost, HostConfig};
    use crate::plugin::args::RenderArguments;
    use crate::plugin::{OUTPUT_CLIP, SOURCE_CLIP};
    use semver::Version;

    const ID: &str = "org.ofxrs.test.panicky";

    struct Panicky;

    impl PluginFactory for Panicky {
        fn identifier(&self) -> &str {
            ID
        }

        fn version(&self) -> Version {
            Version::new(1, 0, 0)
        }

        fn describe(&self, _ctx: &PluginContext, desc: &EffectDescriptor) -> OfxResult<()> {
            desc.add_supported_context(Context::Filter)?;
            desc.add_supported_pixel_depth(BitDepth::Float)?;
            Ok(())
        }

        fn describe_in_context(&self, _ctx: &PluginContext, desc: &mut ContextDescriptor<'_>) -> OfxResult<()> {
            let output = desc.define_clip(OUTPUT_CLIP)?;
            output.add_supported_components(Components::Rgba)?;
            let source = desc.define_clip(SOURCE_CLIP)?;
            source.add_supported_components(Components::Rgba)?;
            Ok(())
        }

        fn create_instance(&self, _ctx: &InstanceContext) -> OfxResult<Box<dyn ImageEffect>> {
            Ok(Box::new(PanickyEffect))
        }
    }

    struct PanickyEffect;

    impl ImageEffect for PanickyEffect {
        fn render(&self, _ctx: &InstanceContext, _args: &RenderArguments) -> OfxResult<()> {
            panic!("render exploded");
        }
    }

    fn call(d: &Dispatcher<Panicky>, action: &str, handle: Option<EffectHandle>) -> Status {
        let mut out = PropertySet::new();
        d.main_entry(action, handle, &PropertySet::new(), &mut out)
    }

    #[test]
    fn test_describe_before_load_is_fatal() {
        let d = Dispatcher::new(Panicky);
        let status = call(&d, Action::Describe.as_str(), Some(EffectHandle::from_raw(0, 0)));
        assert_eq!(status, Status::ErrFatal);
        assert_eq!(d.state(), PluginState::Unloaded);
    }

    #[test]
    fn test_load_without_host_is_fatal() {
        let d = Dispatcher::new(Panicky);
        assert_eq!(call(&d, Action::Load.as_str(), None), Status::ErrFatal);
    }

    #[test]
    fn test_unknown_action_replies_default() {
        let d = Dispatcher::new(Panicky);
        assert_eq!(call(&d, "OfxActionNotARealAction", None), Status::ReplyDefault);
    }

    #[test]
    fn test_lifecycle_through_a_host() {
        let d = Arc::new(Dispatcher::new(Panicky));
        let mut host = EffectHost::new(HostConfig::default()).unwrap();
        assert!(host.add_plugin(d.clone()));
        assert_eq!(d.state(), PluginState::Described);

        let instance = host
            .create_instance(ID, Context::Filter, filter_inputs(solid_source([0.0; 4])))
            .unwrap();
        assert_eq!(d.live_instances(), 1);
        assert_eq!(d.described_contexts(), vec![Context::Filter]);

        assert_eq!(call(&d, Action::Render.as_str(), None), Status::ErrFatal);
        assert_eq!(call(&d, Action::Unload.as_str(), None), Status::ErrFatal);
        assert_eq!(d.state(), PluginState::Described);

        instance.destroy().unwrap();
        assert_eq!(d.live_instances(), 0);
        host.shutdown();
        assert_eq!(d.state(), PluginState::Unloaded);
    }

    #[test]
    fn test_create_over_a_live_instance_is_fatal() {
        let d = Arc::new(Dispatcher::new(Panicky));
        let mut host = EffectHost::new(HostConfig::default()).unwrap();
        host.add_plugin(d.clone());
        let instance = host
            .create_instance(ID, Context::Filter, filter_inputs(solid_source([0.0; 4])))
            .unwrap();

        let status = call(&d, Action::CreateInstance.as_str(), Some(instance.handle()));
        assert_eq!(status, Status::ErrFatal);
        assert_eq!(d.live_instances(), 1);

        // The original instance is untouched and still tears down cleanly.
        instance.destroy().unwrap();
        assert_eq!(d.live_instances(), 0);
        host.shutdown();
        assert_eq!(d.state(), PluginState::Unloaded);
    }

    #[test]
    fn test_panicking_render_fails() {
        let d = Arc::new(Dispatcher::new(Panicky));
        let mut host = EffectHost::new(HostConfig::default()).unwrap();
        host.add_plugin(d.clone());
        let instance = host
            .create_instance(ID, Context::Filter, filter_inputs(solid_source([0.0; 4])))
            .unwrap();

        let Err(err) = instance.render(0.0, None) else {
            panic!("render should fail");
        };
        assert_eq!(err.status(), Status::Failed);
        instance.destroy().unwrap();
    }

    #[test]
    fn test_unbalanced_edit_bracket() {
        let d = Arc::new(Dispatcher::new(Panicky));
        let mut host = EffectHost::new(HostConfig::default()).unwrap();
        host.add_plugin(d.clone());
        let instance = host
            .create_instance(ID, Context::Filter, filter_inputs(solid_source([0.0; 4])))
            .unwrap();

        let err = instance.end_edit().unwrap_err();
        assert_eq!(err.status(), Status::ErrFatal);
        instance.begin_edit().unwrap();
        instance.end_edit().unwrap();
    }
}

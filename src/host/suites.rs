//! Suite implementations of the reference host.
//!
//! [`HostCore`] owns every descriptor, instance and clip the host has
//! handed out, behind generational handle tables, and implements the image
//! effect and parameter suites over them. Table locks are held only long
//! enough to clone a record's `Arc`; no module code ever runs under them.

use crate::core::error::{HandleError, LifecycleError, OfxResult, RenderError};
use crate::core::geometry::{PixelMapping, PointD, RectD, RectI};
use crate::core::handle::{ClipHandle, ClipKind, EffectHandle, EffectKind, HandleTable, MemoryHandle};
use crate::core::status::Status;
use crate::core::types::{BitDepth, Components, Context, Field, MessageKind, PreMultiplication};
use crate::host::clip::FrameSource;
use crate::host::config::HostConfig;
use crate::host::memory::ImageMemoryPool;
use crate::param::{ParamDescriptor, ParamSet, ParamValue};
use crate::property::{Prop, PropertySet, SharedProps};
use crate::render::image::{Image, ImageLayout, PixelStorage};
use crate::suite::{ImageEffectSuite, MessageSuite, MultiThreadSuite, ParamRef, ParameterSuite};
use indexmap::IndexMap;
use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Records
// ============================================================================

/// What an effect handle stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectRole {
    /// The effect-level descriptor filled in by Describe.
    Descriptor,
    /// The descriptor of one context.
    ContextDescriptor(Context),
    /// A live instance.
    Instance,
}

/// Host-side state of one descriptor or instance.
pub struct EffectRecord {
    /// What the handle stands for.
    pub role: EffectRole,
    /// Property set shared with the module.
    pub props: SharedProps,
    /// Parameters; definitions only for descriptors.
    pub params: RwLock<ParamSet>,
    /// Clips by name, in definition order.
    pub clips: RwLock<IndexMap<String, ClipHandle>>,
    abort: AtomicBool,
    outstanding: AtomicUsize,
    edits: Mutex<Vec<String>>,
}

impl EffectRecord {
    fn new(role: EffectRole, props: PropertySet, params: ParamSet) -> Self {
        Self {
            role,
            props: props.into_shared(),
            params: RwLock::new(params),
            clips: RwLock::new(IndexMap::new()),
            abort: AtomicBool::new(false),
            outstanding: AtomicUsize::new(0),
            edits: Mutex::new(Vec::new()),
        }
    }

    /// Images fetched and not yet released.
    pub fn outstanding_images(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Ask the module to stop the current action.
    pub fn set_abort(&self, abort: bool) {
        self.abort.store(abort, Ordering::SeqCst);
    }

    /// Whether an abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Take the names of parameters the module changed since the last call.
    pub fn take_edits(&self) -> Vec<String> {
        std::mem::take(&mut *self.edits.lock())
    }

    fn record_edit(&self, name: &str) {
        let mut edits = self.edits.lock();
        if !edits.iter().any(|n| n == name) {
            edits.push(name.to_string());
        }
    }
}

static NEXT_TARGET: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static RENDER_TARGET: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Binds output fetches made on the current thread to one render target
/// until dropped. Scopes nest.
pub struct TargetScope {
    previous: Option<u64>,
}

impl TargetScope {
    /// Route this thread's output fetches to the target `id`.
    pub fn enter(id: u64) -> Self {
        let previous = RENDER_TARGET.with(|current| current.replace(Some(id)));
        Self { previous }
    }
}

impl Drop for TargetScope {
    fn drop(&mut self) {
        RENDER_TARGET.with(|current| current.set(self.previous));
    }
}

/// A buffer an output clip renders into.
#[derive(Debug)]
pub struct OutputTarget {
    /// Identifies the target among concurrent renders.
    pub id: u64,
    /// Frame being rendered.
    pub time: f64,
    /// Geometry of `data`.
    pub layout: ImageLayout,
    /// Pixel data; `None` while the module holds the image.
    pub data: Option<Vec<u8>>,
}

impl OutputTarget {
    /// A zeroed target for `bounds`.
    pub fn new(time: f64, bounds: RectI, depth: BitDepth, components: Components) -> Result<Self, RenderError> {
        let layout = ImageLayout::packed(bounds, depth, components);
        let len = layout.required_len()?;
        Ok(Self {
            id: NEXT_TARGET.fetch_add(1, Ordering::Relaxed),
            time,
            layout,
            data: Some(vec![0; len]),
        })
    }
}

/// Host-side state of one clip.
pub struct ClipRecord {
    /// Clip name.
    pub name: String,
    /// Owning descriptor or instance.
    pub effect: EffectHandle,
    /// Property set shared with the module.
    pub props: SharedProps,
    /// Upstream frames of a connected input.
    pub source: RwLock<Option<Arc<dyn FrameSource>>>,
    targets: Mutex<Vec<OutputTarget>>,
}

impl ClipRecord {
    /// Offer a render target to the module. Returns its id.
    pub fn push_target(&self, target: OutputTarget) -> u64 {
        let id = target.id;
        self.targets.lock().push(target);
        id
    }

    /// Withdraw a render target.
    pub fn take_target(&self, id: u64) -> Option<OutputTarget> {
        let mut targets = self.targets.lock();
        let index = targets.iter().position(|t| t.id == id)?;
        Some(targets.swap_remove(index))
    }

    fn has_targets(&self) -> bool {
        !self.targets.lock().is_empty()
    }

    fn format(&self) -> (Option<BitDepth>, Option<Components>, Option<f64>, Option<PreMultiplication>) {
        let props = self.props.read();
        (
            props.try_get_enum(&Prop::PixelDepth, 0),
            props.try_get_enum(&Prop::Components, 0),
            props.try_get_double(&Prop::PixelAspectRatio, 0),
            props.try_get_enum(&Prop::PreMultiplication, 0),
        )
    }
}

// ============================================================================
// Host core
// ============================================================================

/// Handle tables, the memory pool and the suites built on them.
pub struct HostCore {
    config: HostConfig,
    effects: RwLock<HandleTable<EffectKind, Arc<EffectRecord>>>,
    clips: RwLock<HandleTable<ClipKind, Arc<ClipRecord>>>,
    memory: ImageMemoryPool,
}

impl HostCore {
    /// Create an empty core.
    pub fn new(config: HostConfig) -> Self {
        let memory = ImageMemoryPool::new(config.memory_limit);
        Self {
            config,
            effects: RwLock::new(HandleTable::new()),
            clips: RwLock::new(HandleTable::new()),
            memory,
        }
    }

    /// Host configuration.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Temporary image memory.
    pub fn memory(&self) -> &ImageMemoryPool {
        &self.memory
    }

    /// Register a descriptor or instance.
    pub fn insert_effect(&self, role: EffectRole, props: PropertySet, params: ParamSet) -> EffectHandle {
        let handle = self.effects.write().insert(Arc::new(EffectRecord::new(role, props, params)));
        trace!("New {:?} {}", role, handle);
        handle
    }

    /// A descriptor or instance record.
    pub fn effect(&self, handle: EffectHandle) -> OfxResult<Arc<EffectRecord>> {
        Ok(self.effects.read().get(handle)?.clone())
    }

    /// Forget a descriptor or instance and its clips. Later use of either
    /// handle fails as stale.
    pub fn remove_effect(&self, handle: EffectHandle) -> OfxResult<()> {
        let record = self.effects.write().remove(handle)?;
        let mut clips = self.clips.write();
        for clip in record.clips.read().values() {
            let _ = clips.remove(*clip);
        }
        trace!("Removed {:?} {}", record.role, handle);
        Ok(())
    }

    /// Add a clip to an effect directly, replacing any clip of that name.
    pub fn insert_clip(&self, effect: EffectHandle, name: &str, props: PropertySet) -> OfxResult<ClipHandle> {
        let record = self.effect(effect)?;
        let clip = Arc::new(ClipRecord {
            name: name.to_string(),
            effect,
            props: props.into_shared(),
            source: RwLock::new(None),
            targets: Mutex::new(Vec::new()),
        });
        let handle = self.clips.write().insert(clip);
        if let Some(old) = record.clips.write().insert(name.to_string(), handle) {
            let _ = self.clips.write().remove(old);
        }
        Ok(handle)
    }

    /// A clip record.
    pub fn clip(&self, handle: ClipHandle) -> OfxResult<Arc<ClipRecord>> {
        Ok(self.clips.read().get(handle)?.clone())
    }

    /// A clip record by owner and name.
    pub fn clip_by_name(&self, effect: EffectHandle, name: &str) -> OfxResult<Arc<ClipRecord>> {
        let handle = self.clip_get_handle(effect, name)?;
        self.clip(handle)
    }

    /// Connect an input to a frame source, or disconnect it with `None`.
    pub fn connect(&self, clip: ClipHandle, source: Option<Arc<dyn FrameSource>>) -> OfxResult<()> {
        let record = self.clip(clip)?;
        let connected = source.is_some();
        {
            let mut props = record.props.write();
            props.set(&Prop::Connected, 0, connected)?;
            if let Some(source) = &source {
                let format = source.format();
                props.set_enum(&Prop::UnmappedPixelDepth, 0, format.depth)?;
                props.set_enum(&Prop::UnmappedComponents, 0, format.components)?;
                props.set(&Prop::PixelAspectRatio, 0, format.pixel_aspect_ratio)?;
                props.set_enum(&Prop::PreMultiplication, 0, source.premultiplication())?;
                let (first, last) = source.frame_range();
                props.set(&Prop::UnmappedFrameRange, 0, first)?;
                props.set(&Prop::UnmappedFrameRange, 1, last)?;
                props.set(&Prop::FrameRange, 0, first)?;
                props.set(&Prop::FrameRange, 1, last)?;
            }
        }
        *record.source.write() = source;
        Ok(())
    }

    /// Number of live descriptors and instances.
    pub fn effect_count(&self) -> usize {
        self.effects.read().len()
    }

    fn fetch_output(&self, record: &Arc<ClipRecord>, owner: Arc<EffectRecord>, time: f64) -> OfxResult<Image> {
        let failed = || RenderError::FetchFailed {
            clip: record.name.clone(),
            time,
        };
        // Outside a render scope (e.g. a worker thread) any free target at `time` will do.
        let scoped = RENDER_TARGET.with(Cell::get);
        let (id, layout, data) = {
            let mut targets = record.targets.lock();
            let target = targets
                .iter_mut()
                .find(|t| t.time == time && t.data.is_some() && scoped.map_or(true, |id| t.id == id))
                .ok_or_else(failed)?;
            (target.id, target.layout, target.data.take().ok_or_else(failed)?)
        };
        let (_, _, par, premult) = record.format();
        let props = image_props(&layout, layout.bounds, par, premult)?;

        owner.outstanding.fetch_add(1, Ordering::SeqCst);
        let clip = record.clone();
        let image = Image::new(layout, props, PixelStorage::Exclusive(data))?.with_release(Box::new(
            move |_, storage| {
                if let PixelStorage::Exclusive(data) = storage {
                    if let Some(target) = clip.targets.lock().iter_mut().find(|t| t.id == id) {
                        target.data = Some(data);
                    }
                }
                owner.outstanding.fetch_sub(1, Ordering::SeqCst);
            },
        ));
        Ok(image)
    }

    fn fetch_source(
        &self,
        record: &ClipRecord,
        source: Arc<dyn FrameSource>,
        owner: Arc<EffectRecord>,
        time: f64,
        region: Option<RectD>,
    ) -> OfxResult<Image> {
        let (depth, components, par, premult) = record.format();
        let frame = source.frame(time)?;
        let native = frame.format();
        let frame = frame.converted(depth.unwrap_or(native.depth), components.unwrap_or(native.components))?;

        let full = frame.layout;
        let mut layout = full;
        if let Some(region) = region {
            let par = par.unwrap_or(frame.pixel_aspect_ratio);
            let pixels = PixelMapping::new(PointD::unit(), par, Field::None).to_pixels(&region);
            if let Some(cropped) = layout.crop(&pixels) {
                layout = cropped;
            }
        }
        let props = image_props(
            &layout,
            full.bounds,
            Some(par.unwrap_or(frame.pixel_aspect_ratio)),
            Some(premult.unwrap_or(frame.premultiplication)),
        )?;

        owner.outstanding.fetch_add(1, Ordering::SeqCst);
        let image = Image::new(layout, props, PixelStorage::Shared(frame.data))?.with_release(Box::new(move |_, _| {
            owner.outstanding.fetch_sub(1, Ordering::SeqCst);
        }));
        Ok(image)
    }
}

fn image_props(
    layout: &ImageLayout,
    rod: RectI,
    par: Option<f64>,
    premult: Option<PreMultiplication>,
) -> OfxResult<PropertySet> {
    let mut props = PropertySet::new();
    layout.write_props(&mut props)?;
    props.set_rect_i(&Prop::ImageRegionOfDefinition, rod)?;
    props.set(&Prop::PixelAspectRatio, 0, par.unwrap_or(1.0))?;
    props.set_enum(&Prop::PreMultiplication, 0, premult.unwrap_or(PreMultiplication::PreMultiplied))?;
    props.set_enum(&Prop::ImageField, 0, Field::None)?;
    props.set(&Prop::UniqueIdentifier, 0, uuid::Uuid::new_v4().to_string())?;
    Ok(props)
}

fn not_a_descriptor(handle: EffectHandle, call: &str) -> LifecycleError {
    LifecycleError::IllegalInstanceAction {
        action: call.to_string(),
        state: format!("instance {}", handle),
    }
}

impl ImageEffectSuite for HostCore {
    fn property_set(&self, effect: EffectHandle) -> OfxResult<SharedProps> {
        Ok(self.effect(effect)?.props.clone())
    }

    fn clip_define(&self, effect: EffectHandle, name: &str) -> OfxResult<SharedProps> {
        let record = self.effect(effect)?;
        if record.role == EffectRole::Instance {
            return Err(not_a_descriptor(effect, "clipDefine").into());
        }
        let existing = record.clips.read().get(name).copied();
        if let Some(handle) = existing {
            debug!("Clip '{}' redefined on {}", name, effect);
            return Ok(self.clip(handle)?.props.clone());
        }
        let mut props = PropertySet::new();
        props.set(&Prop::Name, 0, name)?;
        let handle = self.insert_clip(effect, name, props)?;
        Ok(self.clip(handle)?.props.clone())
    }

    fn clip_get_handle(&self, effect: EffectHandle, name: &str) -> OfxResult<ClipHandle> {
        let record = self.effect(effect)?;
        let clips = record.clips.read();
        clips.get(name).copied().ok_or_else(|| {
            HandleError::UnknownName {
                kind: "clip",
                name: name.to_string(),
            }
            .into()
        })
    }

    fn clip_get_property_set(&self, clip: ClipHandle) -> OfxResult<SharedProps> {
        Ok(self.clip(clip)?.props.clone())
    }

    fn clip_get_image(&self, clip: ClipHandle, time: f64, region: Option<RectD>) -> OfxResult<Image> {
        let record = self.clip(clip)?;
        let owner = self.effect(record.effect)?;
        let source = record.source.read().clone();
        if let Some(source) = source {
            return self.fetch_source(&record, source, owner, time, region);
        }
        if record.has_targets() {
            return self.fetch_output(&record, owner, time);
        }
        debug!("Fetch from unconnected clip '{}'", record.name);
        Err(RenderError::FetchFailed {
            clip: record.name.clone(),
            time,
        }
        .into())
    }

    fn clip_get_region_of_definition(&self, clip: ClipHandle, time: f64) -> OfxResult<RectD> {
        let record = self.clip(clip)?;
        if let Some(source) = record.source.read().as_ref() {
            return Ok(source.region_of_definition(time));
        }
        let props = record.props.read();
        if let Some(rod) = props.try_get_rect_d(&Prop::RegionOfDefinition) {
            return Ok(rod);
        }
        if props.try_get_bool(&Prop::Connected, 0) == Some(false) {
            return Ok(RectD::new(0.0, 0.0, 0.0, 0.0));
        }
        Ok(self.config.project.extent())
    }

    fn abort(&self, effect: EffectHandle) -> bool {
        self.effect(effect).map(|r| r.is_aborted()).unwrap_or(false)
    }

    fn image_memory_alloc(&self, effect: Option<EffectHandle>, bytes: usize) -> OfxResult<MemoryHandle> {
        self.memory.alloc(effect, bytes)
    }

    fn image_memory_free(&self, memory: MemoryHandle) -> OfxResult<()> {
        self.memory.free(memory)
    }

    fn image_memory_lock(&self, memory: MemoryHandle) -> OfxResult<()> {
        self.memory.lock(memory)?;
        Ok(())
    }

    fn image_memory_unlock(&self, memory: MemoryHandle) -> OfxResult<()> {
        self.memory.unlock(memory)?;
        Ok(())
    }

    fn image_memory_access(&self, memory: MemoryHandle, access: &mut dyn FnMut(&mut [u8])) -> OfxResult<()> {
        self.memory.access(memory, access)
    }
}

impl ParameterSuite for HostCore {
    fn param_define(&self, effect: EffectHandle, descriptor: ParamDescriptor) -> OfxResult<()> {
        let record = self.effect(effect)?;
        if record.role == EffectRole::Instance {
            return Err(not_a_descriptor(effect, "paramDefine").into());
        }
        record.params.write().define(descriptor)?;
        Ok(())
    }

    fn param_get_handle(&self, effect: EffectHandle, name: &str) -> OfxResult<ParamRef> {
        let param = self.effect(effect)?.params.read().handle(name)?;
        Ok(ParamRef { effect, param })
    }

    fn param_get_value(&self, param: ParamRef) -> OfxResult<ParamValue> {
        let record = self.effect(param.effect)?;
        let params = record.params.read();
        Ok(params.get(param.param)?.value().clone())
    }

    fn param_get_value_at_time(&self, param: ParamRef, time: f64) -> OfxResult<ParamValue> {
        Ok(self.effect(param.effect)?.params.read().value_at_time(param.param, time)?)
    }

    fn param_set_value(&self, param: ParamRef, value: ParamValue) -> OfxResult<()> {
        let record = self.effect(param.effect)?;
        let name = {
            let mut params = record.params.write();
            params.set_value(param.param, value)?;
            params.get(param.param)?.descriptor().name.clone()
        };
        record.record_edit(&name);
        Ok(())
    }

    fn param_set_value_at_time(&self, param: ParamRef, time: f64, value: ParamValue) -> OfxResult<()> {
        let record = self.effect(param.effect)?;
        let name = {
            let mut params = record.params.write();
            params.set_value_at_time(param.param, time, value)?;
            params.get(param.param)?.descriptor().name.clone()
        };
        record.record_edit(&name);
        Ok(())
    }

    fn param_set_enabled(&self, param: ParamRef, enabled: bool) -> OfxResult<()> {
        Ok(self.effect(param.effect)?.params.write().set_enabled(param.param, enabled)?)
    }
}

// ============================================================================
// Threads and messages
// ============================================================================

/// Fork-join execution on a dedicated rayon pool.
pub struct RayonThreads {
    pool: rayon::ThreadPool,
}

impl RayonThreads {
    /// A pool of `max_workers` threads, or one per CPU when 0.
    pub fn new(max_workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|index| format!("ofxrs-render-{}", index))
            .build()?;
        debug!("Render pool has {} thread(s)", pool.current_num_threads());
        Ok(Self { pool })
    }
}

impl MultiThreadSuite for RayonThreads {
    fn num_cpus(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn multi_thread(&self, count: usize, job: &(dyn Fn(usize, usize) + Sync)) -> OfxResult<()> {
        let panicked = AtomicBool::new(false);
        let panicked_ref = &panicked;
        self.pool.scope(|scope| {
            for index in 0..count {
                scope.spawn(move |_| {
                    if catch_unwind(AssertUnwindSafe(|| job(index, count))).is_err() {
                        panicked_ref.store(true, Ordering::SeqCst);
                    }
                });
            }
        });
        if panicked.load(Ordering::SeqCst) {
            error!("A render job panicked");
            return Err(RenderError::WorkerPanicked.into());
        }
        Ok(())
    }

    fn thread_index(&self) -> Option<usize> {
        self.pool.current_thread_index()
    }
}

/// Messages routed to the log. Questions are answered with the default.
#[derive(Debug, Default)]
pub struct LogMessages;

impl MessageSuite for LogMessages {
    fn message(&self, effect: Option<EffectHandle>, kind: MessageKind, id: &str, text: &str) -> Status {
        let origin = effect.map(|h| h.to_string()).unwrap_or_else(|| "-".to_string());
        match kind {
            MessageKind::Error => error!("[{} {}] {}", origin, id, text),
            MessageKind::Warning => warn!("[{} {}] {}", origin, id, text),
            MessageKind::Log => debug!("[{} {}] {}", origin, id, text),
            MessageKind::Message => info!("[{} {}] {}", origin, id, text),
            MessageKind::Question => {
                info!("[{} {}] {} (answering with the default)", origin, id, text);
                return Status::ReplyDefault;
            }
        }
        Status::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::clip::{SourceFrame, StillSource};

    fn core() -> HostCore {
        HostCore::new(HostConfig::default())
    }

    fn instance_with_clip(core: &HostCore, name: &str) -> (EffectHandle, ClipHandle) {
        let effect = core.insert_effect(EffectRole::Instance, PropertySet::new(), ParamSet::new());
        let clip = core.insert_clip(effect, name, PropertySet::new()).unwrap();
        (effect, clip)
    }

    #[test]
    fn test_clip_define_only_on_descriptors() {
        let core = core();
        let desc = core.insert_effect(EffectRole::Descriptor, PropertySet::new(), ParamSet::new());
        let props = core.clip_define(desc, "Source").unwrap();
        assert_eq!(props.read().get_string(&Prop::Name, 0).unwrap(), "Source");
        let again = core.clip_define(desc, "Source").unwrap();
        assert!(Arc::ptr_eq(&props, &again));

        let (instance, _) = instance_with_clip(&core, "Output");
        let err = core.clip_define(instance, "Extra").unwrap_err();
        assert!(err.is_violation());
    }

    #[test]
    fn test_unknown_clip_and_stale_effect() {
        let core = core();
        let (effect, clip) = instance_with_clip(&core, "Output");
        let err = core.clip_get_handle(effect, "Nope").unwrap_err();
        assert_eq!(err.status(), Status::ErrUnknown);

        core.remove_effect(effect).unwrap();
        assert_eq!(core.property_set(effect).unwrap_err().status(), Status::ErrBadHandle);
        assert_eq!(core.clip_get_property_set(clip).unwrap_err().status(), Status::ErrBadHandle);
    }

    #[test]
    fn test_params_record_module_edits() {
        let core = core();
        let desc = core.insert_effect(EffectRole::Descriptor, PropertySet::new(), ParamSet::new());
        core.param_define(desc, ParamDescriptor::double("gain", 1.0)).unwrap();
        let err = core.param_define(desc, ParamDescriptor::double("gain", 2.0)).unwrap_err();
        assert_eq!(err.status(), Status::ErrExists);

        let params = ParamSet::from_descriptors(
            core.effect(desc).unwrap().params.read().iter().map(|p| p.descriptor()),
        )
        .unwrap();
        let instance = core.insert_effect(EffectRole::Instance, PropertySet::new(), params);
        let gain = core.param_get_handle(instance, "gain").unwrap();
        assert_eq!(core.param_get_value(gain).unwrap(), ParamValue::Double(1.0));

        core.param_set_value(gain, ParamValue::Double(3.0)).unwrap();
        core.param_set_value(gain, ParamValue::Double(4.0)).unwrap();
        assert_eq!(core.param_get_value_at_time(gain, 7.0).unwrap(), ParamValue::Double(4.0));
        let record = core.effect(instance).unwrap();
        assert_eq!(record.take_edits(), vec!["gain".to_string()]);
        assert!(record.take_edits().is_empty());
    }

    #[test]
    fn test_source_fetch_converts_and_counts() {
        let core = core();
        let (effect, clip) = instance_with_clip(&core, "Source");
        let frame = SourceFrame::solid(RectI::new(0, 0, 4, 4), BitDepth::Byte, Components::Rgba, [1.0, 0.0, 0.0, 1.0])
            .unwrap();
        core.connect(clip, Some(Arc::new(StillSource::new(frame)))).unwrap();
        {
            let record = core.clip(clip).unwrap();
            let mut props = record.props.write();
            props.set_enum(&Prop::PixelDepth, 0, BitDepth::Float).unwrap();
            props.set_enum(&Prop::Components, 0, Components::Rgba).unwrap();
        }

        let image = core.clip_get_image(clip, 0.0, Some(RectD::new(1.0, 1.0, 3.0, 3.0))).unwrap();
        assert_eq!(image.depth(), BitDepth::Float);
        assert_eq!(image.bounds(), RectI::new(1, 1, 3, 3));
        assert!(image.props().get_string(&Prop::UniqueIdentifier, 0).is_ok());
        let mut px = [0.0f32; 4];
        assert!(image.view().read_pixel(2, 2, &mut px));
        assert_eq!(px, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(core.effect(effect).unwrap().outstanding_images(), 1);
        drop(image);
        assert_eq!(core.effect(effect).unwrap().outstanding_images(), 0);
    }

    #[test]
    fn test_output_target_returned_on_release() {
        let core = core();
        let (_, clip) = instance_with_clip(&core, "Output");
        let record = core.clip(clip).unwrap();
        let id = record.push_target(OutputTarget::new(5.0, RectI::new(0, 0, 2, 2), BitDepth::Byte, Components::Rgba).unwrap());

        assert!(core.clip_get_image(clip, 4.0, None).is_err());
        let mut image = core.clip_get_image(clip, 5.0, None).unwrap();
        image.view_mut().unwrap().pixel_address_mut(0, 0).unwrap()[0] = 9;
        assert!(core.clip_get_image(clip, 5.0, None).is_err());
        drop(image);

        let target = record.take_target(id).unwrap();
        assert_eq!(target.data.unwrap()[0], 9);
        assert!(record.take_target(id).is_none());
    }

    #[test]
    fn test_scoped_fetch_takes_its_own_target() {
        let core = core();
        let (_, clip) = instance_with_clip(&core, "Output");
        let record = core.clip(clip).unwrap();
        let top = record.push_target(OutputTarget::new(0.0, RectI::new(0, 0, 8, 2), BitDepth::Byte, Components::Rgba).unwrap());
        let bottom =
            record.push_target(OutputTarget::new(0.0, RectI::new(0, 2, 8, 4), BitDepth::Byte, Components::Rgba).unwrap());

        {
            let _scope = TargetScope::enter(bottom);
            let image = core.clip_get_image(clip, 0.0, None).unwrap();
            assert_eq!(image.bounds(), RectI::new(0, 2, 8, 4));
            // Held by this scope already; the other render's target is off limits.
            assert!(core.clip_get_image(clip, 0.0, None).is_err());
            {
                let _inner = TargetScope::enter(top);
                assert_eq!(core.clip_get_image(clip, 0.0, None).unwrap().bounds(), RectI::new(0, 0, 8, 2));
            }
            assert!(core.clip_get_image(clip, 0.0, None).is_err());
        }

        let image = core.clip_get_image(clip, 0.0, None).unwrap();
        assert_eq!(image.bounds(), RectI::new(0, 0, 8, 2));
        drop(image);
        assert!(record.take_target(top).is_some());
        assert!(record.take_target(bottom).is_some());
    }

    #[test]
    fn test_unconnected_clip_fetch_fails() {
        let core = core();
        let (_, clip) = instance_with_clip(&core, "Source");
        core.connect(clip, None).unwrap();
        let err = core.clip_get_image(clip, 0.0, None).unwrap_err();
        assert_eq!(err.status(), Status::Failed);
        assert!(core.clip_get_region_of_definition(clip, 0.0).unwrap().is_empty());
    }

    #[test]
    fn test_abort_flag() {
        let core = core();
        let (effect, _) = instance_with_clip(&core, "Output");
        assert!(!core.abort(effect));
        core.effect(effect).unwrap().set_abort(true);
        assert!(core.abort(effect));
    }

    #[test]
    fn test_rayon_threads_run_every_index() {
        let threads = RayonThreads::new(2).unwrap();
        assert_eq!(threads.num_cpus(), 2);
        assert!(threads.thread_index().is_none());
        let seen = Mutex::new(Vec::new());
        threads
            .multi_thread(5, &|index, count| {
                assert_eq!(count, 5);
                seen.lock().push(index);
            })
            .unwrap();
        let mut seen = seen.into_inner();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_rayon_threads_report_panics() {
        let threads = RayonThreads::new(2).unwrap();
        let err = threads
            .multi_thread(3, &|index, _| {
                if index == 1 {
                    panic!("job failed");
                }
            })
            .unwrap_err();
        assert_eq!(err.status(), Status::Failed);
    }

    #[test]
    fn test_questions_reply_default() {
        assert_eq!(LogMessages.message(None, MessageKind::Question, "q", "ok?"), Status::ReplyDefault);
        assert_eq!(LogMessages.message(None, MessageKind::Warning, "w", "careful"), Status::Ok);
    }
}

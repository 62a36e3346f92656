//! Effects and sources used by the host tests.

use crate::core::error::OfxResult;
use crate::core::geometry::RectI;
use crate::core::types::{BitDepth, ChangeReason, Components, Context, RenderThreadSafety};
use crate::host::clip::{FrameSource, SourceFrame, StillSource};
use crate::host::suites::EffectRecord;
use crate::host::{EffectHost, HostConfig};
use crate::param::{ParamDescriptor, ParamValue};
use crate::plugin::args::{IdentityClip, InstanceChangedArguments, IsIdentityArguments, RenderArguments, SequenceArguments};
use crate::plugin::{
    ContextDescriptor, EffectDescriptor, ImageEffect, InstanceContext, PluginFactory, StaticBundle, OUTPUT_CLIP,
    SOURCE_CLIP,
};
use crate::render::{PixelKernel, Pixel};
use crate::suite::PluginContext;
use indexmap::IndexMap;
use parking_lot::Mutex;
use semver::Version;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

/// What the fixture saw.
#[derive(Default)]
pub(crate) struct Stats {
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub renders: AtomicUsize,
    pub changes: Mutex<Vec<(String, ChangeReason)>>,
    pub events: Mutex<Vec<String>>,
    /// Raised by the kernel on the first pixel it writes.
    pub abort_on_render: Mutex<Option<Arc<EffectRecord>>>,
    pub aborted_renders: AtomicUsize,
}

/// A filter that adds `amount` to every component.
///
/// Editing `amount` makes it copy the value into `mirror`; editing
/// `counter` makes it bump `counter` again, forever. With `leak` set its
/// render forgets the output image instead of releasing it.
#[derive(Clone)]
pub(crate) struct Fixture {
    id: String,
    version: Version,
    safety: RenderThreadSafety,
    temporal: bool,
    single: bool,
    stats: Arc<Stats>,
}

impl Fixture {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            version: Version::new(1, 0, 0),
            safety: RenderThreadSafety::FullySafe,
            temporal: false,
            single: false,
            stats: Arc::new(Stats::default()),
        }
    }

    pub fn with_version(mut self, major: u64, minor: u64) -> Self {
        self.version = Version::new(major, minor, 0);
        self
    }

    pub fn with_safety(mut self, safety: RenderThreadSafety) -> Self {
        self.safety = safety;
        self
    }

    pub fn with_temporal_access(mut self) -> Self {
        self.temporal = true;
        self
    }

    pub fn single_instance(mut self) -> Self {
        self.single = true;
        self
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }
}

impl PluginFactory for Fixture {
    fn identifier(&self) -> &str {
        &self.id
    }

    fn version(&self) -> Version {
        self.version.clone()
    }

    fn describe(&self, _ctx: &PluginContext, desc: &EffectDescriptor) -> OfxResult<()> {
        desc.set_label("Fixture")?;
        desc.add_supported_context(Context::Filter)?;
        desc.add_supported_pixel_depth(BitDepth::Byte)?;
        desc.add_supported_pixel_depth(BitDepth::Float)?;
        desc.set_render_thread_safety(self.safety)?;
        desc.set_temporal_clip_access(self.temporal)?;
        desc.set_single_instance(self.single)?;
        Ok(())
    }

    fn describe_in_context(&self, _ctx: &PluginContext, desc: &mut ContextDescriptor<'_>) -> OfxResult<()> {
        let output = desc.define_clip(OUTPUT_CLIP)?;
        output.add_supported_components(Components::Rgba)?;
        let source = desc.define_clip(SOURCE_CLIP)?;
        source.add_supported_components(Components::Rgba)?;
        desc.define_param(ParamDescriptor::double("amount", 0.0))?;
        desc.define_param(ParamDescriptor::double("mirror", 0.0))?;
        desc.define_param(ParamDescriptor::integer("counter", 0))?;
        desc.define_param(ParamDescriptor::boolean("leak", false))?;
        Ok(())
    }

    fn create_instance(&self, _ctx: &InstanceContext) -> OfxResult<Box<dyn ImageEffect>> {
        Ok(Box::new(FixtureEffect {
            stats: self.stats.clone(),
        }))
    }
}

struct FixtureEffect {
    stats: Arc<Stats>,
}

struct AddKernel {
    amount: f32,
    abort: Option<Arc<EffectRecord>>,
    raised: Once,
}

impl PixelKernel for AddKernel {
    fn apply<P: Pixel>(&self, _x: i32, _y: i32, src: &[P], dst: &mut [P]) {
        if let Some(record) = &self.abort {
            self.raised.call_once(|| record.set_abort(true));
        }
        for (d, s) in dst.iter_mut().zip(src) {
            *d = P::from_f32(s.to_f32() + self.amount * P::MAX);
        }
    }
}

impl ImageEffect for FixtureEffect {
    fn render(&self, ctx: &InstanceContext, args: &RenderArguments) -> OfxResult<()> {
        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_active.fetch_max(active, Ordering::SeqCst);
        self.stats.renders.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));

        let result = if ctx.bool_at("leak", args.time)? {
            ctx.engine()
                .fetch(ctx.clip(OUTPUT_CLIP)?, args.time)
                .map(|image| std::mem::forget(image))
        } else {
            let kernel = AddKernel {
                amount: ctx.double_at("amount", args.time)? as f32,
                abort: self.stats.abort_on_render.lock().clone(),
                raised: Once::new(),
            };
            ctx.render_kernel(&kernel, args).map(|outcome| {
                if outcome.was_aborted() {
                    self.stats.aborted_renders.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn is_identity(&self, ctx: &InstanceContext, args: &IsIdentityArguments) -> OfxResult<Option<IdentityClip>> {
        let untouched = ctx.double_at("amount", args.time)? == 0.0 && !ctx.bool_at("leak", args.time)?;
        Ok(untouched.then(|| IdentityClip::new(SOURCE_CLIP, args.time)))
    }

    fn begin_sequence_render(&self, _ctx: &InstanceContext, args: &SequenceArguments) -> OfxResult<()> {
        self.stats
            .events
            .lock()
            .push(format!("begin {}..{}", args.frame_range.0, args.frame_range.1));
        Ok(())
    }

    fn end_sequence_render(&self, _ctx: &InstanceContext, _args: &SequenceArguments) -> OfxResult<()> {
        self.stats.events.lock().push("end".to_string());
        Ok(())
    }

    fn changed(&self, ctx: &InstanceContext, args: &InstanceChangedArguments) -> OfxResult<()> {
        self.stats.changes.lock().push((args.name.clone(), args.reason));
        match args.name.as_str() {
            "amount" => {
                let amount = ctx.double_at("amount", args.time)?;
                ctx.set_param("mirror", ParamValue::Double(amount))
            }
            "counter" => {
                let counter = ctx.int_at("counter", args.time)?;
                ctx.set_param("counter", ParamValue::Integer(counter + 1))
            }
            _ => Ok(()),
        }
    }
}

/// A host with `fixtures` loaded.
pub(crate) fn host_with(config: HostConfig, fixtures: Vec<Fixture>) -> EffectHost {
    let mut host = EffectHost::new(config).expect("host");
    let bundle = fixtures
        .into_iter()
        .fold(StaticBundle::new(), |bundle, fixture| bundle.with_factory(fixture));
    host.add_bundle(&bundle);
    host
}

/// An 8x4 float RGBA source of one colour.
pub(crate) fn solid_source(colour: [f32; 4]) -> Arc<dyn FrameSource> {
    let frame = SourceFrame::solid(RectI::new(0, 0, 8, 4), BitDepth::Float, Components::Rgba, colour).expect("frame");
    Arc::new(StillSource::new(frame).with_frame_range(0.0, 10.0))
}

/// Inputs connecting `source` to the Source clip.
pub(crate) fn filter_inputs(source: Arc<dyn FrameSource>) -> IndexMap<String, Arc<dyn FrameSource>> {
    let mut inputs = IndexMap::new();
    inputs.insert(SOURCE_CLIP.to_string(), source);
    inputs
}

/// The first pixel of a float RGBA frame.
pub(crate) fn first_pixel(frame: &SourceFrame) -> [f32; 4] {
    let view = frame.view().expect("view");
    let b = view.layout().bounds;
    let mut px = [0.0f32; 4];
    assert!(view.read_pixel(b.x1, b.y1, &mut px));
    px
}

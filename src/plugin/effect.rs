//! The traits a module implements, and the per-instance context handed to
//! them.

use crate::core::error::{HandleError, OfxResult, ParamError};
use crate::core::geometry::RectD;
use crate::core::handle::{ClipHandle, EffectHandle};
use crate::core::status::Status;
use crate::core::types::{Context, MessageKind};
use crate::param::ParamValue;
use crate::plugin::args::{
    ClipPreferences, FramesNeeded, IdentityClip, InstanceChangedArguments, IsIdentityArguments,
    RegionOfDefinitionArguments, RegionsOfInterest, RegionsOfInterestArguments, RenderArguments,
    SequenceArguments,
};
use crate::plugin::descriptor::{ContextDescriptor, EffectDescriptor};
use crate::plugin::{OUTPUT_CLIP, SOURCE_CLIP};
use crate::property::SharedProps;
use crate::render::{ClipRef, PixelKernel, RenderEngine, RenderOptions, RenderOutcome};
use crate::suite::{HostCapabilities, HostSuites, ParamRef, PluginContext};
use indexmap::IndexMap;
use semver::Version;
use std::sync::Arc;

/// Creates and describes one kind of effect.
pub trait PluginFactory: Send + Sync + 'static {
    /// Reverse-domain identifier, such as `org.ofxrs.gain`.
    fn identifier(&self) -> &str;

    /// Effect version.
    fn version(&self) -> Version;

    /// Called once after the host is known.
    fn load(&self, _ctx: &PluginContext) -> OfxResult<()> {
        Ok(())
    }

    /// Called once before the module is released.
    fn unload(&self) -> OfxResult<()> {
        Ok(())
    }

    /// Declare static capabilities.
    fn describe(&self, ctx: &PluginContext, desc: &EffectDescriptor) -> OfxResult<()>;

    /// Define clips and parameters for one context.
    fn describe_in_context(&self, ctx: &PluginContext, desc: &mut ContextDescriptor<'_>) -> OfxResult<()>;

    /// Build the effect for a new instance.
    fn create_instance(&self, ctx: &InstanceContext) -> OfxResult<Box<dyn ImageEffect>>;
}

/// One configured effect instance.
///
/// Only `render` is required. Every other action has a default that makes
/// the dispatcher reply "default", leaving the host to apply its own
/// behaviour.
pub trait ImageEffect: Send + Sync {
    /// Fill `args.window` of the output.
    fn render(&self, ctx: &InstanceContext, args: &RenderArguments) -> OfxResult<()>;

    /// Name a clip to pass through instead of rendering.
    fn is_identity(&self, _ctx: &InstanceContext, _args: &IsIdentityArguments) -> OfxResult<Option<IdentityClip>> {
        Ok(None)
    }

    /// Override the region of definition.
    fn region_of_definition(
        &self,
        _ctx: &InstanceContext,
        _args: &RegionOfDefinitionArguments,
    ) -> OfxResult<Option<RectD>> {
        Ok(None)
    }

    /// Declare regions needed from each input.
    fn regions_of_interest(
        &self,
        _ctx: &InstanceContext,
        _args: &RegionsOfInterestArguments,
        _rois: &mut RegionsOfInterest<'_>,
    ) -> OfxResult<()> {
        Ok(())
    }

    /// Declare input frames needed for an output frame.
    fn frames_needed(&self, _ctx: &InstanceContext, _time: f64, _frames: &mut FramesNeeded<'_>) -> OfxResult<()> {
        Ok(())
    }

    /// Override the frame range the effect can produce.
    fn time_domain(&self, _ctx: &InstanceContext) -> OfxResult<Option<(f64, f64)>> {
        Ok(None)
    }

    /// Override clip formats.
    fn clip_preferences(&self, _ctx: &InstanceContext, _prefs: &mut ClipPreferences<'_>) -> OfxResult<()> {
        Ok(())
    }

    /// A sequence of renders is starting.
    fn begin_sequence_render(&self, _ctx: &InstanceContext, _args: &SequenceArguments) -> OfxResult<()> {
        Ok(())
    }

    /// A sequence of renders has ended.
    fn end_sequence_render(&self, _ctx: &InstanceContext, _args: &SequenceArguments) -> OfxResult<()> {
        Ok(())
    }

    /// A parameter or clip changed.
    fn changed(&self, _ctx: &InstanceContext, _args: &InstanceChangedArguments) -> OfxResult<()> {
        Ok(())
    }

    /// Drop cached data.
    fn purge_caches(&self, _ctx: &InstanceContext) -> OfxResult<()> {
        Ok(())
    }

    /// Flush private data into parameters.
    fn sync_private_data(&self, _ctx: &InstanceContext) -> OfxResult<()> {
        Ok(())
    }
}

/// What an instance's handlers can reach: the host suites, the instance
/// handle, and the clip and parameter handles resolved at creation.
#[derive(Clone)]
pub struct InstanceContext {
    plugin: Arc<PluginContext>,
    handle: EffectHandle,
    context: Context,
    clips: IndexMap<String, ClipHandle>,
    params: IndexMap<String, ParamRef>,
    options: RenderOptions,
}

impl InstanceContext {
    /// Resolve the named clips and parameters of a new instance.
    pub fn resolve(
        plugin: Arc<PluginContext>,
        handle: EffectHandle,
        context: Context,
        clip_names: &[String],
        param_names: &[String],
    ) -> OfxResult<Self> {
        let suites = &plugin.suites;
        let mut clips = IndexMap::new();
        for name in clip_names {
            clips.insert(name.clone(), suites.image_effect.clip_get_handle(handle, name)?);
        }
        let mut params = IndexMap::new();
        for name in param_names {
            params.insert(name.clone(), suites.parameter.param_get_handle(handle, name)?);
        }
        Ok(Self {
            plugin,
            handle,
            context,
            clips,
            params,
            options: RenderOptions::default(),
        })
    }

    /// Instance handle.
    pub fn handle(&self) -> EffectHandle {
        self.handle
    }

    /// Context the instance was created in.
    pub fn context(&self) -> Context {
        self.context
    }

    /// Host suites.
    pub fn suites(&self) -> &HostSuites {
        &self.plugin.suites
    }

    /// Host capabilities.
    pub fn capabilities(&self) -> &HostCapabilities {
        &self.plugin.capabilities
    }

    /// Instance properties.
    pub fn props(&self) -> OfxResult<SharedProps> {
        self.suites().image_effect.property_set(self.handle)
    }

    /// Limit the workers used by `render_kernel`.
    pub fn set_render_options(&mut self, options: RenderOptions) {
        self.options = options;
    }

    // ========================================================================
    // Clips
    // ========================================================================

    /// True if the instance has a clip of this name.
    pub fn has_clip(&self, name: &str) -> bool {
        self.clips.contains_key(name)
    }

    /// A clip by name.
    pub fn clip(&self, name: &str) -> OfxResult<ClipRef<'_>> {
        self.clips
            .get_key_value(name)
            .map(|(name, handle)| ClipRef {
                handle: *handle,
                name: name.as_str(),
            })
            .ok_or_else(|| {
                HandleError::UnknownName {
                    kind: "clip",
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Names of the instance's clips, in definition order.
    pub fn clip_names(&self) -> impl Iterator<Item = &str> {
        self.clips.keys().map(String::as_str)
    }

    /// True if the named clip exists and is connected.
    pub fn clip_connected(&self, name: &str) -> bool {
        let Ok(clip) = self.clip(name) else {
            return false;
        };
        self.suites()
            .image_effect
            .clip_get_property_set(clip.handle)
            .map(|props| props.read().try_get_bool(&crate::property::Prop::Connected, 0).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Region of definition of a clip.
    pub fn clip_region_of_definition(&self, name: &str, time: f64) -> OfxResult<RectD> {
        let clip = self.clip(name)?;
        self.suites().image_effect.clip_get_region_of_definition(clip.handle, time)
    }

    /// Negotiated pixel aspect ratio of a clip, 1 if none was set.
    pub fn clip_pixel_aspect_ratio(&self, name: &str) -> OfxResult<f64> {
        let clip = self.clip(name)?;
        let props = self.suites().image_effect.clip_get_property_set(clip.handle)?;
        let par = props
            .read()
            .try_get_double(&crate::property::Prop::PixelAspectRatio, 0)
            .filter(|par| *par > 0.0)
            .unwrap_or(1.0);
        Ok(par)
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// A parameter by name.
    pub fn param(&self, name: &str) -> OfxResult<ParamRef> {
        self.params
            .get(name)
            .copied()
            .ok_or_else(|| ParamError::Unknown(name.to_string()).into())
    }

    /// Value of a parameter at `time`.
    pub fn param_value(&self, name: &str, time: f64) -> OfxResult<ParamValue> {
        self.suites().parameter.param_get_value_at_time(self.param(name)?, time)
    }

    /// A double parameter at `time`.
    pub fn double_at(&self, name: &str, time: f64) -> OfxResult<f64> {
        self.param_value(name, time)?
            .as_double()
            .ok_or_else(|| wrong_kind(name, "double"))
    }

    /// An integer parameter at `time`.
    pub fn int_at(&self, name: &str, time: f64) -> OfxResult<i32> {
        self.param_value(name, time)?
            .as_int()
            .ok_or_else(|| wrong_kind(name, "integer"))
    }

    /// A boolean parameter at `time`.
    pub fn bool_at(&self, name: &str, time: f64) -> OfxResult<bool> {
        self.param_value(name, time)?
            .as_bool()
            .ok_or_else(|| wrong_kind(name, "boolean"))
    }

    /// A 2D double parameter at `time`.
    pub fn double2d_at(&self, name: &str, time: f64) -> OfxResult<(f64, f64)> {
        self.param_value(name, time)?
            .as_double2d()
            .ok_or_else(|| wrong_kind(name, "2D double"))
    }

    /// An RGBA parameter at `time`.
    pub fn rgba_at(&self, name: &str, time: f64) -> OfxResult<[f64; 4]> {
        self.param_value(name, time)?
            .as_rgba()
            .ok_or_else(|| wrong_kind(name, "RGBA"))
    }

    /// Set a parameter from inside an action.
    pub fn set_param(&self, name: &str, value: ParamValue) -> OfxResult<()> {
        self.suites().parameter.param_set_value(self.param(name)?, value)
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// True if the host wants the current action to stop.
    pub fn abort(&self) -> bool {
        self.suites().image_effect.abort(self.handle)
    }

    /// A render engine for this instance.
    pub fn engine(&self) -> RenderEngine<'_> {
        RenderEngine::new(self.suites(), self.handle).with_options(self.options)
    }

    /// Render `kernel` into the output clip, reading the source clip if the
    /// instance has a connected one.
    pub fn render_kernel<K: PixelKernel>(&self, kernel: &K, args: &RenderArguments) -> OfxResult<RenderOutcome> {
        let output = self.clip(OUTPUT_CLIP)?;
        let source = if self.clip_connected(SOURCE_CLIP) {
            Some(self.clip(SOURCE_CLIP)?)
        } else {
            None
        };
        self.engine().render(kernel, output, source, args.time, args.window)
    }

    /// Post a message to the user.
    pub fn message(&self, kind: MessageKind, id: &str, text: &str) -> Status {
        self.plugin.message(Some(self.handle), kind, id, text)
    }
}

fn wrong_kind(name: &str, expected: &'static str) -> crate::core::error::OfxError {
    ParamError::WrongKind {
        name: name.to_string(),
        expected,
    }
    .into()
}

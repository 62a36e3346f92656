//! Driving one effect instance.
//!
//! [`EffectInstance`] sends the actions a host owes an instance in the
//! order the protocol requires: clip preferences before anything else,
//! bracketed change notifications, identity and region queries before
//! rendering, and DestroyInstance exactly once.

use crate::core::error::{LifecycleError, NegotiationError, OfxError, OfxResult, RenderError};
use crate::core::geometry::{PixelMapping, PointD, RectD, RectI};
use crate::core::handle::EffectHandle;
use crate::core::status::Status;
use crate::core::types::{
    BitDepth, ChangeReason, ChangedKind, Components, Context, Field, RenderThreadSafety,
};
use crate::host::clip::{convert, FrameSource, SourceFrame};
use crate::host::suites::{ClipRecord, EffectRecord, HostCore, OutputTarget, TargetScope};
use crate::host::{check, HostInterface, LoadedPlugin};
use crate::negotiation::{
    default_frames_needed, default_region_of_definition, default_regions_of_interest, default_time_domain,
    enforce_region_of_interest, ClipFormat, ClipNegotiator, ClipSpec, InputRegion, Preferences,
};
use crate::param::ParamValue;
use crate::plugin::actions::Action;
use crate::plugin::args::{
    IdentityClip, InstanceChangedArguments, IsIdentityArguments, RegionOfDefinitionArguments,
    RegionsOfInterestArguments, RenderArguments, SequenceArguments,
};
use crate::plugin::OUTPUT_CLIP;
use crate::property::{Prop, PropertySet};
use crate::render::image::{ImageLayout, ImageView};
use crate::suite::ImageEffectSuite;
use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A live instance of a loaded effect.
pub struct EffectInstance {
    core: Arc<HostCore>,
    interface: Arc<HostInterface>,
    plugin: Arc<LoadedPlugin>,
    handle: EffectHandle,
    context: Context,
    render_lock: Mutex<()>,
    preferences: RwLock<Option<Preferences>>,
    in_sequence: AtomicBool,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for EffectInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectInstance")
            .field("identifier", &self.identifier())
            .field("handle", &self.handle)
            .field("context", &self.context)
            .field("destroyed", &self.destroyed.load(Ordering::Acquire))
            .finish()
    }
}

impl EffectInstance {
    pub(crate) fn new(
        core: Arc<HostCore>,
        interface: Arc<HostInterface>,
        plugin: Arc<LoadedPlugin>,
        handle: EffectHandle,
        context: Context,
    ) -> Self {
        Self {
            core,
            interface,
            plugin,
            handle,
            context,
            render_lock: Mutex::new(()),
            preferences: RwLock::new(None),
            in_sequence: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Instance handle.
    pub fn handle(&self) -> EffectHandle {
        self.handle
    }

    /// Context the instance was created in.
    pub fn context(&self) -> Context {
        self.context
    }

    /// Identifier of the effect.
    pub fn identifier(&self) -> &str {
        self.plugin.identifier()
    }

    /// Negotiated clip formats, once negotiation has run.
    pub fn preferences(&self) -> Option<Preferences> {
        self.preferences.read().clone()
    }

    /// Render thread safety the effect declared.
    pub fn render_thread_safety(&self) -> RenderThreadSafety {
        self.plugin.info.capabilities.render_thread_safety
    }

    fn record(&self) -> OfxResult<Arc<EffectRecord>> {
        self.core.effect(self.handle)
    }

    fn call(&self, action: Action, in_args: &PropertySet) -> OfxResult<(Status, PropertySet)> {
        let (status, out) = self.plugin.call(action, Some(self.handle), in_args);
        check(status)?;
        Ok((status, out))
    }

    fn clips(&self) -> OfxResult<Vec<Arc<ClipRecord>>> {
        let handles: Vec<_> = self.record()?.clips.read().values().copied().collect();
        handles.into_iter().map(|h| self.core.clip(h)).collect()
    }

    fn input_regions(&self, time: f64) -> OfxResult<Vec<InputRegion>> {
        let project = &self.core.config().project;
        let mut inputs = Vec::new();
        for clip in self.clips()? {
            if clip.name == OUTPUT_CLIP {
                continue;
            }
            let source = clip.source.read().clone();
            let optional = clip.props.read().try_get_bool(&Prop::Optional, 0).unwrap_or(false);
            let region = match source {
                Some(source) => {
                    let (first, last) = source.frame_range();
                    InputRegion::connected(&clip.name, source.region_of_definition(time))
                        .with_frame_range(first, last)
                }
                None => InputRegion {
                    name: clip.name.clone(),
                    optional,
                    connected: false,
                    rod: RectD::new(0.0, 0.0, 0.0, 0.0),
                    frame_range: project.frame_range(),
                },
            };
            inputs.push(region.with_optional(optional));
        }
        Ok(inputs)
    }

    // ========================================================================
    // Clip preferences
    // ========================================================================

    /// Run clip preference negotiation and apply the result to the clips.
    /// Runs once at creation and again whenever an input is reconnected.
    pub fn negotiate(&self) -> OfxResult<Preferences> {
        let clips = self.clips()?;
        let host = self.interface.capabilities();
        let mut specs = Vec::with_capacity(clips.len());
        for clip in &clips {
            let mut supported: Vec<Components> =
                clip.props.read().get_enums(&Prop::SupportedComponents).unwrap_or_default();
            if supported.is_empty() {
                supported = host.supported_components.clone();
            }
            if clip.name == OUTPUT_CLIP {
                specs.push(ClipSpec::output(&clip.name, &supported));
                continue;
            }
            let source = clip.source.read().clone();
            specs.push(match source {
                Some(source) => ClipSpec::input(&clip.name, source.format(), &supported)
                    .with_premultiplication(source.premultiplication()),
                None => ClipSpec::input(&clip.name, ClipFormat::new(BitDepth::None, Components::None), &supported)
                    .with_connected(false),
            });
        }

        let project = &self.core.config().project;
        let negotiator = ClipNegotiator::new(host, &self.plugin.info.capabilities, specs)
            .with_project_par(project.pixel_aspect_ratio)
            .with_frame_rate(project.frame_rate);
        let defaults = negotiator.defaults()?;
        let mut out = PropertySet::new();
        defaults.write_props(&mut out)?;
        let status = self
            .plugin
            .call_into(Action::GetClipPreferences, Some(self.handle), &PropertySet::new(), &mut out);
        check(status)?;
        let prefs = if status == Status::Ok {
            negotiator.resolve(&defaults, &out)
        } else {
            defaults
        };

        for clip in &clips {
            let Some(format) = prefs.clip(&clip.name) else {
                continue;
            };
            let mut props = clip.props.write();
            props.set_enum(&Prop::PixelDepth, 0, format.depth)?;
            props.set_enum(&Prop::Components, 0, format.components)?;
            props.set(&Prop::PixelAspectRatio, 0, format.pixel_aspect_ratio)?;
            if clip.name == OUTPUT_CLIP {
                props.set_enum(&Prop::PreMultiplication, 0, prefs.output_premultiplication)?;
                props.set_enum(&Prop::FieldOrder, 0, prefs.field_order)?;
                props.set(&Prop::FrameRate, 0, prefs.frame_rate)?;
            }
        }
        {
            let record = self.record()?;
            let mut props = record.props.write();
            props.set(&Prop::FrameVarying, 0, prefs.frame_varying)?;
            props.set(&Prop::ContinuousSamples, 0, prefs.continuous_samples)?;
        }
        debug!("{} {} negotiated {:?}", self.identifier(), self.handle, prefs.clips);
        *self.preferences.write() = Some(prefs.clone());
        Ok(prefs)
    }

    fn negotiated(&self) -> OfxResult<Preferences> {
        match self.preferences() {
            Some(prefs) => Ok(prefs),
            None => self.negotiate(),
        }
    }

    /// Connect, replace or disconnect an input, then renegotiate and tell
    /// the effect.
    pub fn connect_input(&self, name: &str, source: Option<Arc<dyn FrameSource>>) -> OfxResult<()> {
        if name == OUTPUT_CLIP {
            return Err(NegotiationError::UnknownClip(name.to_string()).into());
        }
        let clip = self.core.clip_get_handle(self.handle, name)?;
        self.core.connect(clip, source)?;
        self.negotiate()?;
        let args = InstanceChangedArguments {
            kind: ChangedKind::Clip,
            ..InstanceChangedArguments::param(name, ChangeReason::UserEdited, 0.0)
        };
        self.bracketed_changes(args)
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Current value of a parameter at `time`.
    pub fn param_value(&self, name: &str, time: f64) -> OfxResult<ParamValue> {
        let record = self.record()?;
        let params = record.params.read();
        Ok(params.value_at_time(params.handle(name)?, time)?)
    }

    /// Set a parameter as the user, then notify the effect.
    pub fn set_param(&self, name: &str, value: ParamValue) -> OfxResult<()> {
        {
            let record = self.record()?;
            let mut params = record.params.write();
            let handle = params.handle(name)?;
            params.set_value(handle, value)?;
        }
        self.bracketed_changes(InstanceChangedArguments::param(name, ChangeReason::UserEdited, 0.0))
    }

    /// Set a keyframe as the user, then notify the effect.
    pub fn set_param_at_time(&self, name: &str, time: f64, value: ParamValue) -> OfxResult<()> {
        {
            let record = self.record()?;
            let mut params = record.params.write();
            let handle = params.handle(name)?;
            params.set_value_at_time(handle, time, value)?;
        }
        self.bracketed_changes(InstanceChangedArguments::param(name, ChangeReason::UserEdited, time))
    }

    fn bracketed_changes(&self, first: InstanceChangedArguments) -> OfxResult<()> {
        let mut bracket = PropertySet::new();
        bracket.set_enum(&Prop::ChangeReason, 0, first.reason)?;
        self.call(Action::BeginInstanceChanged, &bracket)?;
        let delivered = self.deliver_changes(first);
        let ended = self.call(Action::EndInstanceChanged, &bracket);
        delivered?;
        ended?;
        Ok(())
    }

    /// Deliver one change, then the changes the effect made in response,
    /// round after round, up to the configured cascade limit.
    fn deliver_changes(&self, first: InstanceChangedArguments) -> OfxResult<()> {
        let record = self.record()?;
        let limit = self.core.config().max_change_cascade;
        let time = first.time;
        let mut pending = vec![first];
        let mut rounds = 0;
        loop {
            for args in pending.drain(..) {
                let mut in_args = PropertySet::new();
                args.write_props(&mut in_args)?;
                trace!("{} changed ({})", args.name, args.reason);
                self.call(Action::InstanceChanged, &in_args)?;
            }
            let edits = record.take_edits();
            if edits.is_empty() {
                return Ok(());
            }
            rounds += 1;
            if rounds > limit {
                warn!(
                    "{} {}: dropping {} change(s) after {} cascaded round(s)",
                    self.identifier(),
                    self.handle,
                    edits.len(),
                    limit
                );
                return Ok(());
            }
            pending = edits
                .iter()
                .map(|name| InstanceChangedArguments::param(name, ChangeReason::PluginEdited, time))
                .collect();
        }
    }

    /// Tell the effect the user started editing it.
    pub fn begin_edit(&self) -> OfxResult<()> {
        self.call(Action::BeginInstanceEdit, &PropertySet::new()).map(|_| ())
    }

    /// Tell the effect the user stopped editing it.
    pub fn end_edit(&self) -> OfxResult<()> {
        self.call(Action::EndInstanceEdit, &PropertySet::new()).map(|_| ())
    }

    /// Ask the effect to drop cached data.
    pub fn purge_caches(&self) -> OfxResult<()> {
        self.call(Action::PurgeCaches, &PropertySet::new()).map(|_| ())
    }

    /// Ask the effect to flush private data into its parameters.
    pub fn sync_private_data(&self) -> OfxResult<()> {
        self.call(Action::SyncPrivateData, &PropertySet::new()).map(|_| ())
    }

    // ========================================================================
    // Regions and time
    // ========================================================================

    /// Region of definition at `time`, the effect's or the default for its
    /// context.
    pub fn region_of_definition(&self, time: f64) -> OfxResult<RectD> {
        self.negotiated()?;
        let args = RegionOfDefinitionArguments {
            time,
            render_scale: PointD::unit(),
        };
        let mut in_args = PropertySet::new();
        args.write_props(&mut in_args)?;
        let (status, out) = self.call(Action::GetRegionOfDefinition, &in_args)?;
        if status == Status::Ok {
            if let Some(rod) = out.try_get_rect_d(&Prop::RegionOfDefinition) {
                return Ok(rod);
            }
        }
        let project = self.core.config().project.extent();
        Ok(default_region_of_definition(self.context, &self.input_regions(time)?, project))
    }

    /// Regions needed from each connected input to render `region`, each
    /// clipped to its input's region of definition.
    pub fn regions_of_interest(&self, time: f64, region: RectD) -> OfxResult<Vec<(String, RectD)>> {
        let inputs = self.input_regions(time)?;
        if !self.plugin.info.capabilities.supports_tiles {
            return Ok(inputs.iter().filter(|i| i.connected).map(|i| (i.name.clone(), i.rod)).collect());
        }
        let args = RegionsOfInterestArguments {
            time,
            render_scale: PointD::unit(),
            region,
        };
        let mut in_args = PropertySet::new();
        args.write_props(&mut in_args)?;
        let (status, out) = self.call(Action::GetRegionsOfInterest, &in_args)?;
        let defaults = default_regions_of_interest(&region, &inputs);
        if status != Status::Ok {
            return Ok(defaults);
        }
        Ok(inputs
            .iter()
            .filter(|i| i.connected)
            .map(|input| {
                let requested = out
                    .try_get_rect_d(&Prop::ClipRoI(input.name.clone()))
                    .unwrap_or(region);
                (input.name.clone(), enforce_region_of_interest(&requested, &input.rod))
            })
            .collect())
    }

    /// Input frame ranges needed to render `time`.
    pub fn frames_needed(&self, time: f64) -> OfxResult<Vec<(String, Vec<(f64, f64)>)>> {
        let inputs = self.input_regions(time)?;
        let mut in_args = PropertySet::new();
        in_args.set(&Prop::Time, 0, time)?;
        let (status, out) = self.call(Action::GetFramesNeeded, &in_args)?;
        if status != Status::Ok {
            return Ok(default_frames_needed(time, &inputs)
                .into_iter()
                .map(|(name, range)| (name, vec![range]))
                .collect());
        }
        Ok(inputs
            .iter()
            .filter(|i| i.connected)
            .map(|input| {
                let ranges = out
                    .get_doubles(&Prop::ClipFrameRange(input.name.clone()))
                    .map(|flat| flat.chunks_exact(2).map(|r| (r[0], r[1])).collect::<Vec<_>>())
                    .unwrap_or_else(|_| vec![(time, time)]);
                (input.name.clone(), ranges)
            })
            .collect())
    }

    /// Frames the instance can produce.
    pub fn time_domain(&self) -> OfxResult<(f64, f64)> {
        let (status, out) = self.call(Action::GetTimeDomain, &PropertySet::new())?;
        if status == Status::Ok {
            if let (Some(first), Some(last)) = (
                out.try_get_double(&Prop::FrameRange, 0),
                out.try_get_double(&Prop::FrameRange, 1),
            ) {
                return Ok((first, last));
            }
        }
        let project = self.core.config().project.frame_range();
        Ok(default_time_domain(self.context, &self.input_regions(project.0)?, project))
    }

    /// The clip and time to pass through instead of rendering `window`.
    pub fn is_identity(&self, time: f64, window: RectI) -> OfxResult<Option<IdentityClip>> {
        let args = IsIdentityArguments {
            time,
            window,
            render_scale: PointD::unit(),
            field: Field::None,
        };
        let mut in_args = PropertySet::new();
        args.write_props(&mut in_args)?;
        let (status, out) = self.call(Action::IsIdentity, &in_args)?;
        if status != Status::Ok {
            return Ok(None);
        }
        Ok(Some(IdentityClip::from_props(&out)?))
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Ask the effect to stop the render in progress.
    pub fn abort(&self) -> OfxResult<()> {
        self.record()?.set_abort(true);
        Ok(())
    }

    fn render_guards(&self) -> (Option<MutexGuard<'_, ()>>, Option<MutexGuard<'_, ()>>) {
        let safety = self.render_thread_safety();
        let plugin = (safety == RenderThreadSafety::Unsafe).then(|| self.plugin.render_lock.lock());
        let instance = (safety != RenderThreadSafety::FullySafe).then(|| self.render_lock.lock());
        (plugin, instance)
    }

    /// Render one frame. `window` defaults to the whole region of
    /// definition, limited to the project when the region is infinite.
    ///
    /// A render the effect cut short because of [`abort`](Self::abort)
    /// still succeeds; the frame comes back marked
    /// [`is_aborted`](SourceFrame::is_aborted) and its pixels are incomplete.
    pub fn render(&self, time: f64, window: Option<RectI>) -> OfxResult<SourceFrame> {
        let prefs = self.negotiated()?;
        let output = *prefs
            .clip(OUTPUT_CLIP)
            .ok_or_else(|| NegotiationError::UnknownClip(OUTPUT_CLIP.to_string()))?;
        let mut rod = self.region_of_definition(time)?;
        if rod.is_infinite_x() || rod.is_infinite_y() {
            rod = rod.clip(&self.core.config().project.extent());
        }
        let mapping = PixelMapping::new(PointD::unit(), output.pixel_aspect_ratio, Field::None);
        let window = window.unwrap_or_else(|| mapping.to_pixels(&rod));

        let output_clip = self.core.clip_by_name(self.handle, OUTPUT_CLIP)?;
        output_clip.props.write().set_rect_d(&Prop::RegionOfDefinition, rod)?;

        if let Some(identity) = self.is_identity(time, window)? {
            debug!("{} at {} passes '{}' through", self.identifier(), time, identity.clip);
            return self.copy_identity(&identity, window, output, &prefs);
        }
        let rois = self.regions_of_interest(time, mapping.to_canonical(&window))?;
        trace!("Regions of interest at {}: {:?}", time, rois);

        let record = self.record()?;
        record.set_abort(false);
        let id = output_clip.push_target(OutputTarget::new(time, window, output.depth, output.components)?);
        let mut args = RenderArguments::new(time, window);
        args.sequential = self.in_sequence.load(Ordering::SeqCst);
        let mut in_args = PropertySet::new();
        args.write_props(&mut in_args)?;

        let result = {
            let _guards = self.render_guards();
            let _target = TargetScope::enter(id);
            self.call(Action::Render, &in_args)
        };
        let target = output_clip.take_target(id);
        result?;

        let data = target
            .and_then(|t| t.data.map(|data| (t.layout, data)))
            .ok_or_else(|| -> OfxError {
                LifecycleError::OutstandingImages {
                    outstanding: record.outstanding_images(),
                }
                .into()
            })?;
        let aborted = record.is_aborted();
        if aborted {
            warn!("{} at {} was aborted; the frame is incomplete", self.identifier(), time);
        }
        Ok(SourceFrame::new(data.0, data.1)?
            .with_pixel_aspect_ratio(output.pixel_aspect_ratio)
            .with_premultiplication(prefs.output_premultiplication)
            .with_aborted(aborted))
    }

    fn copy_identity(
        &self,
        identity: &IdentityClip,
        window: RectI,
        output: ClipFormat,
        prefs: &Preferences,
    ) -> OfxResult<SourceFrame> {
        let clip = self.core.clip_get_handle(self.handle, &identity.clip)?;
        let image = self.core.clip_get_image(clip, identity.time, None)?;
        let (layout, data) = convert(&image.view(), output.depth, output.components)?;
        drop(image);
        let src = ImageView::new(&data, layout)?;

        let dst_layout = ImageLayout::packed(window, output.depth, output.components);
        let mut out = vec![0u8; dst_layout.required_len()?];
        if let Some(overlap) = window.intersection(&layout.bounds) {
            let bpp = dst_layout.bytes_per_pixel();
            let span = overlap.width() as usize * bpp;
            let src_x = (overlap.x1 - layout.bounds.x1) as usize * bpp;
            let dst_x = (overlap.x1 - window.x1) as usize * bpp;
            for y in overlap.y1..overlap.y2 {
                let row = src.row(y).ok_or(RenderError::BufferTooSmall)?;
                let start = dst_layout.row_offset(y).ok_or(RenderError::BufferTooSmall)? + dst_x;
                out[start..start + span].copy_from_slice(&row[src_x..src_x + span]);
            }
        }
        Ok(SourceFrame::new(dst_layout, out)?
            .with_pixel_aspect_ratio(output.pixel_aspect_ratio)
            .with_premultiplication(prefs.output_premultiplication))
    }

    /// Render `first..=last` every `step` frames inside a sequence bracket.
    pub fn render_sequence(&self, first: f64, last: f64, step: f64) -> OfxResult<Vec<SourceFrame>> {
        if step <= 0.0 || last < first {
            return Err(OfxError::Status(Status::ErrValue));
        }
        let mut args = SequenceArguments::new(first, last);
        args.step = step;
        let mut in_args = PropertySet::new();
        args.write_props(&mut in_args)?;

        self.negotiated()?;
        self.call(Action::BeginSequenceRender, &in_args)?;
        self.in_sequence.store(true, Ordering::SeqCst);
        let mut frames = Vec::new();
        let mut rendered = Ok(());
        let mut time = first;
        while time <= last {
            match self.render(time, None) {
                Ok(frame) if frame.is_aborted() => {
                    debug!("{} sequence stopped at {}", self.identifier(), time);
                    break;
                }
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    rendered = Err(e);
                    break;
                }
            }
            time += step;
        }
        self.in_sequence.store(false, Ordering::SeqCst);
        let ended = self.call(Action::EndSequenceRender, &in_args);
        rendered?;
        ended?;
        info!("{} rendered {} frame(s)", self.identifier(), frames.len());
        Ok(frames)
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    fn teardown(&self) -> OfxResult<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let outstanding = self.record().map(|r| r.outstanding_images()).unwrap_or(0);
        let (status, _) = self.plugin.call(Action::DestroyInstance, Some(self.handle), &PropertySet::new());
        let freed = self.core.memory().free_owned(self.handle);
        if freed > 0 {
            debug!("Freed {} memory block(s) left by {}", freed, self.handle);
        }
        self.core.remove_effect(self.handle)?;
        self.plugin.live.fetch_sub(1, Ordering::SeqCst);
        if outstanding > 0 {
            error!("{} destroyed with {} unreleased image(s)", self.handle, outstanding);
            return Err(LifecycleError::OutstandingImages { outstanding }.into());
        }
        check(status)?;
        Ok(())
    }

    /// Destroy the instance.
    pub fn destroy(self) -> OfxResult<()> {
        self.teardown()
    }
}

impl Drop for EffectInstance {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("Destroying {}: {}", self.handle, e);
        }
    }
}

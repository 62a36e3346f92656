//! Typed action arguments.
//!
//! Hosts write these into an action's in-arguments with `write_props`;
//! the dispatcher reads them back with `from_props` before calling the
//! effect. Out-arguments are written through small setter types that
//! remember whether the effect said anything, so the dispatcher can reply
//! "default" when it did not.

use crate::core::error::PropertyResult;
use crate::core::geometry::{PixelMapping, PointD, RectD, RectI};
use crate::core::types::{BitDepth, ChangeReason, ChangedKind, Components, Field, PreMultiplication};
use crate::property::{Prop, PropertySet, Side};

fn render_scale(props: &PropertySet) -> PointD {
    props.get_point_d(&Prop::RenderScale).unwrap_or_else(|_| PointD::unit())
}

fn flag(props: &PropertySet, prop: Prop) -> bool {
    props.try_get_bool(&prop, 0).unwrap_or(false)
}

/// Arguments of the render action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderArguments {
    /// Frame to render.
    pub time: f64,
    /// Pixel window to fill.
    pub window: RectI,
    /// Proxy scale.
    pub render_scale: PointD,
    /// Field to render.
    pub field: Field,
    /// Frames arrive in order.
    pub sequential: bool,
    /// Render is for interactive display.
    pub interactive: bool,
    /// GPU resources are available to this call.
    pub opengl: bool,
}

impl RenderArguments {
    /// Arguments for a full-frame render.
    pub fn new(time: f64, window: RectI) -> Self {
        Self {
            time,
            window,
            render_scale: PointD::unit(),
            field: Field::None,
            sequential: false,
            interactive: false,
            opengl: false,
        }
    }

    /// Read from in-arguments.
    pub fn from_props(props: &PropertySet) -> PropertyResult<Self> {
        Ok(Self {
            time: props.get_double(&Prop::Time, 0)?,
            window: props.get_rect_i(&Prop::RenderWindow)?,
            render_scale: render_scale(props),
            field: props.try_get_enum(&Prop::FieldToRender, 0).unwrap_or(Field::None),
            sequential: flag(props, Prop::SequentialRenderStatus),
            interactive: flag(props, Prop::InteractiveRenderStatus),
            opengl: flag(props, Prop::OpenGlEnabled),
        })
    }

    /// Write as in-arguments.
    pub fn write_props(&self, props: &mut PropertySet) -> PropertyResult<()> {
        props.set(&Prop::Time, 0, self.time)?;
        props.set_rect_i(&Prop::RenderWindow, self.window)?;
        props.set_point_d(&Prop::RenderScale, self.render_scale)?;
        props.set_enum(&Prop::FieldToRender, 0, self.field)?;
        props.set(&Prop::SequentialRenderStatus, 0, self.sequential)?;
        props.set(&Prop::InteractiveRenderStatus, 0, self.interactive)?;
        props.set(&Prop::OpenGlEnabled, 0, self.opengl)?;
        Ok(())
    }

    /// Canonical to pixel mapping for a clip of the given aspect ratio.
    pub fn mapping(&self, pixel_aspect_ratio: f64) -> PixelMapping {
        PixelMapping::new(self.render_scale, pixel_aspect_ratio, self.field)
    }
}

/// Arguments of the identity query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsIdentityArguments {
    /// Frame in question.
    pub time: f64,
    /// Pixel window in question.
    pub window: RectI,
    /// Proxy scale.
    pub render_scale: PointD,
    /// Field in question.
    pub field: Field,
}

impl IsIdentityArguments {
    /// Read from in-arguments.
    pub fn from_props(props: &PropertySet) -> PropertyResult<Self> {
        Ok(Self {
            time: props.get_double(&Prop::Time, 0)?,
            window: props.get_rect_i(&Prop::RenderWindow)?,
            render_scale: render_scale(props),
            field: props.try_get_enum(&Prop::FieldToRender, 0).unwrap_or(Field::None),
        })
    }

    /// Write as in-arguments.
    pub fn write_props(&self, props: &mut PropertySet) -> PropertyResult<()> {
        props.set(&Prop::Time, 0, self.time)?;
        props.set_rect_i(&Prop::RenderWindow, self.window)?;
        props.set_point_d(&Prop::RenderScale, self.render_scale)?;
        props.set_enum(&Prop::FieldToRender, 0, self.field)?;
        Ok(())
    }
}

impl From<&RenderArguments> for IsIdentityArguments {
    fn from(args: &RenderArguments) -> Self {
        Self {
            time: args.time,
            window: args.window,
            render_scale: args.render_scale,
            field: args.field,
        }
    }
}

/// The pass-through answer to an identity query.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityClip {
    /// Clip to pass through.
    pub clip: String,
    /// Time to take it from.
    pub time: f64,
}

impl IdentityClip {
    /// Pass `clip` through at the queried time.
    pub fn new(clip: &str, time: f64) -> Self {
        Self {
            clip: clip.to_string(),
            time,
        }
    }

    /// Write as out-arguments.
    pub fn write_props(&self, out: &mut PropertySet) -> PropertyResult<()> {
        out.set_by(Side::Plugin, &Prop::Name, 0, self.clip.as_str())?;
        out.set_by(Side::Plugin, &Prop::Time, 0, self.time)?;
        Ok(())
    }

    /// Read from out-arguments.
    pub fn from_props(out: &PropertySet) -> PropertyResult<Self> {
        Ok(Self {
            clip: out.get_string(&Prop::Name, 0)?.to_string(),
            time: out.get_double(&Prop::Time, 0)?,
        })
    }
}

/// Arguments of the region of definition action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionOfDefinitionArguments {
    /// Frame in question.
    pub time: f64,
    /// Proxy scale.
    pub render_scale: PointD,
}

impl RegionOfDefinitionArguments {
    /// Read from in-arguments.
    pub fn from_props(props: &PropertySet) -> PropertyResult<Self> {
        Ok(Self {
            time: props.get_double(&Prop::Time, 0)?,
            render_scale: render_scale(props),
        })
    }

    /// Write as in-arguments.
    pub fn write_props(&self, props: &mut PropertySet) -> PropertyResult<()> {
        props.set(&Prop::Time, 0, self.time)?;
        props.set_point_d(&Prop::RenderScale, self.render_scale)?;
        Ok(())
    }
}

/// Arguments of the regions of interest action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionsOfInterestArguments {
    /// Frame in question.
    pub time: f64,
    /// Proxy scale.
    pub render_scale: PointD,
    /// Output region being requested, canonical.
    pub region: RectD,
}

impl RegionsOfInterestArguments {
    /// Read from in-arguments.
    pub fn from_props(props: &PropertySet) -> PropertyResult<Self> {
        Ok(Self {
            time: props.get_double(&Prop::Time, 0)?,
            render_scale: render_scale(props),
            region: props.get_rect_d(&Prop::RegionOfInterest)?,
        })
    }

    /// Write as in-arguments.
    pub fn write_props(&self, props: &mut PropertySet) -> PropertyResult<()> {
        props.set(&Prop::Time, 0, self.time)?;
        props.set_point_d(&Prop::RenderScale, self.render_scale)?;
        props.set_rect_d(&Prop::RegionOfInterest, self.region)?;
        Ok(())
    }
}

/// Arguments of Begin/EndSequenceRender.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceArguments {
    /// First and last frame.
    pub frame_range: (f64, f64),
    /// Step between frames.
    pub step: f64,
    /// Sequence is for interactive display.
    pub interactive: bool,
    /// Frames arrive in order.
    pub sequential: bool,
    /// Proxy scale.
    pub render_scale: PointD,
}

impl SequenceArguments {
    /// A non-interactive sequence over `first..=last`.
    pub fn new(first: f64, last: f64) -> Self {
        Self {
            frame_range: (first, last),
            step: 1.0,
            interactive: false,
            sequential: true,
            render_scale: PointD::unit(),
        }
    }

    /// Read from in-arguments.
    pub fn from_props(props: &PropertySet) -> PropertyResult<Self> {
        Ok(Self {
            frame_range: (
                props.get_double(&Prop::FrameRange, 0)?,
                props.get_double(&Prop::FrameRange, 1)?,
            ),
            step: props.try_get_double(&Prop::FrameStep, 0).unwrap_or(1.0),
            interactive: flag(props, Prop::IsInteractive),
            sequential: flag(props, Prop::SequentialRenderStatus),
            render_scale: render_scale(props),
        })
    }

    /// Write as in-arguments.
    pub fn write_props(&self, props: &mut PropertySet) -> PropertyResult<()> {
        props.set(&Prop::FrameRange, 0, self.frame_range.0)?;
        props.set(&Prop::FrameRange, 1, self.frame_range.1)?;
        props.set(&Prop::FrameStep, 0, self.step)?;
        props.set(&Prop::IsInteractive, 0, self.interactive)?;
        props.set(&Prop::SequentialRenderStatus, 0, self.sequential)?;
        props.set_point_d(&Prop::RenderScale, self.render_scale)?;
        Ok(())
    }
}

/// Arguments of InstanceChanged.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceChangedArguments {
    /// Whether a parameter or a clip changed.
    pub kind: ChangedKind,
    /// Name of what changed.
    pub name: String,
    /// Why it changed.
    pub reason: ChangeReason,
    /// Current time.
    pub time: f64,
    /// Proxy scale.
    pub render_scale: PointD,
}

impl InstanceChangedArguments {
    /// A parameter change.
    pub fn param(name: &str, reason: ChangeReason, time: f64) -> Self {
        Self {
            kind: ChangedKind::Parameter,
            name: name.to_string(),
            reason,
            time,
            render_scale: PointD::unit(),
        }
    }

    /// Read from in-arguments.
    pub fn from_props(props: &PropertySet) -> PropertyResult<Self> {
        Ok(Self {
            kind: props.get_enum(&Prop::Type, 0)?,
            name: props.get_string(&Prop::Name, 0)?.to_string(),
            reason: props.get_enum(&Prop::ChangeReason, 0)?,
            time: props.get_double(&Prop::Time, 0)?,
            render_scale: render_scale(props),
        })
    }

    /// Write as in-arguments.
    pub fn write_props(&self, props: &mut PropertySet) -> PropertyResult<()> {
        props.set_enum(&Prop::Type, 0, self.kind)?;
        props.set(&Prop::Name, 0, self.name.as_str())?;
        props.set_enum(&Prop::ChangeReason, 0, self.reason)?;
        props.set(&Prop::Time, 0, self.time)?;
        props.set_point_d(&Prop::RenderScale, self.render_scale)?;
        Ok(())
    }
}

// ============================================================================
// Out-argument setters
// ============================================================================

/// Collects regions of interest per input clip.
#[derive(Debug)]
pub struct RegionsOfInterest<'a> {
    out: &'a mut PropertySet,
    count: usize,
}

impl<'a> RegionsOfInterest<'a> {
    /// Write into `out`.
    pub fn new(out: &'a mut PropertySet) -> Self {
        Self { out, count: 0 }
    }

    /// Declare the region needed from `clip`.
    pub fn set(&mut self, clip: &str, region: RectD) -> PropertyResult<()> {
        self.out.set_rect_d(&Prop::ClipRoI(clip.to_string()), region)?;
        self.count += 1;
        Ok(())
    }

    /// True if nothing was declared.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Collects frame ranges needed per input clip.
#[derive(Debug)]
pub struct FramesNeeded<'a> {
    out: &'a mut PropertySet,
    count: usize,
}

impl<'a> FramesNeeded<'a> {
    /// Write into `out`.
    pub fn new(out: &'a mut PropertySet) -> Self {
        Self { out, count: 0 }
    }

    /// Declare the inclusive frame ranges needed from `clip`.
    pub fn set(&mut self, clip: &str, ranges: &[(f64, f64)]) -> PropertyResult<()> {
        let flat = ranges.iter().flat_map(|(a, b)| [*a, *b]);
        self.out.set_all(&Prop::ClipFrameRange(clip.to_string()), flat)?;
        self.count += 1;
        Ok(())
    }

    /// True if nothing was declared.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Clip format overrides an effect requests during clip preference
/// negotiation.
#[derive(Debug)]
pub struct ClipPreferences<'a> {
    out: &'a mut PropertySet,
    count: usize,
}

impl<'a> ClipPreferences<'a> {
    /// Write into `out`, which the host has filled with its defaults.
    pub fn new(out: &'a mut PropertySet) -> Self {
        Self { out, count: 0 }
    }

    fn touched(&mut self, result: PropertyResult<()>) -> PropertyResult<()> {
        result?;
        self.count += 1;
        Ok(())
    }

    /// The depth the host proposes for `clip`.
    pub fn proposed_depth(&self, clip: &str) -> Option<BitDepth> {
        self.out.try_get_enum(&Prop::ClipDepth(clip.to_string()), 0)
    }

    /// The components the host proposes for `clip`.
    pub fn proposed_components(&self, clip: &str) -> Option<Components> {
        self.out.try_get_enum(&Prop::ClipComponents(clip.to_string()), 0)
    }

    /// Request a pixel depth for `clip`.
    pub fn set_depth(&mut self, clip: &str, depth: BitDepth) -> PropertyResult<()> {
        let r = self.out.set_enum(&Prop::ClipDepth(clip.to_string()), 0, depth);
        self.touched(r)
    }

    /// Request components for `clip`.
    pub fn set_components(&mut self, clip: &str, components: Components) -> PropertyResult<()> {
        let r = self.out.set_enum(&Prop::ClipComponents(clip.to_string()), 0, components);
        self.touched(r)
    }

    /// Request a pixel aspect ratio for `clip`.
    pub fn set_pixel_aspect_ratio(&mut self, clip: &str, par: f64) -> PropertyResult<()> {
        let r = self.out.set_by(Side::Plugin, &Prop::ClipPar(clip.to_string()), 0, par);
        self.touched(r)
    }

    /// Premultiplication of the output.
    pub fn set_output_premultiplication(&mut self, premult: PreMultiplication) -> PropertyResult<()> {
        let r = self.out.set_enum(&Prop::PreMultiplication, 0, premult);
        self.touched(r)
    }

    /// Frame rate of the output.
    pub fn set_output_frame_rate(&mut self, rate: f64) -> PropertyResult<()> {
        let r = self.out.set_by(Side::Plugin, &Prop::FrameRate, 0, rate);
        self.touched(r)
    }

    /// Fielding of the output.
    pub fn set_output_fielding(&mut self, field: Field) -> PropertyResult<()> {
        let r = self.out.set_enum(&Prop::FieldOrder, 0, field);
        self.touched(r)
    }

    /// Output changes between frames even for still input.
    pub fn set_frame_varying(&mut self, varying: bool) -> PropertyResult<()> {
        let r = self.out.set_by(Side::Plugin, &Prop::FrameVarying, 0, varying);
        self.touched(r)
    }

    /// Output may be sampled between frames.
    pub fn set_continuous_samples(&mut self, continuous: bool) -> PropertyResult<()> {
        let r = self.out.set_by(Side::Plugin, &Prop::ContinuousSamples, 0, continuous);
        self.touched(r)
    }

    /// True if nothing was requested.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_arguments_round_trip_defaults() {
        let mut props = PropertySet::new();
        props.set(&Prop::Time, 0, 3.0).unwrap();
        props.set_rect_i(&Prop::RenderWindow, RectI::new(0, 0, 8, 8)).unwrap();
        let args = RenderArguments::from_props(&props).unwrap();
        assert_eq!(args, RenderArguments::new(3.0, RectI::new(0, 0, 8, 8)));
    }

    #[test]
    fn test_render_arguments_missing_window() {
        let mut props = PropertySet::new();
        props.set(&Prop::Time, 0, 3.0).unwrap();
        assert!(RenderArguments::from_props(&props).is_err());
    }

    #[test]
    fn test_identity_clip_out_args() {
        let mut out = PropertySet::new();
        IdentityClip::new("Source", 4.0).write_props(&mut out).unwrap();
        assert_eq!(IdentityClip::from_props(&out).unwrap(), IdentityClip::new("Source", 4.0));
    }

    #[test]
    fn test_setters_track_use() {
        let mut out = PropertySet::new();
        let mut rois = RegionsOfInterest::new(&mut out);
        assert!(rois.is_empty());
        rois.set("Source", RectD::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        assert!(!rois.is_empty());
        assert_eq!(
            out.get_rect_d(&Prop::ClipRoI("Source".into())).unwrap(),
            RectD::new(0.0, 0.0, 10.0, 10.0)
        );

        let mut frames = FramesNeeded::new(&mut out);
        frames.set("Source", &[(1.0, 1.0), (3.0, 5.0)]).unwrap();
        assert_eq!(
            out.get_doubles(&Prop::ClipFrameRange("Source".into())).unwrap(),
            vec![1.0, 1.0, 3.0, 5.0]
        );
    }

    #[test]
    fn test_clip_preferences_setter() {
        let mut out = PropertySet::new();
        out.set_enum(&Prop::ClipDepth("Source".into()), 0, BitDepth::Byte).unwrap();
        let mut prefs = ClipPreferences::new(&mut out);
        assert_eq!(prefs.proposed_depth("Source"), Some(BitDepth::Byte));
        assert!(prefs.is_empty());
        prefs.set_depth("Output", BitDepth::Float).unwrap();
        prefs.set_output_premultiplication(PreMultiplication::PreMultiplied).unwrap();
        assert!(!prefs.is_empty());
        assert_eq!(
            out.get_enum::<BitDepth>(&Prop::ClipDepth("Output".into()), 0).unwrap(),
            BitDepth::Float
        );
    }

    #[test]
    fn test_instance_changed_round_trip() {
        let mut props = PropertySet::new();
        let args = InstanceChangedArguments::param("gain", ChangeReason::UserEdited, 2.0);
        args.write_props(&mut props).unwrap();
        assert_eq!(InstanceChangedArguments::from_props(&props).unwrap(), args);
    }
}

//! Strongly typed property identifiers.
//!
//! Every property both sides agree on is a variant of [`Prop`]. The static
//! table below fixes its wire name, value type, dimension and which side may
//! write it, so a typo or a type confusion is a compile error rather than a
//! runtime status. Clip-specific action arguments (such as the region of
//! interest requested from the clip named `Source`) carry the clip name.

use crate::property::value::PropertyType;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Number of values a property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimension {
    /// Exactly this many values.
    Fixed(usize),
    /// A list, grown by appending.
    Open,
}

/// Which side of the boundary may write a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Writer {
    /// Only the host.
    Host,
    /// Only the module.
    Plugin,
    /// Either side.
    Either,
}

/// The side performing a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The host application.
    Host,
    /// The effect module.
    Plugin,
}

impl Side {
    /// Human readable name for error messages.
    pub fn name(self) -> &'static str {
        match self {
            Side::Host => "host",
            Side::Plugin => "plugin",
        }
    }
}

/// Static contract of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropSpec {
    /// Value type.
    pub ty: PropertyType,
    /// Number of values.
    pub dimension: Dimension,
    /// Who may write it.
    pub writer: Writer,
}

impl PropSpec {
    /// True if `side` may write a property with this contract.
    pub fn writable_by(&self, side: Side) -> bool {
        matches!(
            (self.writer, side),
            (Writer::Either, _) | (Writer::Host, Side::Host) | (Writer::Plugin, Side::Plugin)
        )
    }
}

const fn spec(ty: PropertyType, dimension: Dimension, writer: Writer) -> PropSpec {
    PropSpec {
        ty,
        dimension,
        writer,
    }
}

macro_rules! props {
    ( $( $(#[$doc:meta])* $variant:ident => $wire:literal, $ty:ident, $dim:expr, $writer:ident; )+ ) => {
        /// A property identifier.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum Prop {
            $( $(#[$doc])* $variant, )+
            /// Region of interest requested from the named clip.
            ClipRoI(String),
            /// Pixel depth the module wants for the named clip.
            ClipDepth(String),
            /// Components the module wants for the named clip.
            ClipComponents(String),
            /// Pixel aspect ratio the module wants for the named clip.
            ClipPar(String),
            /// Frame ranges needed from the named clip, as pairs.
            ClipFrameRange(String),
        }

        const STATIC_PROPS: &[(Prop, &str)] = &[ $( (Prop::$variant, $wire), )+ ];

        impl Prop {
            /// The wire name of this property.
            pub fn name(&self) -> Cow<'static, str> {
                match self {
                    $( Prop::$variant => Cow::Borrowed($wire), )+
                    Prop::ClipRoI(clip) => Cow::Owned(format!("{}{}", CLIP_ROI_PREFIX, clip)),
                    Prop::ClipDepth(clip) => Cow::Owned(format!("{}{}", CLIP_DEPTH_PREFIX, clip)),
                    Prop::ClipComponents(clip) => {
                        Cow::Owned(format!("{}{}", CLIP_COMPONENTS_PREFIX, clip))
                    }
                    Prop::ClipPar(clip) => Cow::Owned(format!("{}{}", CLIP_PAR_PREFIX, clip)),
                    Prop::ClipFrameRange(clip) => {
                        Cow::Owned(format!("{}{}", CLIP_FRAME_RANGE_PREFIX, clip))
                    }
                }
            }

            /// The static contract of this property.
            pub fn spec(&self) -> PropSpec {
                use Dimension::*;
                use PropertyType::*;
                match self {
                    $( Prop::$variant => spec($ty, $dim, Writer::$writer), )+
                    Prop::ClipRoI(_) => spec(Double, Fixed(4), Writer::Plugin),
                    Prop::ClipDepth(_) | Prop::ClipComponents(_) => {
                        spec(String, Fixed(1), Writer::Plugin)
                    }
                    Prop::ClipPar(_) => spec(Double, Fixed(1), Writer::Plugin),
                    Prop::ClipFrameRange(_) => spec(Double, Open, Writer::Plugin),
                }
            }
        }
    };
}

const CLIP_ROI_PREFIX: &str = "OfxImageClipPropRoI_";
const CLIP_DEPTH_PREFIX: &str = "OfxImageClipPropDepth_";
const CLIP_COMPONENTS_PREFIX: &str = "OfxImageClipPropComponents_";
const CLIP_PAR_PREFIX: &str = "OfxImageClipPropPAR_";
const CLIP_FRAME_RANGE_PREFIX: &str = "OfxImageClipPropFrameRange_";

props! {
    // General
    /// Kind of object a property set describes.
    Type => "OfxPropType", String, Fixed(1), Host;
    /// Unique name of an object.
    Name => "OfxPropName", String, Fixed(1), Either;
    /// User visible label.
    Label => "OfxPropLabel", String, Fixed(1), Either;
    /// Short user visible label.
    ShortLabel => "OfxPropShortLabel", String, Fixed(1), Plugin;
    /// Long user visible label.
    LongLabel => "OfxPropLongLabel", String, Fixed(1), Plugin;
    /// Description shown in host help.
    PluginDescription => "OfxPropPluginDescription", String, Fixed(1), Plugin;
    /// Time of an action.
    Time => "OfxPropTime", Double, Fixed(1), Either;
    /// Module private data attached to an instance.
    InstanceData => "OfxPropInstanceData", Pointer, Fixed(1), Plugin;
    /// Reason for an instance-changed notification.
    ChangeReason => "OfxPropChangeReason", String, Fixed(1), Host;
    /// API version implemented by the host.
    ApiVersion => "OfxPropAPIVersion", Int, Open, Host;
    /// Version of the host or module.
    Version => "OfxPropVersion", Int, Open, Either;
    /// Version string of the host or module.
    VersionLabel => "OfxPropVersionLabel", String, Fixed(1), Either;
    /// Whether the instance is interactive.
    IsInteractive => "OfxPropIsInteractive", Int, Fixed(1), Host;

    // Host and descriptor capabilities
    /// Host runs without a user interface.
    HostIsBackground => "OfxImageEffectHostPropIsBackground", Int, Fixed(1), Host;
    /// Clips may differ in pixel depth.
    SupportsMultipleClipDepths => "OfxImageEffectPropSupportsMultipleClipDepths", Int, Fixed(1), Either;
    /// Clips may differ in pixel aspect ratio.
    SupportsMultipleClipPars => "OfxImageEffectPropSupportsMultipleClipPARs", Int, Fixed(1), Either;
    /// Inputs may differ in resolution.
    SupportsMultiResolution => "OfxImageEffectPropSupportsMultiResolution", Int, Fixed(1), Either;
    /// Images may be smaller than the region of definition.
    SupportsTiles => "OfxImageEffectPropSupportsTiles", Int, Fixed(1), Either;
    /// Images may be fetched at times other than the render time.
    TemporalClipAccess => "OfxImageEffectPropTemporalClipAccess", Int, Fixed(1), Either;
    /// Supported component layouts.
    SupportedComponents => "OfxImageEffectPropSupportedComponents", String, Open, Either;
    /// Supported contexts.
    SupportedContexts => "OfxImageEffectPropSupportedContexts", String, Open, Either;
    /// Supported pixel depths.
    SupportedPixelDepths => "OfxImageEffectPropSupportedPixelDepths", String, Open, Either;
    /// Host lets the module set the output frame rate.
    SetableFrameRate => "OfxImageEffectPropSetableFrameRate", Int, Fixed(1), Host;
    /// Host lets the module set the output fielding.
    SetableFielding => "OfxImageEffectPropSetableFielding", Int, Fixed(1), Host;

    // Effect descriptor
    /// Menu grouping.
    Grouping => "OfxImageEffectPluginPropGrouping", String, Fixed(1), Plugin;
    /// Declared render thread safety.
    RenderThreadSafety => "OfxImageEffectPluginRenderThreadSafety", String, Fixed(1), Plugin;
    /// Host should split frames across threads itself.
    HostFrameThreading => "OfxImageEffectPluginPropHostFrameThreading", Int, Fixed(1), Plugin;
    /// Only one instance may exist at a time.
    SingleInstance => "OfxImageEffectPluginPropSingleInstance", Int, Fixed(1), Plugin;
    /// Render both fields even if identical.
    FieldRenderTwiceAlways => "OfxImageEffectPluginPropFieldRenderTwiceAlways", Int, Fixed(1), Plugin;
    /// GPU render support: "false", "true" or "needed".
    OpenGlRenderSupported => "OfxImageEffectPropOpenGLRenderSupported", String, Fixed(1), Either;

    // Instance
    /// Context the instance was created in.
    Context => "OfxImageEffectPropContext", String, Fixed(1), Host;
    /// Project size in canonical coordinates.
    ProjectSize => "OfxImageEffectPropProjectSize", Double, Fixed(2), Host;
    /// Project origin in canonical coordinates.
    ProjectOffset => "OfxImageEffectPropProjectOffset", Double, Fixed(2), Host;
    /// Project extent in canonical coordinates.
    ProjectExtent => "OfxImageEffectPropProjectExtent", Double, Fixed(2), Host;
    /// Project pixel aspect ratio.
    ProjectPixelAspectRatio => "OfxImageEffectPropProjectPixelAspectRatio", Double, Fixed(1), Host;
    /// Frame rate.
    FrameRate => "OfxImageEffectPropFrameRate", Double, Fixed(1), Either;
    /// Frame range.
    FrameRange => "OfxImageEffectPropFrameRange", Double, Fixed(2), Either;
    /// Frame range before retiming.
    UnmappedFrameRange => "OfxImageEffectPropUnmappedFrameRange", Double, Fixed(2), Host;
    /// Step between frames of a sequence render.
    FrameStep => "OfxImageEffectPropFrameStep", Double, Fixed(1), Host;
    /// Premultiplication state.
    PreMultiplication => "OfxImageEffectPropPreMultiplication", String, Fixed(1), Either;
    /// Pixel depth of a clip or image.
    PixelDepth => "OfxImageEffectPropPixelDepth", String, Fixed(1), Host;
    /// Components of a clip or image.
    Components => "OfxImageEffectPropComponents", String, Fixed(1), Host;
    /// Render is interactive.
    InteractiveRenderStatus => "OfxImageEffectPropInteractiveRenderStatus", Int, Fixed(1), Host;
    /// Frames are rendered in order.
    SequentialRenderStatus => "OfxImageEffectPropSequentialRenderStatus", Int, Fixed(1), Host;
    /// Output differs between frames even for a static input.
    FrameVarying => "OfxImageEffectFrameVarying", Int, Fixed(1), Plugin;
    /// Output may be sampled at non integer times.
    ContinuousSamples => "OfxImageClipPropContinuousSamples", Int, Fixed(1), Plugin;
    /// Render may use GPU resources handed to it.
    OpenGlEnabled => "OfxImageEffectPropOpenGLEnabled", Int, Fixed(1), Host;

    // Clip
    /// Clip may be left unconnected.
    Optional => "OfxImageClipPropOptional", Int, Fixed(1), Plugin;
    /// Clip is a mask input.
    IsMask => "OfxImageClipPropIsMask", Int, Fixed(1), Plugin;
    /// How interlaced input is delivered.
    FieldExtraction => "OfxImageClipPropFieldExtraction", String, Fixed(1), Plugin;
    /// Field order of a clip.
    FieldOrder => "OfxImageClipPropFieldOrder", String, Fixed(1), Either;
    /// Clip is connected.
    Connected => "OfxImageClipPropConnected", Int, Fixed(1), Host;
    /// Components before negotiation.
    UnmappedComponents => "OfxImageClipPropUnmappedComponents", String, Fixed(1), Host;
    /// Pixel depth before negotiation.
    UnmappedPixelDepth => "OfxImageClipPropUnmappedPixelDepth", String, Fixed(1), Host;
    /// Pixel aspect ratio of a clip or image.
    PixelAspectRatio => "OfxImagePropPixelAspectRatio", Double, Fixed(1), Host;

    // Image
    /// Bytes between the starts of consecutive rows; may be negative.
    RowBytes => "OfxImagePropRowBytes", Int, Fixed(1), Host;
    /// Pixel bounds of the data.
    Bounds => "OfxImagePropBounds", Int, Fixed(4), Host;
    /// Pixel region of definition of the image.
    ImageRegionOfDefinition => "OfxImagePropRegionOfDefinition", Int, Fixed(4), Host;
    /// Field held by the image.
    ImageField => "OfxImagePropField", String, Fixed(1), Host;
    /// Identifier that changes whenever the pixels change.
    UniqueIdentifier => "OfxImagePropUniqueIdentifier", String, Fixed(1), Host;
    /// Proxy scale of an image or render.
    RenderScale => "OfxImageEffectPropRenderScale", Double, Fixed(2), Host;

    // Action arguments
    /// Pixel window to render.
    RenderWindow => "OfxImageEffectPropRenderWindow", Int, Fixed(4), Host;
    /// Field to render.
    FieldToRender => "OfxImageEffectPropFieldToRender", String, Fixed(1), Host;
    /// Canonical region of definition.
    RegionOfDefinition => "OfxImageEffectPropRegionOfDefinition", Double, Fixed(4), Either;
    /// Canonical region of interest of the output.
    RegionOfInterest => "OfxImageEffectPropRegionOfInterest", Double, Fixed(4), Host;
}

impl Prop {
    /// Resolve a wire name, including clip-specific argument names.
    pub fn from_name(name: &str) -> Option<Prop> {
        if let Some((prop, _)) = STATIC_PROPS.iter().find(|(_, wire)| *wire == name) {
            return Some(prop.clone());
        }
        let clip_props: [(&str, fn(String) -> Prop); 5] = [
            (CLIP_ROI_PREFIX, Prop::ClipRoI),
            (CLIP_DEPTH_PREFIX, Prop::ClipDepth),
            (CLIP_COMPONENTS_PREFIX, Prop::ClipComponents),
            (CLIP_PAR_PREFIX, Prop::ClipPar),
            (CLIP_FRAME_RANGE_PREFIX, Prop::ClipFrameRange),
        ];
        clip_props.iter().find_map(|(prefix, make)| {
            name.strip_prefix(prefix)
                .filter(|clip| !clip.is_empty())
                .map(|clip| make(clip.to_string()))
        })
    }

    /// Every property with a fixed name.
    pub fn all_static() -> impl Iterator<Item = &'static Prop> {
        STATIC_PROPS.iter().map(|(prop, _)| prop)
    }

    /// Declared type.
    pub fn ty(&self) -> PropertyType {
        self.spec().ty
    }
}

impl fmt::Display for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for prop in Prop::all_static() {
            assert_eq!(Prop::from_name(&prop.name()).as_ref(), Some(prop));
        }
    }

    #[test]
    fn test_clip_names() {
        let roi = Prop::ClipRoI("Source".into());
        assert_eq!(roi.name(), "OfxImageClipPropRoI_Source");
        assert_eq!(Prop::from_name("OfxImageClipPropRoI_Source"), Some(roi));
        assert_eq!(
            Prop::from_name("OfxImageClipPropDepth_Mask"),
            Some(Prop::ClipDepth("Mask".into()))
        );
        assert_eq!(Prop::from_name("OfxImageClipPropRoI_"), None);
        assert_eq!(Prop::from_name("NotAProperty"), None);
    }

    #[test]
    fn test_static_contracts() {
        let bounds = Prop::Bounds.spec();
        assert_eq!(bounds.ty, PropertyType::Int);
        assert_eq!(bounds.dimension, Dimension::Fixed(4));
        assert!(bounds.writable_by(Side::Host));
        assert!(!bounds.writable_by(Side::Plugin));

        let depths = Prop::SupportedPixelDepths.spec();
        assert_eq!(depths.dimension, Dimension::Open);
        assert!(depths.writable_by(Side::Plugin));

        assert_eq!(Prop::ClipRoI("Source".into()).spec().dimension, Dimension::Fixed(4));
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = Prop::all_static().map(|p| p.name()).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}

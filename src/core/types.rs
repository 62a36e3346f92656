//! Closed enumerations exchanged as strings.
//!
//! Many properties hold one of a fixed set of values encoded as a string on
//! the wire (for example `"OfxBitDepthFloat"`). Each such set is a Rust enum
//! here implementing [`EncodedEnum`], so the rest of the crate never compares
//! raw strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A closed enumeration with a string wire encoding.
pub trait EncodedEnum: Sized + Copy + 'static {
    /// Every variant, in declaration order.
    const ALL: &'static [Self];

    /// The wire string for this variant.
    fn as_str(&self) -> &'static str;

    /// Decode a wire string.
    fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.as_str() == s)
    }
}

macro_rules! encoded_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl EncodedEnum for $name {
            const ALL: &'static [Self] = &[ $( $name::$variant, )+ ];

            fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $wire, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

encoded_enum! {
    /// Storage type of one pixel component.
    pub enum BitDepth {
        /// No data, used for unconnected clips.
        None => "OfxBitDepthNone",
        /// 8-bit unsigned integer.
        Byte => "OfxBitDepthByte",
        /// 16-bit unsigned integer.
        Short => "OfxBitDepthShort",
        /// 32-bit float.
        Float => "OfxBitDepthFloat",
    }
}

impl BitDepth {
    /// Bytes per component.
    pub fn bytes(self) -> usize {
        match self {
            BitDepth::None => 0,
            BitDepth::Byte => 1,
            BitDepth::Short => 2,
            BitDepth::Float => 4,
        }
    }

    /// Ordering by precision, used when collapsing to a common depth.
    pub fn precision_rank(self) -> u8 {
        match self {
            BitDepth::None => 0,
            BitDepth::Byte => 1,
            BitDepth::Short => 2,
            BitDepth::Float => 3,
        }
    }

    /// The deepest of a set of depths.
    pub fn deepest<I: IntoIterator<Item = BitDepth>>(depths: I) -> Option<BitDepth> {
        depths.into_iter().max_by_key(|d| d.precision_rank())
    }
}

encoded_enum! {
    /// Component layout of a pixel.
    pub enum Components {
        /// No data.
        None => "OfxImageComponentNone",
        /// Red, green, blue, alpha.
        Rgba => "OfxImageComponentRGBA",
        /// Red, green, blue.
        Rgb => "OfxImageComponentRGB",
        /// A single alpha channel.
        Alpha => "OfxImageComponentAlpha",
    }
}

impl Components {
    /// Number of components per pixel.
    pub fn count(self) -> usize {
        match self {
            Components::None => 0,
            Components::Rgba => 4,
            Components::Rgb => 3,
            Components::Alpha => 1,
        }
    }

    /// Index of the alpha channel, if the layout has a separate one.
    pub fn alpha_index(self) -> Option<usize> {
        match self {
            Components::Rgba => Some(3),
            Components::Alpha => Some(0),
            _ => None,
        }
    }
}

encoded_enum! {
    /// Premultiplication state of an image.
    pub enum PreMultiplication {
        /// Fully opaque, alpha is ignored.
        Opaque => "OfxImageOpaque",
        /// Colour is premultiplied by alpha.
        PreMultiplied => "OfxImagePreMultiplied",
        /// Colour is independent of alpha.
        UnPreMultiplied => "OfxImageUnPreMultiplied",
    }
}

encoded_enum! {
    /// Which field(s) an image contains.
    pub enum Field {
        /// Progressive frame.
        None => "OfxImageFieldNone",
        /// Interlaced frame containing both fields.
        Both => "OfxImageFieldBoth",
        /// Lower field only.
        Lower => "OfxImageFieldLower",
        /// Upper field only.
        Upper => "OfxImageFieldUpper",
    }
}

impl Field {
    /// Vertical scale applied when converting to pixel coordinates.
    pub fn y_scale(self) -> f64 {
        match self {
            Field::Lower | Field::Upper => 0.5,
            Field::None | Field::Both => 1.0,
        }
    }
}

encoded_enum! {
    /// How a clip wants interlaced input delivered.
    pub enum FieldExtraction {
        /// Deliver a single field at half height.
        Single => "OfxImageFieldSingle",
        /// Deliver a single field line-doubled to full height.
        Doubled => "OfxImageFieldDoubled",
        /// Deliver both fields interleaved.
        Both => "OfxImageFieldBoth",
    }
}

encoded_enum! {
    /// The usage context an effect instance is created in.
    pub enum Context {
        /// No inputs, produces images.
        Generator => "OfxImageEffectContextGenerator",
        /// One input, one output.
        Filter => "OfxImageEffectContextFilter",
        /// Two inputs and a transition parameter.
        Transition => "OfxImageEffectContextTransition",
        /// Painting on a source with a brush mask.
        Paint => "OfxImageEffectContextPaint",
        /// Arbitrary inputs.
        General => "OfxImageEffectContextGeneral",
        /// One input resampled in time.
        Retimer => "OfxImageEffectContextRetimer",
    }
}

encoded_enum! {
    /// Thread safety level a module declares for its render action.
    pub enum RenderThreadSafety {
        /// Only one render at a time across all instances.
        Unsafe => "OfxImageEffectRenderUnsafe",
        /// One render at a time per instance.
        InstanceSafe => "OfxImageEffectRenderInstanceSafe",
        /// Any number of concurrent renders.
        FullySafe => "OfxImageEffectRenderFullySafe",
    }
}

encoded_enum! {
    /// Why an instance-changed notification was sent.
    pub enum ChangeReason {
        /// The user edited a value.
        UserEdited => "OfxChangeUserEdited",
        /// The module itself set a value.
        PluginEdited => "OfxChangePluginEdited",
        /// The current time changed.
        TimeChanged => "OfxChangeTime",
    }
}

encoded_enum! {
    /// What kind of object an instance-changed notification concerns.
    pub enum ChangedKind {
        /// A parameter.
        Parameter => "OfxTypeParameter",
        /// A clip.
        Clip => "OfxTypeClip",
    }
}

encoded_enum! {
    /// Severity of a message posted through the message suite.
    pub enum MessageKind {
        /// An error the user must see.
        Error => "OfxMessageError",
        /// A warning.
        Warning => "OfxMessageWarning",
        /// Informational text.
        Message => "OfxMessageMessage",
        /// Text for the host log only.
        Log => "OfxMessageLog",
        /// A yes/no question.
        Question => "OfxMessageQuestion",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_strings() {
        for depth in BitDepth::ALL {
            assert_eq!(BitDepth::parse(depth.as_str()), Some(*depth));
        }
        for ctx in Context::ALL {
            assert_eq!(Context::parse(ctx.as_str()), Some(*ctx));
        }
        assert_eq!(Components::parse("OfxImageComponentRGB"), Some(Components::Rgb));
        assert_eq!(Components::parse("rgb"), None);
    }

    #[test]
    fn test_deepest() {
        let d = BitDepth::deepest([BitDepth::Byte, BitDepth::Float, BitDepth::Short]);
        assert_eq!(d, Some(BitDepth::Float));
        assert_eq!(BitDepth::deepest(Vec::new()), None);
    }

    #[test]
    fn test_component_counts() {
        assert_eq!(Components::Rgba.count(), 4);
        assert_eq!(Components::Rgb.count(), 3);
        assert_eq!(Components::Alpha.count(), 1);
        assert_eq!(Components::Rgb.alpha_index(), None);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&RenderThreadSafety::InstanceSafe).unwrap();
        assert_eq!(json, "\"instance_safe\"");
    }
}

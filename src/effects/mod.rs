//! Built-in effects.
//!
//! This module contains the effects that ship with ofxrs. They are plain
//! [`PluginFactory`](crate::plugin::PluginFactory) implementations and go
//! through the same dispatcher and host as dynamically loaded ones.

mod gain;
mod invert;
mod rectangle;
mod saturation;

use crate::core::error::OfxResult;
use crate::core::types::{BitDepth, Components};
use crate::plugin::{ContextDescriptor, EffectDescriptor, StaticBundle, OUTPUT_CLIP, SOURCE_CLIP};

pub use gain::{Gain, GAIN_ID};
pub use invert::{Invert, INVERT_ID};
pub use rectangle::{Rectangle, RECTANGLE_ID};
pub use saturation::{Saturation, SATURATION_ID};

/// Grouping shown in host menus.
pub const GROUPING: &str = "ofxrs";

/// Register all built-in effects.
pub fn register_all(bundle: &mut StaticBundle) {
    invert::register(bundle);
    gain::register(bundle);
    saturation::register(bundle);
    rectangle::register(bundle);
}

/// A bundle holding every built-in effect.
pub fn builtin_bundle() -> StaticBundle {
    let mut bundle = StaticBundle::new();
    register_all(&mut bundle);
    bundle
}

/// Depths every built-in effect renders.
fn describe_depths(desc: &EffectDescriptor) -> OfxResult<()> {
    for depth in [BitDepth::Byte, BitDepth::Short, BitDepth::Float] {
        desc.add_supported_pixel_depth(depth)?;
    }
    Ok(())
}

/// Output and, when `with_source`, Source clips taking every component
/// layout.
fn define_clips(desc: &mut ContextDescriptor<'_>, with_source: bool) -> OfxResult<()> {
    let output = desc.define_clip(OUTPUT_CLIP)?;
    for components in [Components::Rgba, Components::Rgb, Components::Alpha] {
        output.add_supported_components(components)?;
    }
    output.set_supports_tiles(true)?;
    if with_source {
        let source = desc.define_clip(SOURCE_CLIP)?;
        for components in [Components::Rgba, Components::Rgb, Components::Alpha] {
            source.add_supported_components(components)?;
        }
        source.set_supports_tiles(true)?;
    }
    Ok(())
}

/// Tolerance under which a scale counts as 1.
pub(crate) const IDENTITY_EPSILON: f64 = 1e-9;

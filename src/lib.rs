//! # ofxrs - Image Effect Plugin Protocol
//!
//! ofxrs lets a host drive image effects it has never seen through a
//! property-based protocol: effects describe themselves, negotiate clip
//! formats and regions with the host, and render through a tiled,
//! multi-threaded, depth-generic engine.
//!
//! ## Features
//!
//! - **Typed property exchange**: every argument crosses the host/effect
//!   boundary as a property set checked against a static contract
//! - **Enforced lifecycle**: the dispatcher rejects actions out of order
//!   and converts every failure, panics included, into a status code
//! - **Region negotiation**: regions of definition and interest, clip
//!   preferences and frame ranges with per-topology defaults
//! - **Parallel rendering**: the render window is split into row bands and
//!   processed on a rayon pool for 8-bit, 16-bit and float images
//! - **Reference host**: configuration, image memory, change notification
//!   and dynamic bundle loading
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ofxrs::prelude::*;
//!
//! let mut host = EffectHost::new(HostConfig::default())?;
//! host.add_bundle(&builtin_bundle());
//!
//! let source = StillSource::from_image(&image::open("input.png")?)?;
//! let mut inputs = IndexMap::new();
//! inputs.insert(SOURCE_CLIP.to_string(), Arc::new(source) as Arc<dyn FrameSource>);
//!
//! let gain = host.create_instance("org.ofxrs.gain", Context::Filter, inputs)?;
//! gain.set_param("scale", ParamValue::Double(2.0))?;
//! let frame = gain.render(0.0, None)?;
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: status codes, enumerations, geometry, handles and errors
//! - [`property`]: the typed property store
//! - [`param`]: parameter definitions and animated values
//! - [`suite`]: host suites and their discovery
//! - [`plugin`]: the effect-author traits and the action dispatcher
//! - [`negotiation`]: capability checks, regions and clip preferences
//! - [`render`]: images, pixel types and the tiled processor
//! - [`host`]: the reference host
//! - [`effects`]: built-in effects
//!
//! ## Writing an Effect
//!
//! Implement [`PluginFactory`](plugin::PluginFactory) to describe the effect
//! and [`ImageEffect`](plugin::ImageEffect) for its instances; most effects
//! only need a [`PixelKernel`](render::PixelKernel) and
//! [`InstanceContext::render_kernel`](plugin::InstanceContext::render_kernel).
//! Ship it in a shared library with [`declare_bundle!`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod effects;
pub mod host;
pub mod negotiation;
pub mod param;
pub mod plugin;
pub mod property;
pub mod render;
pub mod suite;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use ofxrs::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::error::{OfxError, OfxResult};
    pub use crate::core::geometry::{PixelMapping, PointD, RectD, RectI};
    pub use crate::core::status::Status;
    pub use crate::core::types::{BitDepth, ChangeReason, Components, Context, Field, RenderThreadSafety};

    // Parameters
    pub use crate::param::{DoubleType, ParamDescriptor, ParamValue};

    // Effect authoring
    pub use crate::plugin::{
        ContextDescriptor, EffectDescriptor, IdentityClip, ImageEffect, InstanceChangedArguments, InstanceContext,
        IsIdentityArguments, PluginFactory, RegionOfDefinitionArguments, RegionsOfInterest,
        RegionsOfInterestArguments, RenderArguments, StaticBundle, OUTPUT_CLIP, SOURCE_CLIP,
    };
    pub use crate::render::{Pixel, PixelKernel};
    pub use crate::suite::PluginContext;

    // Host
    pub use crate::host::{EffectHost, EffectInstance, FrameSource, HostConfig, SourceFrame, StillSource};

    // Built-in effects
    pub use crate::effects::builtin_bundle;

    pub use indexmap::IndexMap;
    pub use semver::Version;
    pub use std::sync::Arc;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "ofxrs");
    }

    #[test]
    fn test_builtins_render_through_the_prelude() {
        let mut host = EffectHost::new(HostConfig::default()).unwrap();
        host.add_bundle(&builtin_bundle());

        let frame = SourceFrame::solid(RectI::new(0, 0, 4, 4), BitDepth::Byte, Components::Rgba, [1.0, 0.0, 0.0, 1.0])
            .unwrap();
        let mut inputs: IndexMap<String, Arc<dyn FrameSource>> = IndexMap::new();
        inputs.insert(SOURCE_CLIP.to_string(), Arc::new(StillSource::new(frame)));

        let invert = host.create_instance(crate::effects::INVERT_ID, Context::Filter, inputs).unwrap();
        let out = invert.render(0.0, None).unwrap();
        let mut px = [0u8; 4];
        assert!(out.view().unwrap().read_pixel(0, 0, &mut px));
        assert_eq!(px, [0, 255, 255, 255]);
    }
}

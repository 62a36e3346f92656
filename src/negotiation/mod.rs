//! Clip and region negotiation.
//!
//! This module contains:
//! - The describe-time capability check that decides whether a host can
//!   use an effect at all
//! - Default regions of definition and interest per topology
//! - Clip preference negotiation

pub mod preferences;
pub mod region;

pub use preferences::{ClipFormat, ClipNegotiator, ClipSpec, Preferences};
pub use region::{
    default_frames_needed, default_region_of_definition, default_regions_of_interest, default_time_domain,
    enforce_region_of_interest, grow_for_kernel, InputRegion,
};

use crate::core::error::NegotiationError;
use crate::core::types::{BitDepth, Context, EncodedEnum, RenderThreadSafety};
use crate::property::{Prop, PropertySet};
use crate::suite::HostCapabilities;
use serde::Serialize;

/// Capabilities an effect declared during Describe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectCapabilities {
    /// Contexts the effect can be instantiated in.
    pub supported_contexts: Vec<Context>,
    /// Pixel depths the effect can process.
    pub supported_depths: Vec<BitDepth>,
    /// Clips may differ in depth.
    pub supports_multiple_clip_depths: bool,
    /// Inputs may differ in size.
    pub supports_multi_resolution: bool,
    /// Accepts tiles.
    pub supports_tiles: bool,
    /// Fetches images at other times than the render time.
    pub temporal_clip_access: bool,
    /// Declared render thread safety.
    pub render_thread_safety: RenderThreadSafety,
    /// Host should split frames across threads.
    pub host_frame_threading: bool,
    /// At most one instance.
    pub single_instance: bool,
    /// Cannot render without a GPU context.
    pub needs_opengl: bool,
}

impl Default for EffectCapabilities {
    fn default() -> Self {
        Self {
            supported_contexts: Vec::new(),
            supported_depths: Vec::new(),
            supports_multiple_clip_depths: false,
            supports_multi_resolution: true,
            supports_tiles: true,
            temporal_clip_access: false,
            render_thread_safety: RenderThreadSafety::InstanceSafe,
            host_frame_threading: false,
            single_instance: false,
            needs_opengl: false,
        }
    }
}

impl EffectCapabilities {
    /// Read capabilities from an effect descriptor.
    pub fn from_props(props: &PropertySet) -> Self {
        let defaults = Self::default();
        let flag = |prop: Prop, default: bool| props.try_get_bool(&prop, 0).unwrap_or(default);
        Self {
            supported_contexts: props.get_enums(&Prop::SupportedContexts).unwrap_or_default(),
            supported_depths: props.get_enums(&Prop::SupportedPixelDepths).unwrap_or_default(),
            supports_multiple_clip_depths: flag(Prop::SupportsMultipleClipDepths, defaults.supports_multiple_clip_depths),
            supports_multi_resolution: flag(Prop::SupportsMultiResolution, defaults.supports_multi_resolution),
            supports_tiles: flag(Prop::SupportsTiles, defaults.supports_tiles),
            temporal_clip_access: flag(Prop::TemporalClipAccess, defaults.temporal_clip_access),
            render_thread_safety: props
                .try_get_enum(&Prop::RenderThreadSafety, 0)
                .unwrap_or(defaults.render_thread_safety),
            host_frame_threading: flag(Prop::HostFrameThreading, defaults.host_frame_threading),
            single_instance: flag(Prop::SingleInstance, defaults.single_instance),
            needs_opengl: props.try_get_string(&Prop::OpenGlRenderSupported, 0) == Some("needed"),
        }
    }
}

/// Check an effect's declared requirements against the host.
///
/// Run at the end of Describe so that an unusable effect is refused at load
/// time with a missing-capability status instead of failing at render.
pub fn check_descriptor(host: &HostCapabilities, effect: &EffectCapabilities) -> Result<(), NegotiationError> {
    if !effect.supported_depths.iter().any(|d| host.supported_depths.contains(d)) {
        return Err(NegotiationError::NoCommonDepth {
            required: effect.supported_depths.iter().map(|d| d.as_str().to_string()).collect(),
        });
    }
    if !effect.supported_contexts.iter().any(|c| host.supported_contexts.contains(c)) {
        return Err(NegotiationError::NoCommonContext {
            required: effect.supported_contexts.iter().map(|c| c.as_str().to_string()).collect(),
        });
    }
    if effect.temporal_clip_access && !host.temporal_clip_access {
        return Err(NegotiationError::MissingCapability(
            Prop::TemporalClipAccess.name().into_owned(),
        ));
    }
    if effect.needs_opengl {
        return Err(NegotiationError::MissingCapability(
            Prop::OpenGlRenderSupported.name().into_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> HostCapabilities {
        let mut props = PropertySet::new();
        props.set_enums(&Prop::SupportedPixelDepths, &[BitDepth::Byte, BitDepth::Float]).unwrap();
        props.set_enums(&Prop::SupportedContexts, &[Context::Filter, Context::Generator]).unwrap();
        HostCapabilities::from_props(&props)
    }

    fn described(depths: &[BitDepth], contexts: &[Context]) -> EffectCapabilities {
        let mut props = PropertySet::new();
        props.set_enums(&Prop::SupportedPixelDepths, depths).unwrap();
        props.set_enums(&Prop::SupportedContexts, contexts).unwrap();
        EffectCapabilities::from_props(&props)
    }

    #[test]
    fn test_compatible_effect_passes() {
        let effect = described(&[BitDepth::Short, BitDepth::Float], &[Context::Filter]);
        assert!(check_descriptor(&host(), &effect).is_ok());
        assert_eq!(effect.render_thread_safety, RenderThreadSafety::InstanceSafe);
        assert!(effect.supports_tiles);
    }

    #[test]
    fn test_required_depth_missing() {
        let effect = described(&[BitDepth::Short], &[Context::Filter]);
        let err = check_descriptor(&host(), &effect).unwrap_err();
        assert_eq!(
            err,
            NegotiationError::NoCommonDepth {
                required: vec!["OfxBitDepthShort".to_string()]
            }
        );
        let status = crate::core::error::OfxError::from(err).status();
        assert_eq!(status, crate::core::status::Status::ErrMissingHostFeature);
    }

    #[test]
    fn test_no_common_context() {
        let effect = described(&[BitDepth::Float], &[Context::Transition]);
        assert!(matches!(
            check_descriptor(&host(), &effect),
            Err(NegotiationError::NoCommonContext { .. })
        ));
    }

    #[test]
    fn test_temporal_access_required() {
        let mut effect = described(&[BitDepth::Float], &[Context::Filter]);
        effect.temporal_clip_access = true;
        assert!(matches!(
            check_descriptor(&host(), &effect),
            Err(NegotiationError::MissingCapability(_))
        ));
    }
}

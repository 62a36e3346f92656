//! Saturation around Rec.709 luminance.

use crate::core::error::OfxResult;
use crate::core::types::{Context, RenderThreadSafety};
use crate::param::{ParamDescriptor, ParamValue};
use crate::plugin::{
    ContextDescriptor, EffectDescriptor, IdentityClip, ImageEffect, InstanceContext, IsIdentityArguments,
    PluginFactory, RenderArguments, StaticBundle, SOURCE_CLIP,
};
use crate::render::{Pixel, PixelKernel};
use crate::suite::PluginContext;
use semver::Version;

/// Identifier of [`Saturation`].
pub const SATURATION_ID: &str = "org.ofxrs.saturation";

const SATURATION: &str = "saturation";

/// Rec.709 luminance weights.
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

pub(super) fn register(bundle: &mut StaticBundle) {
    bundle.register(Saturation);
}

/// Pushes colours towards or away from their luminance.
///
/// A saturation of 0 gives grey, 1 leaves the image unchanged, and
/// negative values swap hues to their complement.
#[derive(Debug, Clone, Copy, Default)]
pub struct Saturation;

impl PluginFactory for Saturation {
    fn identifier(&self) -> &str {
        SATURATION_ID
    }

    fn version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn describe(&self, _ctx: &PluginContext, desc: &EffectDescriptor) -> OfxResult<()> {
        desc.set_label("Saturation")?;
        desc.set_description("Adjust colour saturation")?;
        desc.set_grouping(super::GROUPING)?;
        desc.add_supported_context(Context::Filter)?;
        desc.add_supported_context(Context::General)?;
        super::describe_depths(desc)?;
        desc.set_supports_tiles(true)?;
        desc.set_render_thread_safety(RenderThreadSafety::FullySafe)?;
        Ok(())
    }

    fn describe_in_context(&self, _ctx: &PluginContext, desc: &mut ContextDescriptor<'_>) -> OfxResult<()> {
        super::define_clips(desc, true)?;
        desc.define_param(
            ParamDescriptor::double(SATURATION, 1.0)
                .with_label("Saturation")
                .with_hint("0 removes colour, 1 leaves it unchanged")
                .with_display_range(ParamValue::Double(-2.0), ParamValue::Double(2.0)),
        )
    }

    fn create_instance(&self, _ctx: &InstanceContext) -> OfxResult<Box<dyn ImageEffect>> {
        Ok(Box::new(SaturationEffect))
    }
}

struct SaturationEffect;

struct SaturationKernel {
    saturation: f32,
}

impl PixelKernel for SaturationKernel {
    fn apply<P: Pixel>(&self, _x: i32, _y: i32, src: &[P], dst: &mut [P]) {
        if src.len() < 3 {
            dst.copy_from_slice(src);
            return;
        }
        let luma: f32 = src.iter().zip(LUMA).map(|(c, w)| c.to_f32() * w).sum();
        for (d, s) in dst.iter_mut().zip(src).take(3) {
            *d = P::from_f32((s.to_f32() - luma) * self.saturation + luma);
        }
        if src.len() == 4 {
            dst[3] = src[3];
        }
    }
}

impl ImageEffect for SaturationEffect {
    fn render(&self, ctx: &InstanceContext, args: &RenderArguments) -> OfxResult<()> {
        let saturation = ctx.double_at(SATURATION, args.time)? as f32;
        ctx.render_kernel(&SaturationKernel { saturation }, args)?;
        Ok(())
    }

    fn is_identity(&self, ctx: &InstanceContext, args: &IsIdentityArguments) -> OfxResult<Option<IdentityClip>> {
        let saturation = ctx.double_at(SATURATION, args.time)?;
        let unchanged = (saturation - 1.0).abs() < super::IDENTITY_EPSILON;
        Ok(unchanged.then(|| IdentityClip::new(SOURCE_CLIP, args.time)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::RectI;
    use crate::host::testing::{filter_inputs, first_pixel, solid_source};
    use crate::host::{EffectHost, HostConfig};

    fn apply<P: Pixel>(saturation: f32, src: &[P]) -> Vec<P> {
        let mut dst = vec![P::default(); src.len()];
        SaturationKernel { saturation }.apply(0, 0, src, &mut dst);
        dst
    }

    #[test]
    fn test_zero_saturation_is_grey() {
        let out = apply(0.0, &[1.0f32, 0.0, 0.0, 0.5]);
        for c in &out[..3] {
            assert!((*c - 0.2126f32).abs() < 1e-6);
        }
        assert_eq!(out[3], 0.5);
    }

    #[test]
    fn test_grey_is_unaffected() {
        let out = apply(3.0, &[0.5f32, 0.5, 0.5]);
        for c in out {
            assert!((c - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_integer_results_clamp() {
        let out = apply(4.0, &[255u8, 0, 0, 255]);
        assert_eq!(out[0], 255);
        assert_eq!(out[1], 0);
        assert_eq!(out[2], 0);
        assert_eq!(out[3], 255);
    }

    #[test]
    fn test_alpha_images_pass_through() {
        assert_eq!(apply(0.0, &[7u16]), vec![7u16]);
    }

    #[test]
    fn test_identity_at_one() {
        let mut host = EffectHost::new(HostConfig::default()).unwrap();
        host.add_bundle(&StaticBundle::new().with_factory(Saturation));
        let instance = host
            .create_instance(SATURATION_ID, Context::Filter, filter_inputs(solid_source([0.2, 0.4, 0.6, 1.0])))
            .unwrap();
        let window = RectI::new(0, 0, 8, 4);
        assert!(instance.is_identity(0.0, window).unwrap().is_some());

        instance.set_param(SATURATION, ParamValue::Double(0.0)).unwrap();
        assert!(instance.is_identity(0.0, window).unwrap().is_none());
        let px = first_pixel(&instance.render(0.0, None).unwrap());
        let luma: f32 = 0.2126 * 0.2 + 0.7152 * 0.4 + 0.0722 * 0.6;
        for c in &px[..3] {
            assert!((c - luma).abs() < 1e-5);
        }
        assert_eq!(px[3], 1.0);
    }
}

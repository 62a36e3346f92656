//! Colour inversion.

use crate::core::error::OfxResult;
use crate::core::types::{Context, RenderThreadSafety};
use crate::plugin::{
    ContextDescriptor, EffectDescriptor, ImageEffect, InstanceContext, PluginFactory, RenderArguments, StaticBundle,
};
use crate::render::{Pixel, PixelKernel};
use crate::suite::PluginContext;
use semver::Version;

/// Identifier of [`Invert`].
pub const INVERT_ID: &str = "org.ofxrs.invert";

pub(super) fn register(bundle: &mut StaticBundle) {
    bundle.register(Invert);
}

/// Inverts colour components, leaving alpha alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct Invert;

impl PluginFactory for Invert {
    fn identifier(&self) -> &str {
        INVERT_ID
    }

    fn version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn describe(&self, _ctx: &PluginContext, desc: &EffectDescriptor) -> OfxResult<()> {
        desc.set_label("Invert")?;
        desc.set_description("Invert the colour components of an image")?;
        desc.set_grouping(super::GROUPING)?;
        desc.add_supported_context(Context::Filter)?;
        desc.add_supported_context(Context::General)?;
        super::describe_depths(desc)?;
        desc.set_supports_tiles(true)?;
        desc.set_render_thread_safety(RenderThreadSafety::FullySafe)?;
        Ok(())
    }

    fn describe_in_context(&self, _ctx: &PluginContext, desc: &mut ContextDescriptor<'_>) -> OfxResult<()> {
        super::define_clips(desc, true)
    }

    fn create_instance(&self, _ctx: &InstanceContext) -> OfxResult<Box<dyn ImageEffect>> {
        Ok(Box::new(InvertEffect))
    }
}

struct InvertEffect;

struct InvertKernel;

impl PixelKernel for InvertKernel {
    fn apply<P: Pixel>(&self, _x: i32, _y: i32, src: &[P], dst: &mut [P]) {
        let colour = if src.len() == 4 { 3 } else { src.len() };
        for (i, (d, s)) in dst.iter_mut().zip(src).enumerate() {
            // Single-channel images are alpha only and get inverted too.
            *d = if i < colour || src.len() == 1 { s.invert() } else { *s };
        }
    }
}

impl ImageEffect for InvertEffect {
    fn render(&self, ctx: &InstanceContext, args: &RenderArguments) -> OfxResult<()> {
        ctx.render_kernel(&InvertKernel, args)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{filter_inputs, first_pixel, solid_source};
    use crate::host::{EffectHost, HostConfig};
    use proptest::prelude::*;

    fn apply(src: &[f32]) -> Vec<f32> {
        let mut dst = vec![0.0f32; src.len()];
        InvertKernel.apply(0, 0, src, &mut dst);
        dst
    }

    #[test]
    fn test_alpha_is_kept() {
        assert_eq!(apply(&[0.25, 0.5, 1.0, 0.5]), vec![0.75, 0.5, 0.0, 0.5]);
        assert_eq!(apply(&[0.25, 0.5, 1.0]), vec![0.75, 0.5, 0.0]);
    }

    #[test]
    fn test_bytes_invert_exactly() {
        let src = [0u8, 55, 255, 128];
        let mut dst = [0u8; 4];
        InvertKernel.apply(0, 0, &src, &mut dst);
        assert_eq!(dst, [255, 200, 0, 128]);
    }

    #[test]
    fn test_invert_through_the_host() {
        let mut host = EffectHost::new(HostConfig::default()).unwrap();
        host.add_bundle(&StaticBundle::new().with_factory(Invert));
        let instance = host
            .create_instance(INVERT_ID, Context::Filter, filter_inputs(solid_source([0.25, 0.5, 0.75, 1.0])))
            .unwrap();
        let frame = instance.render(0.0, None).unwrap();
        assert_eq!(first_pixel(&frame), [0.75, 0.5, 0.25, 1.0]);
        instance.destroy().unwrap();
    }

    proptest! {
        #[test]
        fn test_inverting_twice_restores_shorts(values in prop::array::uniform4(any::<u16>())) {
            let mut once = [0u16; 4];
            let mut twice = [0u16; 4];
            InvertKernel.apply(0, 0, &values, &mut once);
            InvertKernel.apply(0, 0, &once, &mut twice);
            prop_assert_eq!(twice, values);
        }
    }
}

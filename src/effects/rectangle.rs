//! A solid rectangle, generated or composited over a source.
//!
//! The rectangle spans the two corner parameters in canonical
//! coordinates. As a generator its region of definition is the rectangle;
//! as a filter it is the union with the source's, so an infinite source
//! keeps the result infinite on that axis.

use crate::core::error::OfxResult;
use crate::core::geometry::{PixelMapping, RectD, RectI};
use crate::core::types::{Context, RenderThreadSafety};
use crate::param::{DoubleType, ParamDescriptor};
use crate::plugin::{
    ContextDescriptor, EffectDescriptor, IdentityClip, ImageEffect, InstanceContext, IsIdentityArguments,
    PluginFactory, RegionOfDefinitionArguments, RegionsOfInterest, RegionsOfInterestArguments, RenderArguments,
    StaticBundle, OUTPUT_CLIP, SOURCE_CLIP,
};
use crate::render::{Pixel, PixelKernel};
use crate::suite::PluginContext;
use semver::Version;

/// Identifier of [`Rectangle`].
pub const RECTANGLE_ID: &str = "org.ofxrs.rectangle";

const CORNER1: &str = "corner1";
const CORNER2: &str = "corner2";
const COLOUR: &str = "colour";

pub(super) fn register(bundle: &mut StaticBundle) {
    bundle.register(Rectangle);
}

/// Draws a rectangle of one colour.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rectangle;

impl PluginFactory for Rectangle {
    fn identifier(&self) -> &str {
        RECTANGLE_ID
    }

    fn version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn describe(&self, _ctx: &PluginContext, desc: &EffectDescriptor) -> OfxResult<()> {
        desc.set_label("Rectangle")?;
        desc.set_description("Draw a solid rectangle")?;
        desc.set_grouping(super::GROUPING)?;
        desc.add_supported_context(Context::Generator)?;
        desc.add_supported_context(Context::Filter)?;
        super::describe_depths(desc)?;
        desc.set_supports_tiles(true)?;
        desc.set_supports_multi_resolution(true)?;
        desc.set_render_thread_safety(RenderThreadSafety::FullySafe)?;
        Ok(())
    }

    fn describe_in_context(&self, _ctx: &PluginContext, desc: &mut ContextDescriptor<'_>) -> OfxResult<()> {
        let filter = desc.context() == Context::Filter;
        super::define_clips(desc, filter)?;
        desc.define_param(
            ParamDescriptor::double2d(CORNER1, (0.0, 0.0))
                .with_label("Bottom Left")
                .with_double_type(DoubleType::XyAbsolute),
        )?;
        desc.define_param(
            ParamDescriptor::double2d(CORNER2, (100.0, 100.0))
                .with_label("Top Right")
                .with_double_type(DoubleType::XyAbsolute),
        )?;
        desc.define_param(ParamDescriptor::rgba(COLOUR, [0.0, 0.0, 0.0, 1.0]).with_label("Colour"))
    }

    fn create_instance(&self, _ctx: &InstanceContext) -> OfxResult<Box<dyn ImageEffect>> {
        Ok(Box::new(RectangleEffect))
    }
}

struct RectangleEffect;

impl RectangleEffect {
    /// The rectangle at `time`, corners in either order.
    fn rect(&self, ctx: &InstanceContext, time: f64) -> OfxResult<RectD> {
        let (x1, y1) = ctx.double2d_at(CORNER1, time)?;
        let (x2, y2) = ctx.double2d_at(CORNER2, time)?;
        Ok(RectD::new(x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)))
    }

    fn is_filter(&self, ctx: &InstanceContext) -> bool {
        ctx.context() == Context::Filter && ctx.clip_connected(SOURCE_CLIP)
    }
}

/// Region covered by `rect` drawn over an optional source.
fn covered_region(rect: RectD, source: Option<RectD>) -> RectD {
    match source {
        Some(source) => rect.union_extending_infinite(&source),
        None => rect,
    }
}

struct RectangleKernel {
    rect: RectI,
    /// Components in `0..=1`.
    colour: [f32; 4],
}

impl PixelKernel for RectangleKernel {
    fn apply<P: Pixel>(&self, x: i32, y: i32, src: &[P], dst: &mut [P]) {
        if !self.rect.contains_point(x, y) {
            dst.copy_from_slice(src);
            return;
        }
        let a = self.colour[3];
        let over = |s: P, c: f32| P::from_f32(s.to_f32() * (1.0 - a) + c * P::MAX * a);
        let alpha = |s: P| {
            let s = s.to_f32() / P::MAX;
            P::from_f32((s + a - s * a) * P::MAX)
        };
        match dst.len() {
            1 => dst[0] = alpha(src[0]),
            n => {
                for i in 0..3 {
                    dst[i] = over(src[i], self.colour[i]);
                }
                if n == 4 {
                    dst[3] = alpha(src[3]);
                }
            }
        }
    }
}

impl ImageEffect for RectangleEffect {
    fn render(&self, ctx: &InstanceContext, args: &RenderArguments) -> OfxResult<()> {
        let par = ctx.clip_pixel_aspect_ratio(OUTPUT_CLIP)?;
        let rect = args.mapping(par).to_pixels(&self.rect(ctx, args.time)?);
        let colour = ctx.rgba_at(COLOUR, args.time)?.map(|c| c as f32);
        ctx.render_kernel(&RectangleKernel { rect, colour }, args)?;
        Ok(())
    }

    fn is_identity(&self, ctx: &InstanceContext, args: &IsIdentityArguments) -> OfxResult<Option<IdentityClip>> {
        if !self.is_filter(ctx) {
            return Ok(None);
        }
        let colour = ctx.rgba_at(COLOUR, args.time)?;
        let par = ctx.clip_pixel_aspect_ratio(OUTPUT_CLIP)?;
        let mapping = PixelMapping::new(args.render_scale, par, args.field);
        let rect = mapping.to_pixels(&self.rect(ctx, args.time)?);
        let untouched = colour[3] <= 0.0 || rect.intersection(&args.window).is_none();
        Ok(untouched.then(|| IdentityClip::new(SOURCE_CLIP, args.time)))
    }

    fn region_of_definition(
        &self,
        ctx: &InstanceContext,
        args: &RegionOfDefinitionArguments,
    ) -> OfxResult<Option<RectD>> {
        let source = if self.is_filter(ctx) {
            Some(ctx.clip_region_of_definition(SOURCE_CLIP, args.time)?)
        } else {
            None
        };
        Ok(Some(covered_region(self.rect(ctx, args.time)?, source)))
    }

    fn regions_of_interest(
        &self,
        ctx: &InstanceContext,
        args: &RegionsOfInterestArguments,
        rois: &mut RegionsOfInterest<'_>,
    ) -> OfxResult<()> {
        if self.is_filter(ctx) {
            rois.set(SOURCE_CLIP, args.region)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{filter_inputs, first_pixel, solid_source};
    use crate::host::{EffectHost, EffectInstance, HostConfig, SourceFrame};
    use crate::param::ParamValue;
    use indexmap::IndexMap;

    fn host() -> EffectHost {
        let mut host = EffectHost::new(HostConfig::default()).unwrap();
        host.add_bundle(&StaticBundle::new().with_factory(Rectangle));
        host
    }

    fn place(instance: &EffectInstance, corners: [(f64, f64); 2], colour: [f64; 4]) {
        instance
            .set_param(CORNER1, ParamValue::Double2D(corners[0].0, corners[0].1))
            .unwrap();
        instance
            .set_param(CORNER2, ParamValue::Double2D(corners[1].0, corners[1].1))
            .unwrap();
        instance.set_param(COLOUR, ParamValue::Rgba(colour)).unwrap();
    }

    fn pixel_at(frame: &SourceFrame, x: i32, y: i32) -> [f32; 4] {
        let mut px = [0.0f32; 4];
        assert!(frame.view().unwrap().read_pixel(x, y, &mut px));
        px
    }

    #[test]
    fn test_generator_covers_the_rectangle() {
        let host = host();
        let instance = host
            .create_instance(RECTANGLE_ID, Context::Generator, IndexMap::new())
            .unwrap();
        place(&instance, [(6.0, 3.0), (2.0, 1.0)], [1.0, 0.0, 0.0, 1.0]);

        assert_eq!(instance.region_of_definition(0.0).unwrap(), RectD::new(2.0, 1.0, 6.0, 3.0));
        let frame = instance.render(0.0, None).unwrap();
        assert_eq!(frame.view().unwrap().layout().bounds, RectI::new(2, 1, 6, 3));
        assert_eq!(first_pixel(&frame), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_filter_composites_over_the_source() {
        let host = host();
        let instance = host
            .create_instance(RECTANGLE_ID, Context::Filter, filter_inputs(solid_source([0.0, 0.0, 1.0, 1.0])))
            .unwrap();
        place(&instance, [(2.0, 1.0), (4.0, 3.0)], [1.0, 0.0, 0.0, 0.5]);

        assert_eq!(instance.region_of_definition(0.0).unwrap(), RectD::new(0.0, 0.0, 8.0, 4.0));
        let frame = instance.render(0.0, None).unwrap();
        assert_eq!(pixel_at(&frame, 0, 0), [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(pixel_at(&frame, 2, 1), [0.5, 0.0, 0.5, 1.0]);
        assert_eq!(pixel_at(&frame, 4, 3), [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_filter_identity_when_invisible() {
        let host = host();
        let instance = host
            .create_instance(RECTANGLE_ID, Context::Filter, filter_inputs(solid_source([0.0, 0.0, 1.0, 1.0])))
            .unwrap();
        place(&instance, [(2.0, 1.0), (4.0, 3.0)], [1.0, 0.0, 0.0, 1.0]);
        assert!(instance.is_identity(0.0, RectI::new(0, 0, 8, 4)).unwrap().is_none());
        assert!(instance.is_identity(0.0, RectI::new(6, 0, 8, 4)).unwrap().is_some());

        instance.set_param(COLOUR, ParamValue::Rgba([1.0, 0.0, 0.0, 0.0])).unwrap();
        assert!(instance.is_identity(0.0, RectI::new(0, 0, 8, 4)).unwrap().is_some());
    }

    #[test]
    fn test_infinite_source_stays_infinite() {
        let rect = RectD::new(0.0, 0.0, 10.0, 10.0);
        let mut source = RectD::infinite();
        source.y1 = -5.0;
        source.y2 = 5.0;
        let rod = covered_region(rect, Some(source));
        assert!(rod.is_infinite_x());
        assert!(!rod.is_infinite_y());
        assert_eq!((rod.y1, rod.y2), (-5.0, 10.0));
        assert_eq!(covered_region(rect, None), rect);
    }

    #[test]
    fn test_alpha_only_composite() {
        let kernel = RectangleKernel {
            rect: RectI::new(0, 0, 1, 1),
            colour: [0.0, 0.0, 0.0, 0.5],
        };
        let mut dst = [0u8; 1];
        kernel.apply(0, 0, &[0u8], &mut dst);
        assert_eq!(dst, [127]);
        kernel.apply(5, 5, &[9u8], &mut dst);
        assert_eq!(dst, [9]);
    }
}

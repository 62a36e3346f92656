//! Per-component gain.
//!
//! A master `scale` multiplies the colour components. With
//! `scaleComponents` on, each component additionally has its own scale
//! inside the `componentScales` group; alpha is only ever scaled by its
//! own `scaleA`.

use crate::core::error::OfxResult;
use crate::core::types::{Context, RenderThreadSafety};
use crate::param::{DoubleType, ParamDescriptor, ParamValue};
use crate::plugin::{
    ContextDescriptor, EffectDescriptor, IdentityClip, ImageEffect, InstanceChangedArguments, InstanceContext,
    IsIdentityArguments, PluginFactory, RenderArguments, StaticBundle, SOURCE_CLIP,
};
use crate::render::{Pixel, PixelKernel};
use crate::suite::PluginContext;
use semver::Version;

/// Identifier of [`Gain`].
pub const GAIN_ID: &str = "org.ofxrs.gain";

const SCALE: &str = "scale";
const SCALE_COMPONENTS: &str = "scaleComponents";
const COMPONENT_SCALES: &str = "componentScales";
const COMPONENTS: [&str; 4] = ["scaleR", "scaleG", "scaleB", "scaleA"];

pub(super) fn register(bundle: &mut StaticBundle) {
    bundle.register(Gain);
}

/// Multiplies components by a master and per-component scale.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gain;

fn scale_param(name: &str, label: &str) -> ParamDescriptor {
    ParamDescriptor::double(name, 1.0)
        .with_label(label)
        .with_double_type(DoubleType::Scale)
        .with_range(ParamValue::Double(0.0), ParamValue::Double(f64::MAX))
        .with_display_range(ParamValue::Double(0.0), ParamValue::Double(10.0))
}

impl PluginFactory for Gain {
    fn identifier(&self) -> &str {
        GAIN_ID
    }

    fn version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn describe(&self, _ctx: &PluginContext, desc: &EffectDescriptor) -> OfxResult<()> {
        desc.set_label("Gain")?;
        desc.set_description("Scale image components")?;
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
        desc.define_param(scale_param(SCALE, "Scale").with_hint("Scales all colour components"))?;
        desc.define_param(
            ParamDescriptor::boolean(SCALE_COMPONENTS, true)
                .with_label("Scale Individual Components")
                .with_hint("Enables scaling of individual components"),
        )?;
        desc.define_param(ParamDescriptor::group(COMPONENT_SCALES).with_label("Component Scales"))?;
        for (name, label) in COMPONENTS.iter().zip(["Red", "Green", "Blue", "Alpha"]) {
            desc.define_param(scale_param(name, label).with_parent(COMPONENT_SCALES))?;
        }
        Ok(())
    }

    fn create_instance(&self, _ctx: &InstanceContext) -> OfxResult<Box<dyn ImageEffect>> {
        Ok(Box::new(GainEffect))
    }
}

struct GainEffect;

impl GainEffect {
    /// Effective `[r, g, b, a]` scales at `time`.
    fn scales(&self, ctx: &InstanceContext, time: f64) -> OfxResult<[f64; 4]> {
        let master = ctx.double_at(SCALE, time)?;
        let mut scales = [master, master, master, 1.0];
        if ctx.bool_at(SCALE_COMPONENTS, time)? {
            for (scale, name) in scales.iter_mut().zip(COMPONENTS) {
                let component = ctx.double_at(name, time)?;
                *scale = if name == "scaleA" { component } else { *scale * component };
            }
        }
        Ok(scales)
    }
}

struct GainKernel {
    scales: [f32; 4],
}

impl PixelKernel for GainKernel {
    fn apply<P: Pixel>(&self, _x: i32, _y: i32, src: &[P], dst: &mut [P]) {
        match src.len() {
            1 => dst[0] = P::from_f32(src[0].to_f32() * self.scales[3]),
            _ => {
                for ((d, s), scale) in dst.iter_mut().zip(src).zip(self.scales) {
                    *d = P::from_f32(s.to_f32() * scale);
                }
            }
        }
    }
}

impl ImageEffect for GainEffect {
    fn render(&self, ctx: &InstanceContext, args: &RenderArguments) -> OfxResult<()> {
        let scales = self.scales(ctx, args.time)?.map(|s| s as f32);
        ctx.render_kernel(&GainKernel { scales }, args)?;
        Ok(())
    }

    fn is_identity(&self, ctx: &InstanceContext, args: &IsIdentityArguments) -> OfxResult<Option<IdentityClip>> {
        let scales = self.scales(ctx, args.time)?;
        let unity = scales.iter().all(|s| (s - 1.0).abs() < super::IDENTITY_EPSILON);
        Ok(unity.then(|| IdentityClip::new(SOURCE_CLIP, args.time)))
    }

    fn changed(&self, ctx: &InstanceContext, args: &InstanceChangedArguments) -> OfxResult<()> {
        if args.name != SCALE_COMPONENTS {
            return Ok(());
        }
        let enabled = ctx.bool_at(SCALE_COMPONENTS, args.time)?;
        for name in COMPONENTS {
            ctx.suites().parameter.param_set_enabled(ctx.param(name)?, enabled)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{filter_inputs, first_pixel, solid_source};
    use crate::host::{EffectHost, EffectInstance, HostConfig};

    fn gain_instance(host: &mut EffectHost) -> EffectInstance {
        host.add_bundle(&StaticBundle::new().with_factory(Gain));
        host.create_instance(GAIN_ID, Context::Filter, filter_inputs(solid_source([0.5, 0.25, 0.125, 0.5])))
            .unwrap()
    }

    fn enabled(host: &EffectHost, instance: &EffectInstance, name: &str) -> bool {
        let record = host.core().effect(instance.handle()).unwrap();
        let params = record.params.read();
        params.by_name(name).unwrap().is_enabled()
    }

    #[test]
    fn test_defaults_are_identity() {
        let mut host = EffectHost::new(HostConfig::default()).unwrap();
        let instance = gain_instance(&mut host);
        let window = crate::core::geometry::RectI::new(0, 0, 8, 4);
        let identity = instance.is_identity(0.0, window).unwrap();
        assert_eq!(identity.map(|c| c.clip), Some(SOURCE_CLIP.to_string()));
    }

    #[test]
    fn test_master_and_component_scales_multiply() {
        let mut host = EffectHost::new(HostConfig::default()).unwrap();
        let instance = gain_instance(&mut host);
        instance.set_param(SCALE, ParamValue::Double(2.0)).unwrap();
        instance.set_param("scaleG", ParamValue::Double(0.5)).unwrap();
        instance.set_param("scaleA", ParamValue::Double(2.0)).unwrap();

        let frame = instance.render(0.0, None).unwrap();
        assert_eq!(first_pixel(&frame), [1.0, 0.25, 0.25, 1.0]);
    }

    #[test]
    fn test_component_scales_ignored_when_disabled() {
        let mut host = EffectHost::new(HostConfig::default()).unwrap();
        let instance = gain_instance(&mut host);
        instance.set_param("scaleR", ParamValue::Double(4.0)).unwrap();
        instance.set_param(SCALE_COMPONENTS, ParamValue::Boolean(false)).unwrap();

        let window = crate::core::geometry::RectI::new(0, 0, 8, 4);
        assert!(instance.is_identity(0.0, window).unwrap().is_some());
    }

    #[test]
    fn test_toggle_enables_component_params() {
        let mut host = EffectHost::new(HostConfig::default()).unwrap();
        let instance = gain_instance(&mut host);
        assert!(enabled(&host, &instance, "scaleR"));

        instance.set_param(SCALE_COMPONENTS, ParamValue::Boolean(false)).unwrap();
        for name in COMPONENTS {
            assert!(!enabled(&host, &instance, name));
        }
        assert!(enabled(&host, &instance, SCALE));

        instance.set_param(SCALE_COMPONENTS, ParamValue::Boolean(true)).unwrap();
        assert!(enabled(&host, &instance, "scaleA"));
    }

    #[test]
    fn test_bytes_clamp() {
        let kernel = GainKernel {
            scales: [2.0, 0.5, 1.0, 1.0],
        };
        let mut dst = [0u8; 4];
        kernel.apply(0, 0, &[200, 100, 7, 255], &mut dst);
        assert_eq!(dst, [255, 50, 7, 255]);
    }

    #[test]
    fn test_alpha_images_use_the_alpha_scale() {
        let kernel = GainKernel {
            scales: [4.0, 4.0, 4.0, 0.5],
        };
        let mut dst = [0.0f32; 1];
        kernel.apply(0, 0, &[0.5f32], &mut dst);
        assert_eq!(dst, [0.25]);
    }
}

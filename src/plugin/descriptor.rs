//! Descriptors a module fills in during Describe and DescribeInContext.

use crate::core::error::{OfxResult, PropertyResult};
use crate::core::handle::EffectHandle;
use crate::core::types::{BitDepth, Components, Context, EncodedEnum, FieldExtraction, RenderThreadSafety};
use crate::param::ParamDescriptor;
use crate::property::{Prop, PropertySet, PropertyValue, SharedProps, Side};
use crate::suite::HostSuites;

/// Append to an open-dimension property as the module.
fn append(props: &mut PropertySet, prop: &Prop, value: impl Into<PropertyValue>) -> PropertyResult<()> {
    let next = props.dimension(prop).unwrap_or(0);
    props.set_by(Side::Plugin, prop, next, value)
}

fn append_enum<T: EncodedEnum>(props: &mut PropertySet, prop: &Prop, value: T) -> PropertyResult<()> {
    let present = props.get_enums::<T>(prop).unwrap_or_default();
    if present.iter().any(|v| v.as_str() == value.as_str()) {
        return Ok(());
    }
    append(props, prop, value.as_str())
}

/// The effect descriptor: static capabilities of the effect.
#[derive(Clone)]
pub struct EffectDescriptor {
    handle: EffectHandle,
    props: SharedProps,
}

impl EffectDescriptor {
    /// Wrap a descriptor handle.
    pub fn new(handle: EffectHandle, props: SharedProps) -> Self {
        Self { handle, props }
    }

    /// Descriptor handle.
    pub fn handle(&self) -> EffectHandle {
        self.handle
    }

    /// Descriptor properties.
    pub fn props(&self) -> &SharedProps {
        &self.props
    }

    fn set(&self, prop: Prop, value: impl Into<PropertyValue>) -> OfxResult<()> {
        self.props.write().set_by(Side::Plugin, &prop, 0, value)?;
        Ok(())
    }

    /// User visible label.
    pub fn set_label(&self, label: &str) -> OfxResult<()> {
        self.set(Prop::Label, label)
    }

    /// Description shown in host help.
    pub fn set_description(&self, text: &str) -> OfxResult<()> {
        self.set(Prop::PluginDescription, text)
    }

    /// Menu grouping, such as "Color".
    pub fn set_grouping(&self, group: &str) -> OfxResult<()> {
        self.set(Prop::Grouping, group)
    }

    /// Declare a supported context.
    pub fn add_supported_context(&self, context: Context) -> OfxResult<()> {
        append_enum(&mut self.props.write(), &Prop::SupportedContexts, context)?;
        Ok(())
    }

    /// Declare a supported pixel depth.
    pub fn add_supported_pixel_depth(&self, depth: BitDepth) -> OfxResult<()> {
        append_enum(&mut self.props.write(), &Prop::SupportedPixelDepths, depth)?;
        Ok(())
    }

    /// Declare the render thread safety level.
    pub fn set_render_thread_safety(&self, safety: RenderThreadSafety) -> OfxResult<()> {
        self.set(Prop::RenderThreadSafety, safety.as_str())
    }

    /// Ask the host to split frames across threads itself.
    pub fn set_host_frame_threading(&self, enabled: bool) -> OfxResult<()> {
        self.set(Prop::HostFrameThreading, enabled)
    }

    /// Whether the effect accepts tiled images.
    pub fn set_supports_tiles(&self, enabled: bool) -> OfxResult<()> {
        self.set(Prop::SupportsTiles, enabled)
    }

    /// Whether inputs may differ in size.
    pub fn set_supports_multi_resolution(&self, enabled: bool) -> OfxResult<()> {
        self.set(Prop::SupportsMultiResolution, enabled)
    }

    /// Whether clips may differ in pixel depth.
    pub fn set_supports_multiple_clip_depths(&self, enabled: bool) -> OfxResult<()> {
        self.set(Prop::SupportsMultipleClipDepths, enabled)
    }

    /// Whether images are fetched at times other than the render time.
    pub fn set_temporal_clip_access(&self, enabled: bool) -> OfxResult<()> {
        self.set(Prop::TemporalClipAccess, enabled)
    }

    /// Only one instance may exist.
    pub fn set_single_instance(&self, enabled: bool) -> OfxResult<()> {
        self.set(Prop::SingleInstance, enabled)
    }

    /// Declared contexts.
    pub fn supported_contexts(&self) -> Vec<Context> {
        self.props.read().get_enums(&Prop::SupportedContexts).unwrap_or_default()
    }

    /// Declared pixel depths.
    pub fn supported_pixel_depths(&self) -> Vec<BitDepth> {
        self.props.read().get_enums(&Prop::SupportedPixelDepths).unwrap_or_default()
    }
}

/// A clip being described.
#[derive(Clone)]
pub struct ClipDescriptor {
    name: String,
    props: SharedProps,
}

impl ClipDescriptor {
    /// Wrap clip descriptor properties.
    pub fn new(name: &str, props: SharedProps) -> Self {
        Self {
            name: name.to_string(),
            props,
        }
    }

    /// Clip name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn set(&self, prop: Prop, value: impl Into<PropertyValue>) -> OfxResult<()> {
        self.props.write().set_by(Side::Plugin, &prop, 0, value)?;
        Ok(())
    }

    /// Declare a supported component layout.
    pub fn add_supported_components(&self, components: Components) -> OfxResult<()> {
        append_enum(&mut self.props.write(), &Prop::SupportedComponents, components)?;
        Ok(())
    }

    /// The clip may be left unconnected.
    pub fn set_optional(&self, optional: bool) -> OfxResult<()> {
        self.set(Prop::Optional, optional)
    }

    /// The clip is a mask.
    pub fn set_is_mask(&self, mask: bool) -> OfxResult<()> {
        self.set(Prop::IsMask, mask)
    }

    /// Whether this clip accepts tiled images.
    pub fn set_supports_tiles(&self, enabled: bool) -> OfxResult<()> {
        self.set(Prop::SupportsTiles, enabled)
    }

    /// Whether images are fetched from this clip at other times.
    pub fn set_temporal_clip_access(&self, enabled: bool) -> OfxResult<()> {
        self.set(Prop::TemporalClipAccess, enabled)
    }

    /// How interlaced input is delivered.
    pub fn set_field_extraction(&self, extraction: FieldExtraction) -> OfxResult<()> {
        self.set(Prop::FieldExtraction, extraction.as_str())
    }
}

/// The effect described for one context.
///
/// Records the clips and parameters defined so the dispatcher can resolve
/// their instance handles once at creation.
pub struct ContextDescriptor<'a> {
    effect: &'a EffectDescriptor,
    suites: &'a HostSuites,
    context: Context,
    clips: Vec<String>,
    params: Vec<String>,
}

impl<'a> ContextDescriptor<'a> {
    /// Describe `effect` in `context`.
    pub fn new(effect: &'a EffectDescriptor, suites: &'a HostSuites, context: Context) -> Self {
        Self {
            effect,
            suites,
            context,
            clips: Vec::new(),
            params: Vec::new(),
        }
    }

    /// The effect-level descriptor.
    pub fn effect(&self) -> &EffectDescriptor {
        self.effect
    }

    /// Context being described.
    pub fn context(&self) -> Context {
        self.context
    }

    /// Define a clip.
    pub fn define_clip(&mut self, name: &str) -> OfxResult<ClipDescriptor> {
        let props = self.suites.image_effect.clip_define(self.effect.handle, name)?;
        self.clips.push(name.to_string());
        Ok(ClipDescriptor::new(name, props))
    }

    /// Define a parameter.
    pub fn define_param(&mut self, descriptor: ParamDescriptor) -> OfxResult<()> {
        let name = descriptor.name.clone();
        self.suites.parameter.param_define(self.effect.handle, descriptor)?;
        self.params.push(name);
        Ok(())
    }

    /// Names of defined clips and parameters.
    pub fn into_names(self) -> (Vec<String>, Vec<String>) {
        (self.clips, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handle::Handle;

    #[test]
    fn test_effect_descriptor_lists_deduplicate() {
        let desc = EffectDescriptor::new(Handle::from_raw(0, 0), PropertySet::new().into_shared());
        desc.add_supported_context(Context::Filter).unwrap();
        desc.add_supported_context(Context::General).unwrap();
        desc.add_supported_context(Context::Filter).unwrap();
        assert_eq!(desc.supported_contexts(), vec![Context::Filter, Context::General]);
        desc.set_label("Gain").unwrap();
        assert_eq!(desc.props().read().get_string(&Prop::Label, 0).unwrap(), "Gain");
    }

    #[test]
    fn test_module_cannot_write_host_properties() {
        let desc = EffectDescriptor::new(Handle::from_raw(0, 0), PropertySet::new().into_shared());
        let err = desc.set(Prop::Context, Context::Filter.as_str()).unwrap_err();
        assert_eq!(err.status(), crate::core::status::Status::ErrValue);
    }

    #[test]
    fn test_clip_descriptor() {
        let clip = ClipDescriptor::new("Source", PropertySet::new().into_shared());
        clip.add_supported_components(Components::Rgba).unwrap();
        clip.add_supported_components(Components::Alpha).unwrap();
        clip.set_optional(true).unwrap();
        let props = clip.props.read();
        assert_eq!(
            props.get_enums::<Components>(&Prop::SupportedComponents).unwrap(),
            vec![Components::Rgba, Components::Alpha]
        );
        assert!(props.get_bool(&Prop::Optional, 0).unwrap());
    }
}

//! Clip preference negotiation.
//!
//! Runs once per instance. The host computes defaults and writes them into
//! the action's out arguments, the module overrides what it wants, and the
//! host validates the result. Overrides the host or the module's own
//! declarations cannot honour are logged and dropped rather than failing
//! the instance.

use crate::core::error::NegotiationError;
use crate::core::types::{BitDepth, Components, EncodedEnum, Field, PreMultiplication};
use crate::negotiation::EffectCapabilities;
use crate::property::{Prop, PropertySet};
use crate::core::error::PropertyResult;
use crate::suite::HostCapabilities;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::Serialize;

/// Negotiated format of one clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClipFormat {
    /// Pixel depth.
    pub depth: BitDepth,
    /// Component layout.
    pub components: Components,
    /// Pixel aspect ratio.
    pub pixel_aspect_ratio: f64,
}

impl ClipFormat {
    /// A format with square pixels.
    pub fn new(depth: BitDepth, components: Components) -> Self {
        Self {
            depth,
            components,
            pixel_aspect_ratio: 1.0,
        }
    }

    /// Set the pixel aspect ratio.
    pub fn with_pixel_aspect_ratio(mut self, par: f64) -> Self {
        self.pixel_aspect_ratio = par;
        self
    }
}

/// A clip taking part in negotiation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSpec {
    /// Clip name.
    pub name: String,
    /// The output clip.
    pub is_output: bool,
    /// Connected to upstream data. Outputs are always connected.
    pub connected: bool,
    /// Components the module declared for the clip.
    pub supported_components: Vec<Components>,
    /// What the upstream data provides before mapping.
    pub unmapped: ClipFormat,
    /// Premultiplication of the upstream data.
    pub premultiplication: PreMultiplication,
}

impl ClipSpec {
    /// A connected input.
    pub fn input(name: &str, unmapped: ClipFormat, supported: &[Components]) -> Self {
        Self {
            name: name.to_string(),
            is_output: false,
            connected: true,
            supported_components: supported.to_vec(),
            unmapped,
            premultiplication: PreMultiplication::PreMultiplied,
        }
    }

    /// The output clip.
    pub fn output(name: &str, supported: &[Components]) -> Self {
        Self {
            name: name.to_string(),
            is_output: true,
            connected: true,
            supported_components: supported.to_vec(),
            unmapped: ClipFormat::new(BitDepth::None, Components::None),
            premultiplication: PreMultiplication::PreMultiplied,
        }
    }

    /// Mark connected or not.
    pub fn with_connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    /// Set the upstream premultiplication.
    pub fn with_premultiplication(mut self, premult: PreMultiplication) -> Self {
        self.premultiplication = premult;
        self
    }
}

/// Result of clip preference negotiation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preferences {
    /// Per clip formats, in clip order.
    pub clips: IndexMap<String, ClipFormat>,
    /// Premultiplication of the output.
    pub output_premultiplication: PreMultiplication,
    /// Output frame rate.
    pub frame_rate: f64,
    /// Output fielding.
    pub field_order: Field,
    /// Output changes between frames even for static input.
    pub frame_varying: bool,
    /// Output may be sampled between frames.
    pub continuous_samples: bool,
}

impl Preferences {
    /// Format of a clip.
    pub fn clip(&self, name: &str) -> Option<&ClipFormat> {
        self.clips.get(name)
    }

    /// Write as GetClipPreferences out arguments.
    pub fn write_props(&self, out: &mut PropertySet) -> PropertyResult<()> {
        for (name, format) in &self.clips {
            out.set_enum(&Prop::ClipDepth(name.clone()), 0, format.depth)?;
            out.set_enum(&Prop::ClipComponents(name.clone()), 0, format.components)?;
            out.set(&Prop::ClipPar(name.clone()), 0, format.pixel_aspect_ratio)?;
        }
        out.set_enum(&Prop::PreMultiplication, 0, self.output_premultiplication)?;
        out.set(&Prop::FrameRate, 0, self.frame_rate)?;
        out.set_enum(&Prop::FieldOrder, 0, self.field_order)?;
        out.set(&Prop::FrameVarying, 0, self.frame_varying)?;
        out.set(&Prop::ContinuousSamples, 0, self.continuous_samples)?;
        Ok(())
    }
}

/// Negotiates clip formats between a host and one effect instance.
pub struct ClipNegotiator<'a> {
    host: &'a HostCapabilities,
    effect: &'a EffectCapabilities,
    clips: Vec<ClipSpec>,
    project_par: f64,
    frame_rate: f64,
}

impl<'a> ClipNegotiator<'a> {
    /// Create a negotiator.
    pub fn new(host: &'a HostCapabilities, effect: &'a EffectCapabilities, clips: Vec<ClipSpec>) -> Self {
        Self {
            host,
            effect,
            clips,
            project_par: 1.0,
            frame_rate: 25.0,
        }
    }

    /// Set the project pixel aspect ratio, used for outputs without input.
    pub fn with_project_par(mut self, par: f64) -> Self {
        self.project_par = par;
        self
    }

    /// Set the project frame rate.
    pub fn with_frame_rate(mut self, rate: f64) -> Self {
        self.frame_rate = rate;
        self
    }

    /// Both sides accept clips of differing depths.
    pub fn heterogeneous_depths(&self) -> bool {
        self.host.supports_multiple_clip_depths && self.effect.supports_multiple_clip_depths
    }

    /// Depths both sides support, shallowest first.
    pub fn common_depths(&self) -> Vec<BitDepth> {
        let mut common: Vec<BitDepth> = self
            .effect
            .supported_depths
            .iter()
            .copied()
            .filter(|d| *d != BitDepth::None && self.host.supported_depths.contains(d))
            .collect();
        common.sort_by_key(|d| d.precision_rank());
        common.dedup();
        common
    }

    /// The common depth that loses least when converting from `wanted`:
    /// `wanted` itself, else the shallowest deeper one, else the deepest.
    pub fn best_depth(&self, wanted: BitDepth) -> Result<BitDepth, NegotiationError> {
        let common = self.common_depths();
        if common.contains(&wanted) {
            return Ok(wanted);
        }
        common
            .iter()
            .copied()
            .find(|d| d.precision_rank() > wanted.precision_rank())
            .or_else(|| common.last().copied())
            .ok_or_else(|| NegotiationError::NoCommonDepth {
                required: self.effect.supported_depths.iter().map(|d| d.as_str().to_string()).collect(),
            })
    }

    fn components_for(&self, clip: &ClipSpec, wanted: Components) -> Result<Components, NegotiationError> {
        let candidates: Vec<Components> = clip
            .supported_components
            .iter()
            .copied()
            .filter(|c| self.host.supported_components.is_empty() || self.host.supported_components.contains(c))
            .collect();
        if candidates.contains(&wanted) {
            return Ok(wanted);
        }
        if wanted == Components::Rgb && candidates.contains(&Components::Rgba) {
            return Ok(Components::Rgba);
        }
        candidates.first().copied().ok_or_else(|| NegotiationError::NoCommonComponents {
            clip: clip.name.clone(),
            offered: clip.supported_components.iter().map(|c| c.as_str().to_string()).collect(),
        })
    }

    fn connected_inputs(&self) -> impl Iterator<Item = &ClipSpec> {
        self.clips.iter().filter(|c| !c.is_output && c.connected)
    }

    /// The host's proposal before the module has a say.
    ///
    /// Without heterogeneous depth support every clip collapses to the best
    /// common depth for the deepest connected input. Outputs follow their
    /// first connected input's components and pixel aspect ratio.
    pub fn defaults(&self) -> Result<Preferences, NegotiationError> {
        let deepest_input = BitDepth::deepest(self.connected_inputs().map(|c| c.unmapped.depth))
            .or_else(|| self.common_depths().last().copied())
            .unwrap_or(BitDepth::None);
        let common = self.best_depth(deepest_input)?;

        let mut clips = IndexMap::new();
        let mut lead: Option<ClipFormat> = None;
        for clip in self.clips.iter().filter(|c| !c.is_output) {
            let depth = if self.heterogeneous_depths() && clip.connected {
                self.best_depth(clip.unmapped.depth)?
            } else {
                common
            };
            let wanted = if clip.connected { clip.unmapped.components } else { Components::Rgba };
            let format = ClipFormat {
                depth,
                components: self.components_for(clip, wanted)?,
                pixel_aspect_ratio: if clip.connected {
                    clip.unmapped.pixel_aspect_ratio
                } else {
                    self.project_par
                },
            };
            if clip.connected && lead.is_none() {
                lead = Some(format);
            }
            clips.insert(clip.name.clone(), format);
        }
        for clip in self.clips.iter().filter(|c| c.is_output) {
            let wanted = lead.map(|f| f.components).unwrap_or(Components::Rgba);
            let format = ClipFormat {
                depth: common,
                components: self.components_for(clip, wanted)?,
                pixel_aspect_ratio: lead.map(|f| f.pixel_aspect_ratio).unwrap_or(self.project_par),
            };
            clips.insert(clip.name.clone(), format);
        }

        let output_premultiplication = self
            .connected_inputs()
            .next()
            .map(|c| c.premultiplication)
            .unwrap_or(PreMultiplication::PreMultiplied);

        Ok(Preferences {
            clips,
            output_premultiplication,
            frame_rate: self.frame_rate,
            field_order: Field::None,
            frame_varying: false,
            continuous_samples: false,
        })
    }

    /// Apply the module's overrides found in `out` to `defaults`, dropping
    /// any the negotiated capabilities forbid.
    pub fn resolve(&self, defaults: &Preferences, out: &PropertySet) -> Preferences {
        let mut prefs = defaults.clone();
        let common = self.common_depths();
        for clip in &self.clips {
            let Some(format) = prefs.clips.get_mut(&clip.name) else {
                continue;
            };
            if let Some(depth) = out.try_get_enum::<BitDepth>(&Prop::ClipDepth(clip.name.clone()), 0) {
                if depth != format.depth {
                    if !common.contains(&depth) {
                        warn!("Ignoring depth {} for clip '{}': not supported by both sides", depth, clip.name);
                    } else if !self.heterogeneous_depths() {
                        warn!(
                            "Ignoring depth {} for clip '{}': clips must share depth {}",
                            depth, clip.name, format.depth
                        );
                    } else {
                        debug!("Clip '{}' depth set to {}", clip.name, depth);
                        format.depth = depth;
                    }
                }
            }
            if let Some(components) = out.try_get_enum::<Components>(&Prop::ClipComponents(clip.name.clone()), 0) {
                if components != format.components {
                    match self.components_for(clip, components) {
                        Ok(c) if c == components => format.components = c,
                        _ => warn!(
                            "Ignoring components {} for clip '{}': not declared by the clip",
                            components, clip.name
                        ),
                    }
                }
            }
            if let Some(par) = out.try_get_double(&Prop::ClipPar(clip.name.clone()), 0) {
                if par != format.pixel_aspect_ratio {
                    if self.host.supports_multiple_clip_pars && par > 0.0 {
                        format.pixel_aspect_ratio = par;
                    } else {
                        warn!("Ignoring pixel aspect ratio {} for clip '{}'", par, clip.name);
                    }
                }
            }
        }

        if let Some(premult) = out.try_get_enum(&Prop::PreMultiplication, 0) {
            prefs.output_premultiplication = premult;
        }
        if let Some(rate) = out.try_get_double(&Prop::FrameRate, 0) {
            if rate != prefs.frame_rate {
                if self.host.setable_frame_rate && rate > 0.0 {
                    prefs.frame_rate = rate;
                } else {
                    warn!("Ignoring output frame rate {}: host rate is fixed", rate);
                }
            }
        }
        if let Some(field) = out.try_get_enum(&Prop::FieldOrder, 0) {
            if field != prefs.field_order {
                if self.host.setable_fielding {
                    prefs.field_order = field;
                } else {
                    warn!("Ignoring output fielding {}: host fielding is fixed", field);
                }
            }
        }
        prefs.frame_varying = out.try_get_bool(&Prop::FrameVarying, 0).unwrap_or(false);
        prefs.continuous_samples = out.try_get_bool(&Prop::ContinuousSamples, 0).unwrap_or(false);
        prefs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::args::ClipPreferences;

    fn host(multi_depth: bool) -> HostCapabilities {
        let mut props = PropertySet::new();
        props.set(&Prop::SupportsMultipleClipDepths, 0, multi_depth).unwrap();
        props
            .set_enums(&Prop::SupportedPixelDepths, &[BitDepth::Byte, BitDepth::Short, BitDepth::Float])
            .unwrap();
        props
            .set_enums(&Prop::SupportedComponents, &[Components::Rgba, Components::Rgb, Components::Alpha])
            .unwrap();
        HostCapabilities::from_props(&props)
    }

    fn effect(depths: &[BitDepth], multi_depth: bool) -> EffectCapabilities {
        EffectCapabilities {
            supported_depths: depths.to_vec(),
            supports_multiple_clip_depths: multi_depth,
            ..EffectCapabilities::default()
        }
    }

    fn filter_clips(source_depth: BitDepth) -> Vec<ClipSpec> {
        vec![
            ClipSpec::input("Source", ClipFormat::new(source_depth, Components::Rgb), &[Components::Rgba]),
            ClipSpec::output("Output", &[Components::Rgba]),
        ]
    }

    #[test]
    fn test_collapses_to_common_depth() {
        let host = host(false);
        let effect = effect(&[BitDepth::Byte, BitDepth::Float], false);
        let negotiator = ClipNegotiator::new(&host, &effect, filter_clips(BitDepth::Short));
        let prefs = negotiator.defaults().unwrap();
        assert_eq!(prefs.clip("Source").unwrap().depth, BitDepth::Float);
        assert_eq!(prefs.clip("Output").unwrap().depth, BitDepth::Float);
        assert_eq!(prefs.clip("Source").unwrap().components, Components::Rgba);
        assert_eq!(prefs.clip("Output").unwrap().components, Components::Rgba);
    }

    #[test]
    fn test_deepest_common_when_nothing_deeper() {
        let host = host(false);
        let effect = effect(&[BitDepth::Byte], false);
        let negotiator = ClipNegotiator::new(&host, &effect, filter_clips(BitDepth::Float));
        assert_eq!(negotiator.best_depth(BitDepth::Float).unwrap(), BitDepth::Byte);
    }

    #[test]
    fn test_no_common_depth() {
        let host = host(false);
        let effect = effect(&[], false);
        let negotiator = ClipNegotiator::new(&host, &effect, filter_clips(BitDepth::Byte));
        assert!(matches!(
            negotiator.defaults(),
            Err(NegotiationError::NoCommonDepth { .. })
        ));
    }

    #[test]
    fn test_override_ignored_without_heterogeneous_support() {
        let host = host(false);
        let effect = effect(&[BitDepth::Byte, BitDepth::Float], true);
        let negotiator = ClipNegotiator::new(&host, &effect, filter_clips(BitDepth::Byte));
        let defaults = negotiator.defaults().unwrap();
        let mut out = PropertySet::new();
        defaults.write_props(&mut out).unwrap();
        ClipPreferences::new(&mut out).set_depth("Output", BitDepth::Float).unwrap();
        let prefs = negotiator.resolve(&defaults, &out);
        assert_eq!(prefs.clip("Output").unwrap().depth, BitDepth::Byte);
    }

    #[test]
    fn test_override_accepted_with_heterogeneous_support() {
        let host = host(true);
        let effect = effect(&[BitDepth::Byte, BitDepth::Float], true);
        let negotiator = ClipNegotiator::new(&host, &effect, filter_clips(BitDepth::Byte));
        let defaults = negotiator.defaults().unwrap();
        let mut out = PropertySet::new();
        defaults.write_props(&mut out).unwrap();
        let mut setter = ClipPreferences::new(&mut out);
        setter.set_depth("Output", BitDepth::Float).unwrap();
        setter.set_output_premultiplication(PreMultiplication::UnPreMultiplied).unwrap();
        setter.set_frame_varying(true).unwrap();
        let prefs = negotiator.resolve(&defaults, &out);
        assert_eq!(prefs.clip("Output").unwrap().depth, BitDepth::Float);
        assert_eq!(prefs.clip("Source").unwrap().depth, BitDepth::Byte);
        assert_eq!(prefs.output_premultiplication, PreMultiplication::UnPreMultiplied);
        assert!(prefs.frame_varying);
    }

    #[test]
    fn test_undeclared_components_rejected() {
        let host = host(true);
        let effect = effect(&[BitDepth::Float], false);
        let negotiator = ClipNegotiator::new(&host, &effect, filter_clips(BitDepth::Float));
        let defaults = negotiator.defaults().unwrap();
        let mut out = PropertySet::new();
        defaults.write_props(&mut out).unwrap();
        ClipPreferences::new(&mut out).set_components("Output", Components::Alpha).unwrap();
        let prefs = negotiator.resolve(&defaults, &out);
        assert_eq!(prefs.clip("Output").unwrap().components, Components::Rgba);
    }

    #[test]
    fn test_frame_rate_fixed_unless_setable() {
        let host = host(false);
        let effect = effect(&[BitDepth::Float], false);
        let negotiator = ClipNegotiator::new(&host, &effect, filter_clips(BitDepth::Float)).with_frame_rate(24.0);
        let defaults = negotiator.defaults().unwrap();
        let mut out = PropertySet::new();
        defaults.write_props(&mut out).unwrap();
        ClipPreferences::new(&mut out).set_output_frame_rate(50.0).unwrap();
        assert_eq!(negotiator.resolve(&defaults, &out).frame_rate, 24.0);
    }

    #[test]
    fn test_generator_output_uses_project() {
        let host = host(false);
        let effect = effect(&[BitDepth::Byte, BitDepth::Float], false);
        let clips = vec![ClipSpec::output("Output", &[Components::Rgba])];
        let negotiator = ClipNegotiator::new(&host, &effect, clips).with_project_par(2.0);
        let prefs = negotiator.defaults().unwrap();
        let output = prefs.clip("Output").unwrap();
        assert_eq!(output.depth, BitDepth::Float);
        assert_eq!(output.pixel_aspect_ratio, 2.0);
        assert_eq!(prefs.output_premultiplication, PreMultiplication::PreMultiplied);
    }
}

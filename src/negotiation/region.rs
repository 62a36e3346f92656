//! Default regions of definition and interest, time domains and frames
//! needed.

use crate::core::geometry::RectD;
use crate::core::types::Context;

/// What region defaults need to know about one input clip.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRegion {
    /// Clip name.
    pub name: String,
    /// Clip may be unconnected.
    pub optional: bool,
    /// Clip is connected.
    pub connected: bool,
    /// Clip region of definition at the time in question.
    pub rod: RectD,
    /// Clip frame range.
    pub frame_range: (f64, f64),
}

impl InputRegion {
    /// A connected, mandatory input.
    pub fn connected(name: &str, rod: RectD) -> Self {
        Self {
            name: name.to_string(),
            optional: false,
            connected: true,
            rod,
            frame_range: (0.0, 0.0),
        }
    }

    /// Mark optional.
    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Set the frame range.
    pub fn with_frame_range(mut self, first: f64, last: f64) -> Self {
        self.frame_range = (first, last);
        self
    }
}

fn union_of<'a>(rects: impl Iterator<Item = &'a RectD>) -> Option<RectD> {
    rects.fold(None, |acc: Option<RectD>, r| match acc {
        None => Some(*r),
        Some(u) => Some(u.union(r)),
    })
}

/// The region of definition an effect gets when it does not compute one.
///
/// Generators cover the project. Filters take their source's region,
/// transitions the union of both sources, and the general case the union of
/// every connected mandatory input. Without usable inputs the project
/// extent is used.
pub fn default_region_of_definition(context: Context, inputs: &[InputRegion], project: RectD) -> RectD {
    let connected = || inputs.iter().filter(|i| i.connected);
    let rod = match context {
        Context::Generator => None,
        Context::Filter | Context::Paint | Context::Retimer => connected()
            .find(|i| i.name == crate::plugin::SOURCE_CLIP)
            .or_else(|| connected().next())
            .map(|i| i.rod),
        Context::Transition => union_of(connected().map(|i| &i.rod)),
        Context::General => union_of(connected().filter(|i| !i.optional).map(|i| &i.rod)),
    };
    rod.unwrap_or(project)
}

/// Default regions of interest: the requested region clipped to each
/// connected input's region of definition.
pub fn default_regions_of_interest(region: &RectD, inputs: &[InputRegion]) -> Vec<(String, RectD)> {
    inputs
        .iter()
        .filter(|i| i.connected)
        .map(|i| (i.name.clone(), region.clip(&i.rod)))
        .collect()
}

/// Clip a region of interest to its clip's region of definition. Hosts
/// apply this to every region an effect declares.
pub fn enforce_region_of_interest(requested: &RectD, rod: &RectD) -> RectD {
    requested.clip(rod)
}

/// Grow a requested region by a filter support radius.
pub fn grow_for_kernel(region: &RectD, radius: f64) -> RectD {
    region.grow(radius)
}

/// Default time domain: the union of connected inputs' frame ranges, or
/// the project range for effects without inputs.
pub fn default_time_domain(context: Context, inputs: &[InputRegion], project: (f64, f64)) -> (f64, f64) {
    if context == Context::Generator {
        return project;
    }
    inputs
        .iter()
        .filter(|i| i.connected)
        .map(|i| i.frame_range)
        .fold(None, |acc: Option<(f64, f64)>, (a, b)| match acc {
            None => Some((a, b)),
            Some((lo, hi)) => Some((lo.min(a), hi.max(b))),
        })
        .unwrap_or(project)
}

/// Default frames needed: the current frame from every connected input.
pub fn default_frames_needed(time: f64, inputs: &[InputRegion]) -> Vec<(String, (f64, f64))> {
    inputs
        .iter()
        .filter(|i| i.connected)
        .map(|i| (i.name.clone(), (time, time)))
        .collect()
}

//! Parameter descriptors and values.
//!
//! Parameters are named, typed values a module declares during
//! describe-in-context. Each carries a default and, for numeric kinds, a
//! legal range and a display range.

use crate::core::error::ParamError;
use crate::core::types::EncodedEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// One double.
    Double,
    /// Two doubles.
    Double2D,
    /// One integer.
    Integer,
    /// A boolean.
    Boolean,
    /// An index into a list of options.
    Choice,
    /// An RGBA colour.
    Rgba,
    /// A string.
    String,
    /// A grouping of other parameters.
    Group,
    /// A page of the user interface.
    Page,
}

impl EncodedEnum for ParamType {
    const ALL: &'static [Self] = &[
        ParamType::Double,
        ParamType::Double2D,
        ParamType::Integer,
        ParamType::Boolean,
        ParamType::Choice,
        ParamType::Rgba,
        ParamType::String,
        ParamType::Group,
        ParamType::Page,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            ParamType::Double => "OfxParamTypeDouble",
            ParamType::Double2D => "OfxParamTypeDouble2D",
            ParamType::Integer => "OfxParamTypeInteger",
            ParamType::Boolean => "OfxParamTypeBoolean",
            ParamType::Choice => "OfxParamTypeChoice",
            ParamType::Rgba => "OfxParamTypeRGBA",
            ParamType::String => "OfxParamTypeString",
            ParamType::Group => "OfxParamTypeGroup",
            ParamType::Page => "OfxParamTypePage",
        }
    }
}

impl ParamType {
    /// True if values of this kind can be keyframed.
    pub fn can_animate(self) -> bool {
        matches!(
            self,
            ParamType::Double
                | ParamType::Double2D
                | ParamType::Integer
                | ParamType::Boolean
                | ParamType::Choice
                | ParamType::Rgba
        )
    }

    /// True if keyframes interpolate linearly rather than stepping.
    pub fn interpolates(self) -> bool {
        matches!(
            self,
            ParamType::Double | ParamType::Double2D | ParamType::Integer | ParamType::Rgba
        )
    }
}

/// How a double parameter is interpreted by the host interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoubleType {
    /// A plain number.
    #[default]
    Plain,
    /// A scale factor.
    Scale,
    /// An angle in degrees.
    Angle,
    /// An absolute position in canonical coordinates.
    XyAbsolute,
}

/// A parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ParamValue {
    /// One double.
    Double(f64),
    /// Two doubles.
    Double2D(f64, f64),
    /// One integer.
    Integer(i32),
    /// A boolean.
    Boolean(bool),
    /// A choice index.
    Choice(usize),
    /// RGBA components.
    Rgba([f64; 4]),
    /// A string.
    String(String),
    /// No value, for groups and pages.
    None,
}

impl ParamValue {
    /// The parameter kind this value belongs to, if any.
    pub fn param_type(&self) -> Option<ParamType> {
        match self {
            ParamValue::Double(_) => Some(ParamType::Double),
            ParamValue::Double2D(..) => Some(ParamType::Double2D),
            ParamValue::Integer(_) => Some(ParamType::Integer),
            ParamValue::Boolean(_) => Some(ParamType::Boolean),
            ParamValue::Choice(_) => Some(ParamType::Choice),
            ParamValue::Rgba(_) => Some(ParamType::Rgba),
            ParamValue::String(_) => Some(ParamType::String),
            ParamValue::None => None,
        }
    }

    /// Try to get as a double.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            ParamValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as a 2D double.
    pub fn as_double2d(&self) -> Option<(f64, f64)> {
        match self {
            ParamValue::Double2D(x, y) => Some((*x, *y)),
            _ => None,
        }
    }

    /// Try to get as an integer.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            ParamValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as a choice index.
    pub fn as_choice(&self) -> Option<usize> {
        match self {
            ParamValue::Choice(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as RGBA.
    pub fn as_rgba(&self) -> Option<[f64; 4]> {
        match self {
            ParamValue::Rgba(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Linear blend between two values of the same interpolating kind;
    /// other kinds step to `self`.
    pub fn lerp(&self, other: &ParamValue, t: f64) -> ParamValue {
        let mix = |a: f64, b: f64| a + (b - a) * t;
        match (self, other) {
            (ParamValue::Double(a), ParamValue::Double(b)) => ParamValue::Double(mix(*a, *b)),
            (ParamValue::Double2D(ax, ay), ParamValue::Double2D(bx, by)) => {
                ParamValue::Double2D(mix(*ax, *bx), mix(*ay, *by))
            }
            (ParamValue::Integer(a), ParamValue::Integer(b)) => {
                ParamValue::Integer(mix(*a as f64, *b as f64).round() as i32)
            }
            (ParamValue::Rgba(a), ParamValue::Rgba(b)) => ParamValue::Rgba([
                mix(a[0], b[0]),
                mix(a[1], b[1]),
                mix(a[2], b[2]),
                mix(a[3], b[3]),
            ]),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Double(v) => write!(f, "{}", v),
            ParamValue::Double2D(x, y) => write!(f, "({}, {})", x, y),
            ParamValue::Integer(v) => write!(f, "{}", v),
            ParamValue::Boolean(v) => write!(f, "{}", v),
            ParamValue::Choice(v) => write!(f, "#{}", v),
            ParamValue::Rgba(c) => write!(f, "rgba({}, {}, {}, {})", c[0], c[1], c[2], c[3]),
            ParamValue::String(s) => write!(f, "\"{}\"", s),
            ParamValue::None => write!(f, "none"),
        }
    }
}

/// Static description of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    /// Unique name within the effect.
    pub name: String,
    /// User visible label.
    pub label: String,
    /// Tooltip text.
    pub hint: String,
    /// Kind of value.
    pub param_type: ParamType,
    /// Default value.
    pub default: ParamValue,
    /// Smallest legal value.
    pub min: Option<ParamValue>,
    /// Largest legal value.
    pub max: Option<ParamValue>,
    /// Smallest value shown on a slider.
    pub display_min: Option<ParamValue>,
    /// Largest value shown on a slider.
    pub display_max: Option<ParamValue>,
    /// Choice labels.
    pub options: Vec<String>,
    /// Whether the value may be keyframed.
    pub animates: bool,
    /// Name of the containing group.
    pub parent: Option<String>,
    /// Interpretation of double values.
    pub double_type: DoubleType,
}

impl ParamDescriptor {
    fn new(name: &str, param_type: ParamType, default: ParamValue) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            hint: String::new(),
            param_type,
            default,
            min: None,
            max: None,
            display_min: None,
            display_max: None,
            options: Vec::new(),
            animates: param_type.can_animate(),
            parent: None,
            double_type: DoubleType::Plain,
        }
    }

    /// A double parameter.
    pub fn double(name: &str, default: f64) -> Self {
        Self::new(name, ParamType::Double, ParamValue::Double(default))
    }

    /// A 2D double parameter.
    pub fn double2d(name: &str, default: (f64, f64)) -> Self {
        Self::new(name, ParamType::Double2D, ParamValue::Double2D(default.0, default.1))
    }

    /// An integer parameter.
    pub fn integer(name: &str, default: i32) -> Self {
        Self::new(name, ParamType::Integer, ParamValue::Integer(default))
    }

    /// A boolean parameter.
    pub fn boolean(name: &str, default: bool) -> Self {
        Self::new(name, ParamType::Boolean, ParamValue::Boolean(default))
    }

    /// A choice parameter.
    pub fn choice(name: &str, options: &[&str], default: usize) -> Self {
        let mut d = Self::new(name, ParamType::Choice, ParamValue::Choice(default));
        d.options = options.iter().map(|s| s.to_string()).collect();
        d
    }

    /// An RGBA parameter.
    pub fn rgba(name: &str, default: [f64; 4]) -> Self {
        Self::new(name, ParamType::Rgba, ParamValue::Rgba(default))
    }

    /// A string parameter.
    pub fn string(name: &str, default: &str) -> Self {
        Self::new(name, ParamType::String, ParamValue::String(default.to_string()))
    }

    /// A group parameter.
    pub fn group(name: &str) -> Self {
        Self::new(name, ParamType::Group, ParamValue::None)
    }

    /// A page parameter.
    pub fn page(name: &str) -> Self {
        Self::new(name, ParamType::Page, ParamValue::None)
    }

    /// Builder: set the label.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Builder: set the hint.
    pub fn with_hint(mut self, hint: &str) -> Self {
        self.hint = hint.to_string();
        self
    }

    /// Builder: set the legal range.
    pub fn with_range(mut self, min: ParamValue, max: ParamValue) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Builder: set the slider range.
    pub fn with_display_range(mut self, min: ParamValue, max: ParamValue) -> Self {
        self.display_min = Some(min);
        self.display_max = Some(max);
        self
    }

    /// Builder: set the containing group.
    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    /// Builder: enable or disable keyframing.
    pub fn with_animation(mut self, animates: bool) -> Self {
        self.animates = animates && self.param_type.can_animate();
        self
    }

    /// Builder: set the double interpretation.
    pub fn with_double_type(mut self, double_type: DoubleType) -> Self {
        self.double_type = double_type;
        self
    }

    /// Check a value against this descriptor, clamping numeric values into
    /// the legal range.
    pub fn validate(&self, value: ParamValue) -> Result<ParamValue, ParamError> {
        if value.param_type() != Some(self.param_type) {
            return Err(ParamError::WrongKind {
                name: self.name.clone(),
                expected: self.param_type.as_str(),
            });
        }
        let value = match value {
            ParamValue::Choice(index) if index >= self.options.len() => {
                return Err(ParamError::BadChoice {
                    name: self.name.clone(),
                    index,
                })
            }
            other => other,
        };
        Ok(self.clamp(value))
    }

    fn clamp(&self, value: ParamValue) -> ParamValue {
        let lower = |v: f64, b: Option<f64>| b.map_or(v, |b| v.max(b));
        let upper = |v: f64, b: Option<f64>| b.map_or(v, |b| v.min(b));
        match value {
            ParamValue::Double(v) => {
                let min = self.min.as_ref().and_then(ParamValue::as_double);
                let max = self.max.as_ref().and_then(ParamValue::as_double);
                ParamValue::Double(upper(lower(v, min), max))
            }
            ParamValue::Double2D(x, y) => {
                let min = self.min.as_ref().and_then(ParamValue::as_double2d);
                let max = self.max.as_ref().and_then(ParamValue::as_double2d);
                ParamValue::Double2D(
                    upper(lower(x, min.map(|m| m.0)), max.map(|m| m.0)),
                    upper(lower(y, min.map(|m| m.1)), max.map(|m| m.1)),
                )
            }
            ParamValue::Integer(v) => {
                let min = self.min.as_ref().and_then(ParamValue::as_int);
                let max = self.max.as_ref().and_then(ParamValue::as_int);
                let v = min.map_or(v, |m| v.max(m));
                ParamValue::Integer(max.map_or(v, |m| v.min(m)))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_clamps_to_range() {
        let gain = ParamDescriptor::double("gain", 1.0)
            .with_range(ParamValue::Double(0.0), ParamValue::Double(10.0));
        assert_eq!(gain.validate(ParamValue::Double(-2.0)), Ok(ParamValue::Double(0.0)));
        assert_eq!(gain.validate(ParamValue::Double(3.5)), Ok(ParamValue::Double(3.5)));
        assert_eq!(gain.validate(ParamValue::Double(11.0)), Ok(ParamValue::Double(10.0)));
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let flag = ParamDescriptor::boolean("applyToAlpha", false);
        assert!(matches!(
            flag.validate(ParamValue::Double(1.0)),
            Err(ParamError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_choice_bounds() {
        let mode = ParamDescriptor::choice("mode", &["a", "b"], 0);
        assert_eq!(mode.validate(ParamValue::Choice(1)), Ok(ParamValue::Choice(1)));
        assert!(matches!(
            mode.validate(ParamValue::Choice(2)),
            Err(ParamError::BadChoice { index: 2, .. })
        ));
    }

    #[test]
    fn test_lerp() {
        let a = ParamValue::Double2D(0.0, 10.0);
        let b = ParamValue::Double2D(10.0, 20.0);
        assert_eq!(a.lerp(&b, 0.5), ParamValue::Double2D(5.0, 15.0));
        let s = ParamValue::Boolean(false);
        assert_eq!(s.lerp(&ParamValue::Boolean(true), 0.9), s);
    }

    #[test]
    fn test_groups_do_not_animate() {
        let g = ParamDescriptor::group("advanced").with_animation(true);
        assert!(!g.animates);
        assert!(ParamDescriptor::double("x", 0.0).animates);
    }
}

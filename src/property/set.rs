//! Property sets: typed, named bags of values.

use crate::core::error::{PropertyError, PropertyResult};
use crate::core::geometry::{PointD, RectD, RectI};
use crate::core::types::EncodedEnum;
use crate::property::key::{Dimension, Prop, Side};
use crate::property::value::{OpaquePointer, PropertyType, PropertyValue};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// A property set shared between the host and a module for the life of an
/// object (instance, clip, descriptor).
pub type SharedProps = Arc<RwLock<PropertySet>>;

/// A typed key/value container.
///
/// Every access is checked against the property's static contract. Reading a
/// property that was never set reports [`PropertyError::Unknown`], which is
/// how a host signals that it does not support a property; the `try_*`
/// accessors turn that into `None`. Writing a property the set does not yet
/// hold defines it, filling a fixed dimension with zero values.
#[derive(Debug, Clone, Default)]
pub struct PropertySet {
    values: IndexMap<Prop, Vec<PropertyValue>>,
}

impl PropertySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap this set for sharing.
    pub fn into_shared(self) -> SharedProps {
        Arc::new(RwLock::new(self))
    }

    /// Define a property with its zero values.
    pub fn define(&mut self, prop: Prop) -> &mut Self {
        let spec = prop.spec();
        let values = match spec.dimension {
            Dimension::Fixed(n) => vec![PropertyValue::default_for(spec.ty); n],
            Dimension::Open => Vec::new(),
        };
        self.values.insert(prop, values);
        self
    }

    /// True if the set holds the property.
    pub fn contains(&self, prop: &Prop) -> bool {
        self.values.contains_key(prop)
    }

    /// Number of properties held.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the set holds nothing.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over properties and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&Prop, &[PropertyValue])> {
        self.values.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Current number of values of a property.
    pub fn dimension(&self, prop: &Prop) -> PropertyResult<usize> {
        self.values
            .get(prop)
            .map(Vec::len)
            .ok_or_else(|| unknown(prop))
    }

    /// Restore a property to its zero values, or an empty list.
    pub fn reset(&mut self, prop: &Prop) -> PropertyResult<()> {
        if !self.contains(prop) {
            return Err(unknown(prop));
        }
        self.define(prop.clone());
        Ok(())
    }

    /// Remove a property entirely.
    pub fn remove(&mut self, prop: &Prop) -> Option<Vec<PropertyValue>> {
        self.values.shift_remove(prop)
    }

    // ========================================================================
    // Raw access
    // ========================================================================

    /// Get one value, checking the declared type.
    pub fn get(&self, prop: &Prop, index: usize, ty: PropertyType) -> PropertyResult<&PropertyValue> {
        let spec = prop.spec();
        if spec.ty != ty {
            return Err(PropertyError::TypeMismatch {
                name: prop.name().into_owned(),
                expected: spec.ty,
                got: ty,
            });
        }
        let values = self.values.get(prop).ok_or_else(|| unknown(prop))?;
        values.get(index).ok_or_else(|| PropertyError::BadIndex {
            name: prop.name().into_owned(),
            index,
            dimension: values.len(),
        })
    }

    /// Set one value.
    ///
    /// Open properties accept an index equal to their current length, which
    /// appends; anything further out is a bad index.
    pub fn set(&mut self, prop: &Prop, index: usize, value: impl Into<PropertyValue>) -> PropertyResult<()> {
        let value = value.into();
        let spec = prop.spec();
        if value.get_type() != spec.ty {
            return Err(PropertyError::TypeMismatch {
                name: prop.name().into_owned(),
                expected: spec.ty,
                got: value.get_type(),
            });
        }
        if !self.contains(prop) {
            self.define(prop.clone());
        }
        let values = self.values.get_mut(prop).ok_or_else(|| unknown(prop))?;
        let limit = match spec.dimension {
            Dimension::Fixed(n) => n,
            Dimension::Open => values.len() + 1,
        };
        if index >= limit {
            return Err(PropertyError::BadIndex {
                name: prop.name().into_owned(),
                index,
                dimension: values.len(),
            });
        }
        if index == values.len() {
            values.push(value);
        } else {
            values[index] = value;
        }
        Ok(())
    }

    /// Set one value on behalf of `side`, enforcing the declared writer.
    pub fn set_by(
        &mut self,
        side: Side,
        prop: &Prop,
        index: usize,
        value: impl Into<PropertyValue>,
    ) -> PropertyResult<()> {
        if !prop.spec().writable_by(side) {
            return Err(PropertyError::ReadOnly {
                name: prop.name().into_owned(),
                writer: side.name(),
            });
        }
        self.set(prop, index, value)
    }

    /// Replace all values of a property.
    pub fn set_all<V: Into<PropertyValue>>(
        &mut self,
        prop: &Prop,
        values: impl IntoIterator<Item = V>,
    ) -> PropertyResult<()> {
        let spec = prop.spec();
        let values: Vec<PropertyValue> = values.into_iter().map(Into::into).collect();
        if let Some(bad) = values.iter().find(|v| v.get_type() != spec.ty) {
            return Err(PropertyError::TypeMismatch {
                name: prop.name().into_owned(),
                expected: spec.ty,
                got: bad.get_type(),
            });
        }
        if let Dimension::Fixed(n) = spec.dimension {
            if values.len() != n {
                return Err(PropertyError::BadIndex {
                    name: prop.name().into_owned(),
                    index: values.len(),
                    dimension: n,
                });
            }
        }
        self.values.insert(prop.clone(), values);
        Ok(())
    }

    // ========================================================================
    // Typed getters
    // ========================================================================

    /// Get an integer.
    pub fn get_int(&self, prop: &Prop, index: usize) -> PropertyResult<i32> {
        let v = self.get(prop, index, PropertyType::Int)?;
        Ok(v.as_int().unwrap_or_default())
    }

    /// Get an integer as a boolean.
    pub fn get_bool(&self, prop: &Prop, index: usize) -> PropertyResult<bool> {
        self.get_int(prop, index).map(|v| v != 0)
    }

    /// Get a double.
    pub fn get_double(&self, prop: &Prop, index: usize) -> PropertyResult<f64> {
        let v = self.get(prop, index, PropertyType::Double)?;
        Ok(v.as_double().unwrap_or_default())
    }

    /// Get a string.
    pub fn get_string(&self, prop: &Prop, index: usize) -> PropertyResult<&str> {
        let v = self.get(prop, index, PropertyType::String)?;
        Ok(v.as_str().unwrap_or_default())
    }

    /// Get a byte blob.
    pub fn get_bytes(&self, prop: &Prop, index: usize) -> PropertyResult<&[u8]> {
        let v = self.get(prop, index, PropertyType::Bytes)?;
        Ok(v.as_bytes().unwrap_or_default())
    }

    /// Get a pointer.
    pub fn get_pointer(&self, prop: &Prop, index: usize) -> PropertyResult<OpaquePointer> {
        let v = self.get(prop, index, PropertyType::Pointer)?;
        Ok(v.as_pointer().cloned().unwrap_or_default())
    }

    /// Get a string-encoded enumeration.
    pub fn get_enum<T: EncodedEnum>(&self, prop: &Prop, index: usize) -> PropertyResult<T> {
        let s = self.get_string(prop, index)?;
        T::parse(s).ok_or_else(|| PropertyError::BadEnum {
            name: prop.name().into_owned(),
            value: s.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Get every value of a string-encoded enumeration list, skipping
    /// entries this build does not recognise.
    pub fn get_enums<T: EncodedEnum>(&self, prop: &Prop) -> PropertyResult<Vec<T>> {
        let n = self.dimension(prop)?;
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            if let Some(v) = T::parse(self.get_string(prop, i)?) {
                out.push(v);
            }
        }
        Ok(out)
    }

    /// Get every string of a list property.
    pub fn get_strings(&self, prop: &Prop) -> PropertyResult<Vec<String>> {
        let n = self.dimension(prop)?;
        (0..n)
            .map(|i| self.get_string(prop, i).map(str::to_string))
            .collect()
    }

    /// Get every double of a list property.
    pub fn get_doubles(&self, prop: &Prop) -> PropertyResult<Vec<f64>> {
        let n = self.dimension(prop)?;
        (0..n).map(|i| self.get_double(prop, i)).collect()
    }

    /// Get a 4-integer rectangle.
    pub fn get_rect_i(&self, prop: &Prop) -> PropertyResult<RectI> {
        Ok(RectI::new(
            self.get_int(prop, 0)?,
            self.get_int(prop, 1)?,
            self.get_int(prop, 2)?,
            self.get_int(prop, 3)?,
        ))
    }

    /// Get a 4-double rectangle.
    pub fn get_rect_d(&self, prop: &Prop) -> PropertyResult<RectD> {
        Ok(RectD::new(
            self.get_double(prop, 0)?,
            self.get_double(prop, 1)?,
            self.get_double(prop, 2)?,
            self.get_double(prop, 3)?,
        ))
    }

    /// Get a 2-double point.
    pub fn get_point_d(&self, prop: &Prop) -> PropertyResult<PointD> {
        Ok(PointD::new(self.get_double(prop, 0)?, self.get_double(prop, 1)?))
    }

    // ========================================================================
    // Fallible getters
    // ========================================================================

    /// Get an integer if the property is present.
    pub fn try_get_int(&self, prop: &Prop, index: usize) -> Option<i32> {
        self.get_int(prop, index).ok()
    }

    /// Get a boolean if the property is present.
    pub fn try_get_bool(&self, prop: &Prop, index: usize) -> Option<bool> {
        self.get_bool(prop, index).ok()
    }

    /// Get a double if the property is present.
    pub fn try_get_double(&self, prop: &Prop, index: usize) -> Option<f64> {
        self.get_double(prop, index).ok()
    }

    /// Get a string if the property is present.
    pub fn try_get_string(&self, prop: &Prop, index: usize) -> Option<&str> {
        self.get_string(prop, index).ok()
    }

    /// Get an enumeration if the property is present and valid.
    pub fn try_get_enum<T: EncodedEnum>(&self, prop: &Prop, index: usize) -> Option<T> {
        self.get_enum(prop, index).ok()
    }

    /// Get a double rectangle if the property is present.
    pub fn try_get_rect_d(&self, prop: &Prop) -> Option<RectD> {
        self.get_rect_d(prop).ok()
    }

    // ========================================================================
    // Typed setters
    // ========================================================================

    /// Set an enumeration value.
    pub fn set_enum<T: EncodedEnum>(&mut self, prop: &Prop, index: usize, value: T) -> PropertyResult<()> {
        self.set(prop, index, value.as_str())
    }

    /// Replace a list with enumeration values.
    pub fn set_enums<T: EncodedEnum>(&mut self, prop: &Prop, values: &[T]) -> PropertyResult<()> {
        self.set_all(prop, values.iter().map(|v| v.as_str()))
    }

    /// Set a 4-integer rectangle.
    pub fn set_rect_i(&mut self, prop: &Prop, r: RectI) -> PropertyResult<()> {
        self.set_all(prop, r.to_array())
    }

    /// Set a 4-double rectangle.
    pub fn set_rect_d(&mut self, prop: &Prop, r: RectD) -> PropertyResult<()> {
        self.set_all(prop, r.to_array())
    }

    /// Set a 2-double point.
    pub fn set_point_d(&mut self, prop: &Prop, p: PointD) -> PropertyResult<()> {
        self.set_all(prop, [p.x, p.y])
    }

    /// A JSON object of every property, for diagnostics.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .values
            .iter()
            .map(|(prop, values)| {
                let rendered = match values.as_slice() {
                    [single] if matches!(prop.spec().dimension, Dimension::Fixed(1)) => single.to_json(),
                    many => serde_json::Value::Array(many.iter().map(PropertyValue::to_json).collect()),
                };
                (prop.name().into_owned(), rendered)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

fn unknown(prop: &Prop) -> PropertyError {
    PropertyError::Unknown {
        name: prop.name().into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::Status;
    use crate::core::types::BitDepth;

    #[test]
    fn test_unknown_property() {
        let props = PropertySet::new();
        let err = props.get_int(&Prop::RowBytes, 0).unwrap_err();
        assert_eq!(err.status(), Status::ErrUnknown);
        assert_eq!(props.try_get_int(&Prop::RowBytes, 0), None);
    }

    #[test]
    fn test_type_mismatch() {
        let mut props = PropertySet::new();
        props.set(&Prop::RowBytes, 0, 128).unwrap();
        let err = props.get_double(&Prop::RowBytes, 0).unwrap_err();
        assert_eq!(err.status(), Status::ErrValue);

        let err = props.set(&Prop::RowBytes, 0, 1.5).unwrap_err();
        assert_eq!(err.status(), Status::ErrValue);
        assert_eq!(props.get_int(&Prop::RowBytes, 0).unwrap(), 128);
    }

    #[test]
    fn test_fixed_dimension() {
        let mut props = PropertySet::new();
        props.set(&Prop::Bounds, 2, 640).unwrap();
        assert_eq!(props.dimension(&Prop::Bounds).unwrap(), 4);
        assert_eq!(props.get_rect_i(&Prop::Bounds).unwrap(), RectI::new(0, 0, 640, 0));

        let err = props.set(&Prop::Bounds, 4, 1).unwrap_err();
        assert_eq!(err.status(), Status::ErrBadIndex);
        let err = props.get_int(&Prop::Bounds, 7).unwrap_err();
        assert_eq!(err.status(), Status::ErrBadIndex);
    }

    #[test]
    fn test_open_dimension_appends() {
        let mut props = PropertySet::new();
        let prop = Prop::SupportedPixelDepths;
        for (i, depth) in [BitDepth::Byte, BitDepth::Short, BitDepth::Float].iter().enumerate() {
            props.set_enum(&prop, i, *depth).unwrap();
        }
        assert_eq!(props.dimension(&prop).unwrap(), 3);
        assert_eq!(
            props.get_enums::<BitDepth>(&prop).unwrap(),
            vec![BitDepth::Byte, BitDepth::Short, BitDepth::Float]
        );

        // Skipping an index is not an append.
        let err = props.set(&prop, 5, "OfxBitDepthByte").unwrap_err();
        assert_eq!(err.status(), Status::ErrBadIndex);

        // Overwrite in place.
        props.set_enum(&prop, 0, BitDepth::Float).unwrap();
        assert_eq!(props.dimension(&prop).unwrap(), 3);
    }

    #[test]
    fn test_set_all_checks_dimension() {
        let mut props = PropertySet::new();
        assert!(props.set_all(&Prop::RenderWindow, [0, 0, 10]).is_err());
        props.set_rect_i(&Prop::RenderWindow, RectI::new(0, 0, 10, 20)).unwrap();
        assert_eq!(
            props.get_rect_i(&Prop::RenderWindow).unwrap(),
            RectI::new(0, 0, 10, 20)
        );
    }

    #[test]
    fn test_writer_enforced() {
        let mut props = PropertySet::new();
        let err = props.set_by(Side::Plugin, &Prop::Context, 0, "x").unwrap_err();
        assert_eq!(err.status(), Status::ErrValue);
        props
            .set_by(Side::Plugin, &Prop::InstanceData, 0, OpaquePointer::null())
            .unwrap();
        props.set_by(Side::Host, &Prop::Context, 0, "x").unwrap();
    }

    #[test]
    fn test_bad_enum() {
        let mut props = PropertySet::new();
        props.set(&Prop::PixelDepth, 0, "OfxBitDepthHalf").unwrap();
        let err = props.get_enum::<BitDepth>(&Prop::PixelDepth, 0).unwrap_err();
        assert_eq!(err.status(), Status::ErrValue);
        assert_eq!(props.try_get_enum::<BitDepth>(&Prop::PixelDepth, 0), None);
    }

    #[test]
    fn test_reset_and_remove() {
        let mut props = PropertySet::new();
        props.set(&Prop::SupportedContexts, 0, "OfxImageEffectContextFilter").unwrap();
        props.reset(&Prop::SupportedContexts).unwrap();
        assert_eq!(props.dimension(&Prop::SupportedContexts).unwrap(), 0);
        assert!(props.remove(&Prop::SupportedContexts).is_some());
        assert!(props.reset(&Prop::SupportedContexts).is_err());
    }

    #[test]
    fn test_json_rendering() {
        let mut props = PropertySet::new();
        props.set(&Prop::Label, 0, "Gain").unwrap();
        props.set_point_d(&Prop::RenderScale, PointD::unit()).unwrap();
        let json = props.to_json();
        assert_eq!(json["OfxPropLabel"], "Gain");
        assert_eq!(json["OfxImageEffectPropRenderScale"], serde_json::json!([1.0, 1.0]));
    }
}

//! Tagged property values.
//!
//! A property holds one or more values of a single declared type. The value
//! enum is closed: integers, doubles, strings, byte blobs and opaque
//! pointers. Enumerations are carried as strings and decoded through
//! [`EncodedEnum`](crate::core::types::EncodedEnum).

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Declared type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    /// 32-bit signed integer; booleans are stored as 0/1.
    Int,
    /// 64-bit float.
    Double,
    /// UTF-8 string, also used for closed enumerations.
    String,
    /// Arbitrary bytes.
    Bytes,
    /// Opaque pointer owned by whoever set it.
    Pointer,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::Int => "int",
            PropertyType::Double => "double",
            PropertyType::String => "string",
            PropertyType::Bytes => "bytes",
            PropertyType::Pointer => "pointer",
        };
        f.write_str(name)
    }
}

/// An opaque, shareable pointer value.
///
/// The property store never looks inside; it only hands the `Arc` back. Two
/// pointers are equal when they refer to the same allocation.
#[derive(Clone, Default)]
pub struct OpaquePointer(Option<Arc<dyn Any + Send + Sync>>);

impl OpaquePointer {
    /// A null pointer.
    pub fn null() -> Self {
        Self(None)
    }

    /// Wrap shared data.
    pub fn new<T: Any + Send + Sync>(data: Arc<T>) -> Self {
        Self(Some(data))
    }

    /// True if nothing is attached.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Recover the attached data as a concrete type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().and_then(|data| data.downcast::<T>().ok())
    }

    /// Detach and return the data, leaving the pointer null.
    pub fn take(&mut self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.0.take()
    }
}

impl PartialEq for OpaquePointer {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for OpaquePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("null"),
            Some(p) => write!(f, "{:p}", Arc::as_ptr(p)),
        }
    }
}

/// A single property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Integer value.
    Int(i32),
    /// Floating point value.
    Double(f64),
    /// String value.
    String(String),
    /// Byte blob.
    Bytes(Vec<u8>),
    /// Opaque pointer.
    Pointer(OpaquePointer),
}

impl PropertyValue {
    /// The type tag of this value.
    pub fn get_type(&self) -> PropertyType {
        match self {
            PropertyValue::Int(_) => PropertyType::Int,
            PropertyValue::Double(_) => PropertyType::Double,
            PropertyValue::String(_) => PropertyType::String,
            PropertyValue::Bytes(_) => PropertyType::Bytes,
            PropertyValue::Pointer(_) => PropertyType::Pointer,
        }
    }

    /// The zero value of a type.
    pub fn default_for(ty: PropertyType) -> Self {
        match ty {
            PropertyType::Int => PropertyValue::Int(0),
            PropertyType::Double => PropertyValue::Double(0.0),
            PropertyType::String => PropertyValue::String(String::new()),
            PropertyType::Bytes => PropertyValue::Bytes(Vec::new()),
            PropertyType::Pointer => PropertyValue::Pointer(OpaquePointer::null()),
        }
    }

    /// Try to get as an integer.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as a double.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Try to get as a pointer.
    pub fn as_pointer(&self) -> Option<&OpaquePointer> {
        match self {
            PropertyValue::Pointer(p) => Some(p),
            _ => None,
        }
    }

    /// A JSON rendering for diagnostics; pointers and blobs are summarised.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::Int(v) => serde_json::json!(v),
            PropertyValue::Double(v) => serde_json::json!(v),
            PropertyValue::String(s) => serde_json::json!(s),
            PropertyValue::Bytes(b) => serde_json::json!(format!("<{} bytes>", b.len())),
            PropertyValue::Pointer(p) => serde_json::json!(format!("{:?}", p)),
        }
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Int(v as i32)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(v: Vec<u8>) -> Self {
        PropertyValue::Bytes(v)
    }
}

impl From<OpaquePointer> for PropertyValue {
    fn from(v: OpaquePointer) -> Self {
        PropertyValue::Pointer(v)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Double(v) => write!(f, "{}", v),
            PropertyValue::String(s) => write!(f, "\"{}\"", s),
            PropertyValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            PropertyValue::Pointer(p) => write!(f, "{:?}", p),
        }
    }
}

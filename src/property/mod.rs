//! The property store.
//!
//! This module contains:
//! - Tagged property values and their types
//! - Strongly typed property identifiers with their static contracts
//! - Property sets with typed and fallible access

pub mod key;
pub mod set;
pub mod value;

pub use key::{Dimension, Prop, PropSpec, Side, Writer};
pub use set::{PropertySet, SharedProps};
pub use value::{OpaquePointer, PropertyType, PropertyValue};

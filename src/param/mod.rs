//! Parameters: typed, optionally animated values with range metadata.

pub mod definition;
pub mod set;

pub use definition::{DoubleType, ParamDescriptor, ParamType, ParamValue};
pub use set::{Param, ParamHandle, ParamSet};

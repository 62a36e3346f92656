//! Core types shared by both sides of the protocol.
//!
//! This module contains:
//! - Status codes returned by every entry point
//! - Encoded enumerations (depths, components, contexts, ...)
//! - Geometry in canonical and pixel coordinates
//! - Generational handles for effects, clips and memory
//! - Error types

pub mod error;
pub mod geometry;
pub mod handle;
pub mod status;
pub mod types;

// Re-export commonly used types
pub use error::{OfxError, OfxResult, PropertyResult};
pub use geometry::{PixelMapping, PointD, RectD, RectI};
pub use handle::{ClipHandle, EffectHandle, MemoryHandle};
pub use status::Status;
pub use types::{
    BitDepth, ChangeReason, ChangedKind, Components, Context, EncodedEnum, Field, FieldExtraction, MessageKind,
    PreMultiplication, RenderThreadSafety,
};

//! Pixel component types and the depth dispatch table.
//!
//! Every per-pixel algorithm is written once, generic over [`Pixel`], and
//! instantiated for the negotiated depth through [`dispatch_depth`].

use crate::core::error::RenderError;
use crate::core::types::{BitDepth, EncodedEnum};
use std::fmt::Debug;
use std::mem::size_of;

/// A single pixel component.
///
/// Integer components clamp to `[0, MAX]` when converted back from a
/// working value; floating components never clamp and treat `MAX` as the
/// unit reference only.
pub trait Pixel: bytemuck::Pod + Default + PartialEq + Debug + Send + Sync + 'static {
    /// The depth this component type is used for.
    const DEPTH: BitDepth;
    /// The nominal white value.
    const MAX: f32;
    /// True for integer representations.
    const CLAMPS: bool;

    /// Convert to a working value in component units.
    fn to_f32(self) -> f32;

    /// Convert back from a working value, clamping integer types.
    fn from_f32(value: f32) -> Self;

    /// `MAX - self`, exact for every representation.
    fn invert(self) -> Self;
}

impl Pixel for u8 {
    const DEPTH: BitDepth = BitDepth::Byte;
    const MAX: f32 = 255.0;
    const CLAMPS: bool = true;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        value.clamp(0.0, <Self as Pixel>::MAX) as u8
    }

    fn invert(self) -> Self {
        u8::MAX - self
    }
}

impl Pixel for u16 {
    const DEPTH: BitDepth = BitDepth::Short;
    const MAX: f32 = 65535.0;
    const CLAMPS: bool = true;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        value.clamp(0.0, <Self as Pixel>::MAX) as u16
    }

    fn invert(self) -> Self {
        u16::MAX - self
    }
}

impl Pixel for f32 {
    const DEPTH: BitDepth = BitDepth::Float;
    const MAX: f32 = 1.0;
    const CLAMPS: bool = false;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }

    fn invert(self) -> Self {
        1.0 - self
    }
}

/// Read `out.len()` components from unaligned bytes.
pub fn read_components<P: Pixel>(bytes: &[u8], out: &mut [P]) {
    for (c, chunk) in out.iter_mut().zip(bytes.chunks_exact(size_of::<P>())) {
        *c = bytemuck::pod_read_unaligned(chunk);
    }
}

/// Write components into unaligned bytes.
pub fn write_components<P: Pixel>(bytes: &mut [u8], components: &[P]) {
    for (chunk, c) in bytes.chunks_exact_mut(size_of::<P>()).zip(components) {
        chunk.copy_from_slice(bytemuck::bytes_of(c));
    }
}

// ============================================================================
// Depth Dispatch
// ============================================================================

/// Work that is generic over the component type.
pub trait DepthVisitor {
    /// Result of the visit.
    type Output;

    /// Run for component type `P`.
    fn visit<P: Pixel>(self) -> Self::Output;
}

/// Run `visitor` for the component type of `depth`.
pub fn dispatch_depth<V: DepthVisitor>(depth: BitDepth, visitor: V) -> Result<V::Output, RenderError> {
    match depth {
        BitDepth::Byte => Ok(visitor.visit::<u8>()),
        BitDepth::Short => Ok(visitor.visit::<u16>()),
        BitDepth::Float => Ok(visitor.visit::<f32>()),
        BitDepth::None => Err(RenderError::UnsupportedDepth(depth.as_str().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct DepthName;

    impl DepthVisitor for DepthName {
        type Output = (BitDepth, usize);

        fn visit<P: Pixel>(self) -> Self::Output {
            (P::DEPTH, size_of::<P>())
        }
    }

    #[test]
    fn test_dispatch_table() {
        assert_eq!(dispatch_depth(BitDepth::Byte, DepthName).unwrap(), (BitDepth::Byte, 1));
        assert_eq!(dispatch_depth(BitDepth::Short, DepthName).unwrap(), (BitDepth::Short, 2));
        assert_eq!(dispatch_depth(BitDepth::Float, DepthName).unwrap(), (BitDepth::Float, 4));
        assert!(matches!(
            dispatch_depth(BitDepth::None, DepthName),
            Err(RenderError::UnsupportedDepth(_))
        ));
    }

    #[test]
    fn test_integer_clamping() {
        assert_eq!(u8::from_f32(300.0), 255);
        assert_eq!(u8::from_f32(-4.0), 0);
        assert_eq!(u16::from_f32(70000.0), 65535);
        assert_eq!(u16::from_f32(-1.0), 0);
        assert_eq!(u8::from_f32(<u8 as Pixel>::MAX), u8::MAX);
        assert_eq!(f32::from_f32(3.5), 3.5);
        assert_eq!(f32::from_f32(-0.25), -0.25);
    }

    #[test]
    fn test_unaligned_round_trip() {
        let mut bytes = vec![0u8; 1 + 4 * size_of::<f32>()];
        let px = [0.25f32, 0.5, 0.75, 1.0];
        write_components(&mut bytes[1..], &px);
        let mut back = [0f32; 4];
        read_components(&bytes[1..], &mut back);
        assert_eq!(back, px);
    }

    proptest! {
        #[test]
        fn test_invert_round_trip_u8(v: u8) {
            prop_assert_eq!(v.invert().invert(), v);
        }

        #[test]
        fn test_invert_round_trip_u16(v: u16) {
            prop_assert_eq!(v.invert().invert(), v);
        }

        #[test]
        fn test_invert_round_trip_f32(k in 0u32..=65536) {
            let v = k as f32 / 65536.0;
            prop_assert_eq!(v.invert().invert(), v);
        }
    }
}

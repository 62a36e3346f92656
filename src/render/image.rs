//! Images fetched from clips and bounds-checked views over their pixels.
//!
//! An [`Image`] is owned by the action call that fetched it. Dropping it
//! hands its buffer back to the host exactly once, whatever path the call
//! leaves by.

use crate::core::error::{PropertyResult, RenderError};
use crate::core::geometry::RectI;
use crate::core::types::{BitDepth, Components, PreMultiplication};
use crate::property::{Prop, PropertySet};
use crate::render::pixel::{read_components, Pixel};
use std::fmt;
use std::sync::Arc;

/// Geometry of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    /// Pixel rectangle held by the buffer.
    pub bounds: RectI,
    /// Bytes from one row to the next; negative for bottom-up storage.
    pub row_bytes: isize,
    /// Component type.
    pub depth: BitDepth,
    /// Component layout.
    pub components: Components,
    /// Byte offset of pixel `(bounds.x1, bounds.y1)` in the buffer.
    pub origin: usize,
}

impl ImageLayout {
    /// Tightly packed rows, lowest row first.
    pub fn packed(bounds: RectI, depth: BitDepth, components: Components) -> Self {
        let row_bytes = bounds.width() as usize * depth.bytes() * components.count();
        Self {
            bounds,
            row_bytes: row_bytes as isize,
            depth,
            components,
            origin: 0,
        }
    }

    /// Tightly packed rows, highest row first, addressed with a negative stride.
    pub fn packed_top_down(bounds: RectI, depth: BitDepth, components: Components) -> Self {
        let row = bounds.width() as usize * depth.bytes() * components.count();
        let rows = bounds.height() as usize;
        Self {
            bounds,
            row_bytes: -(row as isize),
            depth,
            components,
            origin: rows.saturating_sub(1) * row,
        }
    }

    /// Bytes per pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        self.depth.bytes() * self.components.count()
    }

    /// Bytes of pixel data in one row.
    pub fn row_len(&self) -> usize {
        self.bounds.width() as usize * self.bytes_per_pixel()
    }

    /// Smallest buffer length that holds every row, or an error if rows
    /// would overlap or start before the buffer.
    pub fn required_len(&self) -> Result<usize, RenderError> {
        let rows = self.bounds.height() as i64;
        if rows == 0 || self.row_len() == 0 {
            return Ok(self.origin);
        }
        if (self.row_bytes.unsigned_abs()) < self.row_len() {
            return Err(RenderError::BufferTooSmall);
        }
        let first = self.origin as i64;
        let last = first + (rows - 1) * self.row_bytes as i64;
        if first.min(last) < 0 {
            return Err(RenderError::BufferTooSmall);
        }
        Ok((first.max(last) as usize) + self.row_len())
    }

    /// Byte offset of the start of row `y`, if `y` is inside the bounds.
    pub fn row_offset(&self, y: i32) -> Option<usize> {
        if y < self.bounds.y1 || y >= self.bounds.y2 {
            return None;
        }
        let offset = self.origin as i64 + (y as i64 - self.bounds.y1 as i64) * self.row_bytes as i64;
        usize::try_from(offset).ok()
    }

    /// Byte offset of pixel `(x, y)`, if it is inside the bounds.
    pub fn pixel_offset(&self, x: i32, y: i32) -> Option<usize> {
        if !self.bounds.contains_point(x, y) {
            return None;
        }
        let column = (x as i64 - self.bounds.x1 as i64) as usize * self.bytes_per_pixel();
        self.row_offset(y).map(|row| row + column)
    }

    /// The same buffer restricted to `region`.
    pub fn crop(&self, region: &RectI) -> Option<ImageLayout> {
        let bounds = self.bounds.intersection(region)?;
        let origin = self.pixel_offset(bounds.x1, bounds.y1)?;
        Some(ImageLayout { bounds, origin, ..*self })
    }

    /// Write the image description properties.
    pub fn write_props(&self, props: &mut PropertySet) -> PropertyResult<()> {
        props.set_rect_i(&Prop::Bounds, self.bounds)?;
        props.set(&Prop::RowBytes, 0, self.row_bytes as i32)?;
        props.set_enum(&Prop::PixelDepth, 0, self.depth)?;
        props.set_enum(&Prop::Components, 0, self.components)?;
        Ok(())
    }
}

/// Pixel storage behind an image.
#[derive(Debug)]
pub enum PixelStorage {
    /// Read-only data shared with the host's frame cache.
    Shared(Arc<Vec<u8>>),
    /// A buffer the image may write.
    Exclusive(Vec<u8>),
}

impl PixelStorage {
    /// All bytes.
    pub fn bytes(&self) -> &[u8] {
        match self {
            PixelStorage::Shared(data) => data.as_slice(),
            PixelStorage::Exclusive(data) => data.as_slice(),
        }
    }

    /// All bytes, if writable.
    pub fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            PixelStorage::Shared(data) => Arc::get_mut(data).map(|v| v.as_mut_slice()),
            PixelStorage::Exclusive(data) => Some(data.as_mut_slice()),
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    /// True if there are no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Called once when an image is dropped.
pub type ReleaseFn = Box<dyn FnOnce(ImageLayout, PixelStorage) + Send>;

/// An image fetched from a clip for the duration of one action call.
pub struct Image {
    layout: ImageLayout,
    props: PropertySet,
    storage: PixelStorage,
    release: Option<ReleaseFn>,
}

impl Image {
    /// Wrap storage with a layout and its description properties.
    pub fn new(layout: ImageLayout, props: PropertySet, storage: PixelStorage) -> Result<Self, RenderError> {
        if layout.required_len()? > storage.len() {
            return Err(RenderError::BufferTooSmall);
        }
        Ok(Self {
            layout,
            props,
            storage,
            release: None,
        })
    }

    /// Run `release` when the image is dropped.
    pub fn with_release(mut self, release: ReleaseFn) -> Self {
        self.release = Some(release);
        self
    }

    /// Buffer geometry.
    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    /// Pixel bounds.
    pub fn bounds(&self) -> RectI {
        self.layout.bounds
    }

    /// Component type.
    pub fn depth(&self) -> BitDepth {
        self.layout.depth
    }

    /// Component layout.
    pub fn components(&self) -> Components {
        self.layout.components
    }

    /// Row stride in bytes.
    pub fn row_bytes(&self) -> isize {
        self.layout.row_bytes
    }

    /// Description properties.
    pub fn props(&self) -> &PropertySet {
        &self.props
    }

    /// Pixel aspect ratio, 1 if the host did not say.
    pub fn pixel_aspect_ratio(&self) -> f64 {
        self.props.try_get_double(&Prop::PixelAspectRatio, 0).unwrap_or(1.0)
    }

    /// Premultiplication state, opaque if the host did not say.
    pub fn premultiplication(&self) -> PreMultiplication {
        self.props
            .try_get_enum(&Prop::PreMultiplication, 0)
            .unwrap_or(PreMultiplication::Opaque)
    }

    /// Read-only view.
    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            data: self.storage.bytes(),
            layout: self.layout,
        }
    }

    /// Writable view; fails for shared read-only images.
    pub fn view_mut(&mut self) -> Result<ImageViewMut<'_>, RenderError> {
        let data = self.storage.bytes_mut().ok_or(RenderError::ReadOnlyImage)?;
        Ok(ImageViewMut {
            data,
            layout: self.layout,
        })
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            let storage = std::mem::replace(&mut self.storage, PixelStorage::Exclusive(Vec::new()));
            release(self.layout, storage);
        }
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("layout", &self.layout)
            .field("bytes", &self.storage.len())
            .finish()
    }
}

// ============================================================================
// Views
// ============================================================================

/// A read-only, bounds-checked view of pixels.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    data: &'a [u8],
    layout: ImageLayout,
}

impl<'a> ImageView<'a> {
    /// View `data` through `layout`.
    pub fn new(data: &'a [u8], layout: ImageLayout) -> Result<Self, RenderError> {
        if layout.required_len()? > data.len() {
            return Err(RenderError::BufferTooSmall);
        }
        Ok(Self { data, layout })
    }

    /// Buffer geometry.
    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    /// Bytes of pixel `(x, y)`, or `None` outside the bounds.
    pub fn pixel_address(&self, x: i32, y: i32) -> Option<&'a [u8]> {
        let start = self.layout.pixel_offset(x, y)?;
        self.data.get(start..start + self.layout.bytes_per_pixel())
    }

    /// Read pixel `(x, y)` into `out`. Outside the bounds `out` is set to
    /// zero (transparent black) and `false` is returned.
    pub fn read_pixel<P: Pixel>(&self, x: i32, y: i32, out: &mut [P]) -> bool {
        match self.pixel_address(x, y) {
            Some(bytes) => {
                read_components(bytes, out);
                true
            }
            None => {
                out.fill(P::default());
                false
            }
        }
    }

    /// Pixel bytes of row `y`.
    pub fn row(&self, y: i32) -> Option<&'a [u8]> {
        let start = self.layout.row_offset(y)?;
        self.data.get(start..start + self.layout.row_len())
    }
}

/// One row of a render window, writable.
#[derive(Debug)]
pub struct RowMut<'a> {
    /// Row coordinate.
    pub y: i32,
    /// Coordinate of the first pixel in `bytes`.
    pub x1: i32,
    /// Pixel bytes of the window's span of this row.
    pub bytes: &'a mut [u8],
}

/// A writable, bounds-checked view of pixels.
#[derive(Debug)]
pub struct ImageViewMut<'a> {
    data: &'a mut [u8],
    layout: ImageLayout,
}

impl<'a> ImageViewMut<'a> {
    /// View `data` through `layout`.
    pub fn new(data: &'a mut [u8], layout: ImageLayout) -> Result<Self, RenderError> {
        if layout.required_len()? > data.len() {
            return Err(RenderError::BufferTooSmall);
        }
        Ok(Self { data, layout })
    }

    /// Buffer geometry.
    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    /// Read-only view of the same pixels.
    pub fn as_view(&self) -> ImageView<'_> {
        ImageView {
            data: self.data,
            layout: self.layout,
        }
    }

    /// Bytes of pixel `(x, y)`, or `None` outside the bounds.
    pub fn pixel_address_mut(&mut self, x: i32, y: i32) -> Option<&mut [u8]> {
        let start = self.layout.pixel_offset(x, y)?;
        let len = self.layout.bytes_per_pixel();
        self.data.get_mut(start..start + len)
    }

    /// Split the rows of `window` into disjoint writable slices, ordered by
    /// ascending `y`.
    pub fn rows_mut(self, window: RectI) -> Result<Vec<RowMut<'a>>, RenderError> {
        let layout = self.layout;
        if !layout.bounds.contains(&window) {
            return Err(RenderError::WindowOutsideBounds {
                window: window.to_string(),
                bounds: layout.bounds.to_string(),
            });
        }
        if window.is_empty() {
            return Ok(Vec::new());
        }
        let bpp = layout.bytes_per_pixel();
        let span_start = (window.x1 as i64 - layout.bounds.x1 as i64) as usize * bpp;
        let span_end = (window.x2 as i64 - layout.bounds.x1 as i64) as usize * bpp;

        let mut starts = (window.y1..window.y2)
            .map(|y| layout.row_offset(y).map(|offset| (offset, y)))
            .collect::<Option<Vec<_>>>()
            .ok_or(RenderError::BufferTooSmall)?;
        starts.sort_unstable_by_key(|(offset, _)| *offset);

        let mut rest: &'a mut [u8] = self.data;
        let mut consumed = 0usize;
        let mut rows = Vec::with_capacity(starts.len());
        for (offset, y) in starts {
            let skip = offset - consumed;
            if rest.len() < skip + span_end {
                return Err(RenderError::BufferTooSmall);
            }
            let (_, tail) = std::mem::take(&mut rest).split_at_mut(skip);
            let (row, tail) = tail.split_at_mut(span_end);
            rows.push(RowMut {
                y,
                x1: window.x1,
                bytes: &mut row[span_start..],
            });
            rest = tail;
            consumed = offset + span_end;
        }
        rows.sort_unstable_by_key(|row| row.y);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rgba8(bounds: RectI) -> ImageLayout {
        ImageLayout::packed(bounds, BitDepth::Byte, Components::Rgba)
    }

    #[test]
    fn test_packed_layout() {
        let layout = rgba8(RectI::new(10, 20, 14, 23));
        assert_eq!(layout.row_bytes, 16);
        assert_eq!(layout.required_len().unwrap(), 48);
        assert_eq!(layout.pixel_offset(10, 20), Some(0));
        assert_eq!(layout.pixel_offset(11, 21), Some(20));
        assert_eq!(layout.pixel_offset(14, 20), None);
        assert_eq!(layout.pixel_offset(10, 19), None);
    }

    #[test]
    fn test_negative_row_bytes() {
        let layout = ImageLayout::packed_top_down(RectI::new(0, 0, 2, 3), BitDepth::Byte, Components::Alpha);
        assert_eq!(layout.row_bytes, -2);
        assert_eq!(layout.required_len().unwrap(), 6);
        // Row 0 is stored last.
        assert_eq!(layout.row_offset(0), Some(4));
        assert_eq!(layout.row_offset(2), Some(0));

        let data = [0u8, 1, 2, 3, 4, 5];
        let view = ImageView::new(&data, layout).unwrap();
        assert_eq!(view.row(0), Some(&[4u8, 5][..]));
        assert_eq!(view.pixel_address(1, 2), Some(&[1u8][..]));
    }

    #[test]
    fn test_out_of_bounds_reads_transparent_black() {
        let data = vec![200u8; 16];
        let view = ImageView::new(&data, rgba8(RectI::new(0, 0, 2, 2))).unwrap();
        let mut px = [7u8; 4];
        assert!(view.read_pixel(1, 1, &mut px));
        assert_eq!(px, [200; 4]);
        assert!(!view.read_pixel(2, 0, &mut px));
        assert_eq!(px, [0; 4]);
        assert!(view.pixel_address(-1, 0).is_none());
    }

    #[test]
    fn test_short_buffer_rejected() {
        let data = vec![0u8; 10];
        assert!(matches!(
            ImageView::new(&data, rgba8(RectI::new(0, 0, 2, 2))),
            Err(RenderError::BufferTooSmall)
        ));
    }

    #[test]
    fn test_crop_shares_buffer() {
        let layout = rgba8(RectI::new(0, 0, 4, 4));
        let cropped = layout.crop(&RectI::new(1, 2, 10, 10)).unwrap();
        assert_eq!(cropped.bounds, RectI::new(1, 2, 4, 4));
        assert_eq!(cropped.origin, layout.pixel_offset(1, 2).unwrap());
        assert_eq!(cropped.pixel_offset(3, 3), layout.pixel_offset(3, 3));
        assert!(layout.crop(&RectI::new(5, 5, 6, 6)).is_none());
    }

    #[test]
    fn test_rows_mut_disjoint_and_ordered() {
        for layout in [
            ImageLayout::packed(RectI::new(0, 0, 3, 4), BitDepth::Byte, Components::Alpha),
            ImageLayout::packed_top_down(RectI::new(0, 0, 3, 4), BitDepth::Byte, Components::Alpha),
        ] {
            let mut data = vec![0u8; 12];
            let view = ImageViewMut::new(&mut data, layout).unwrap();
            let rows = view.rows_mut(RectI::new(1, 1, 3, 4)).unwrap();
            assert_eq!(rows.iter().map(|r| r.y).collect::<Vec<_>>(), vec![1, 2, 3]);
            for row in rows {
                assert_eq!(row.bytes.len(), 2);
                row.bytes.fill(row.y as u8);
            }
            let view = ImageView::new(&data, layout).unwrap();
            assert_eq!(view.pixel_address(0, 2), Some(&[0u8][..]));
            assert_eq!(view.pixel_address(2, 2), Some(&[2u8][..]));
            assert_eq!(view.pixel_address(1, 3), Some(&[3u8][..]));
        }
    }

    #[test]
    fn test_rows_mut_rejects_window_outside() {
        let mut data = vec![0u8; 16];
        let view = ImageViewMut::new(&mut data, rgba8(RectI::new(0, 0, 2, 2))).unwrap();
        assert!(matches!(
            view.rows_mut(RectI::new(0, 0, 3, 2)),
            Err(RenderError::WindowOutsideBounds { .. })
        ));
    }

    #[test]
    fn test_release_runs_once_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let layout = rgba8(RectI::new(0, 0, 1, 1));
        let image = Image::new(layout, PropertySet::new(), PixelStorage::Exclusive(vec![0; 4]))
            .unwrap()
            .with_release(Box::new(move |_, storage| {
                assert_eq!(storage.len(), 4);
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        drop(image);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shared_storage_is_read_only() {
        let data = Arc::new(vec![0u8; 4]);
        let _keep = Arc::clone(&data);
        let layout = rgba8(RectI::new(0, 0, 1, 1));
        let mut image = Image::new(layout, PropertySet::new(), PixelStorage::Shared(data)).unwrap();
        assert!(matches!(image.view_mut(), Err(RenderError::ReadOnlyImage)));
    }
}

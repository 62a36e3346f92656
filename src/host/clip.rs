//! Upstream frame sources and pixel format conversion for host clips.

use crate::core::error::{OfxResult, RenderError};
use crate::core::geometry::{RectD, RectI};
use crate::core::types::{BitDepth, Components, PreMultiplication};
use crate::negotiation::ClipFormat;
use crate::render::image::{ImageLayout, ImageView};
use crate::render::pixel::{dispatch_depth, write_components, DepthVisitor, Pixel};
use image::{DynamicImage, ImageBuffer, Rgba};
use std::mem::size_of;
use std::sync::Arc;

/// One frame of upstream data in its native format.
#[derive(Debug, Clone)]
pub struct SourceFrame {
    /// Buffer geometry.
    pub layout: ImageLayout,
    /// Pixel data.
    pub data: Arc<Vec<u8>>,
    /// Pixel aspect ratio.
    pub pixel_aspect_ratio: f64,
    /// Premultiplication state.
    pub premultiplication: PreMultiplication,
    aborted: bool,
}

impl SourceFrame {
    /// Wrap a buffer, checking it is large enough for `layout`.
    pub fn new(layout: ImageLayout, data: Vec<u8>) -> Result<Self, RenderError> {
        if data.len() < layout.required_len()? {
            return Err(RenderError::BufferTooSmall);
        }
        Ok(Self {
            layout,
            data: Arc::new(data),
            pixel_aspect_ratio: 1.0,
            premultiplication: PreMultiplication::PreMultiplied,
            aborted: false,
        })
    }

    /// A frame filled with one normalized colour.
    pub fn solid(bounds: RectI, depth: BitDepth, components: Components, colour: [f32; 4]) -> Result<Self, RenderError> {
        let layout = ImageLayout::packed(bounds, depth, components);
        let mut data = vec![0u8; layout.required_len()?];
        let pixel_len = layout.bytes_per_pixel();
        if pixel_len > 0 {
            let mut pixel = vec![0u8; pixel_len];
            dispatch_depth(depth, WritePixel {
                rgba: colour,
                components,
                out: &mut pixel,
            })?;
            for chunk in data.chunks_exact_mut(pixel_len) {
                chunk.copy_from_slice(&pixel);
            }
        }
        Self::new(layout, data)
    }

    /// Set the pixel aspect ratio.
    pub fn with_pixel_aspect_ratio(mut self, par: f64) -> Self {
        self.pixel_aspect_ratio = par;
        self
    }

    /// Set the premultiplication state.
    pub fn with_premultiplication(mut self, premult: PreMultiplication) -> Self {
        self.premultiplication = premult;
        self
    }

    /// Mark the frame as the partial result of an aborted render.
    pub fn with_aborted(mut self, aborted: bool) -> Self {
        self.aborted = aborted;
        self
    }

    /// True when the render producing this frame was aborted part way.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// A read-only view of the pixels.
    pub fn view(&self) -> Result<ImageView<'_>, RenderError> {
        ImageView::new(&self.data, self.layout)
    }

    /// Native format.
    pub fn format(&self) -> ClipFormat {
        ClipFormat::new(self.layout.depth, self.layout.components).with_pixel_aspect_ratio(self.pixel_aspect_ratio)
    }

    /// Convert to another depth and component layout. Returns a clone when
    /// nothing changes.
    pub fn converted(&self, depth: BitDepth, components: Components) -> Result<SourceFrame, RenderError> {
        if depth == self.layout.depth && components == self.layout.components {
            return Ok(self.clone());
        }
        let (layout, data) = convert(&self.view()?, depth, components)?;
        Ok(SourceFrame {
            layout,
            data: Arc::new(data),
            pixel_aspect_ratio: self.pixel_aspect_ratio,
            premultiplication: self.premultiplication,
            aborted: self.aborted,
        })
    }
}

/// Upstream data connected to an input clip.
pub trait FrameSource: Send + Sync {
    /// Region of definition in canonical coordinates.
    fn region_of_definition(&self, time: f64) -> RectD;

    /// Frames the source can produce.
    fn frame_range(&self) -> (f64, f64);

    /// Native format, before negotiation.
    fn format(&self) -> ClipFormat;

    /// Premultiplication of the data.
    fn premultiplication(&self) -> PreMultiplication {
        PreMultiplication::PreMultiplied
    }

    /// The frame at `time`.
    fn frame(&self, time: f64) -> OfxResult<SourceFrame>;
}

/// The same frame at every time.
#[derive(Debug, Clone)]
pub struct StillSource {
    frame: SourceFrame,
    frame_range: (f64, f64),
}

impl StillSource {
    /// Serve `frame` for the given frame range.
    pub fn new(frame: SourceFrame) -> Self {
        Self {
            frame,
            frame_range: (0.0, 0.0),
        }
    }

    /// Set the frame range reported upstream.
    pub fn with_frame_range(mut self, first: f64, last: f64) -> Self {
        self.frame_range = (first, last);
        self
    }

    /// A source backed by a decoded image. Sixteen-bit and float images keep
    /// their precision; everything else becomes 8-bit RGBA.
    pub fn from_image(image: &DynamicImage) -> Result<Self, RenderError> {
        Ok(Self::new(frame_from_image(image)?))
    }
}

impl FrameSource for StillSource {
    fn region_of_definition(&self, _time: f64) -> RectD {
        let b = self.frame.layout.bounds;
        let par = self.frame.pixel_aspect_ratio;
        RectD::new(b.x1 as f64 * par, b.y1 as f64, b.x2 as f64 * par, b.y2 as f64)
    }

    fn frame_range(&self) -> (f64, f64) {
        self.frame_range
    }

    fn format(&self) -> ClipFormat {
        self.frame.format()
    }

    fn premultiplication(&self) -> PreMultiplication {
        self.frame.premultiplication
    }

    fn frame(&self, _time: f64) -> OfxResult<SourceFrame> {
        Ok(self.frame.clone())
    }
}

// ============================================================================
// Conversion
// ============================================================================

/// Expand a pixel to normalized RGBA.
fn to_rgba(components: Components, values: &[f32]) -> [f32; 4] {
    match components {
        Components::Rgba => [values[0], values[1], values[2], values[3]],
        Components::Rgb => [values[0], values[1], values[2], 1.0],
        Components::Alpha => [0.0, 0.0, 0.0, values[0]],
        Components::None => [0.0; 4],
    }
}

fn from_rgba(components: Components, rgba: [f32; 4], out: &mut [f32]) {
    match components {
        Components::Rgba => out[..4].copy_from_slice(&rgba),
        Components::Rgb => out[..3].copy_from_slice(&rgba[..3]),
        Components::Alpha => out[0] = rgba[3],
        Components::None => {}
    }
}

struct ReadRgba<'a, 'v> {
    view: &'a ImageView<'v>,
    out: &'a mut Vec<[f32; 4]>,
}

impl DepthVisitor for ReadRgba<'_, '_> {
    type Output = ();

    fn visit<P: Pixel>(self) {
        let layout = *self.view.layout();
        let n = layout.components.count();
        let mut pixel = [P::default(); 4];
        let mut normalized = [0f32; 4];
        for y in layout.bounds.y1..layout.bounds.y2 {
            for x in layout.bounds.x1..layout.bounds.x2 {
                self.view.read_pixel(x, y, &mut pixel[..n]);
                for (v, p) in normalized.iter_mut().zip(&pixel[..n]) {
                    *v = p.to_f32() / P::MAX;
                }
                self.out.push(to_rgba(layout.components, &normalized[..n]));
            }
        }
    }
}

struct WritePixel<'a> {
    rgba: [f32; 4],
    components: Components,
    out: &'a mut [u8],
}

impl DepthVisitor for WritePixel<'_> {
    type Output = ();

    fn visit<P: Pixel>(self) {
        let n = self.components.count();
        let mut normalized = [0f32; 4];
        from_rgba(self.components, self.rgba, &mut normalized);
        let mut pixel = [P::default(); 4];
        for (p, v) in pixel.iter_mut().zip(&normalized[..n]) {
            let scaled = v * P::MAX;
            *p = P::from_f32(if P::CLAMPS { scaled.round() } else { scaled });
        }
        write_components(self.out, &pixel[..n]);
    }
}

/// Convert a view into a packed buffer of another depth and layout.
pub fn convert(
    view: &ImageView<'_>,
    depth: BitDepth,
    components: Components,
) -> Result<(ImageLayout, Vec<u8>), RenderError> {
    let source = *view.layout();
    let mut rgba = Vec::with_capacity((source.bounds.width() * source.bounds.height()) as usize);
    dispatch_depth(source.depth, ReadRgba { view, out: &mut rgba })?;

    let layout = ImageLayout::packed(source.bounds, depth, components);
    let mut data = vec![0u8; layout.required_len()?];
    let pixel_len = layout.bytes_per_pixel();
    if pixel_len > 0 {
        for (chunk, px) in data.chunks_exact_mut(pixel_len).zip(&rgba) {
            dispatch_depth(depth, WritePixel {
                rgba: *px,
                components,
                out: chunk,
            })?;
        }
    }
    Ok((layout, data))
}

/// Decode a `DynamicImage` into a top-down RGBA frame anchored at the
/// origin.
pub fn frame_from_image(image: &DynamicImage) -> Result<SourceFrame, RenderError> {
    let bounds = RectI::new(0, 0, image.width() as i32, image.height() as i32);
    let (depth, data) = match image {
        DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_) => (
            BitDepth::Short,
            bytemuck::cast_slice::<u16, u8>(image.to_rgba16().as_raw()).to_vec(),
        ),
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => (
            BitDepth::Float,
            bytemuck::cast_slice::<f32, u8>(image.to_rgba32f().as_raw()).to_vec(),
        ),
        _ => (BitDepth::Byte, image.to_rgba8().into_raw()),
    };
    SourceFrame::new(ImageLayout::packed_top_down(bounds, depth, Components::Rgba), data)
}

/// Encode a view as an RGBA `DynamicImage` of the same depth, top row
/// first.
pub fn image_from_view(view: &ImageView<'_>) -> Result<DynamicImage, RenderError> {
    let layout = *view.layout();
    let (packed, data) = convert(view, layout.depth, Components::Rgba)?;
    let width = packed.bounds.width() as u32;
    let height = packed.bounds.height() as u32;
    let row = packed.row_len();
    let mut flipped = Vec::with_capacity(data.len());
    for chunk in data.chunks_exact(row.max(1)).rev() {
        flipped.extend_from_slice(chunk);
    }
    let too_small = || RenderError::BufferTooSmall;
    let image = match layout.depth {
        BitDepth::Byte => DynamicImage::ImageRgba8(
            ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, flipped).ok_or_else(too_small)?,
        ),
        BitDepth::Short => {
            let samples: Vec<u16> = flipped
                .chunks_exact(size_of::<u16>())
                .map(bytemuck::pod_read_unaligned)
                .collect();
            DynamicImage::ImageRgba16(
                ImageBuffer::<Rgba<u16>, _>::from_raw(width, height, samples).ok_or_else(too_small)?,
            )
        }
        BitDepth::Float => {
            let samples: Vec<f32> = flipped
                .chunks_exact(size_of::<f32>())
                .map(bytemuck::pod_read_unaligned)
                .collect();
            DynamicImage::ImageRgba32F(
                ImageBuffer::<Rgba<f32>, _>::from_raw(width, height, samples).ok_or_else(too_small)?,
            )
        }
        BitDepth::None => return Err(RenderError::UnsupportedDepth(layout.depth.to_string())),
    };
    Ok(image)
}

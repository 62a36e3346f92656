//! The render engine: pixel types, image views, tiling and the processor.

pub mod engine;
pub mod image;
pub mod pixel;
pub mod processor;

pub use engine::{ClipRef, RenderEngine, RenderOutcome};
pub use image::{Image, ImageLayout, ImageView, ImageViewMut, PixelStorage, RowMut};
pub use pixel::{dispatch_depth, DepthVisitor, Pixel};
pub use processor::{split_rows, PixelKernel, ProcessOutcome, Processor, RenderOptions, ABORT_POLL_ROWS};

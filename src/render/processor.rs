//! Tiled, multi-threaded pixel processing.
//!
//! A render window is split into contiguous row ranges, one per worker. Each
//! worker runs the same kernel over its rows, polling the abort flag every
//! [`ABORT_POLL_ROWS`] rows. The partition depends only on the window and the
//! worker count, and rows never overlap, so the output is the same however
//! many workers actually ran.

use crate::core::error::{OfxResult, RenderError};
use crate::core::geometry::RectI;
use crate::core::types::Components;
use crate::render::image::{ImageView, ImageViewMut, RowMut};
use crate::render::pixel::{dispatch_depth, write_components, DepthVisitor, Pixel};
use crate::suite::MultiThreadSuite;
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::mem::size_of;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Rows between abort polls.
pub const ABORT_POLL_ROWS: i32 = 20;

/// A per-pixel operation, generic over the component type.
pub trait PixelKernel: Sync {
    /// Compute the output pixel at `(x, y)`.
    ///
    /// `src` holds the source pixel at the same location, or zeros when
    /// there is no source or the location is outside its bounds. Both
    /// slices have one entry per component.
    fn apply<P: Pixel>(&self, x: i32, y: i32, src: &[P], dst: &mut [P]);
}

/// Split `window` into at most `workers` row ranges.
///
/// Each range is `ceil(height / workers)` rows tall except the last, which
/// takes what remains. Ranges that would start past the window are dropped.
pub fn split_rows(window: &RectI, workers: usize) -> Vec<RectI> {
    let height = window.height() as i64;
    if height == 0 || window.is_empty() {
        return Vec::new();
    }
    let workers = workers.max(1) as i64;
    let step = ((height + workers - 1) / workers).max(1);
    (0..workers)
        .map(|i| (i * step, ((i + 1) * step).min(height)))
        .filter(|(start, _)| *start < height)
        .map(|(start, end)| {
            RectI::new(
                window.x1,
                (window.y1 as i64 + start) as i32,
                window.x2,
                (window.y1 as i64 + end) as i32,
            )
        })
        .collect()
}

/// Per-call limits for the processor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Upper bound on workers; 0 means one per available CPU.
    pub max_workers: usize,
    /// Rows between abort polls.
    pub abort_poll_rows: i32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_workers: 0,
            abort_poll_rows: ABORT_POLL_ROWS,
        }
    }
}

impl RenderOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker limit.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the abort poll interval.
    pub fn with_abort_poll_rows(mut self, rows: i32) -> Self {
        self.abort_poll_rows = rows.max(1);
        self
    }
}

/// What a processing pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Rows written.
    pub rows: usize,
    /// Row ranges the window was split into.
    pub workers: usize,
    /// The pass stopped early because abort was requested.
    pub aborted: bool,
}

/// Drives a [`PixelKernel`] over a render window.
pub struct Processor<'a> {
    multi_thread: Option<&'a dyn MultiThreadSuite>,
    abort: &'a (dyn Fn() -> bool + Sync),
    options: RenderOptions,
}

impl<'a> Processor<'a> {
    /// Create a processor that polls `abort`.
    pub fn new(abort: &'a (dyn Fn() -> bool + Sync)) -> Self {
        Self {
            multi_thread: None,
            abort,
            options: RenderOptions::default(),
        }
    }

    /// Fork rows across the host's workers.
    pub fn with_multi_thread(mut self, suite: Option<&'a dyn MultiThreadSuite>) -> Self {
        self.multi_thread = suite;
        self
    }

    /// Set per-call options.
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Workers used for a window of `rows` rows: the smaller of the
    /// available CPUs and the configured maximum, at least one.
    pub fn worker_count(&self, rows: usize) -> usize {
        let available = self.multi_thread.map(|mt| mt.num_cpus()).unwrap_or(1).max(1);
        let workers = match self.options.max_workers {
            0 => available,
            max => available.min(max),
        };
        workers.min(rows).max(1)
    }

    /// Run `kernel` over `window` of `dst`, reading from `src` if given.
    pub fn process<K: PixelKernel>(
        &self,
        kernel: &K,
        src: Option<&ImageView<'_>>,
        dst: ImageViewMut<'_>,
        window: RectI,
    ) -> OfxResult<ProcessOutcome> {
        let layout = *dst.layout();
        if layout.components == Components::None {
            return Err(RenderError::UnsupportedComponents(layout.components.to_string()).into());
        }
        if let Some(src) = src {
            let s = src.layout();
            if s.depth != layout.depth || s.components != layout.components {
                return Err(RenderError::FormatMismatch(format!(
                    "source {}/{} vs output {}/{}",
                    s.depth, s.components, layout.depth, layout.components
                ))
                .into());
            }
        }
        let rows = dst.rows_mut(window)?;
        let pass = Pass {
            processor: self,
            kernel,
            src,
            rows,
            window,
            components: layout.components.count(),
        };
        dispatch_depth(layout.depth, pass)?
    }
}

struct Pass<'p, 'r, K> {
    processor: &'p Processor<'p>,
    kernel: &'p K,
    src: Option<&'p ImageView<'p>>,
    rows: Vec<RowMut<'r>>,
    window: RectI,
    components: usize,
}

impl<'p, 'r, K: PixelKernel> DepthVisitor for Pass<'p, 'r, K> {
    type Output = OfxResult<ProcessOutcome>;

    fn visit<P: Pixel>(self) -> Self::Output {
        let processor = self.processor;
        let slices = split_rows(&self.window, processor.worker_count(self.rows.len()));
        let mut rows = self.rows.into_iter();
        let slots: Vec<Mutex<Vec<RowMut<'r>>>> = slices
            .iter()
            .map(|slice| Mutex::new(rows.by_ref().take(slice.height() as usize).collect()))
            .collect();

        let aborted = AtomicBool::new(false);
        let done = AtomicUsize::new(0);
        let (kernel, src, components) = (self.kernel, self.src, self.components);
        let poll = processor.options.abort_poll_rows.max(1) as usize;
        let abort = processor.abort;
        let job = |index: usize, _count: usize| {
            let Some(slot) = slots.get(index) else {
                return;
            };
            let rows = std::mem::take(&mut *slot.lock());
            for (i, row) in rows.into_iter().enumerate() {
                if i % poll == 0 && abort() {
                    aborted.store(true, Ordering::Relaxed);
                    return;
                }
                process_row::<P, K>(kernel, src, row, components);
                done.fetch_add(1, Ordering::Relaxed);
            }
        };

        let workers = slots.len();
        match processor.multi_thread {
            Some(mt) if workers > 1 => mt.multi_thread(workers, &job)?,
            _ => (0..workers).for_each(|i| job(i, workers)),
        }

        let outcome = ProcessOutcome {
            rows: done.load(Ordering::Relaxed),
            workers,
            aborted: aborted.load(Ordering::Relaxed),
        };
        debug!(
            "Processed {} row(s) of {} on {} worker(s){}",
            outcome.rows,
            self.window,
            outcome.workers,
            if outcome.aborted { " (aborted)" } else { "" }
        );
        Ok(outcome)
    }
}

fn process_row<P: Pixel, K: PixelKernel>(kernel: &K, src: Option<&ImageView<'_>>, row: RowMut<'_>, n: usize) {
    let mut s = [P::default(); 4];
    let mut d = [P::default(); 4];
    let pixel_bytes = n * size_of::<P>();
    for (i, bytes) in row.bytes.chunks_exact_mut(pixel_bytes).enumerate() {
        let x = row.x1 + i as i32;
        match src {
            Some(src) => {
                src.read_pixel(x, row.y, &mut s[..n]);
            }
            None => s[..n].fill(P::default()),
        }
        kernel.apply(x, row.y, &s[..n], &mut d[..n]);
        write_components(bytes, &d[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BitDepth;
    use crate::render::image::ImageLayout;
    use proptest::prelude::*;

    struct Invert;

    impl PixelKernel for Invert {
        fn apply<P: Pixel>(&self, _x: i32, _y: i32, src: &[P], dst: &mut [P]) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = s.invert();
            }
        }
    }

    /// Writes a value derived from the coordinates.
    struct Coords;

    impl PixelKernel for Coords {
        fn apply<P: Pixel>(&self, x: i32, y: i32, _src: &[P], dst: &mut [P]) {
            dst.fill(P::from_f32(((x * 7 + y * 13) % 256) as f32));
        }
    }

    /// Runs workers one after another, in reverse, to show order does not matter.
    struct ReverseSerial(usize);

    impl MultiThreadSuite for ReverseSerial {
        fn num_cpus(&self) -> usize {
            self.0
        }

        fn multi_thread(&self, count: usize, job: &(dyn Fn(usize, usize) + Sync)) -> OfxResult<()> {
            (0..count).rev().for_each(|i| job(i, count));
            Ok(())
        }

        fn thread_index(&self) -> Option<usize> {
            None
        }
    }

    fn never() -> bool {
        false
    }

    fn render(workers: usize, window: RectI, bounds: RectI) -> Vec<u8> {
        let layout = ImageLayout::packed(bounds, BitDepth::Byte, Components::Rgba);
        let mut data = vec![0u8; layout.required_len().unwrap()];
        let mt = ReverseSerial(workers);
        let processor = Processor::new(&never).with_multi_thread(Some(&mt));
        let dst = ImageViewMut::new(&mut data, layout).unwrap();
        let outcome = processor.process(&Coords, None, dst, window).unwrap();
        assert_eq!(outcome.rows, window.height() as usize);
        data
    }

    #[test]
    fn test_split_rows_exact() {
        let window = RectI::new(0, 10, 5, 20);
        let slices = split_rows(&window, 4);
        let ys: Vec<(i32, i32)> = slices.iter().map(|r| (r.y1, r.y2)).collect();
        assert_eq!(ys, vec![(10, 13), (13, 16), (16, 19), (19, 20)]);
    }

    #[test]
    fn test_split_rows_drops_empty_tail() {
        // ceil(5 / 4) = 2 rows each: the fourth worker would start past the end.
        let slices = split_rows(&RectI::new(0, 0, 1, 5), 4);
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[2], RectI::new(0, 4, 1, 5));
        assert!(split_rows(&RectI::new(0, 0, 1, 0), 4).is_empty());
    }

    #[test]
    fn test_worker_count_respects_limits() {
        let mt = ReverseSerial(8);
        let p = Processor::new(&never).with_multi_thread(Some(&mt));
        assert_eq!(p.worker_count(100), 8);
        assert_eq!(p.worker_count(3), 3);
        let p = p.with_options(RenderOptions::new().with_max_workers(2));
        assert_eq!(p.worker_count(100), 2);
        assert_eq!(Processor::new(&never).worker_count(100), 1);
    }

    #[test]
    fn test_one_worker_matches_four() {
        let bounds = RectI::new(-3, -2, 17, 31);
        let window = RectI::new(-1, 0, 15, 29);
        assert_eq!(render(1, window, bounds), render(4, window, bounds));
    }

    #[test]
    fn test_invert_with_source() {
        let bounds = RectI::new(0, 0, 2, 1);
        let layout = ImageLayout::packed(bounds, BitDepth::Short, Components::Rgb);
        let mut src_data = vec![0u8; layout.required_len().unwrap()];
        write_components::<u16>(&mut src_data, &[0, 1000, 65535, 1, 2, 3]);
        let src = ImageView::new(&src_data, layout).unwrap();

        let mut out = vec![0u8; layout.required_len().unwrap()];
        let dst = ImageViewMut::new(&mut out, layout).unwrap();
        Processor::new(&never).process(&Invert, Some(&src), dst, bounds).unwrap();

        let view = ImageView::new(&out, layout).unwrap();
        let mut px = [0u16; 3];
        view.read_pixel(0, 0, &mut px);
        assert_eq!(px, [65535, 64535, 0]);
        view.read_pixel(1, 0, &mut px);
        assert_eq!(px, [65534, 65533, 65532]);
    }

    #[test]
    fn test_format_mismatch_rejected() {
        let bounds = RectI::new(0, 0, 1, 1);
        let src_layout = ImageLayout::packed(bounds, BitDepth::Float, Components::Rgba);
        let dst_layout = ImageLayout::packed(bounds, BitDepth::Byte, Components::Rgba);
        let src_data = vec![0u8; 16];
        let src = ImageView::new(&src_data, src_layout).unwrap();
        let mut out = vec![0u8; 4];
        let dst = ImageViewMut::new(&mut out, dst_layout).unwrap();
        let err = Processor::new(&never).process(&Invert, Some(&src), dst, bounds).unwrap_err();
        assert_eq!(err.status(), crate::core::status::Status::ErrImageFormat);
    }

    #[test]
    fn test_abort_stops_early() {
        let bounds = RectI::new(0, 0, 4, 100);
        let layout = ImageLayout::packed(bounds, BitDepth::Byte, Components::Alpha);
        let mut out = vec![0u8; layout.required_len().unwrap()];
        let always = || true;
        let dst = ImageViewMut::new(&mut out, layout).unwrap();
        let outcome = Processor::new(&always).process(&Coords, None, dst, bounds).unwrap();
        assert!(outcome.aborted);
        assert_eq!(outcome.rows, 0);
    }

    #[test]
    fn test_abort_polled_every_twenty_rows() {
        let bounds = RectI::new(0, 0, 1, 100);
        let layout = ImageLayout::packed(bounds, BitDepth::Byte, Components::Alpha);
        let mut out = vec![0u8; layout.required_len().unwrap()];
        let polls = AtomicUsize::new(0);
        let abort = || polls.fetch_add(1, Ordering::SeqCst) >= 2;
        let dst = ImageViewMut::new(&mut out, layout).unwrap();
        let outcome = Processor::new(&abort).process(&Coords, None, dst, bounds).unwrap();
        // Polls at rows 0 and 20 pass, the poll at row 40 aborts.
        assert!(outcome.aborted);
        assert_eq!(outcome.rows, 40);
        assert_eq!(polls.load(Ordering::SeqCst), 3);

        // Slices of 13 rows: every worker polls on its own first row, even
        // when no row of its slice is a multiple of twenty.
        let mut out = vec![0u8; layout.required_len().unwrap()];
        let polls = AtomicUsize::new(0);
        let abort = || {
            polls.fetch_add(1, Ordering::SeqCst);
            true
        };
        let mt = ReverseSerial(8);
        let dst = ImageViewMut::new(&mut out, layout).unwrap();
        let outcome = Processor::new(&abort)
            .with_multi_thread(Some(&mt))
            .process(&Coords, None, dst, bounds)
            .unwrap();
        assert_eq!(outcome.workers, 8);
        assert!(outcome.aborted);
        assert_eq!(outcome.rows, 0);
        assert_eq!(polls.load(Ordering::SeqCst), 8);
    }

    proptest! {
        #[test]
        fn test_split_partitions_window(y1 in -50i32..50, h in 0i32..200, n in 1usize..16) {
            let window = RectI::new(0, y1, 3, y1 + h);
            let slices = split_rows(&window, n);
            prop_assert!(slices.len() <= n);
            let mut next = y1;
            for slice in &slices {
                prop_assert_eq!(slice.y1, next);
                prop_assert!(slice.y2 > slice.y1);
                next = slice.y2;
            }
            if h > 0 {
                prop_assert_eq!(next, y1 + h);
            }
            prop_assert_eq!(split_rows(&window, n), slices);
        }
    }
}

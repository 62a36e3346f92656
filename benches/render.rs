//! Benchmarks for the tiled render processor.
//!
//! Run with:
//!   cargo bench -- render

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ofxrs::core::geometry::RectI;
use ofxrs::core::types::{BitDepth, Components};
use ofxrs::host::RayonThreads;
use ofxrs::render::{split_rows, ImageLayout, ImageView, ImageViewMut, Pixel, PixelKernel, Processor, RenderOptions};

/// Common resolutions to benchmark
const RESOLUTIONS: &[(i32, i32, &str)] = &[(640, 480, "VGA"), (1920, 1080, "1080p"), (3840, 2160, "4K")];

/// Scales every component, like a gain effect.
struct Scale(f32);

impl PixelKernel for Scale {
    fn apply<P: Pixel>(&self, _x: i32, _y: i32, src: &[P], dst: &mut [P]) {
        for (d, s) in dst.iter_mut().zip(src) {
            *d = P::from_f32(s.to_f32() * self.0);
        }
    }
}

/// A gradient source; the scale pushes the bright half past white so
/// integer clamping is exercised.
fn gradient(depth: BitDepth, len: usize) -> Vec<u8> {
    match depth {
        BitDepth::Float => {
            let values: Vec<f32> = (0..len / 4).map(|i| (i % 251) as f32 / 250.0).collect();
            bytemuck::cast_slice(&values).to_vec()
        }
        _ => (0..len).map(|i| (i % 251) as u8).collect(),
    }
}

fn never() -> bool {
    false
}

fn bench_process(c: &mut Criterion) {
    let threads = RayonThreads::new(0).expect("thread pool");

    for depth in [BitDepth::Byte, BitDepth::Float] {
        let mut group = c.benchmark_group(format!("process_{:?}", depth).to_lowercase());
        for &(width, height, name) in RESOLUTIONS {
            let bounds = RectI::new(0, 0, width, height);
            let layout = ImageLayout::packed(bounds, depth, Components::Rgba);
            let len = layout.required_len().expect("layout");
            group.throughput(Throughput::Bytes(len as u64));

            let src = gradient(depth, len);
            let mut dst = vec![0u8; len];

            for workers in [1usize, 0] {
                let options = RenderOptions::new().with_max_workers(workers);
                let processor = Processor::new(&never)
                    .with_multi_thread(Some(&threads))
                    .with_options(options);
                let label = if workers == 1 { "serial" } else { "parallel" };
                group.bench_with_input(BenchmarkId::new(label, name), &src, |b, src| {
                    b.iter(|| {
                        let view = ImageView::new(src, layout).unwrap();
                        let out = ImageViewMut::new(&mut dst, layout).unwrap();
                        processor.process(&Scale(1.5), Some(&view), out, bounds).unwrap();
                        std::hint::black_box(&dst);
                    });
                });
            }
        }
        group.finish();
    }
}

fn bench_split_rows(c: &mut Criterion) {
    let window = RectI::new(0, 0, 3840, 2160);
    c.bench_function("split_rows_4k_64", |b| {
        b.iter(|| std::hint::black_box(split_rows(std::hint::black_box(&window), 64)));
    });
}

criterion_group!(benches, bench_process, bench_split_rows);
criterion_main!(benches);

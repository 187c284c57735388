//! Page Rendering Benchmarks
//!
//! Cold renders (decode on every iteration) against cached renders
//! (served from the decode cache) for a CBZ with large pages, plus the
//! downsample factor computation.
//!
//! Run with: `cargo bench --bench page_rendering`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::io::{Cursor, Write};
use std::path::Path;
use std::time::Duration;

use amnesia_comics::cache::CacheConfig;
use amnesia_comics::imaging::{compute_downsample_factor, decode_with_budget, DecodeLimits};
use amnesia_comics::{BookReader, BookReaderFactory, EngineConfig, RenderTarget};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use tempfile::TempDir;
use zip::{write::SimpleFileOptions, ZipWriter};

const PAGE_WIDTH: u32 = 1600;
const PAGE_HEIGHT: u32 = 2400;

/// Gradient page so encoders cannot collapse it to nothing
fn create_page(format: ImageFormat) -> Vec<u8> {
    let buf = ImageBuffer::from_fn(PAGE_WIDTH, PAGE_HEIGHT, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(buf)
        .write_to(&mut Cursor::new(&mut out), format)
        .unwrap();
    out
}

fn create_cbz(path: &Path, pages: usize) {
    let mut zip = ZipWriter::new(std::fs::File::create(path).unwrap());
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let page = create_page(ImageFormat::Jpeg);
    for index in 0..pages {
        zip.start_file(format!("page-{index:03}.jpg"), options).unwrap();
        zip.write_all(&page).unwrap();
    }
    zip.finish().unwrap();
}

fn bench_page_render(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bench.cbz");
    create_cbz(&path, 4);

    let mut config = EngineConfig::default().with_temp_root(dir.path());
    let mut group = c.benchmark_group("page_render");
    group.measurement_time(Duration::from_secs(10));

    for target in [RenderTarget::new(1080, 1920), RenderTarget::square(200)] {
        let label = format!("{}x{}", target.width, target.height);

        // A zero budget rejects every insert, so each render decodes
        config.cache = CacheConfig {
            page_budget_bytes: 0,
            thumbnail_budget_bytes: 0,
        };
        let mut cold = BookReaderFactory::new(config.clone());
        let (cold_reader, _) = runtime.block_on(cold.open(&path)).unwrap();
        group.bench_with_input(BenchmarkId::new("cold", &label), &target, |b, target| {
            b.iter(|| {
                let page = runtime
                    .block_on(cold_reader.render_page(1, *target))
                    .unwrap();
                black_box(page)
            });
        });
        runtime.block_on(cold.release_resources());

        config.cache = CacheConfig::default();
        let mut warm = BookReaderFactory::new(config.clone());
        let (warm_reader, _) = runtime.block_on(warm.open(&path)).unwrap();
        runtime.block_on(warm_reader.render_page(1, target)).unwrap();
        group.bench_with_input(BenchmarkId::new("cached", &label), &target, |b, target| {
            b.iter(|| {
                let page = runtime
                    .block_on(warm_reader.render_page(1, *target))
                    .unwrap();
                black_box(page)
            });
        });
        runtime.block_on(warm.release_resources());
    }

    group.finish();
}

fn bench_budgeted_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("budgeted_decode");
    group.measurement_time(Duration::from_secs(10));

    for format in [ImageFormat::Jpeg, ImageFormat::Png] {
        let bytes = create_page(format);
        group.bench_with_input(
            BenchmarkId::new("thumbnail", format!("{format:?}")),
            &bytes,
            |b, bytes| {
                b.iter(|| {
                    decode_with_budget(
                        black_box(bytes),
                        RenderTarget::square(200),
                        DecodeLimits::default(),
                    )
                    .unwrap()
                });
            },
        );
    }

    group.finish();
}

fn bench_downsample_factor(c: &mut Criterion) {
    c.bench_function("downsample_factor", |b| {
        b.iter(|| {
            compute_downsample_factor(
                black_box(PAGE_WIDTH),
                black_box(PAGE_HEIGHT),
                black_box(200),
                black_box(300),
            )
        });
    });
}

criterion_group!(
    benches,
    bench_page_render,
    bench_budgeted_decode,
    bench_downsample_factor,
);
criterion_main!(benches);

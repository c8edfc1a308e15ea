//! Performance benchmarks for mtcopy
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mtcopy::config::TransferConfig;
use mtcopy::core::{ChunkPlanner, TransferCoordinator};

/// Create `count` buffers of `size` bytes with a recognizable pattern
fn create_buffers(count: usize, size: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| (0..size).map(|b| (b % 251) as u8 ^ i as u8).collect())
        .collect()
}

fn bench_fine_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("fine_split");

    for size in [3 * 1024 * 1024, 24 * 1024 * 1024, 96 * 1024 * 1024].iter() {
        let sources = create_buffers(1, *size);
        let mut destinations = create_buffers(1, *size);

        group.throughput(Throughput::Bytes(*size as u64));
        for workers in [1usize, 2, 4] {
            let coordinator = TransferCoordinator::new(TransferConfig {
                max_workers: workers,
                ..Default::default()
            });

            group.bench_with_input(
                BenchmarkId::new(
                    format!("{}_workers", workers),
                    humansize::format_size(*size as u64, humansize::BINARY),
                ),
                size,
                |b, _| {
                    b.iter(|| {
                        let src: Vec<&[u8]> = sources.iter().map(|s| s.as_slice()).collect();
                        let mut dst: Vec<&mut [u8]> =
                            destinations.iter_mut().map(|d| d.as_mut_slice()).collect();
                        black_box(coordinator.transfer(&src, &mut dst, None).unwrap());
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_coarse_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("coarse_split");

    let pages = 4096;
    let page_size = 4096;
    let sources = create_buffers(pages, page_size);
    let mut destinations = create_buffers(pages, page_size);
    let coordinator = TransferCoordinator::default();

    group.throughput(Throughput::Bytes((pages * page_size) as u64));
    group.bench_function("4096_pages", |b| {
        b.iter(|| {
            let src: Vec<&[u8]> = sources.iter().map(|s| s.as_slice()).collect();
            let mut dst: Vec<&mut [u8]> =
                destinations.iter_mut().map(|d| d.as_mut_slice()).collect();
            black_box(coordinator.transfer(&src, &mut dst, None).unwrap());
        });
    });

    group.finish();
}

fn bench_planner(c: &mut Criterion) {
    let lengths = vec![4096usize; 100_000];

    c.bench_function("plan_100k_units", |b| {
        b.iter(|| black_box(ChunkPlanner::new(64).plan(&lengths).unwrap()));
    });
}

criterion_group!(benches, bench_fine_split, bench_coarse_split, bench_planner);

criterion_main!(benches);

//! Rotating writer benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use logroll_bench::log_line;
use logroll_core::{ArchiveMode, RotatingWriter, WriterConfig};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

/// Benchmark writes that never rotate.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer_append");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let config = WriterConfig::new(u64::MAX, 1);
            let writer = RotatingWriter::open(temp_dir.path().join("bench.log"), config).unwrap();
            let line = log_line(size);

            b.iter(|| {
                black_box(writer.write(black_box(&line)).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark writes with frequent rotation.
fn bench_rotating(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer_rotating");
    group.sample_size(20);

    for mode in [ArchiveMode::Inline, ArchiveMode::Background] {
        let name = format!("{mode:?}").to_lowercase();
        group.throughput(Throughput::Bytes(256));
        group.bench_function(BenchmarkId::new(name, "64KiB"), |b| {
            let temp_dir = TempDir::new().unwrap();
            let config = WriterConfig::new(64 * 1024, 4)
                .archive_mode(mode)
                .sync_on_rotate(false);
            let writer = RotatingWriter::open(temp_dir.path().join("bench.log"), config).unwrap();
            let line = log_line(256);

            b.iter(|| {
                black_box(writer.write(black_box(&line)).unwrap());
            });

            writer.close().unwrap();
        });
    }

    group.finish();
}

/// Benchmark contended writes from several threads.
fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer_contended");
    group.sample_size(20);

    for threads in [1usize, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements((*threads * 1000) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(threads), threads, |b, &threads| {
            let temp_dir = TempDir::new().unwrap();
            let config = WriterConfig::new(1024 * 1024, 2).sync_on_rotate(false);
            let writer = Arc::new(
                RotatingWriter::open(temp_dir.path().join("bench.log"), config).unwrap(),
            );
            let line = Arc::new(log_line(128));

            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let writer = Arc::clone(&writer);
                        let line = Arc::clone(&line);
                        thread::spawn(move || {
                            for _ in 0..1000 {
                                writer.write(&line).unwrap();
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_append, bench_rotating, bench_contended);
criterion_main!(benches);

//! Stream Performance Benchmarks
//!
//! ## What We Benchmark
//!
//! ### 1. Append (`bench_append`)
//! - Records/second appended with explicit IDs
//! - Same-schema records (dictionary compressed) vs. varying schemas
//!
//! ### 2. Range Reads (`bench_range`)
//! - Full forward and reverse scans
//!
//! ### 3. Trim (`bench_trim`)
//! - Exact vs. approximate trims of half the stream
//!
//! ### 4. Snapshots (`bench_snapshot`)
//! - Encode + decode with and without LZ4 node bodies
//!
//! ## Running Benchmarks
//!
//! ```bash
//! cargo bench -p streamlog-storage
//!
//! # Run specific benchmark
//! cargo bench -p streamlog-storage --bench append_bench append
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use streamlog_storage::{
    decode_stream, encode_stream, Compression, Stream, StreamConfig, StreamId,
};

fn filled_stream(count: u64, config: StreamConfig) -> Stream {
    let mut stream = Stream::with_config(config);
    for i in 1..=count {
        let value = format!("value-{i}");
        stream
            .append(
                &[("sensor", "temp-01"), ("reading", value.as_str())],
                Some(StreamId::new(i, 0)),
            )
            .unwrap();
    }
    stream
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for record_count in [1_000u64, 10_000] {
        group.throughput(Throughput::Elements(record_count));
        group.bench_with_input(
            BenchmarkId::new("same_fields", record_count),
            &record_count,
            |b, &count| {
                b.iter(|| black_box(filled_stream(count, StreamConfig::default())));
            },
        );
        group.bench_with_input(
            BenchmarkId::new("varying_fields", record_count),
            &record_count,
            |b, &count| {
                b.iter(|| {
                    let mut stream = Stream::new();
                    for i in 1..=count {
                        let field = format!("f{}", i % 5);
                        stream
                            .append(&[(field.as_str(), "v")], Some(StreamId::new(i, 0)))
                            .unwrap();
                    }
                    black_box(stream)
                });
            },
        );
    }

    group.finish();
}

fn bench_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("range");
    let record_count = 10_000u64;
    let stream = filled_stream(record_count, StreamConfig::default());

    group.throughput(Throughput::Elements(record_count));
    for reverse in [false, true] {
        let name = if reverse { "reverse" } else { "forward" };
        group.bench_function(name, |b| {
            b.iter(|| {
                black_box(
                    stream
                        .range(StreamId::MIN, StreamId::MAX, reverse, None)
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

fn bench_trim(c: &mut Criterion) {
    let mut group = c.benchmark_group("trim");

    for approximate in [false, true] {
        let name = if approximate { "approximate" } else { "exact" };
        group.bench_function(name, |b| {
            b.iter_batched(
                || filled_stream(10_000, StreamConfig::default()),
                |mut stream| black_box(stream.trim(5_000, approximate).unwrap()),
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for compression in [Compression::None, Compression::Lz4] {
        let compression_name = match compression {
            Compression::None => "none",
            Compression::Lz4 => "lz4",
        };
        let config = StreamConfig {
            snapshot_compression: compression,
            ..Default::default()
        };
        let stream = filled_stream(10_000, config.clone());

        group.bench_function(format!("{compression_name}_roundtrip"), |b| {
            b.iter(|| {
                let bytes = encode_stream(&stream).unwrap();
                black_box(decode_stream(&bytes, config.clone()).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_append, bench_range, bench_trim, bench_snapshot);
criterion_main!(benches);

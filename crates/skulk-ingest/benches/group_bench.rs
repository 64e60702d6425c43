//! Benchmarks for the ingestion write path.
//!
//! Run with: cargo bench --package alopex-skulk-ingest
//!
//! ## Benchmark Categories
//!
//! - **Grouping**: single-pass scan over simple-only and mixed batches
//! - **Resolution**: pointer chain serialization
//! - **End-to-End**: group + resolve + append into an in-memory store

use alopex_skulk_ingest::group::{group_points, GroupedBatch};
use alopex_skulk_ingest::ingest::BatchIngestor;
use alopex_skulk_ingest::point::{encode_points, Location, Point};
use alopex_skulk_ingest::resolver::{EpochIndex, EpochResolver};
use alopex_skulk_ingest::store::MemoryStore;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::BTreeMap;

/// Generate a batch where every `extended_every`-th point carries a payload.
fn generate_batch(count: usize, extended_every: usize, payload: &[u8]) -> Vec<u8> {
    let points: Vec<Point<'_>> = (0..count)
        .map(|i| {
            let address = (i as u64 % 512) * 2;
            let time = i as u64;
            if extended_every > 0 && i % extended_every == 0 {
                Point::extended(address + 1, time, payload)
            } else {
                Point::simple(address, time, i as u64)
            }
        })
        .collect();
    encode_points(&points)
}

fn index() -> EpochIndex {
    EpochIndex::new().with_epoch(0, 64).with_epoch(50_000, 128)
}

fn zero_lengths(batch: &GroupedBatch) -> BTreeMap<Location, u64> {
    batch
        .referenced_extended_locations()
        .into_iter()
        .map(|location| (location, 0))
        .collect()
}

fn bench_group_simple_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_simple_only");
    let idx = index();

    for count in [1_000usize, 10_000, 100_000] {
        let buf = generate_batch(count, 0, b"");
        group.throughput(Throughput::Bytes(buf.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &buf, |b, buf| {
            b.iter(|| group_points(black_box(buf), &EpochResolver, &idx, &idx))
        });
    }

    group.finish();
}

fn bench_group_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_mixed");
    let idx = index();
    let payload = vec![0xABu8; 64];

    for extended_every in [2usize, 8, 32] {
        let buf = generate_batch(10_000, extended_every, &payload);
        group.throughput(Throughput::Bytes(buf.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(extended_every),
            &buf,
            |b, buf| b.iter(|| group_points(black_box(buf), &EpochResolver, &idx, &idx)),
        );
    }

    group.finish();
}

fn bench_resolve_pointers(c: &mut Criterion) {
    let idx = index();
    let buf = generate_batch(10_000, 1, b"payload");
    let batch = group_points(&buf, &EpochResolver, &idx, &idx).unwrap();
    let lengths = zero_lengths(&batch);

    c.bench_function("resolve_pointers_10k", |b| {
        b.iter(|| batch.resolve_pointers(black_box(&lengths)))
    });
}

fn bench_ingest_memory_store(c: &mut Criterion) {
    let idx = index();
    let ingestor = BatchIngestor::new(EpochResolver, idx.clone(), idx);
    let buf = generate_batch(10_000, 4, &[0x5Au8; 32]);

    c.bench_function("ingest_memory_store_10k", |b| {
        b.iter(|| {
            let mut store = MemoryStore::new();
            ingestor.ingest(&mut store, black_box(&buf)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_group_simple_only,
    bench_group_mixed,
    bench_resolve_pointers,
    bench_ingest_memory_store
);
criterion_main!(benches);

//! Handle-table benchmarks.

use std::ptr::NonNull;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use silcore_core::idarray::{CompactIdArray, IdTable, SharedIdArray};

fn register_release<Table: IdTable<u64>>(table: &Table, objects: &mut [u64]) {
    let ids: Vec<usize> = objects
        .iter_mut()
        .map(|o| table.register(NonNull::from(o)))
        .collect();
    for id in ids {
        table.release(id);
    }
}

fn bench_register_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("register_release_256");
    let mut objects = vec![0u64; 256];
    for expand_by in [4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::new("compact", expand_by), &expand_by, |b, &e| {
            let table = CompactIdArray::new(e).expect("valid expand_by");
            b.iter(|| register_release(&table, &mut objects));
        });
        group.bench_with_input(BenchmarkId::new("shared", expand_by), &expand_by, |b, &e| {
            let table = SharedIdArray::new(e).expect("valid expand_by");
            b.iter(|| register_release(&table, &mut objects));
        });
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    let mut objects = vec![0u64; 1024];
    for expand_by in [4usize, 64] {
        // Lookups walk the segment chain, so segment size dominates.
        let table = SharedIdArray::new(expand_by).expect("valid expand_by");
        let ids: Vec<usize> = objects
            .iter_mut()
            .map(|o| table.register(NonNull::from(o)))
            .collect();
        group.bench_with_input(BenchmarkId::new("shared", expand_by), &ids, |b, ids| {
            b.iter(|| ids.iter().filter_map(|&id| table.get(id)).count());
        });
    }
    let compact = CompactIdArray::new(16).expect("valid expand_by");
    let ids: Vec<usize> = objects
        .iter_mut()
        .map(|o| compact.register(NonNull::from(o)))
        .collect();
    group.bench_function("compact", |b| {
        b.iter(|| ids.iter().filter_map(|&id| compact.get(id)).count());
    });
    group.finish();
}

criterion_group!(benches, bench_register_release, bench_get);
criterion_main!(benches);

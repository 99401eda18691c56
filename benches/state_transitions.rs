//! Benchmarks for copy-free paths: state bookkeeping, repeated reads and
//! alias management.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mirrorsync::{ArgumentList, CoherenceState, DeviceAllocator, HostBackedAllocator, SyncCache};

fn bench_transition_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("transition_table");
    let states = [
        CoherenceState::HostOwned,
        CoherenceState::DeviceOwned,
        CoherenceState::Shared,
    ];

    group.bench_function("all_triggers", |b| {
        b.iter(|| {
            for state in states {
                let _ = black_box(state.on_synchronize(true));
                let _ = black_box(state.on_write(true));
                let _ = black_box(state.on_invocation(true));
                let _ = black_box(state.on_refresh());
            }
        })
    });

    group.finish();
}

fn bench_shared_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared_reads");
    let alloc: Arc<dyn DeviceAllocator> = Arc::new(HostBackedAllocator::new(1024 * 1024));
    let mut home = vec![0u32; 1024];
    let cache = SyncCache::allocate(&alloc, &mut home).unwrap();
    cache.prepare_for_invocation(&mut ArgumentList::new());
    cache.synchronize();

    group.bench_function("get_in_shared", |b| {
        b.iter(|| black_box(cache.get().len()))
    });

    group.finish();
}

fn bench_alias_clone_drop(c: &mut Criterion) {
    let mut group = c.benchmark_group("aliases");
    let alloc: Arc<dyn DeviceAllocator> = Arc::new(HostBackedAllocator::new(1024 * 1024));
    let mut home = vec![0u8; 256];
    let cache = SyncCache::allocate(&alloc, &mut home).unwrap();

    group.bench_function("clone_and_drop", |b| {
        b.iter(|| {
            let alias = cache.clone();
            black_box(alias.is_last())
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_transition_table,
    bench_shared_reads,
    bench_alias_clone_drop
);
criterion_main!(benches);

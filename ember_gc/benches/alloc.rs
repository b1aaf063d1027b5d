//! Allocation-path benchmarks.
//!
//! Measures the fast allocation path per size class and a full
//! collection cycle over a populated heap.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ember_gc::{GlobalRoot, HeapConfig, HeapManager, Root};

fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate");

    for (label, size) in [("small_64b", 64u32), ("medium_1k", 1024), ("large_64k", 64 * 1024)] {
        group.bench_function(label, |b| {
            let manager = HeapManager::with_defaults();
            b.iter(|| {
                // Collect when the class runs dry so the loop can keep going.
                black_box(manager.allocate(black_box(size)))
            })
        });
    }

    group.finish();
}

fn bench_collection(c: &mut Criterion) {
    c.bench_function("collect_garbage_populated", |b| {
        let manager = HeapManager::new(HeapConfig::default()).expect("manager");

        // A mix of rooted and unrooted blocks so mark, sweep, and
        // coalesce all have real work.
        for i in 0..512 {
            let block = manager.allocate(if i % 5 == 0 { 2048 } else { 128 });
            if i % 4 == 0 {
                manager.add_root(format!("g{i}"), Root::Global(GlobalRoot::new(block)));
            }
        }

        b.iter(|| manager.collect_garbage())
    });
}

criterion_group!(benches, bench_allocation, bench_collection);
criterion_main!(benches);

//! Benchmarks for zsql-incremental.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use zsql_core::Value;
use zsql_incremental::ZSet;

fn make_zset(size: i32, weight: i64) -> ZSet {
    (0..size)
        .map(|i| (Value::tuple(vec![Value::Int32(i), Value::Int64(i as i64 * 10)]), weight))
        .collect()
}

fn bench_zset_plus(c: &mut Criterion) {
    let mut group = c.benchmark_group("zset/plus");

    for size in [10, 100, 1000] {
        let left = make_zset(size, 1);
        let right = make_zset(size / 2, -1);
        group.bench_with_input(BenchmarkId::new("retract_half", size), &(left, right), |b, (l, r)| {
            b.iter(|| black_box(l).plus(black_box(r)))
        });
    }

    group.finish();
}

fn bench_zset_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("zset/index");

    for size in [10, 100, 1000] {
        let indexed: ZSet = (0..size)
            .map(|i| {
                let row = Value::tuple(vec![Value::Int32(i)]);
                (zsql_incremental::pair(Value::Int32(i % 7), row), 1)
            })
            .collect();
        group.bench_with_input(BenchmarkId::new("group_by_key", size), &indexed, |b, zset| {
            b.iter(|| black_box(zset).index())
        });
    }

    group.finish();
}

fn bench_zset_distinct(c: &mut Criterion) {
    let zset = make_zset(1000, 3);
    c.bench_function("zset/distinct", |b| b.iter(|| black_box(&zset).distinct()));
}

criterion_group!(benches, bench_zset_plus, bench_zset_index, bench_zset_distinct);
criterion_main!(benches);

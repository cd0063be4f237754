extern crate criterion;
extern crate roarset;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use roarset::{intersect_many, union_many, RoaringSet};
use std::iter::FromIterator;

struct Duplex(Vec<u32>, Vec<u32>);

struct RDuplex(RoaringSet, RoaringSet);

impl std::fmt::Display for RDuplex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} - {} {}",
            self.0.cardinality(),
            self.0.num_containers(),
            self.1.cardinality(),
            self.1.num_containers()
        )
    }
}

// =========

fn do_bench_duplex(c: &mut Criterion, label: &str, i: Duplex) {
    let ri = RDuplex(
        RoaringSet::from_iter(i.0.clone()),
        RoaringSet::from_iter(i.1.clone()),
    );

    let mut oi = RDuplex(
        RoaringSet::from_iter(i.0.clone()),
        RoaringSet::from_iter(i.1.clone()),
    );
    oi.0.optimize();
    oi.1.optimize();

    let mut group = c.benchmark_group(&format!("{}_union", label));
    group.bench_with_input(
        BenchmarkId::new("Plain", &ri),
        &ri,
        |t, RDuplex(a, b)| t.iter(|| (b | a).cardinality()),
    );
    group.bench_with_input(
        BenchmarkId::new("Optimized", &oi),
        &oi,
        |t, RDuplex(a, b)| t.iter(|| (b | a).cardinality()),
    );
    group.finish();

    let mut group = c.benchmark_group(&format!("{}_intersection", label));
    group.bench_with_input(
        BenchmarkId::new("Plain", &ri),
        &ri,
        |t, RDuplex(a, b)| t.iter(|| (b & a).cardinality()),
    );
    group.bench_with_input(
        BenchmarkId::new("Optimized", &oi),
        &oi,
        |t, RDuplex(a, b)| t.iter(|| (b & a).cardinality()),
    );
    group.finish();

    let mut group = c.benchmark_group(&format!("{}_codec", label));
    group.bench_with_input(BenchmarkId::new("Serialize", &ri), &ri, |t, RDuplex(a, _)| {
        t.iter(|| a.serialize().len())
    });
    let bytes = ri.0.serialize();
    group.bench_with_input(
        BenchmarkId::new("Deserialize", &ri),
        &bytes,
        |t, bytes| t.iter(|| RoaringSet::deserialize(bytes).map(|s| s.cardinality())),
    );
    group.finish();
}

fn bench_duplex(c: &mut Criterion) {
    let i = Duplex(
        vec![2, 3, 8, 35, 64, 128, 130, 150, 152, 180, 256, 800, 900],
        Vec::from_iter(1..1024),
    );
    do_bench_duplex(c, "1_small", i);

    let i = Duplex(vec![1], Vec::from_iter(1..102400));
    do_bench_duplex(c, "2_large_early", i);

    let i = Duplex(vec![102399], Vec::from_iter(1..102400));
    do_bench_duplex(c, "3_large_deep", i);

    let i = Duplex(Vec::from_iter(1..1024), Vec::from_iter(1..1024));
    do_bench_duplex(c, "4_same", i);

    let i = Duplex(
        Vec::from_iter((0..2_000_000).step_by(7)),
        Vec::from_iter((0..2_000_000).step_by(3)),
    );
    do_bench_duplex(c, "5_dense_sparse", i);
}

fn bench_many(c: &mut Criterion) {
    // 500 single value sets, the shape a query planner hands over for an "or" of
    // equality terms.
    let singles: Vec<RoaringSet> = (0..500u32)
        .map(|i| RoaringSet::from_iter(vec![i * 7919 % 100_000]))
        .collect();

    let common = [17, 4099, 65_537];
    let overlapping: Vec<RoaringSet> = (0..500u32)
        .map(|i| {
            let mut s = RoaringSet::from_iter(common.iter().copied());
            s.add_range((i * 100)..(i * 100 + 5000));
            s
        })
        .collect();

    let mut group = c.benchmark_group("6_many");
    group.bench_function("union_many_singles", |t| {
        t.iter(|| union_many(&singles).cardinality())
    });
    group.bench_function("intersect_many_overlapping", |t| {
        t.iter(|| intersect_many(&overlapping).map(|s| s.cardinality()))
    });
    group.finish();
}

criterion_group!(setbenches, bench_duplex, bench_many);
criterion_main!(setbenches);

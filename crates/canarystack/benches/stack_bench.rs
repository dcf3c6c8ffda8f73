//! Guarded stack overhead benchmarks.
//!
//! Measures push/pop round trips (including the checksum re-stamp on every
//! mutation), growth through several doublings, and a standalone verify.

use canarystack::{DumpSink, GuardStack, guard_stack};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

fn quiet() -> GuardStack {
    guard_stack!()
        .expect("init")
        .with_dump_sink(DumpSink::Off)
}

fn bench_push_pop_round_trip(c: &mut Criterion) {
    let mut stack = quiet();
    c.bench_function("push_pop_round_trip", |b| {
        b.iter(|| {
            stack.push(criterion::black_box(42)).expect("push");
            criterion::black_box(stack.pop().expect("pop"));
        });
    });
}

fn bench_fill_and_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_and_drain");
    for n in [8usize, 64, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut stack = quiet();
                for v in 0..n as i32 {
                    stack.push(v).expect("push");
                }
                while let Ok(v) = stack.pop() {
                    criterion::black_box(v);
                }
                stack.destroy().expect("destroy");
            });
        });
    }
    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify");
    for n in [0usize, 100, 1000] {
        let mut stack = quiet();
        for v in 0..n as i32 {
            stack.push(v).expect("push");
        }
        group.bench_with_input(BenchmarkId::from_parameter(n), &stack, |b, stack| {
            b.iter(|| criterion::black_box(stack.verify()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_push_pop_round_trip,
    bench_fill_and_drain,
    bench_verify
);
criterion_main!(benches);

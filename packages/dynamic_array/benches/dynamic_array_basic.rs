//! Basic benchmarks for the `dynamic_array` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::time::Instant;

use criterion::{Criterion, criterion_group, criterion_main};
use dynamic_array::DynamicArray;

criterion_group!(benches, entrypoint);
criterion_main!(benches);

type TestItem = usize;
const TEST_VALUE: TestItem = 1024;

/// Number of elements in the arrays that operations are performed on.
const ARRAY_LEN: usize = 1000;

fn filled() -> DynamicArray<TestItem> {
    let mut array = DynamicArray::new();
    array.extend(iter::repeat_n(TEST_VALUE, ARRAY_LEN));
    array
}

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynamic_array_basic");

    group.bench_function("push_back_with_growth", |b| {
        b.iter(|| {
            let mut array = DynamicArray::new();

            for _ in 0..ARRAY_LEN {
                array.push_back(black_box(TEST_VALUE)).unwrap();
            }

            black_box(array)
        });
    });

    group.bench_function("push_back_preallocated", |b| {
        b.iter(|| {
            let mut array = DynamicArray::builder().capacity(ARRAY_LEN).build().unwrap();

            for _ in 0..ARRAY_LEN {
                array.push_back(black_box(TEST_VALUE)).unwrap();
            }

            black_box(array)
        });
    });

    group.bench_function("insert_front", |b| {
        b.iter_custom(|iters| {
            let mut arrays = iter::repeat_with(filled)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let start = Instant::now();

            for array in &mut arrays {
                _ = black_box(array.insert(0, black_box(TEST_VALUE)));
            }

            start.elapsed()
        });
    });

    group.bench_function("erase_front", |b| {
        b.iter_custom(|iters| {
            let mut arrays = iter::repeat_with(filled)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let start = Instant::now();

            for array in &mut arrays {
                _ = black_box(array.erase(0));
            }

            start.elapsed()
        });
    });

    group.bench_function("try_clone", |b| {
        let array = filled();

        b.iter(|| black_box(array.try_clone().unwrap()));
    });

    group.bench_function("with_len", |b| {
        b.iter(|| black_box(DynamicArray::<TestItem>::with_len(black_box(ARRAY_LEN)).unwrap()));
    });

    group.finish();
}

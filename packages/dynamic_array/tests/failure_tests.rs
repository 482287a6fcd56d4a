//! Failure handling tests for the `dynamic_array` package.
//!
//! This test binary installs an allocator that refuses requests on demand and counts the bytes
//! each thread holds, so the tests can verify that failed operations leave the array as
//! promised and release everything they acquired.

#![cfg(not(miri))] // Miri replaces the global allocator, so cannot be used here.

use std::alloc::System;
use std::num::NonZero;
use std::panic::{self, AssertUnwindSafe};

use dynamic_array::{DynamicArray, Error, RawBlock};
use testing::{
    FailingAllocator, Operation, Tracked, fail_allocations_from, fail_on_nth, thread_live_bytes,
};

#[global_allocator]
static ALLOCATOR: FailingAllocator<System> = FailingAllocator::system();

/// Allocations at least this large are refused while a failure guard is active. Nothing the
/// test harness does on the test thread comes close to this size.
const REFUSE_FROM_BYTES: usize = 64 * 1024;

/// Number of `u64` elements that fit in half of `REFUSE_FROM_BYTES`, so doubling it hits the limit.
const HALF_LIMIT_LEN: usize = REFUSE_FROM_BYTES / 2 / size_of::<u64>();

fn sequence(len: usize) -> DynamicArray<u64> {
    DynamicArray::try_from_fn(len, |index| u64::try_from(index)).unwrap()
}

fn tracked_sequence(len: usize) -> DynamicArray<Tracked> {
    DynamicArray::try_from_fn(len, |index| u64::try_from(index).map(Tracked::new)).unwrap()
}

/// Runs `scenario` twice and asserts that the second run leaves no bytes and no elements
/// behind. The first run absorbs one-time allocations made on first use of a code path.
fn assert_releases_everything(mut scenario: impl FnMut()) {
    scenario();

    let bytes_before = thread_live_bytes();
    let live_before = Tracked::live();

    scenario();

    assert_eq!(thread_live_bytes(), bytes_before, "memory was leaked");
    assert_eq!(Tracked::live(), live_before, "elements were leaked");
}

#[test]
fn raw_block_reports_allocation_failure() {
    let _refuse = fail_allocations_from(REFUSE_FROM_BYTES);

    let result = RawBlock::<u64>::allocate(10_000);

    assert!(matches!(
        result,
        Err(Error::Allocation {
            capacity: 10_000,
            byte_count: 80_000
        })
    ));
}

#[test]
fn raw_block_releases_storage_once() {
    assert_releases_everything(|| {
        let mut a = RawBlock::<u64>::allocate(100).unwrap();
        let mut b = RawBlock::<u64>::allocate(300).unwrap();

        a.exchange(&mut b);
    });
}

#[test]
fn failed_reserve_leaves_array_unchanged() {
    let mut array = sequence(3);

    let result = {
        let _refuse = fail_allocations_from(REFUSE_FROM_BYTES);
        array.reserve(10_000)
    };

    let error = result.unwrap_err();
    assert!(error.is_allocation_failure());

    assert_eq!(array.as_slice(), &[0, 1, 2]);
    assert_eq!(array.capacity(), 3);
}

#[test]
fn failed_growth_in_push_back_leaves_array_unchanged() {
    let mut array = sequence(HALF_LIMIT_LEN);
    let base = array.as_ptr();

    let result = {
        let _refuse = fail_allocations_from(REFUSE_FROM_BYTES);
        array.push_back(12345)
    };

    assert!(matches!(result, Err(Error::Allocation { .. })));
    assert_eq!(array.len(), HALF_LIMIT_LEN);
    assert_eq!(array.capacity(), HALF_LIMIT_LEN);
    assert_eq!(array.as_ptr(), base);
    assert!(
        array
            .iter()
            .enumerate()
            .all(|(index, value)| u64::try_from(index).unwrap() == *value)
    );

    // Once the allocator cooperates again, growth works as usual.
    array.push_back(12345).unwrap();
    assert_eq!(array.capacity(), HALF_LIMIT_LEN * 2);
}

#[test]
fn failed_growth_does_not_call_emplace_constructor() {
    let mut array = tracked_sequence(HALF_LIMIT_LEN);
    let live_before = Tracked::live();

    let result = {
        let _refuse = fail_allocations_from(REFUSE_FROM_BYTES);
        array.emplace_back(|| unreachable!("storage is secured before construction"))
    };

    assert!(result.is_err());
    assert_eq!(array.len(), HALF_LIMIT_LEN);
    assert_eq!(Tracked::live(), live_before);
}

#[test]
fn failed_growth_in_insert_leaves_array_unchanged() {
    let mut array = sequence(HALF_LIMIT_LEN);

    let result = {
        let _refuse = fail_allocations_from(REFUSE_FROM_BYTES);
        array.insert(0, 999).map(|_| ())
    };

    assert!(result.is_err());
    assert_eq!(array.len(), HALF_LIMIT_LEN);
    assert_eq!(array.first(), Some(&0));
}

#[test]
fn sized_construction_allocation_failure_constructs_nothing() {
    let live_before = Tracked::live();

    let result = {
        let _refuse = fail_allocations_from(REFUSE_FROM_BYTES);
        DynamicArray::<Tracked>::with_len(10_000)
    };

    assert!(matches!(result, Err(Error::Allocation { .. })));
    assert_eq!(Tracked::live(), live_before);
}

#[test]
fn sized_construction_error_on_third_of_five_releases_everything() {
    assert_releases_everything(|| {
        let result = DynamicArray::try_from_fn(5, |index| {
            if index == 2 {
                Err("the third element refuses to exist")
            } else {
                Ok(Tracked::new(u64::try_from(index).unwrap()))
            }
        });

        assert!(matches!(
            result,
            Err(Error::ElementOperation { index: 2, .. })
        ));
    });
}

#[test]
fn sized_construction_panic_on_third_of_five_drops_constructed() {
    let live_before = Tracked::live();

    let _fail = fail_on_nth(Operation::Default, NonZero::new(3).unwrap());

    let result = panic::catch_unwind(|| DynamicArray::<Tracked>::with_len(5));

    assert!(result.is_err());
    assert_eq!(Tracked::live(), live_before);
}

#[test]
fn copy_construction_allocation_failure_leaves_source() {
    let original = tracked_sequence(10_000);

    let result = {
        let _refuse = fail_allocations_from(REFUSE_FROM_BYTES);
        original.try_clone()
    };

    assert!(result.unwrap_err().is_allocation_failure());
    assert_eq!(original.len(), 10_000);
}

#[test]
fn copy_construction_panic_drops_partial_copy() {
    let original = tracked_sequence(5);
    let live_before = Tracked::live();

    let _fail = fail_on_nth(Operation::Clone, NonZero::new(4).unwrap());

    let result = panic::catch_unwind(AssertUnwindSafe(|| original.clone()));

    assert!(result.is_err());
    assert_eq!(Tracked::live(), live_before);
}

#[test]
fn infallible_clone_panics_on_allocation_failure() {
    let original = sequence(10_000);

    let result = {
        let _refuse = fail_allocations_from(REFUSE_FROM_BYTES);
        panic::catch_unwind(AssertUnwindSafe(|| original.clone()))
    };

    assert!(result.is_err());
}

#[test]
fn copy_assignment_allocation_failure_is_strong() {
    let source = tracked_sequence(10_000);
    let mut target = tracked_sequence(2);
    let live_before = Tracked::live();

    let result = {
        let _refuse = fail_allocations_from(REFUSE_FROM_BYTES);
        target.try_clone_from(&source)
    };

    assert!(result.unwrap_err().is_allocation_failure());
    assert_eq!(
        target.iter().map(Tracked::value).collect::<Vec<_>>(),
        vec![0, 1]
    );
    assert_eq!(target.capacity(), 2);
    assert_eq!(Tracked::live(), live_before);
}

#[test]
fn copy_assignment_clone_panic_during_growth_is_strong() {
    let source = tracked_sequence(6);
    let mut target = DynamicArray::new();
    target.push_back(Tracked::new(100)).unwrap();
    let live_before = Tracked::live();

    let _fail = fail_on_nth(Operation::Clone, NonZero::new(3).unwrap());

    let result = panic::catch_unwind(AssertUnwindSafe(|| target.clone_from(&source)));

    assert!(result.is_err());
    assert_eq!(
        target.iter().map(Tracked::value).collect::<Vec<_>>(),
        vec![100]
    );
    assert_eq!(target.capacity(), 1);
    assert_eq!(Tracked::live(), live_before);
}

#[test]
fn copy_assignment_clone_panic_in_place_keeps_valid_elements() {
    let source = tracked_sequence(3);
    let mut target = DynamicArray::builder().capacity(8).build().unwrap();
    target.push_back(Tracked::new(100)).unwrap();
    let live_before = Tracked::live();

    // The first element is assigned via clone_from(), the second is a fresh clone that fails.
    let _fail = fail_on_nth(Operation::Clone, NonZero::new(2).unwrap());

    let result = panic::catch_unwind(AssertUnwindSafe(|| target.clone_from(&source)));

    assert!(result.is_err());
    assert_eq!(
        target.iter().map(Tracked::value).collect::<Vec<_>>(),
        vec![0]
    );
    assert_eq!(Tracked::live(), live_before);
}

#[test]
fn resize_panic_keeps_constructed_elements() {
    let mut array = tracked_sequence(2);

    let _fail = fail_on_nth(Operation::Default, NonZero::new(2).unwrap());

    let result = panic::catch_unwind(AssertUnwindSafe(|| array.resize(6)));

    assert!(result.is_err());
    assert_eq!(array.len(), 3);
    assert_eq!(array.capacity(), 6);

    let live_before_drop = Tracked::live();
    drop(array);
    assert_eq!(Tracked::live(), live_before_drop - 3);
}

#[test]
fn everyday_operations_release_everything() {
    assert_releases_everything(|| {
        let mut array = DynamicArray::new();

        for value in 0..100 {
            array.push_back(Tracked::new(value)).unwrap();
        }

        array.insert(50, Tracked::new(1000)).unwrap();
        array.erase(10);
        drop(array.remove(0));
        drop(array.pop_back());
        array.resize(200).unwrap();
        array.truncate(20);

        let mut copy = array.try_clone().unwrap();
        copy.push_back(Tracked::new(5)).unwrap();
        array.clone_from(&copy);

        let mut moved = array.take();
        moved.exchange(&mut copy);
    });
}

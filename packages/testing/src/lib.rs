#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing the `dynamic_array` package.
//!
//! * [`Tracked`] is an element type that counts its live instances and can be told to panic
//!   on the n-th default construction or clone, for verifying that no element leaks when an
//!   element operation fails halfway through a container operation.
//! * [`FailingAllocator`] is a global allocator wrapper that counts live bytes and can be told
//!   to refuse allocations, for verifying how a container handles allocation failure and that
//!   it releases everything it allocated.
//!
//! All counters and failure settings are per thread, so tests running in parallel do not
//! interfere with each other.

mod allocator;
mod tracked;

pub use allocator::*;
pub use tracked::*;

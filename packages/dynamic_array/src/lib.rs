#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A growable array that manages its own raw storage.
//!
//! This crate provides [`DynamicArray`], a contiguous growable array built directly on top of
//! the global allocator instead of on another collection type, and [`RawBlock`], the
//! uninitialized storage it is made of.
//!
//! # Key Features
//!
//! - **Explicit allocation failure**: every operation that may need storage returns a
//!   [`Result`][std::result::Result] with an [`Error`] instead of aborting the process
//! - **Amortized growth**: appends double the capacity (starting from 1) when the array is full
//! - **No partial states**: failed construction drops whatever it constructed and releases its
//!   storage, failed growth leaves the array untouched
//! - **Strong copy assignment**: assigning from a longer array either fully succeeds or leaves
//!   the target as it was
//! - **Slice access**: the array dereferences to `[T]` for indexing, iteration and the rest of
//!   the slice API
//!
//! # Layers
//!
//! [`RawBlock<T>`] owns storage for a fixed number of `T` but never constructs or drops values.
//! It is move-only, so its storage is released exactly once.
//!
//! [`DynamicArray<T>`] owns one block plus a count of live elements and does all the element
//! work: constructing, dropping, relocating on growth and shifting on insert/erase.
//!
//! # Example
//!
//! ```
//! use dynamic_array::DynamicArray;
//!
//! let mut names = DynamicArray::with_len(2)?;
//! names[0] = String::from("first");
//! names[1] = String::from("third");
//!
//! names.insert(1, String::from("second"))?;
//! names.push_back(String::from("fourth"))?;
//!
//! assert_eq!(names.len(), 4);
//! assert_eq!(names.capacity(), 4);
//! assert_eq!(names.join(" "), "first second third fourth");
//!
//! // Copies are deep and independent.
//! let mut copy = names.try_clone()?;
//! copy.erase(0);
//!
//! assert_eq!(names.len(), 4);
//! assert_eq!(copy.len(), 3);
//! # Ok::<(), dynamic_array::Error>(())
//! ```
//!
//! # Logging
//!
//! The crate emits [`tracing`](https://docs.rs/tracing) events when storage is acquired or
//! released (trace level) and when an array grows or the allocator refuses a request
//! (debug level). It does not install a subscriber.

mod builder;
mod dynamic_array;
mod error;
mod raw_block;

pub use builder::*;
pub use dynamic_array::*;
pub use error::Error;
pub(crate) use error::Result;
pub use raw_block::*;

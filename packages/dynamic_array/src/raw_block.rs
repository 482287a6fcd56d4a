use std::alloc::{self, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ptr::NonNull;

use tracing::{debug, trace};

use crate::{Error, Result};

/// Uninitialized storage for a fixed number of `T`, owned by exactly one instance.
///
/// The block never constructs or drops elements. It only knows how many slots it has and where
/// they are. Whoever owns the block is responsible for tracking which slots hold live values and
/// for dropping those values before the block goes away.
///
/// A block is move-only. Ownership of the storage is transferred either by moving the block
/// itself or by [`exchange()`](Self::exchange), so the storage is released exactly once, when
/// the owning block is dropped.
///
/// # Zero-sized types
///
/// Storage for zero-sized `T` never touches the allocator. Such a block reports whatever
/// capacity it was created with.
///
/// # Example
///
/// ```
/// use dynamic_array::RawBlock;
///
/// let mut block = RawBlock::<u32>::allocate(4).unwrap();
/// assert_eq!(block.capacity(), 4);
///
/// block.slot_mut(2).write(42);
///
/// // SAFETY: We just initialized slot 2 and u32 has no drop logic to worry about.
/// assert_eq!(unsafe { block.slot(2).assume_init_read() }, 42);
/// ```
pub struct RawBlock<T> {
    /// Start of the storage. Dangling (but aligned) if nothing was allocated.
    base: NonNull<T>,

    /// Number of `T` slots the storage has room for.
    capacity: usize,

    _owns: PhantomData<T>,
}

impl<T> RawBlock<T> {
    /// Creates an empty block with no storage.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            base: NonNull::dangling(),
            capacity: 0,
            _owns: PhantomData,
        }
    }

    /// Acquires storage for `capacity` elements from the global allocator.
    ///
    /// Requesting zero capacity returns an empty block without allocating.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityOverflow`] if the storage size cannot be expressed as a memory
    /// layout and [`Error::Allocation`] if the allocator cannot satisfy the request.
    pub fn allocate(capacity: usize) -> Result<Self> {
        let Some(layout) = Self::layout_for(capacity)? else {
            return Ok(Self {
                base: NonNull::dangling(),
                capacity,
                _owns: PhantomData,
            });
        };

        // SAFETY: layout_for() only returns layouts with a non-zero size.
        let base = unsafe { alloc::alloc(layout) };

        let Some(base) = NonNull::new(base) else {
            debug!(
                capacity,
                byte_count = layout.size(),
                "allocator refused block request"
            );

            return Err(Error::Allocation {
                capacity,
                byte_count: layout.size(),
            });
        };

        trace!(capacity, byte_count = layout.size(), "acquired block");

        Ok(Self {
            base: base.cast(),
            capacity,
            _owns: PhantomData,
        })
    }

    /// Calculates the layout of the storage for `capacity` elements.
    ///
    /// Returns `None` if the storage would be zero-sized, in which case nothing is allocated.
    fn layout_for(capacity: usize) -> Result<Option<Layout>> {
        let Ok(layout) = Layout::array::<T>(capacity) else {
            return Err(Error::CapacityOverflow { capacity });
        };

        Ok((layout.size() != 0).then_some(layout))
    }

    /// The number of elements the block has room for.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the slot at `index`.
    ///
    /// The slot may or may not hold a live value. The block does not know.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than the capacity of the block.
    #[must_use]
    pub fn slot(&self, index: usize) -> &MaybeUninit<T> {
        let slot = self.slot_ptr(index);

        // SAFETY: slot_ptr() checked the bounds, so the pointer is aligned and within our
        // storage. MaybeUninit<T> is valid for any content, including uninitialized memory.
        unsafe { slot.as_ref() }
    }

    /// Returns the slot at `index` for writing.
    ///
    /// Writing to a slot that holds a live value overwrites it without dropping it.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than the capacity of the block.
    #[must_use]
    pub fn slot_mut(&mut self, index: usize) -> &mut MaybeUninit<T> {
        let mut slot = self.slot_ptr(index);

        // SAFETY: slot_ptr() checked the bounds, so the pointer is aligned and within our
        // storage, and we hold the only reference to the storage (&mut self).
        unsafe { slot.as_mut() }
    }

    fn slot_ptr(&self, index: usize) -> NonNull<MaybeUninit<T>> {
        assert!(
            index < self.capacity,
            "slot {index} out of bounds in block of capacity {}",
            self.capacity
        );

        // SAFETY: The index is within capacity, so the offset stays within our storage
        // (or is a no-op offset of a dangling pointer for zero-sized T).
        unsafe { self.base.add(index).cast() }
    }

    /// Returns a pointer to the first slot.
    ///
    /// The pointer is dangling (but non-null and aligned) if nothing was allocated.
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.base.as_ptr()
    }

    /// Returns a mutable pointer to the first slot.
    ///
    /// The pointer is dangling (but non-null and aligned) if nothing was allocated.
    #[must_use]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.base.as_ptr()
    }

    /// Exchanges the storage of two blocks without touching any of the slots.
    pub fn exchange(&mut self, other: &mut Self) {
        mem::swap(&mut self.base, &mut other.base);
        mem::swap(&mut self.capacity, &mut other.capacity);
    }
}

impl<T> Default for RawBlock<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for RawBlock<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBlock")
            .field("base", &self.base)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<T> Drop for RawBlock<T> {
    fn drop(&mut self) {
        // The layout was valid when the storage was acquired, so an error here is impossible.
        // A zero-sized layout means we never allocated anything.
        let Ok(Some(layout)) = Self::layout_for(self.capacity) else {
            return;
        };

        trace!(
            capacity = self.capacity,
            byte_count = layout.size(),
            "releasing block"
        );

        // SAFETY: base was returned by alloc() in allocate() with this same layout. Blocks are
        // move-only, so this is the only place the storage is ever released.
        unsafe {
            alloc::dealloc(self.base.as_ptr().cast(), layout);
        }
    }
}

// SAFETY: The block owns its storage exclusively, so sending the block sends the storage along
// with whatever values of T the owner has placed in it.
unsafe impl<T: Send> Send for RawBlock<T> {}

// SAFETY: Shared access to the block only hands out shared references to its slots.
unsafe impl<T: Sync> Sync for RawBlock<T> {}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(RawBlock<u32>: Send, Sync, fmt::Debug, Default);
    assert_not_impl_any!(RawBlock<u32>: Clone, Copy);
    assert_not_impl_any!(RawBlock<Rc<u32>>: Send, Sync);

    #[test]
    fn new_is_empty() {
        let block = RawBlock::<u64>::new();

        assert_eq!(block.capacity(), 0);
        assert!(!block.as_ptr().is_null());
    }

    #[test]
    fn allocate_zero_is_empty() {
        let block = RawBlock::<u64>::allocate(0).unwrap();

        assert_eq!(block.capacity(), 0);
    }

    #[test]
    fn allocate_reports_capacity() {
        let block = RawBlock::<u64>::allocate(10).unwrap();

        assert_eq!(block.capacity(), 10);
        assert_eq!(block.as_ptr().align_offset(align_of::<u64>()), 0);
    }

    #[test]
    fn slots_hold_written_values() {
        let mut block = RawBlock::<u32>::allocate(3).unwrap();

        block.slot_mut(0).write(10);
        block.slot_mut(1).write(11);
        block.slot_mut(2).write(12);

        unsafe {
            assert_eq!(block.slot(0).assume_init_read(), 10);
            assert_eq!(block.slot(1).assume_init_read(), 11);
            assert_eq!(block.slot(2).assume_init_read(), 12);
        }
    }

    #[test]
    fn slots_are_contiguous() {
        let block = RawBlock::<u16>::allocate(4).unwrap();

        let first = block.slot(0).as_ptr();
        let third = block.slot(2).as_ptr();

        assert_eq!(first, block.as_ptr());
        assert_eq!(third, block.as_ptr().wrapping_add(2));
    }

    #[test]
    #[should_panic]
    fn slot_past_capacity_panics() {
        let block = RawBlock::<u32>::allocate(3).unwrap();

        _ = block.slot(3);
    }

    #[test]
    #[should_panic]
    fn slot_in_empty_block_panics() {
        let mut block = RawBlock::<u32>::new();

        _ = block.slot_mut(0);
    }

    #[test]
    fn exchange_swaps_storage() {
        let mut a = RawBlock::<u32>::allocate(2).unwrap();
        let mut b = RawBlock::<u32>::allocate(5).unwrap();

        a.slot_mut(0).write(1);
        b.slot_mut(0).write(2);

        let a_base = a.as_ptr();
        let b_base = b.as_ptr();

        a.exchange(&mut b);

        assert_eq!(a.capacity(), 5);
        assert_eq!(b.capacity(), 2);
        assert_eq!(a.as_ptr(), b_base);
        assert_eq!(b.as_ptr(), a_base);

        unsafe {
            assert_eq!(a.slot(0).assume_init_read(), 2);
            assert_eq!(b.slot(0).assume_init_read(), 1);
        }
    }

    #[test]
    fn exchange_with_empty_moves_ownership() {
        let mut full = RawBlock::<u64>::allocate(8).unwrap();
        let mut empty = RawBlock::<u64>::new();

        full.exchange(&mut empty);

        assert_eq!(full.capacity(), 0);
        assert_eq!(empty.capacity(), 8);

        // Both are dropped here, the storage exactly once.
    }

    #[test]
    fn zero_sized_type_never_allocates() {
        let mut block = RawBlock::<()>::allocate(1000).unwrap();

        assert_eq!(block.capacity(), 1000);

        block.slot_mut(999).write(());
    }

    #[test]
    fn overflowing_capacity_is_error() {
        let result = RawBlock::<u64>::allocate(usize::MAX);

        assert!(matches!(
            result,
            Err(Error::CapacityOverflow {
                capacity: usize::MAX
            })
        ));
    }

    #[test]
    fn drop_does_not_drop_slots() {
        struct DropFlag(Rc<Cell<bool>>);

        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let dropped = Rc::new(Cell::new(false));

        let mut block = RawBlock::<DropFlag>::allocate(1).unwrap();
        block.slot_mut(0).write(DropFlag(Rc::clone(&dropped)));

        drop(block);

        assert!(!dropped.get());

        // The value was never dropped, so its Rc clone leaked. That is the expected outcome.
        assert_eq!(Rc::strong_count(&dropped), 2);
    }
}

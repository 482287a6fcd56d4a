use std::convert::Infallible;
use std::error::Error as StdError;
use std::ops::{Deref, DerefMut};
use std::{fmt, mem, ptr, slice};

use scopeguard::ScopeGuard;
use tracing::debug;

use crate::{DynamicArrayBuilder, Error, RawBlock, Result};

/// A growable array that owns its storage and constructs its elements in place.
///
/// The array is made of a [`RawBlock<T>`] and a count of live elements. Slots `[0, len)` of the
/// block hold live elements, slots `[len, capacity)` are uninitialized.
///
/// # Growth
///
/// Appending to a full array grows the capacity to `max(1, 2 * capacity)`. Growing allocates a
/// new block, moves the elements over and only then releases the old block. If the allocation
/// fails, the array is left exactly as it was.
///
/// # Failure handling
///
/// Every operation that may need storage returns a [`Result`][std::result::Result] and reports
/// allocator failures as [`Error::Allocation`] or [`Error::CapacityOverflow`] instead of
/// aborting. Element constructors that report failure through a `Result` surface it as
/// [`Error::ElementOperation`].
///
/// Element operations that fail by panicking (`Default`, `Clone`, `Drop`) never leave the array
/// with an uninitialized slot in `[0, len)` and never leak elements that were already
/// constructed by the same operation.
///
/// # Example
///
/// ```
/// use dynamic_array::DynamicArray;
///
/// let mut array = DynamicArray::new();
///
/// array.push_back(1)?;
/// array.push_back(2)?;
/// array.push_back(4)?;
///
/// array.insert(2, 3)?;
/// assert_eq!(array.as_slice(), &[1, 2, 3, 4]);
///
/// array.erase(0);
/// assert_eq!(array.as_slice(), &[2, 3, 4]);
/// assert_eq!(array.capacity(), 4);
/// # Ok::<(), dynamic_array::Error>(())
/// ```
///
/// # Thread safety
///
/// The array has no internal synchronization. It is [`Send`] and [`Sync`] if `T` is.
pub struct DynamicArray<T> {
    block: RawBlock<T>,

    /// Number of live elements at the start of the block.
    len: usize,
}

impl<T> DynamicArray<T> {
    /// Creates an empty array without allocating.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            block: RawBlock::new(),
            len: 0,
        }
    }

    /// Creates a builder for configuring and constructing a [`DynamicArray`].
    ///
    /// # Example
    ///
    /// ```
    /// use dynamic_array::DynamicArray;
    ///
    /// let array = DynamicArray::<String>::builder().capacity(16).build()?;
    ///
    /// assert_eq!(array.capacity(), 16);
    /// assert!(array.is_empty());
    /// # Ok::<(), dynamic_array::Error>(())
    /// ```
    pub fn builder() -> DynamicArrayBuilder<T> {
        DynamicArrayBuilder::new()
    }

    /// Takes ownership of an empty block.
    pub(crate) fn from_block(block: RawBlock<T>) -> Self {
        Self { block, len: 0 }
    }

    /// Creates an array of `len` default-valued elements, with capacity `len`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated. No elements are constructed in
    /// that case.
    ///
    /// # Panics
    ///
    /// If `T::default()` panics, the elements constructed so far are dropped and the storage is
    /// released before the panic continues.
    pub fn with_len(len: usize) -> Result<Self>
    where
        T: Default,
    {
        Self::try_from_fn(len, |_| Ok::<T, Infallible>(T::default()))
    }

    /// Creates an array of `len` elements, with capacity `len`, constructing the element at each
    /// index by calling `f` with that index.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated or if `f` returns an error. In the
    /// latter case, the elements constructed so far are dropped and the storage is released.
    ///
    /// # Example
    ///
    /// ```
    /// use dynamic_array::DynamicArray;
    ///
    /// let squares = DynamicArray::try_from_fn(4, |index| u32::try_from(index * index))?;
    /// assert_eq!(squares.as_slice(), &[0, 1, 4, 9]);
    /// # Ok::<(), dynamic_array::Error>(())
    /// ```
    pub fn try_from_fn<E, F>(len: usize, mut f: F) -> Result<Self>
    where
        F: FnMut(usize) -> std::result::Result<T, E>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let block = RawBlock::allocate(len)?;

        let block = fill(block, len, |index| {
            f(index).map_err(|source| Error::element_operation(index, source))
        })?;

        Ok(Self { block, len })
    }

    /// Creates a deep copy of the array, with capacity equal to the number of elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated.
    ///
    /// # Panics
    ///
    /// If cloning an element panics, the clones made so far are dropped and the storage is
    /// released before the panic continues.
    pub fn try_clone(&self) -> Result<Self>
    where
        T: Clone,
    {
        let block = RawBlock::allocate(self.len)?;

        let block = fill(block, self.len, |index| {
            #[expect(
                clippy::indexing_slicing,
                reason = "fill() only asks for indexes below self.len"
            )]
            let value = self.as_slice()[index].clone();

            Ok(value)
        })?;

        Ok(Self {
            block,
            len: self.len,
        })
    }

    /// Makes this array a deep copy of `source`.
    ///
    /// If `source` has more elements than this array has capacity for, a complete copy of
    /// `source` is built first and then exchanged in. Otherwise the existing elements are
    /// overwritten via [`Clone::clone_from`], extra elements are cloned into spare capacity and
    /// surplus elements are dropped. Capacity never shrinks.
    ///
    /// # Errors
    ///
    /// Returns an error if new storage is needed and cannot be allocated. The array is untouched
    /// in that case.
    ///
    /// # Panics
    ///
    /// If the new storage is needed and cloning an element panics, the array is untouched.
    /// Otherwise a panic while cloning leaves the array holding a mix of old and new elements,
    /// with every element in `[0, len)` live.
    pub fn try_clone_from(&mut self, source: &Self) -> Result<()>
    where
        T: Clone,
    {
        if source.len > self.capacity() {
            let mut replacement = source.try_clone()?;
            self.exchange(&mut replacement);
            return Ok(());
        }

        let shared = self.len.min(source.len);
        let (source_shared, source_extra) = source.as_slice().split_at(shared);

        for (target, value) in self.as_mut_slice().iter_mut().zip(source_shared) {
            target.clone_from(value);
        }

        // At most one of these does anything.
        for value in source_extra {
            // Capacity was checked above, so this never grows.
            self.push_within_capacity(value.clone());
        }

        self.truncate(source.len);

        Ok(())
    }

    /// Moves the contents out into a new array, leaving this one empty with no storage.
    #[must_use]
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Exchanges the contents (elements and storage) of two arrays.
    ///
    /// No elements are moved or copied. This never fails.
    pub fn exchange(&mut self, other: &mut Self) {
        self.block.exchange(&mut other.block);
        mem::swap(&mut self.len, &mut other.len);
    }

    /// The number of live elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array has no live elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of elements the array can hold before it needs to grow.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.block.capacity()
    }

    /// Ensures the array can hold at least `capacity` elements in total.
    ///
    /// Does nothing if the current capacity is already large enough. Capacity never shrinks.
    ///
    /// # Errors
    ///
    /// Returns an error if new storage cannot be allocated. The array is untouched in that case.
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity() {
            return Ok(());
        }

        let mut replacement = RawBlock::allocate(capacity)?;

        debug!(
            from_capacity = self.capacity(),
            to_capacity = capacity,
            len = self.len,
            "growing array"
        );

        // SAFETY: The first `len` slots of our block hold live elements and the new block has
        // room for at least `len` elements. The two blocks are distinct allocations. After the
        // copy, the new block owns the elements and the old slots are treated as uninitialized.
        unsafe {
            ptr::copy_nonoverlapping(self.block.as_ptr(), replacement.as_mut_ptr(), self.len);
        }

        self.block.exchange(&mut replacement);

        // `replacement` now holds the old storage, which is released here. A block never drops
        // elements, so the relocated elements are unaffected.
        drop(replacement);

        Ok(())
    }

    /// Changes the number of elements to `len`, dropping surplus elements or appending
    /// default-valued ones.
    ///
    /// # Errors
    ///
    /// Returns an error if new storage is needed and cannot be allocated. The array is untouched
    /// in that case.
    pub fn resize(&mut self, len: usize) -> Result<()>
    where
        T: Default,
    {
        self.resize_with(len, T::default)
    }

    /// Changes the number of elements to `len`, dropping surplus elements or appending
    /// elements produced by `f`.
    ///
    /// # Errors
    ///
    /// Returns an error if new storage is needed and cannot be allocated. The array is untouched
    /// in that case.
    pub fn resize_with(&mut self, len: usize, mut f: impl FnMut() -> T) -> Result<()> {
        self.reserve(len)?;

        self.truncate(len);

        while self.len < len {
            self.push_within_capacity(f());
        }

        Ok(())
    }

    /// Drops all elements from index `len` onward. Does nothing if the array is not longer
    /// than `len`. Capacity is unchanged.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }

        // Cannot underflow because we checked len < self.len above.
        let surplus = self.len.wrapping_sub(len);

        // SAFETY: len < self.len, so the offset stays within the live elements.
        let first_surplus = unsafe { self.block.as_mut_ptr().add(len) };
        let surplus = ptr::slice_from_raw_parts_mut(first_surplus, surplus);

        // Shorten first, so a panicking Drop cannot make us drop anything twice.
        self.len = len;

        // SAFETY: These elements were live and are no longer covered by `len`.
        unsafe {
            ptr::drop_in_place(surplus);
        }
    }

    /// Drops all elements. Capacity is unchanged.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Appends an element, growing the storage if the array is full.
    ///
    /// # Errors
    ///
    /// Returns an error if new storage is needed and cannot be allocated. The array is untouched
    /// and `value` is dropped in that case.
    pub fn push_back(&mut self, value: T) -> Result<()> {
        self.reserve_one()?;
        self.push_within_capacity(value);
        Ok(())
    }

    /// Appends an element produced by `f`, growing the storage if the array is full.
    ///
    /// The storage is secured before `f` is called, so `f` is not called if allocation fails.
    ///
    /// # Errors
    ///
    /// Returns an error if new storage is needed and cannot be allocated. The array is untouched
    /// in that case.
    pub fn emplace_back(&mut self, f: impl FnOnce() -> T) -> Result<&mut T> {
        self.reserve_one()?;
        Ok(self.push_within_capacity(f()))
    }

    /// Appends an element produced by a fallible constructor, growing the storage if the array
    /// is full.
    ///
    /// # Errors
    ///
    /// Returns an error if new storage is needed and cannot be allocated or if `f` returns an
    /// error. The elements are untouched in either case, though the capacity may have grown
    /// before `f` was called.
    pub fn try_emplace_back<E>(
        &mut self,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> Result<&mut T>
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        self.reserve_one()?;

        let value = f().map_err(|source| Error::element_operation(self.len, source))?;

        Ok(self.push_within_capacity(value))
    }

    /// Removes the last element and returns it, or `None` if the array is empty.
    pub fn pop_back(&mut self) -> Option<T> {
        let last = self.len.checked_sub(1)?;

        self.len = last;

        // SAFETY: The slot held a live element that is no longer covered by `len`, so reading it
        // transfers ownership to the caller.
        Some(unsafe { self.block.slot(last).assume_init_read() })
    }

    /// Inserts an element at `index`, shifting all elements after it one slot back.
    ///
    /// Returns a reference to the inserted element.
    ///
    /// # Errors
    ///
    /// Returns an error if new storage is needed and cannot be allocated. The array is untouched
    /// and `value` is dropped in that case.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, value: T) -> Result<&mut T> {
        self.emplace(index, || value)
    }

    /// Inserts an element produced by `f` at `index`, shifting all elements after it one
    /// slot back.
    ///
    /// Returns a reference to the inserted element.
    ///
    /// # Errors
    ///
    /// Returns an error if new storage is needed and cannot be allocated. The array is untouched
    /// in that case.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn emplace(&mut self, index: usize, f: impl FnOnce() -> T) -> Result<&mut T> {
        assert!(
            index <= self.len,
            "insertion index {index} is out of bounds in array of length {}",
            self.len
        );

        self.emplace_back(f)?;

        // The new element is at the end. Rotating the tail moves it to `index` and every element
        // that used to be at or after `index` one slot back, keeping their order.
        let (_, tail) = self.as_mut_slice().split_at_mut(index);
        tail.rotate_right(1);

        Ok(tail
            .first_mut()
            .expect("the tail contains at least the element we just appended"))
    }

    /// Drops the element at `index`, shifting all elements after it one slot forward.
    ///
    /// Returns a reference to the element that now occupies `index`, or `None` if the erased
    /// element was the last one.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn erase(&mut self, index: usize) -> Option<&mut T> {
        drop(self.remove(index));

        self.as_mut_slice().get_mut(index)
    }

    /// Removes the element at `index` and returns it, shifting all elements after it one
    /// slot forward.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        assert!(
            index < self.len,
            "removal index {index} is out of bounds in array of length {}",
            self.len
        );

        // Cannot underflow because we checked index < self.len above.
        let last = self.len.wrapping_sub(1);
        let trailing = last.wrapping_sub(index);

        // SAFETY: index < len, so the offset stays within the live elements.
        let hole = unsafe { self.block.as_mut_ptr().add(index) };

        // SAFETY: The slot holds a live element. Reading it transfers ownership to us and the
        // slot is overwritten below (or falls outside `len` if it was the last one).
        let value = unsafe { hole.read() };

        // SAFETY: index < len, so the element after the hole is at most one past the end.
        let after_hole = unsafe { hole.add(1) };

        // SAFETY: The `trailing` elements after the hole are live and both ranges are within our
        // storage. ptr::copy() permits the overlap.
        unsafe {
            ptr::copy(after_hole, hole, trailing);
        }

        self.len = last;

        value
    }

    /// Returns the live elements as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: The first `len` slots hold live elements and the pointer is non-null and
        // aligned even if nothing was allocated.
        unsafe { slice::from_raw_parts(self.block.as_ptr(), self.len) }
    }

    /// Returns the live elements as a mutable slice.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: The first `len` slots hold live elements, the pointer is non-null and aligned
        // even if nothing was allocated and we hold the only reference (&mut self).
        unsafe { slice::from_raw_parts_mut(self.block.as_mut_ptr(), self.len) }
    }

    /// Ensures there is room for one more element, growing the storage if needed.
    fn reserve_one(&mut self) -> Result<()> {
        if self.len < self.capacity() {
            return Ok(());
        }

        // Saturating is fine: a block of usize::MAX non-zero-sized elements fails to allocate
        // with a capacity overflow error anyway.
        self.reserve(self.capacity().saturating_mul(2).max(1))
    }

    /// Writes `value` into the first spare slot.
    ///
    /// # Panics
    ///
    /// Panics if there is no spare capacity.
    fn push_within_capacity(&mut self, value: T) -> &mut T {
        let index = self.len;
        let element = self.block.slot_mut(index).write(value);

        // Cannot overflow because slot_mut() checked index < capacity.
        self.len = index.wrapping_add(1);

        element
    }
}

/// Constructs the first `len` elements of `block`, calling `make` with each index in order.
///
/// If `make` fails (by returning an error or by panicking), the elements constructed so far are
/// dropped and the block is released before the failure continues on its way.
fn fill<T>(
    block: RawBlock<T>,
    len: usize,
    mut make: impl FnMut(usize) -> Result<T>,
) -> Result<RawBlock<T>> {
    debug_assert!(len <= block.capacity());

    let mut partial = scopeguard::guard((block, 0_usize), |(mut block, constructed)| {
        let constructed = ptr::slice_from_raw_parts_mut(block.as_mut_ptr(), constructed);

        // SAFETY: Exactly the first `constructed` slots hold live elements and the block is
        // released right after, so nothing can observe them again.
        unsafe {
            ptr::drop_in_place(constructed);
        }
    });

    while partial.1 < len {
        let index = partial.1;
        let value = make(index)?;

        partial.0.slot_mut(index).write(value);

        // Cannot overflow because index < len.
        partial.1 = index.wrapping_add(1);
    }

    let (block, _) = ScopeGuard::into_inner(partial);

    Ok(block)
}

/// Infallible trait methods treat storage failure the way the standard collections do.
#[cfg_attr(test, mutants::skip)] // Only reachable via allocation failure.
fn unwrap_storage<R>(result: Result<R>) -> R {
    match result {
        Ok(value) => value,
        Err(error) => panic!("{error}"),
    }
}

impl<T> Drop for DynamicArray<T> {
    fn drop(&mut self) {
        // The block releases the storage after this, when it is dropped as a field.
        self.clear();
    }
}

impl<T> Default for DynamicArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for DynamicArray<T> {
    /// # Panics
    ///
    /// Panics if the storage cannot be allocated. Use
    /// [`try_clone()`](DynamicArray::try_clone) to handle that case.
    fn clone(&self) -> Self {
        unwrap_storage(self.try_clone())
    }

    /// # Panics
    ///
    /// Panics if the storage cannot be allocated. Use
    /// [`try_clone_from()`](DynamicArray::try_clone_from) to handle that case.
    fn clone_from(&mut self, source: &Self) {
        unwrap_storage(self.try_clone_from(source));
    }
}

impl<T> Deref for DynamicArray<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for DynamicArray<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<'a, T> IntoIterator for &'a DynamicArray<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<'a, T> IntoIterator for &'a mut DynamicArray<T> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_mut_slice().iter_mut()
    }
}

impl<T> Extend<T> for DynamicArray<T> {
    /// # Panics
    ///
    /// Panics if the storage cannot be allocated.
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            unwrap_storage(self.push_back(value));
        }
    }
}

impl<T: PartialEq> PartialEq for DynamicArray<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq> Eq for DynamicArray<T> {}

impl<T: fmt::Debug> fmt::Debug for DynamicArray<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    reason = "test code doesn't need the same rigor as production code"
)]
mod tests {
    use std::cell::Cell;
    use std::panic::{self, AssertUnwindSafe};
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(DynamicArray<u32>: Send, Sync, fmt::Debug, Default, Clone);
    assert_not_impl_any!(DynamicArray<Rc<u32>>: Send, Sync);
    assert_not_impl_any!(DynamicArray<Cell<u32>>: Sync);

    /// Counts how many instances sharing the counter are alive.
    #[derive(Debug)]
    struct Counted {
        value: u32,
        live: Rc<Cell<usize>>,
    }

    impl Counted {
        fn new(value: u32, live: &Rc<Cell<usize>>) -> Self {
            live.set(live.get() + 1);

            Self {
                value,
                live: Rc::clone(live),
            }
        }
    }

    impl Clone for Counted {
        fn clone(&self) -> Self {
            Self::new(self.value, &self.live)
        }
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.live.set(self.live.get() - 1);
        }
    }

    fn array_of(values: &[u32]) -> DynamicArray<u32> {
        let mut array = DynamicArray::new();
        array.extend(values.iter().copied());
        array
    }

    #[test]
    fn new_is_empty_without_storage() {
        let array = DynamicArray::<u32>::new();

        assert_eq!(array.len(), 0);
        assert_eq!(array.capacity(), 0);
        assert!(array.is_empty());
        assert_eq!(array.as_slice(), &[] as &[u32]);
    }

    #[test]
    fn with_len_default_constructs() {
        for len in [0, 1, 7, 64] {
            let array = DynamicArray::<u64>::with_len(len).unwrap();

            assert_eq!(array.len(), len);
            assert_eq!(array.capacity(), len);
            assert!(array.iter().all(|value| *value == 0));
        }
    }

    #[test]
    fn with_len_of_strings() {
        let array = DynamicArray::<String>::with_len(3).unwrap();

        assert_eq!(array.len(), 3);
        assert!(array.iter().all(String::is_empty));
    }

    #[test]
    fn try_from_fn_uses_index() {
        let array =
            DynamicArray::try_from_fn(5, |index| Ok::<_, Infallible>(index * 10)).unwrap();

        assert_eq!(array.as_slice(), &[0, 10, 20, 30, 40]);
    }

    #[test]
    fn try_from_fn_error_drops_constructed_prefix() {
        let live = Rc::new(Cell::new(0));

        let result = DynamicArray::try_from_fn(5, |index| {
            if index == 2 {
                Err("third element refused")
            } else {
                Ok(Counted::new(1, &live))
            }
        });

        assert!(matches!(
            result,
            Err(Error::ElementOperation { index: 2, .. })
        ));
        assert_eq!(live.get(), 0);
    }

    #[test]
    fn push_back_grows_by_doubling() {
        let mut array = DynamicArray::new();

        array.push_back(1).unwrap();
        assert_eq!(array.capacity(), 1);

        array.push_back(2).unwrap();
        assert_eq!(array.capacity(), 2);

        array.push_back(3).unwrap();
        assert_eq!(array.capacity(), 4);

        assert_eq!(array.len(), 3);
        assert_eq!(array.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn push_back_capacity_stays_within_double() {
        let mut array = DynamicArray::new();

        for k in 1..=1000_usize {
            array.push_back(k).unwrap();

            assert_eq!(array.len(), k);
            assert!(array.capacity() <= 2 * k);
            assert!(array.capacity() >= k);
        }
    }

    #[test]
    fn push_back_keeps_elements_across_growth() {
        let mut array = DynamicArray::new();

        for value in 0..100 {
            array.push_back(value.to_string()).unwrap();
        }

        for (index, value) in array.iter().enumerate() {
            assert_eq!(*value, index.to_string());
        }
    }

    #[test]
    fn emplace_back_returns_new_element() {
        let mut array = DynamicArray::new();
        array.push_back(String::from("a")).unwrap();

        let element = array.emplace_back(|| String::from("b")).unwrap();
        element.push('!');

        assert_eq!(array.as_slice(), &["a", "b!"]);
    }

    #[test]
    fn try_emplace_back_error_leaves_elements() {
        let mut array = array_of(&[1, 2]);

        let result = array.try_emplace_back(|| Err("not today"));

        assert!(matches!(
            result,
            Err(Error::ElementOperation { index: 2, .. })
        ));
        assert_eq!(array.as_slice(), &[1, 2]);
    }

    #[test]
    fn try_emplace_back_success() {
        let mut array = array_of(&[1]);

        let element = array.try_emplace_back(|| Ok::<_, Infallible>(2)).unwrap();
        assert_eq!(*element, 2);

        assert_eq!(array.as_slice(), &[1, 2]);
    }

    #[test]
    fn pop_back_returns_last() {
        let mut array = array_of(&[1, 2, 3]);

        assert_eq!(array.pop_back(), Some(3));
        assert_eq!(array.pop_back(), Some(2));
        assert_eq!(array.len(), 1);
        assert_eq!(array.capacity(), 4);
    }

    #[test]
    fn pop_back_on_empty_is_none() {
        let mut array = DynamicArray::<u32>::new();

        assert_eq!(array.pop_back(), None);
    }

    #[test]
    fn pop_back_drops_element_once() {
        let live = Rc::new(Cell::new(0));
        let mut array = DynamicArray::new();

        array.push_back(Counted::new(1, &live)).unwrap();
        array.push_back(Counted::new(2, &live)).unwrap();

        let popped = array.pop_back().unwrap();
        assert_eq!(popped.value, 2);
        assert_eq!(live.get(), 2);

        drop(popped);
        assert_eq!(live.get(), 1);

        drop(array);
        assert_eq!(live.get(), 0);
    }

    #[test]
    fn reserve_below_capacity_is_noop() {
        let mut array = array_of(&[1, 2, 3]);
        let base = array.as_ptr();

        array.reserve(2).unwrap();
        array.reserve(4).unwrap();

        assert_eq!(array.capacity(), 4);
        assert_eq!(array.as_ptr(), base);
        assert_eq!(array.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn reserve_moves_elements_without_cloning_or_dropping() {
        let live = Rc::new(Cell::new(0));
        let mut array = DynamicArray::new();

        for value in 0..3 {
            array.push_back(Counted::new(value, &live)).unwrap();
        }

        array.reserve(100).unwrap();

        assert_eq!(array.capacity(), 100);
        assert_eq!(live.get(), 3);
        assert_eq!(
            array.iter().map(|c| c.value).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn resize_grows_with_defaults() {
        let mut array = array_of(&[5, 6]);

        array.resize(5).unwrap();

        assert_eq!(array.as_slice(), &[5, 6, 0, 0, 0]);
        assert_eq!(array.capacity(), 5);
    }

    #[test]
    fn resize_shrinks_and_keeps_capacity() {
        let live = Rc::new(Cell::new(0));
        let mut array = DynamicArray::try_from_fn(6, |index| {
            Ok::<_, Infallible>(Counted::new(u32::try_from(index).unwrap(), &live))
        })
        .unwrap();

        array
            .resize_with(2, || unreachable!("shrinking constructs nothing"))
            .unwrap();

        assert_eq!(array.len(), 2);
        assert_eq!(array.capacity(), 6);
        assert_eq!(live.get(), 2);
    }

    #[test]
    fn resize_with_calls_constructor_per_new_element() {
        let mut array = DynamicArray::new();
        let mut next = 0;

        array
            .resize_with(4, || {
                next += 1;
                next
            })
            .unwrap();

        assert_eq!(array.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn truncate_and_clear() {
        let mut array = array_of(&[1, 2, 3, 4]);

        array.truncate(10);
        assert_eq!(array.len(), 4);

        array.truncate(2);
        assert_eq!(array.as_slice(), &[1, 2]);

        array.clear();
        assert!(array.is_empty());
        assert_eq!(array.capacity(), 4);
    }

    #[test]
    fn insert_in_middle() {
        let mut array = array_of(&[1, 2, 4]);

        let inserted = array.insert(2, 3).unwrap();
        assert_eq!(*inserted, 3);

        assert_eq!(array.as_slice(), &[1, 2, 3, 4]);
        assert_eq!(array.len(), 4);
    }

    #[test]
    fn insert_at_front_and_end() {
        let mut array = array_of(&[2, 3]);

        array.insert(0, 1).unwrap();
        array.insert(3, 4).unwrap();

        assert_eq!(array.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn insert_into_empty() {
        let mut array = DynamicArray::new();

        array.insert(0, "only").unwrap();

        assert_eq!(array.as_slice(), &["only"]);
        assert_eq!(array.capacity(), 1);
    }

    #[test]
    #[should_panic]
    fn insert_past_end_panics() {
        let mut array = array_of(&[1, 2]);

        _ = array.insert(3, 9);
    }

    #[test]
    fn emplace_constructs_at_index() {
        let mut array = DynamicArray::new();
        array.push_back(String::from("a")).unwrap();
        array.push_back(String::from("c")).unwrap();

        array.emplace(1, || String::from("b")).unwrap();

        assert_eq!(array.as_slice(), &["a", "b", "c"]);
    }

    #[test]
    fn erase_shifts_tail_forward() {
        let mut array = array_of(&[1, 2, 3, 4]);

        let next = array.erase(1).copied();

        assert_eq!(next, Some(3));
        assert_eq!(array.as_slice(), &[1, 3, 4]);
        assert_eq!(array.len(), 3);
    }

    #[test]
    fn erase_last_returns_none() {
        let mut array = array_of(&[1, 2, 3]);

        assert!(array.erase(2).is_none());
        assert_eq!(array.as_slice(), &[1, 2]);
    }

    #[test]
    fn erase_drops_exactly_the_erased_element() {
        let live = Rc::new(Cell::new(0));
        let mut array = DynamicArray::try_from_fn(4, |index| {
            Ok::<_, Infallible>(Counted::new(u32::try_from(index).unwrap(), &live))
        })
        .unwrap();

        array.erase(0);

        assert_eq!(live.get(), 3);
        assert_eq!(
            array.iter().map(|c| c.value).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    #[should_panic]
    fn erase_at_end_panics() {
        let mut array = array_of(&[1, 2]);

        array.erase(2);
    }

    #[test]
    fn insert_then_erase_restores_sequence() {
        let original = array_of(&[10, 20, 30, 40, 50]);

        for index in 0..=original.len() {
            let mut array = original.clone();

            array.insert(index, 99).unwrap();
            array.erase(index);

            assert_eq!(array, original);
        }
    }

    #[test]
    fn remove_returns_element() {
        let mut array = array_of(&[1, 2, 3]);

        assert_eq!(array.remove(0), 1);
        assert_eq!(array.as_slice(), &[2, 3]);
    }

    #[test]
    fn try_clone_is_deep_and_independent() {
        let original = array_of(&[1, 2, 3]);

        let mut copy = original.try_clone().unwrap();
        assert_eq!(copy, original);
        assert_eq!(copy.capacity(), 3);

        copy[0] = 100;
        copy.push_back(4).unwrap();

        assert_eq!(original.as_slice(), &[1, 2, 3]);
        assert_eq!(copy.as_slice(), &[100, 2, 3, 4]);
    }

    #[test]
    fn clone_of_empty_has_no_storage() {
        let original = DynamicArray::<String>::builder().capacity(8).build().unwrap();

        let copy = original.clone();

        assert!(copy.is_empty());
        assert_eq!(copy.capacity(), 0);
    }

    #[test]
    fn clone_panic_drops_partial_copy() {
        #[derive(Debug)]
        struct Fragile {
            explode: bool,
            live: Rc<Cell<usize>>,
        }

        impl Clone for Fragile {
            fn clone(&self) -> Self {
                assert!(!self.explode, "refusing to clone");
                self.live.set(self.live.get() + 1);

                Self {
                    explode: self.explode,
                    live: Rc::clone(&self.live),
                }
            }
        }

        impl Drop for Fragile {
            fn drop(&mut self) {
                self.live.set(self.live.get() - 1);
            }
        }

        let live = Rc::new(Cell::new(0));
        let mut original = DynamicArray::new();

        for explode in [false, false, true, false] {
            live.set(live.get() + 1);
            original
                .push_back(Fragile {
                    explode,
                    live: Rc::clone(&live),
                })
                .unwrap();
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| original.clone()));

        assert!(result.is_err());
        assert_eq!(live.get(), 4);
    }

    #[test]
    fn clone_from_larger_source_replaces_storage() {
        let source = array_of(&[1, 2, 3, 4, 5]);
        let mut target = array_of(&[9]);

        target.clone_from(&source);

        assert_eq!(target, source);
        assert_eq!(target.capacity(), 5);
    }

    #[test]
    fn clone_from_longer_source_within_capacity() {
        let source = array_of(&[1, 2, 3]);
        let mut target = DynamicArray::builder().capacity(10).build().unwrap();
        target.push_back(7).unwrap();

        target.try_clone_from(&source).unwrap();

        assert_eq!(target, source);
        assert_eq!(target.capacity(), 10);
    }

    #[test]
    fn clone_from_shorter_source_drops_surplus() {
        let live = Rc::new(Cell::new(0));

        let source = DynamicArray::try_from_fn(2, |index| {
            Ok::<_, Infallible>(Counted::new(u32::try_from(index).unwrap(), &live))
        })
        .unwrap();
        let mut target = DynamicArray::try_from_fn(5, |_| {
            Ok::<_, Infallible>(Counted::new(100, &live))
        })
        .unwrap();

        target.try_clone_from(&source).unwrap();

        assert_eq!(live.get(), 4);
        assert_eq!(target.capacity(), 5);
        assert_eq!(
            target.iter().map(|c| c.value).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn take_leaves_source_empty() {
        let mut source = array_of(&[1, 2, 3]);

        let taken = source.take();

        assert_eq!(taken.as_slice(), &[1, 2, 3]);
        assert_eq!(taken.capacity(), 4);
        assert!(source.is_empty());
        assert_eq!(source.capacity(), 0);
    }

    #[test]
    fn exchange_swaps_everything() {
        let mut a = array_of(&[1, 2, 3]);
        let mut b = array_of(&[9]);

        a.exchange(&mut b);

        assert_eq!(a.as_slice(), &[9]);
        assert_eq!(a.capacity(), 1);
        assert_eq!(b.as_slice(), &[1, 2, 3]);
        assert_eq!(b.capacity(), 4);
    }

    #[test]
    fn drop_drops_every_element() {
        let live = Rc::new(Cell::new(0));

        {
            let mut array = DynamicArray::new();

            for value in 0..10 {
                array.push_back(Counted::new(value, &live)).unwrap();
            }

            assert_eq!(live.get(), 10);
        }

        assert_eq!(live.get(), 0);
    }

    #[test]
    fn slice_access_through_deref() {
        let mut array = array_of(&[3, 1, 2]);

        array.sort_unstable();

        assert_eq!(array[0], 1);
        assert_eq!(array.get(2), Some(&3));
        assert_eq!(array.get(3), None);
        assert_eq!(array.iter().sum::<u32>(), 6);
    }

    #[test]
    fn iterates_by_reference() {
        let mut array = array_of(&[1, 2, 3]);

        for value in &mut array {
            *value *= 2;
        }

        let mut seen = Vec::new();
        for value in &array {
            seen.push(*value);
        }

        assert_eq!(seen, vec![2, 4, 6]);
    }

    #[test]
    fn zero_sized_elements() {
        let mut array = DynamicArray::new();

        for _ in 0..10 {
            array.push_back(()).unwrap();
        }

        array.insert(5, ()).unwrap();
        array.erase(0);

        assert_eq!(array.len(), 10);
        assert_eq!(array.capacity(), 16);
    }

    #[test]
    fn reserve_overflow_is_error_and_array_untouched() {
        let mut array = array_of(&[1, 2]);

        let result = array.reserve(usize::MAX);

        assert!(matches!(result, Err(Error::CapacityOverflow { .. })));
        assert_eq!(array.as_slice(), &[1, 2]);
        assert_eq!(array.capacity(), 2);
    }

    #[test]
    fn debug_lists_elements() {
        let array = array_of(&[1, 2]);

        assert_eq!(format!("{array:?}"), "[1, 2]");
    }
}

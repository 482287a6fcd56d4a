use std::fmt;
use std::marker::PhantomData;

use crate::{DynamicArray, RawBlock, Result};

/// Builder for creating an instance of [`DynamicArray`].
///
/// All settings are optional. Without any settings, the builder produces the same empty array
/// as [`DynamicArray::new()`].
///
/// # Examples
///
/// ```
/// use dynamic_array::DynamicArray;
///
/// let mut array = DynamicArray::builder().capacity(4).build()?;
///
/// array.push_back(1_u64)?;
/// array.push_back(2)?;
///
/// // No growth was needed.
/// assert_eq!(array.capacity(), 4);
/// # Ok::<(), dynamic_array::Error>(())
/// ```
#[must_use]
pub struct DynamicArrayBuilder<T> {
    capacity: usize,

    _element: PhantomData<fn() -> T>,
}

impl<T> DynamicArrayBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            capacity: 0,
            _element: PhantomData,
        }
    }

    /// Sets the number of elements to allocate storage for up front.
    ///
    /// Defaults to zero, which allocates nothing until the first element is added.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builds the array with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial storage cannot be allocated.
    pub fn build(self) -> Result<DynamicArray<T>> {
        let block = RawBlock::allocate(self.capacity)?;

        Ok(DynamicArray::from_block(block))
    }
}

impl<T> fmt::Debug for DynamicArrayBuilder<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicArrayBuilder")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

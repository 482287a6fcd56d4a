use thiserror::Error;

/// Errors that can occur when acquiring storage for a [`DynamicArray`][crate::DynamicArray] or
/// when constructing its elements.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The global allocator could not satisfy a request for storage.
    ///
    /// The container never retries a failed allocation. The operation that requested the storage
    /// has no effect on the container it was called on.
    #[error("failed to allocate {byte_count} bytes for a block of {capacity} elements")]
    Allocation {
        /// The number of elements the block was supposed to hold.
        capacity: usize,

        /// The number of bytes requested from the allocator.
        byte_count: usize,
    },

    /// The requested capacity cannot be expressed as a valid memory layout, either because the
    /// byte count exceeds `isize::MAX` or because growing the capacity overflowed `usize`.
    #[error("a block of {capacity} elements exceeds the maximum allocation size")]
    CapacityOverflow {
        /// The number of elements the block was supposed to hold.
        capacity: usize,
    },

    /// A caller-provided element constructor reported a failure.
    ///
    /// Any elements constructed by the same operation before the failure have been dropped.
    #[error("failed to construct the element at index {index}")]
    ElementOperation {
        /// The index of the element whose construction failed.
        index: usize,

        /// The failure reported by the element constructor.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// Whether this error means that storage could not be acquired, as opposed to an element
    /// operation failing.
    #[must_use]
    pub fn is_allocation_failure(&self) -> bool {
        matches!(self, Self::Allocation { .. } | Self::CapacityOverflow { .. })
    }

    pub(crate) fn element_operation(
        index: usize,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ElementOperation {
            index,
            source: source.into(),
        }
    }
}

/// A specialized `Result` type for storage and element operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::error::Error as _;
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn allocation_errors_are_classified() {
        let error = Error::Allocation {
            capacity: 4,
            byte_count: 32,
        };
        assert!(error.is_allocation_failure());

        let error = Error::CapacityOverflow { capacity: usize::MAX };
        assert!(error.is_allocation_failure());

        let error = Error::element_operation(3, "no more widgets");
        assert!(!error.is_allocation_failure());
    }

    #[test]
    fn element_operation_keeps_source() {
        let error = Error::element_operation(7, "disk on fire");

        assert_eq!(
            error.to_string(),
            "failed to construct the element at index 7"
        );
        assert_eq!(
            error.source().map(ToString::to_string).as_deref(),
            Some("disk on fire")
        );
    }

    #[test]
    fn allocation_message_names_sizes() {
        let error = Error::Allocation {
            capacity: 16,
            byte_count: 128,
        };

        assert_eq!(
            error.to_string(),
            "failed to allocate 128 bytes for a block of 16 elements"
        );
    }
}

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::marker::PhantomData;
use std::{fmt, ptr};

thread_local! {
    // Only const-initialized Cells without drop logic live here, so accessing them from inside
    // the allocator never allocates and never runs into a destroyed thread-local.
    static ACQUIRED_BYTES: Cell<usize> = const { Cell::new(0) };
    static RELEASED_BYTES: Cell<usize> = const { Cell::new(0) };
    static FAIL_FROM_BYTES: Cell<Option<usize>> = const { Cell::new(None) };
}

/// A memory allocator wrapper that counts live bytes per thread and refuses allocations on
/// request.
///
/// Install it as the global allocator of a test binary to use [`thread_live_bytes()`] and
/// [`fail_allocations_from()`]. Without it, neither has any effect.
///
/// # Examples
///
/// ```rust
/// use testing::FailingAllocator;
///
/// #[global_allocator]
/// static ALLOCATOR: FailingAllocator<std::alloc::System> = FailingAllocator::system();
/// ```
pub struct FailingAllocator<A: GlobalAlloc> {
    inner: A,
}

impl FailingAllocator<System> {
    /// Creates a new allocator wrapping the system allocator.
    #[must_use]
    #[inline]
    pub const fn system() -> Self {
        Self { inner: System }
    }
}

impl<A: GlobalAlloc> FailingAllocator<A> {
    /// Creates a new allocator wrapping the provided allocator.
    #[must_use]
    #[inline]
    pub const fn new(allocator: A) -> Self {
        Self { inner: allocator }
    }
}

impl<A: GlobalAlloc> fmt::Debug for FailingAllocator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailingAllocator")
            .field("inner", &"<allocator>")
            .finish()
    }
}

// SAFETY: We delegate all allocation operations to the underlying allocator, which already
// implements GlobalAlloc safely. Refusing a request by returning null is permitted by the
// GlobalAlloc contract.
unsafe impl<A: GlobalAlloc> GlobalAlloc for FailingAllocator<A> {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if should_fail(layout.size()) {
            return ptr::null_mut();
        }

        // SAFETY: We forward the call to the underlying allocator which implements GlobalAlloc.
        let result = unsafe { self.inner.alloc(layout) };

        if !result.is_null() {
            record_acquired(layout.size());
        }

        result
    }

    #[inline]
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if should_fail(layout.size()) {
            return ptr::null_mut();
        }

        // SAFETY: We forward the call to the underlying allocator which implements GlobalAlloc.
        let result = unsafe { self.inner.alloc_zeroed(layout) };

        if !result.is_null() {
            record_acquired(layout.size());
        }

        result
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: We forward the call to the underlying allocator which implements GlobalAlloc.
        unsafe { self.inner.dealloc(ptr, layout) }

        record_released(layout.size());
    }

    #[inline]
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if new_size > layout.size() && should_fail(new_size) {
            return ptr::null_mut();
        }

        // SAFETY: We forward the call to the underlying allocator which implements GlobalAlloc.
        let result = unsafe { self.inner.realloc(ptr, layout, new_size) };

        if !result.is_null() {
            record_released(layout.size());
            record_acquired(new_size);
        }

        result
    }
}

fn should_fail(size: usize) -> bool {
    FAIL_FROM_BYTES
        .try_with(|threshold| threshold.get().is_some_and(|min| size >= min))
        .unwrap_or(false)
}

fn record_acquired(size: usize) {
    _ = ACQUIRED_BYTES.try_with(|bytes| bytes.set(bytes.get().wrapping_add(size)));
}

fn record_released(size: usize) {
    _ = RELEASED_BYTES.try_with(|bytes| bytes.set(bytes.get().wrapping_add(size)));
}

/// The number of bytes allocated minus the number of bytes released on the current thread
/// through [`FailingAllocator`].
///
/// Only differences between two readings are meaningful. If memory allocated on one thread is
/// released on another, the readings of both threads are skewed.
#[must_use]
pub fn thread_live_bytes() -> usize {
    ACQUIRED_BYTES.get().wrapping_sub(RELEASED_BYTES.get())
}

/// Makes [`FailingAllocator`] refuse every allocation of at least `min_bytes` requested from
/// the current thread, until the returned guard is dropped.
///
/// Smaller allocations and allocations from other threads are unaffected.
pub fn fail_allocations_from(min_bytes: usize) -> AllocationFailureGuard {
    let previous = FAIL_FROM_BYTES.replace(Some(min_bytes));

    AllocationFailureGuard {
        previous,
        _single_threaded: PhantomData,
    }
}

/// Restores the previous allocation failure setting of the current thread when dropped.
#[derive(Debug)]
#[must_use = "allocations stop failing when the guard is dropped"]
pub struct AllocationFailureGuard {
    previous: Option<usize>,

    // The setting is thread-local, so the guard must stay on the thread that made it.
    _single_threaded: PhantomData<*const ()>,
}

impl Drop for AllocationFailureGuard {
    fn drop(&mut self) {
        FAIL_FROM_BYTES.set(self.previous);
    }
}

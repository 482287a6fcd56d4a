use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;
use std::thread::LocalKey;

thread_local! {
    static LIVE: Cell<usize> = const { Cell::new(0) };

    // Number of calls left until the operation fails, counting the failing call.
    static DEFAULT_COUNTDOWN: Cell<Option<NonZero<usize>>> = const { Cell::new(None) };
    static CLONE_COUNTDOWN: Cell<Option<NonZero<usize>>> = const { Cell::new(None) };
}

/// An element operation of [`Tracked`] that can be made to fail.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    /// [`Default::default()`].
    Default,

    /// [`Clone::clone()`] and [`Clone::clone_from()`].
    Clone,
}

impl Operation {
    fn countdown(self) -> &'static LocalKey<Cell<Option<NonZero<usize>>>> {
        match self {
            Self::Default => &DEFAULT_COUNTDOWN,
            Self::Clone => &CLONE_COUNTDOWN,
        }
    }
}

/// An element that counts how many instances of it are alive on the current thread.
///
/// Its default value is `Tracked::new(0)`. Default construction and cloning can be made to
/// panic via [`fail_on_nth()`].
///
/// # Example
///
/// ```
/// use testing::Tracked;
///
/// let before = Tracked::live();
///
/// let a = Tracked::new(1);
/// let b = a.clone();
/// assert_eq!(Tracked::live(), before + 2);
///
/// drop((a, b));
/// assert_eq!(Tracked::live(), before);
/// ```
#[derive(Debug, Eq, PartialEq)]
pub struct Tracked {
    value: u64,
}

impl Tracked {
    /// Creates a new instance. This never fails.
    #[must_use]
    pub fn new(value: u64) -> Self {
        LIVE.set(LIVE.get().wrapping_add(1));

        Self { value }
    }

    /// The value this instance was created with.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.value
    }

    /// The number of instances currently alive on the current thread.
    #[must_use]
    pub fn live() -> usize {
        LIVE.get()
    }
}

impl Default for Tracked {
    fn default() -> Self {
        trip(Operation::Default);

        Self::new(0)
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        trip(Operation::Clone);

        Self::new(self.value)
    }

    fn clone_from(&mut self, source: &Self) {
        trip(Operation::Clone);

        self.value = source.value;
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        LIVE.set(LIVE.get().wrapping_sub(1));
    }
}

/// Makes the `nth` upcoming call of `operation` on the current thread panic.
///
/// The calls before it succeed. After the failure, the operation succeeds again. Dropping the
/// returned guard before the failure has happened cancels it.
pub fn fail_on_nth(operation: Operation, nth: NonZero<usize>) -> FailureGuard {
    operation.countdown().set(Some(nth));

    FailureGuard {
        operation,
        _single_threaded: PhantomData,
    }
}

/// Cancels a pending failure set up by [`fail_on_nth()`] when dropped.
#[derive(Debug)]
#[must_use = "the pending failure is cancelled when the guard is dropped"]
pub struct FailureGuard {
    operation: Operation,

    // The countdown is thread-local, so the guard must stay on the thread that armed it.
    _single_threaded: PhantomData<*const ()>,
}

impl Drop for FailureGuard {
    fn drop(&mut self) {
        self.operation.countdown().set(None);
    }
}

fn trip(operation: Operation) {
    let countdown = operation.countdown();

    let Some(remaining) = countdown.get() else {
        return;
    };

    match NonZero::new(remaining.get().wrapping_sub(1)) {
        Some(remaining) => countdown.set(Some(remaining)),
        None => {
            countdown.set(None);
            panic!("injected failure in {operation:?} of a Tracked element");
        }
    }
}

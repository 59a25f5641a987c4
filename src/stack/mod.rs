//! Stacks for the context-switching engine.
//!
//! A coroutine takes ownership of its stack for as long as it lives, which
//! keeps the owner from touching the memory while the callee may be running
//! on it. [`Coroutine::into_stack`](crate::Coroutine::into_stack) hands the
//! stack back once the coroutine has terminated.

use core::marker::PhantomData;
use core::mem;
use core::num::NonZeroUsize;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "default-stack", unix))] {
        mod unix;
        pub use self::unix::DefaultStack;
    }
}

/// Type to represent a stack address.
pub type StackPointer = NonZeroUsize;

/// Required stack alignment at function call boundaries.
pub const STACK_ALIGNMENT: usize = 16;

/// Minimum size of a stack, excluding guard pages.
pub const MIN_STACK_SIZE: usize = 4096;

/// Rounds a stack size in bytes up to a multiple of [`STACK_ALIGNMENT`].
///
/// ```
/// use cothread::stack::{round_stack_size, STACK_ALIGNMENT};
///
/// assert_eq!(round_stack_size(1), STACK_ALIGNMENT);
/// assert_eq!(round_stack_size(4096), 4096);
/// ```
#[inline]
pub const fn round_stack_size(size: usize) -> usize {
    (size + (STACK_ALIGNMENT - 1)) / STACK_ALIGNMENT * STACK_ALIGNMENT
}

/// One aligned unit of caller-provided stack memory.
///
/// A slice of `StackUnit` is correctly aligned by construction and its length
/// in bytes is always a multiple of [`STACK_ALIGNMENT`].
#[derive(Clone, Copy, Default)]
#[repr(C, align(16))]
pub struct StackUnit([u8; STACK_ALIGNMENT]);

impl StackUnit {
    /// A zeroed unit.
    pub const ZERO: StackUnit = StackUnit([0; STACK_ALIGNMENT]);

    /// Number of units needed to hold `size` bytes.
    #[inline]
    pub const fn count(size: usize) -> usize {
        round_stack_size(size) / mem::size_of::<StackUnit>()
    }
}

/// A trait for objects that hold ownership of a stack.
///
/// # Safety
///
/// To preserve memory safety, a stack must catch overflows, usually with a
/// guard page, and must contain at least [`MIN_STACK_SIZE`] bytes of usable
/// memory. Its base and limit must not change while a coroutine runs on it.
pub unsafe trait Stack {
    /// Returns the base address of the stack. This is the highest address since
    /// stacks grow downwards on all supported architectures.
    ///
    /// Must be aligned to [`STACK_ALIGNMENT`].
    fn base(&self) -> StackPointer;

    /// Returns the maximum limit address of the stack. This is the lowest
    /// address of the region and includes any guard pages.
    ///
    /// Must be aligned to [`STACK_ALIGNMENT`].
    fn limit(&self) -> StackPointer;
}

/// A mutable reference to a stack can be used as a stack. The lifetime of the
/// resulting coroutine will be bound to that of the reference.
unsafe impl<'a, S: Stack> Stack for &'a mut S {
    #[inline]
    fn base(&self) -> StackPointer {
        (**self).base()
    }

    #[inline]
    fn limit(&self) -> StackPointer {
        (**self).limit()
    }
}

/// A stack over memory owned by the caller.
///
/// The memory stays mutably borrowed for as long as the coroutine using it
/// exists.
pub struct SliceStack<'a> {
    base: StackPointer,
    limit: StackPointer,
    marker: PhantomData<&'a mut [StackUnit]>,
}

impl<'a> SliceStack<'a> {
    /// Wraps `mem` as a stack.
    ///
    /// # Panics
    ///
    /// Panics if `mem` is smaller than [`MIN_STACK_SIZE`].
    ///
    /// # Safety
    ///
    /// There is no guard page below `mem`. The caller must make sure that the
    /// entry function never needs more stack than `mem` provides.
    pub unsafe fn new(mem: &'a mut [StackUnit]) -> Self {
        let len = mem::size_of_val(mem);
        assert!(
            len >= MIN_STACK_SIZE,
            "stack of {} bytes is smaller than the minimum of {} bytes",
            len,
            MIN_STACK_SIZE
        );
        let start = mem.as_mut_ptr() as usize;
        Self {
            base: StackPointer::new_unchecked(start + len),
            limit: StackPointer::new_unchecked(start),
            marker: PhantomData,
        }
    }

    /// Returns the size of the stack in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.base.get() - self.limit.get()
    }

    /// Always false, a `SliceStack` holds at least [`MIN_STACK_SIZE`] bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }
}

unsafe impl Stack for SliceStack<'_> {
    #[inline]
    fn base(&self) -> StackPointer {
        self.base
    }

    #[inline]
    fn limit(&self) -> StackPointer {
        self.limit
    }
}

#[test]
fn assert_send_sync() {
    fn send<T: Send>() {}
    fn sync<T: Sync>() {}
    #[cfg(all(feature = "default-stack", unix))]
    {
        send::<DefaultStack>();
        sync::<DefaultStack>();
    }
    send::<StackUnit>();
    sync::<StackUnit>();
}

#[test]
fn slice_stack_bounds() {
    let mut mem = vec![StackUnit::ZERO; StackUnit::count(8192)];
    let start = mem.as_ptr() as usize;
    let stack = unsafe { SliceStack::new(&mut mem) };
    assert_eq!(stack.limit().get(), start);
    assert_eq!(stack.base().get(), start + 8192);
    assert_eq!(stack.base().get() % STACK_ALIGNMENT, 0);
    assert_eq!(stack.len(), 8192);
}

#[test]
#[should_panic = "smaller than the minimum"]
fn slice_stack_too_small() {
    let mut mem = [StackUnit::ZERO; 4];
    let _ = unsafe { SliceStack::new(&mut mem) };
}

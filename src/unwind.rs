//! Forced unwinding of a suspended callee, shared by both engines.
//!
//! Dropping a coroutine whose entry function is still suspended resumes it
//! with a [`ForcedUnwind`] instead of a value. The callee's pending yield turns
//! that into a panic which unwinds the callee stack, running every destructor
//! on it, until the root of the coroutine catches it and switches back for
//! the last time.
//!
//! Any other panic reaching the root cannot be carried across a handoff and
//! aborts the process.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Panic payload used to unwind a suspended callee.
#[derive(Debug)]
pub(crate) struct ForcedUnwind;

/// Result of running the entry function at the root of the callee stack.
pub(crate) type RootResult<T> = Result<T, Box<dyn Any + Send>>;

#[inline]
pub(crate) fn catch_unwind_at_root<T, F: FnOnce() -> T>(f: F) -> RootResult<T> {
    panic::catch_unwind(AssertUnwindSafe(f))
}

#[inline]
pub(crate) fn is_forced_unwind(payload: &(dyn Any + Send)) -> bool {
    payload.is::<ForcedUnwind>()
}

/// Unwraps a value received by the callee, or starts unwinding its stack.
#[inline]
pub(crate) fn maybe_force_unwind<T>(val: Result<T, ForcedUnwind>) -> T {
    match val {
        Ok(val) => val,
        Err(e) => panic::resume_unwind(Box::new(e)),
    }
}

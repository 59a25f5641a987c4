//! Symmetric caller/callee coroutines.
//!
//! ## Overview
//!
//! A coroutine in this crate has exactly two execution contexts, the *caller*
//! that created it and the *callee* running its entry function. They take
//! turns: exactly one of them runs at any time and control only changes hands
//! when the running side yields. Unlike generators there is no parent/child
//! asymmetry in the handoff itself; both sides use the same kind of yield and
//! either can be suspended at any depth of its call stack.
//!
//! Two engines provide the same contract:
//!
//! - [`Coroutine`] switches between stacks within the current thread and
//!   carries a value of type `T` across every yield. It needs a [`Stack`] for
//!   the callee and is only available on targets with a context-switching
//!   backend (x86_64 and AArch64, except Windows).
//! - [`ThreadCoroutine`] runs the callee on a dedicated OS thread and hands a
//!   [`Baton`] back and forth. No value crosses a yield; the two sides share
//!   data through user data or captured state. It works everywhere `std`
//!   threads do.
//!
//! Both implement [`Cothread`], which covers user data, debug names and the
//! current side.
//!
//! ## Example
//!
//! ```rust
//! use cothread::{Config, ThreadCoroutine, ThreadYielder};
//!
//! let mut co = ThreadCoroutine::new(
//!     Config::new(|yielder: &ThreadYielder| {
//!         println!("[callee] started");
//!         yielder.yield_now();
//!         println!("[callee] exiting");
//!     })
//!     .callee_name("worker"),
//! )
//! .unwrap();
//!
//! println!("[caller] yielding to the callee");
//! co.yield_now();
//! println!("[caller] back, yielding again");
//! co.yield_now();
//! assert!(co.is_terminated());
//! co.teardown();
//! ```
//!
//! ## Diagnostics
//!
//! Every step of every transition is reported at `trace` level through the
//! [`log`] crate under the `cothread` target, as `"<endpoint-name>: <message>"`.
//! The same lines can be sent to a [`DebugSink`] given in the [`Config`].
//!
//! ## Cargo features
//!
//! #### `default-stack` (Enabled by default)
//!
//! Provides [`stack::DefaultStack`], an `mmap`-allocated stack with a guard
//! page, on Unix platforms.
//!
//! [`Stack`]: stack::Stack

#![warn(missing_docs)]

#[cfg(context_switch)]
mod arch;
mod config;
#[cfg(context_switch)]
mod coroutine;
mod endpoint;
mod error;
pub mod stack;
mod thread;
mod unwind;
#[cfg(context_switch)]
mod util;

pub use config::Config;
#[cfg(context_switch)]
pub use coroutine::{Coroutine, Yielder};
pub use endpoint::{
    Cothread, DebugSink, Side, WriteSink, DEFAULT_CALLEE_NAME, DEFAULT_CALLER_NAME,
};
pub use error::{Error, Primitive, Result};
pub use thread::{Baton, CondvarBaton, EventBaton, ThreadCoroutine, ThreadYielder};

#[cfg(test)]
mod tests;

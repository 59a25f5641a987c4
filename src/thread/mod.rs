//! Thread-handoff engine.
//!
//! The callee runs on a dedicated OS thread. A [`Baton`] decides which of the
//! two threads may run; the other one is blocked on it. Handing the baton
//! over is the only synchronization between the two sides, so all shared
//! state is published through it.

use core::fmt;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::Config;
use crate::endpoint::{self, Cothread, DebugSink, Endpoint, Side};
use crate::error::{fatal, Error, Primitive, Result};
use crate::unwind::{self, ForcedUnwind};

mod condvar;
mod event;

pub use self::condvar::CondvarBaton;
pub use self::event::EventBaton;

/// The callee has not started its entry function yet and can be aborted.
const ABORTABLE: u8 = 1 << 0;
/// The callee must exit: without running its entry function if it never
/// started, by unwinding out of it otherwise.
const ABORTING: u8 = 1 << 1;
/// The callee thread is done and is about to exit.
const COMPLETE: u8 = 1 << 2;

/// Exclusive right to run, handed back and forth between the two sides.
///
/// The caller holds the baton when it is created.
pub trait Baton: Send + Sync + Sized + 'static {
    /// Creates a baton held by the caller.
    fn new() -> Result<Self>;

    /// Returns the side currently holding the baton.
    fn current(&self) -> Side;

    /// Hands the baton from `from` to the other side and wakes it up. Does
    /// not wait for it to come back.
    fn release(&self, from: Side);

    /// Blocks until `side` holds the baton.
    fn acquire(&self, side: Side);

    /// Hands the baton to the other side and blocks until it is handed back.
    fn switch(&self, from: Side) {
        self.release(from);
        self.acquire(from);
    }
}

struct Shared<B> {
    baton: B,
    caller: Endpoint<()>,
    callee: Endpoint<()>,
    flags: AtomicU8,
    user_data: AtomicPtr<()>,
    sink: Option<Box<dyn DebugSink>>,
}

impl<B: Baton> Shared<B> {
    fn endpoint(&self, side: Side) -> &Endpoint<()> {
        match side {
            Side::Caller => &self.caller,
            Side::Callee => &self.callee,
        }
    }

    fn trace_as(&self, side: Side, message: fmt::Arguments<'_>) {
        endpoint::trace(self.sink.as_deref(), &self.endpoint(side).name, message);
    }

    fn flags(&self) -> u8 {
        self.flags.load(Ordering::Acquire)
    }

    fn switch(&self, from: Side) {
        self.trace_as(from, format_args!("saving endpoint"));
        self.trace_as(from, format_args!("yielding"));
        self.trace_as(from.other(), format_args!("resuming"));
        self.baton.switch(from);
        self.trace_as(from, format_args!("endpoint restored"));
    }
}

/// A symmetric coroutine whose callee runs on its own OS thread.
///
/// No value crosses a yield; the two sides share data through
/// [`Cothread::set_user_data`] or whatever the entry function captures.
///
/// Dropping a coroutine whose callee is suspended in its entry function
/// unwinds the callee stack from its pending
/// [`ThreadYielder::yield_now`] and joins the thread.
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// use cothread::{Config, ThreadCoroutine, ThreadYielder};
///
/// let steps = Arc::new(AtomicUsize::new(0));
/// let counter = steps.clone();
/// let mut co = ThreadCoroutine::new(Config::new(move |yielder: &ThreadYielder| {
///     counter.fetch_add(1, Ordering::Relaxed);
///     yielder.yield_now();
///     counter.fetch_add(1, Ordering::Relaxed);
/// }))
/// .unwrap();
///
/// co.yield_now();
/// assert_eq!(steps.load(Ordering::Relaxed), 1);
/// co.yield_now();
/// assert_eq!(steps.load(Ordering::Relaxed), 2);
/// co.teardown();
/// ```
pub struct ThreadCoroutine<B: Baton = CondvarBaton> {
    shared: Arc<Shared<B>>,
    thread: Option<JoinHandle<()>>,
}

impl ThreadCoroutine<CondvarBaton> {
    /// Initializes a coroutine from `config` using a [`CondvarBaton`].
    ///
    /// The stack in `config`, if any, is ignored.
    pub fn new<F, S>(config: Config<F, S>) -> Result<Self>
    where
        F: FnOnce(&ThreadYielder<CondvarBaton>) + Send + 'static,
    {
        Self::with_baton(config)
    }
}

impl<B: Baton> ThreadCoroutine<B> {
    /// Initializes a coroutine from `config` using the baton type `B`.
    ///
    /// The callee thread is started but stays parked until the first
    /// [`yield_now`](ThreadCoroutine::yield_now). If anything fails, whatever
    /// was already created is released again.
    pub fn with_baton<F, S>(config: Config<F, S>) -> Result<Self>
    where
        F: FnOnce(&ThreadYielder<B>) + Send + 'static,
    {
        let Config {
            entry,
            stack: _,
            caller_name,
            callee_name,
            sink,
            thread_stack_size,
        } = config;

        let shared = Arc::new(Shared {
            baton: B::new()?,
            caller: Endpoint::new(caller_name, Side::Caller),
            callee: Endpoint::new(callee_name, Side::Callee),
            flags: AtomicU8::new(ABORTABLE),
            user_data: AtomicPtr::new(ptr::null_mut()),
            sink,
        });
        shared.trace_as(Side::Callee, format_args!("initializing endpoint"));

        // OS thread names cannot contain NUL.
        let thread_name = format!("cothread-{}", shared.callee.name).replace('\0', "\u{FFFD}");
        let mut builder = thread::Builder::new().name(thread_name);
        if let Some(size) = thread_stack_size {
            builder = builder.stack_size(size);
        }
        let yielder = ThreadYielder {
            shared: shared.clone(),
        };
        let thread = builder
            .spawn(move || callee_main(yielder, entry))
            .map_err(|source| Error::NotSupported {
                primitive: Primitive::Thread,
                source,
            })?;
        log::debug!(
            target: "cothread",
            "{}: spawned callee thread {:?}",
            shared.caller.name,
            thread.thread().id()
        );
        shared.trace_as(Side::Caller, format_args!("initialized"));

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Hands control to the callee and blocks until it yields back or its
    /// entry function returns.
    ///
    /// # Panics
    ///
    /// Panics if the entry function has already returned.
    pub fn yield_now(&mut self) {
        assert!(
            self.shared.flags() & COMPLETE == 0,
            "attempt to yield into a terminated coroutine"
        );
        self.shared.switch(Side::Caller);
    }

    /// Returns whether the entry function has returned.
    pub fn is_terminated(&self) -> bool {
        self.shared.flags() & COMPLETE != 0
    }

    /// Stops the callee thread and releases everything the coroutine holds.
    ///
    /// A callee that never started is woken up and exits without calling its
    /// entry function, which is simply dropped.
    ///
    /// # Panics
    ///
    /// Panics if the callee is suspended in the middle of its entry function.
    pub fn teardown(mut self) {
        assert!(
            self.can_teardown(),
            "cannot tear down a coroutine suspended in its entry function"
        );
        self.teardown_inner();
    }

    /// Unwinds a callee suspended in its entry function so that its thread
    /// can be joined.
    #[cold]
    fn force_unwind(&mut self) {
        log::debug!(
            target: "cothread",
            "{}: unwinding suspended callee",
            self.shared.caller.name
        );
        self.shared.trace_as(Side::Caller, format_args!("unwinding"));
        self.shared.flags.fetch_or(ABORTING, Ordering::AcqRel);
        self.shared.switch(Side::Caller);
        debug_assert!(self.is_terminated());
    }

    fn can_teardown(&self) -> bool {
        self.shared.flags() & (ABORTABLE | COMPLETE) != 0
    }

    fn teardown_inner(&mut self) {
        let thread = match self.thread.take() {
            Some(thread) => thread,
            None => return,
        };

        if self.shared.flags() & ABORTABLE != 0 {
            log::debug!(
                target: "cothread",
                "{}: aborting callee before it started",
                self.shared.caller.name
            );
            self.shared.flags.fetch_or(ABORTING, Ordering::AcqRel);
            self.shared.baton.switch(Side::Caller);
        }

        if thread.join().is_err() {
            fatal(format_args!(
                "{}: callee thread terminated abnormally",
                self.shared.callee.name
            ));
        }
        log::debug!(target: "cothread", "{}: torn down", self.shared.caller.name);
    }
}

impl<B: Baton> Drop for ThreadCoroutine<B> {
    fn drop(&mut self) {
        if self.thread.is_none() {
            return;
        }
        if !self.can_teardown() {
            self.force_unwind();
        }
        self.teardown_inner();
    }
}

impl<B: Baton> Cothread for ThreadCoroutine<B> {
    fn set_user_data(&self, data: *mut ()) {
        self.shared.user_data.store(data, Ordering::Relaxed);
    }

    fn user_data(&self) -> *mut () {
        self.shared.user_data.load(Ordering::Relaxed)
    }

    fn current(&self) -> Side {
        self.shared.baton.current()
    }

    fn name(&self, side: Side) -> &str {
        &self.shared.endpoint(side).name
    }

    fn is_terminated(&self) -> bool {
        ThreadCoroutine::is_terminated(self)
    }
}

impl<B: Baton> fmt::Debug for ThreadCoroutine<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadCoroutine")
            .field("caller", &self.shared.caller.name)
            .field("callee", &self.shared.callee.name)
            .field("current", &self.shared.baton.current())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Handle given to the entry function of a [`ThreadCoroutine`], used to hand
/// control back to the caller.
pub struct ThreadYielder<B: Baton = CondvarBaton> {
    shared: Arc<Shared<B>>,
}

impl<B: Baton> ThreadYielder<B> {
    /// Hands control back to the caller and blocks until it yields again.
    ///
    /// If the coroutine is dropped in the meantime this unwinds instead of
    /// returning, see [`ThreadCoroutine`].
    pub fn yield_now(&self) {
        debug_assert_eq!(self.shared.baton.current(), Side::Callee);
        // A callee that caught the unwind keeps unwinding on its next yield.
        if !self.aborting() {
            self.shared.switch(Side::Callee);
        }
        let received = if self.aborting() {
            Err(ForcedUnwind)
        } else {
            Ok(())
        };
        unwind::maybe_force_unwind(received)
    }

    fn aborting(&self) -> bool {
        self.shared.flags() & ABORTING != 0
    }
}

impl<B: Baton> Cothread for ThreadYielder<B> {
    fn set_user_data(&self, data: *mut ()) {
        self.shared.user_data.store(data, Ordering::Relaxed);
    }

    fn user_data(&self) -> *mut () {
        self.shared.user_data.load(Ordering::Relaxed)
    }

    fn current(&self) -> Side {
        self.shared.baton.current()
    }

    fn name(&self, side: Side) -> &str {
        &self.shared.endpoint(side).name
    }

    fn is_terminated(&self) -> bool {
        self.shared.flags() & COMPLETE != 0
    }
}

fn callee_main<B, F>(yielder: ThreadYielder<B>, entry: F)
where
    B: Baton,
    F: FnOnce(&ThreadYielder<B>),
{
    let shared = &*yielder.shared;
    shared.baton.acquire(Side::Callee);

    if shared.flags() & ABORTING != 0 {
        shared.trace_as(Side::Callee, format_args!("aborted before start"));
        drop(entry);
    } else {
        shared.flags.fetch_and(!ABORTABLE, Ordering::AcqRel);
        shared.trace_as(Side::Callee, format_args!("starting user callback"));
        match unwind::catch_unwind_at_root(|| entry(&yielder)) {
            Ok(()) => shared.trace_as(Side::Callee, format_args!("user callback returned")),
            Err(payload) if unwind::is_forced_unwind(&*payload) => {
                shared.trace_as(Side::Callee, format_args!("unwound"))
            }
            Err(_) => fatal(format_args!(
                "{}: panic escaped the entry function",
                shared.callee.name
            )),
        }
    }

    shared.trace_as(
        Side::Callee,
        format_args!("complete, returning to {}", shared.caller.name),
    );
    shared.flags.fetch_or(COMPLETE, Ordering::AcqRel);
    shared.baton.release(Side::Callee);
}

use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ptr::{self, NonNull};
use std::borrow::Cow;

use crate::arch;
use crate::config::Config;
use crate::endpoint::{self, Cothread, DebugSink, Endpoint, Side};
use crate::error::fatal;
use crate::stack::{self, StackPointer, MIN_STACK_SIZE, STACK_ALIGNMENT};
use crate::unwind::{self, ForcedUnwind};
use crate::util::{self, EncodedValue};

const _: () = assert!(arch::STACK_ALIGNMENT == STACK_ALIGNMENT);

/// Saved context of one side: the stack pointer it was suspended at, or
/// `None` while it is running or after it has finished.
type SavedContext = Cell<Option<StackPointer>>;

/// A symmetric coroutine running its entry function on a separate stack
/// within the current thread.
///
/// The caller and the callee hand control to each other with `yield_with`,
/// passing a value of type `T` every time. The callee's entry function
/// receives the first value as its argument and its return value is the last
/// value the caller receives.
///
/// ```
/// use cothread::stack::{SliceStack, StackUnit};
/// use cothread::{Config, Coroutine, Yielder};
///
/// let mut mem = vec![StackUnit::ZERO; StackUnit::count(64 * 1024)];
/// let stack = unsafe { SliceStack::new(&mut mem) };
///
/// let mut co = Coroutine::new(
///     Config::new(|yielder: &Yielder<i32>, first| {
///         let second = yielder.yield_with(first * 2);
///         second + 100
///     })
///     .stack(stack),
/// );
/// assert_eq!(co.yield_with(100), 200);
/// assert_eq!(co.yield_with(101), 201);
/// ```
///
/// # Dropping a coroutine
///
/// Dropping a coroutine whose entry function is suspended unwinds its stack
/// so that every object on it is dropped, see [`Coroutine::force_unwind`].
/// The process is aborted if that fails.
///
/// # Panics in the entry function
///
/// A panic escaping the entry function cannot be carried back to the caller.
/// It aborts the process.
pub struct Coroutine<T, S: stack::Stack> {
    // Stack that the callee runs on.
    stack: S,

    // State shared with the callee, which refers to it through a raw pointer
    // for its whole life. Freed on drop.
    yielder: NonNull<Yielder<T>>,

    // Coroutine must be !Send.
    /// ```compile_fail
    /// fn send<T: Send>() {}
    /// send::<cothread::Coroutine<(), cothread::stack::SliceStack<'static>>>();
    /// ```
    marker: PhantomData<*mut ()>,
}

impl<T, S: stack::Stack> Coroutine<T, S> {
    /// Initializes a coroutine from `config`.
    ///
    /// The callee is started on its stack and immediately suspended again, so
    /// that "current" designates the caller when this returns. The body of the
    /// entry function only starts running with the first
    /// [`yield_with`](Coroutine::yield_with).
    ///
    /// # Panics
    ///
    /// Panics if the stack is not aligned to [`STACK_ALIGNMENT`] or is smaller
    /// than [`MIN_STACK_SIZE`].
    pub fn new<F>(config: Config<F, S>) -> Self
    where
        F: FnOnce(&Yielder<T>, T) -> T + 'static,
    {
        let Config {
            entry,
            stack,
            caller_name,
            callee_name,
            sink,
            thread_stack_size: _,
        } = config;

        let base = stack.base().get();
        let limit = stack.limit().get();
        assert!(
            base % STACK_ALIGNMENT == 0 && limit % STACK_ALIGNMENT == 0,
            "stack is not aligned to {} bytes",
            STACK_ALIGNMENT
        );
        assert!(
            base - limit >= MIN_STACK_SIZE,
            "stack is smaller than the minimum of {} bytes",
            MIN_STACK_SIZE
        );

        let yielder = Box::new(Yielder::new(caller_name, callee_name, sink));
        let yielder = unsafe { NonNull::new_unchecked(Box::into_raw(yielder)) };
        let this = Self {
            stack,
            yielder,
            marker: PhantomData,
        };

        unsafe {
            let yielder = this.yielder();
            let sp = arch::init_stack(&this.stack, coroutine_main::<T, F>);

            yielder.current.set(Side::Callee);
            yielder.trace(format_args!("initializing endpoint"));

            // The callee reads this out of our frame before switching back.
            let mut initial = ManuallyDrop::new(InitialState {
                yielder: yielder as *const Yielder<T>,
                entry,
            });
            arch::switch(
                util::encode_val(&mut initial),
                yielder.caller.context.as_ptr(),
                sp,
            );
            yielder.trace(format_args!("endpoint restored"));
        }

        this
    }

    #[inline]
    fn yielder(&self) -> &Yielder<T> {
        unsafe { self.yielder.as_ref() }
    }

    /// Hands control and `val` to the callee and returns the value it passes
    /// back, either through [`Yielder::yield_with`] or by returning from its
    /// entry function.
    ///
    /// # Panics
    ///
    /// Panics if the coroutine has terminated.
    pub fn yield_with(&mut self, val: T) -> T {
        let yielder = self.yielder();
        assert!(
            !yielder.terminated.get(),
            "attempt to yield into a terminated coroutine"
        );
        assert_eq!(
            yielder.current.get(),
            Side::Caller,
            "attempt to resume a coroutine from its own callee"
        );

        match unsafe { yielder.transfer(Ok(val)) } {
            Ok(val) => val,
            // The callee only answers a forced unwind with one.
            Err(ForcedUnwind) => unreachable!(),
        }
    }

    /// Returns whether the entry function has returned.
    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.yielder().terminated.get()
    }

    /// Unwinds the callee stack, dropping every object that is live on it.
    /// This is automatically called when the coroutine is dropped.
    ///
    /// If the coroutine has already terminated then this function is a no-op.
    /// If the body of the entry function never started then only the entry
    /// function itself is dropped.
    ///
    /// The coroutine is terminated afterwards.
    ///
    /// # Panics
    ///
    /// Panics if the callee caught the panic used to unwind it and did not
    /// resume it.
    pub fn force_unwind(&mut self) {
        if !self.is_terminated() {
            self.force_unwind_slow();
        }
    }

    #[cold]
    fn force_unwind_slow(&mut self) {
        let yielder = self.yielder();
        yielder.trace(format_args!("unwinding"));
        match unsafe { yielder.transfer(Err(ForcedUnwind)) } {
            Err(ForcedUnwind) => debug_assert!(yielder.terminated.get()),
            Ok(_) => panic!("the forced unwind was caught and not rethrown"),
        }
    }

    /// Extracts the stack from a coroutine that has terminated.
    ///
    /// This allows the stack to be re-used for another coroutine.
    ///
    /// # Panics
    ///
    /// Panics if the coroutine has not terminated, see
    /// [`Coroutine::force_unwind`].
    pub fn into_stack(self) -> S {
        assert!(
            self.is_terminated(),
            "cannot extract stack from an incomplete coroutine"
        );

        let this = ManuallyDrop::new(self);
        unsafe {
            drop(Box::from_raw(this.yielder.as_ptr()));
            ptr::read(&this.stack)
        }
    }
}

impl<T, S: stack::Stack> Drop for Coroutine<T, S> {
    fn drop(&mut self) {
        let guard = scopeguard::guard((), |()| {
            fatal(format_args!("failed to unwind a suspended coroutine"))
        });
        self.force_unwind();
        mem::forget(guard);

        unsafe { drop(Box::from_raw(self.yielder.as_ptr())) };
    }
}

impl<T, S: stack::Stack> Cothread for Coroutine<T, S> {
    fn set_user_data(&self, data: *mut ()) {
        self.yielder().set_user_data(data)
    }

    fn user_data(&self) -> *mut () {
        self.yielder().user_data()
    }

    fn current(&self) -> Side {
        self.yielder().current()
    }

    fn name(&self, side: Side) -> &str {
        &self.yielder().endpoint(side).name
    }

    fn is_terminated(&self) -> bool {
        Coroutine::is_terminated(self)
    }
}

impl<T, S: stack::Stack> fmt::Debug for Coroutine<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yielder = self.yielder();
        f.debug_struct("Coroutine")
            .field("caller", &yielder.caller.name)
            .field("callee", &yielder.callee.name)
            .field("current", &yielder.current.get())
            .field("terminated", &yielder.terminated.get())
            .finish()
    }
}

/// What the callee needs to get going, read from the caller's frame during
/// the initial switch.
struct InitialState<T, F> {
    yielder: *const Yielder<T>,
    entry: F,
}

/// Root function of every callee stack.
unsafe extern "C" fn coroutine_main<T, F>(arg: EncodedValue) -> !
where
    F: FnOnce(&Yielder<T>, T) -> T,
{
    let InitialState { yielder, entry } = util::decode_val::<InitialState<T, F>>(arg);
    let yielder = &*yielder;

    let result = unwind::catch_unwind_at_root(|| {
        let input = unwind::maybe_force_unwind(yielder.suspend_initial());
        yielder.trace(format_args!("starting user callback"));
        let output = entry(yielder, input);
        yielder.trace(format_args!("user callback returned"));
        output
    });

    let result = match result {
        Ok(val) => Ok(val),
        Err(payload) => {
            if !unwind::is_forced_unwind(&*payload) {
                fatal(format_args!(
                    "{}: panic escaped the entry function",
                    yielder.callee.name
                ));
            }
            drop(payload);
            Err(ForcedUnwind)
        }
    };

    yielder.finish(result)
}

/// Handle given to the entry function, used to hand control back to the
/// caller.
///
/// Every `yield_with` suspends the callee at that point, however deep in its
/// call stack, until the caller yields back.
pub struct Yielder<T> {
    caller: Endpoint<SavedContext>,
    callee: Endpoint<SavedContext>,
    current: Cell<Side>,
    terminated: Cell<bool>,
    user_data: Cell<*mut ()>,
    sink: Option<Box<dyn DebugSink>>,
    marker: PhantomData<fn(T) -> T>,
}

impl<T> Yielder<T> {
    fn new(
        caller_name: Option<Cow<'static, str>>,
        callee_name: Option<Cow<'static, str>>,
        sink: Option<Box<dyn DebugSink>>,
    ) -> Self {
        Self {
            caller: Endpoint::new(caller_name, Side::Caller),
            callee: Endpoint::new(callee_name, Side::Callee),
            current: Cell::new(Side::Caller),
            terminated: Cell::new(false),
            user_data: Cell::new(ptr::null_mut()),
            sink,
            marker: PhantomData,
        }
    }

    /// Hands control and `val` back to the caller and returns the value the
    /// caller passes in its next [`Coroutine::yield_with`].
    pub fn yield_with(&self, val: T) -> T {
        debug_assert_eq!(self.current.get(), Side::Callee);
        unsafe { unwind::maybe_force_unwind(self.transfer(Ok(val))) }
    }

    #[inline]
    fn endpoint(&self, side: Side) -> &Endpoint<SavedContext> {
        match side {
            Side::Caller => &self.caller,
            Side::Callee => &self.callee,
        }
    }

    fn trace(&self, message: fmt::Arguments<'_>) {
        let name = &self.endpoint(self.current.get()).name;
        endpoint::trace(self.sink.as_deref(), name, message);
    }

    /// Saves the running side and resumes the other one.
    unsafe fn switch(&self, arg: EncodedValue) -> EncodedValue {
        let from = self.current.get();
        let to = from.other();
        let target = self
            .endpoint(to)
            .context
            .take()
            .expect("attempt to yield into a terminated coroutine");

        self.trace(format_args!("saving endpoint"));
        self.trace(format_args!("yielding"));
        self.current.set(to);
        self.trace(format_args!("resuming"));

        let ret = arch::switch(arg, self.endpoint(from).context.as_ptr(), target);

        debug_assert_eq!(self.current.get(), from);
        self.trace(format_args!("endpoint restored"));
        ret
    }

    unsafe fn transfer(&self, val: Result<T, ForcedUnwind>) -> Result<T, ForcedUnwind> {
        let mut val = ManuallyDrop::new(val);
        util::decode_val(self.switch(util::encode_val(&mut val)))
    }

    /// First suspension point of the callee, reached during initialization.
    /// Returns what the caller sends with its first yield.
    unsafe fn suspend_initial(&self) -> Result<T, ForcedUnwind> {
        self.trace(format_args!("initialized"));
        util::decode_val(self.switch(0))
    }

    /// Final switch back to the caller once the entry function is done.
    unsafe fn finish(&self, result: Result<T, ForcedUnwind>) -> ! {
        self.trace(format_args!("complete, returning to {}", self.caller.name));
        self.terminated.set(true);
        self.current.set(Side::Caller);

        let target = match self.caller.context.take() {
            Some(sp) => sp,
            None => fatal(format_args!("{}: caller context lost", self.callee.name)),
        };
        let mut result = ManuallyDrop::new(result);
        arch::switch_final(util::encode_val(&mut result), target)
    }
}

impl<T> Cothread for Yielder<T> {
    fn set_user_data(&self, data: *mut ()) {
        self.user_data.set(data);
    }

    fn user_data(&self) -> *mut () {
        self.user_data.get()
    }

    fn current(&self) -> Side {
        self.current.get()
    }

    fn name(&self, side: Side) -> &str {
        &self.endpoint(side).name
    }

    fn is_terminated(&self) -> bool {
        self.terminated.get()
    }
}

//! One-shot description of a coroutine.

use std::borrow::Cow;

use crate::endpoint::DebugSink;

/// Everything needed to initialize a coroutine.
///
/// A `Config` is consumed by the engine's constructor and cannot be reused.
///
/// ```
/// use cothread::{Config, WriteSink};
///
/// let config = Config::new(|_: &(), ()| ())
///     .caller_name("main")
///     .callee_name("worker")
///     .sink(WriteSink::new(std::io::sink()));
/// # drop(config);
/// ```
pub struct Config<F, S = ()> {
    pub(crate) entry: F,
    pub(crate) stack: S,
    pub(crate) caller_name: Option<Cow<'static, str>>,
    pub(crate) callee_name: Option<Cow<'static, str>>,
    pub(crate) sink: Option<Box<dyn DebugSink>>,
    pub(crate) thread_stack_size: Option<usize>,
}

impl<F> Config<F> {
    /// Creates a configuration running `entry` on the callee side.
    pub fn new(entry: F) -> Self {
        Self {
            entry,
            stack: (),
            caller_name: None,
            callee_name: None,
            sink: None,
            thread_stack_size: None,
        }
    }
}

impl<F, S> Config<F, S> {
    /// Sets the stack the callee runs on.
    ///
    /// Required by the context-switching engine, ignored by the thread-handoff
    /// engine.
    pub fn stack<S2>(self, stack: S2) -> Config<F, S2> {
        Config {
            entry: self.entry,
            stack,
            caller_name: self.caller_name,
            callee_name: self.callee_name,
            sink: self.sink,
            thread_stack_size: self.thread_stack_size,
        }
    }

    /// Sets the debug name of the caller endpoint (default `"caller"`).
    pub fn caller_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.caller_name = Some(name.into());
        self
    }

    /// Sets the debug name of the callee endpoint (default `"callee"`).
    pub fn callee_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.callee_name = Some(name.into());
        self
    }

    /// Sets where diagnostic lines are written.
    pub fn sink(mut self, sink: impl DebugSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Sets the stack size of the OS thread spawned by the thread-handoff
    /// engine. Ignored by the context-switching engine.
    pub fn thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = Some(size);
        self
    }
}

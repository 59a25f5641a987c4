//! The two endpoints of a coroutine and the pieces shared by both engines.

use core::fmt;
use std::borrow::Cow;
use std::io::Write;

use parking_lot::Mutex;

/// Debug name given to the caller endpoint when none is configured.
pub const DEFAULT_CALLER_NAME: &str = "caller";

/// Debug name given to the callee endpoint when none is configured.
pub const DEFAULT_CALLEE_NAME: &str = "callee";

/// One of the two sides of a coroutine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// The side that initialized the coroutine.
    Caller,

    /// The side running the entry function.
    Callee,
}

impl Side {
    /// Returns the opposite side.
    #[inline]
    pub fn other(self) -> Side {
        match self {
            Side::Caller => Side::Callee,
            Side::Callee => Side::Caller,
        }
    }
}

/// One execution context of a coroutine together with its debug name.
///
/// `C` is whatever the engine needs to resume this side.
pub(crate) struct Endpoint<C> {
    pub(crate) name: Cow<'static, str>,
    pub(crate) context: C,
}

impl<C: Default> Endpoint<C> {
    pub(crate) fn new(name: Option<Cow<'static, str>>, side: Side) -> Self {
        let name = name.unwrap_or(Cow::Borrowed(match side {
            Side::Caller => DEFAULT_CALLER_NAME,
            Side::Callee => DEFAULT_CALLEE_NAME,
        }));
        Self {
            name,
            context: C::default(),
        }
    }
}

/// Destination for the diagnostic lines emitted around every transition.
///
/// Each line names the endpoint that was current when it was produced,
/// followed by a short message (`"<endpoint-name>: <message>"`).
pub trait DebugSink: Send + Sync {
    /// Receives one diagnostic line.
    fn line(&self, endpoint: &str, message: fmt::Arguments<'_>);
}

impl<F> DebugSink for F
where
    F: Fn(&str, fmt::Arguments<'_>) + Send + Sync,
{
    #[inline]
    fn line(&self, endpoint: &str, message: fmt::Arguments<'_>) {
        self(endpoint, message)
    }
}

/// A [`DebugSink`] writing one text line per transition to a writer.
pub struct WriteSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriteSink<W> {
    /// Wraps the given writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> DebugSink for WriteSink<W> {
    fn line(&self, endpoint: &str, message: fmt::Arguments<'_>) {
        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{}: {}", endpoint, message) {
            log::warn!(target: "cothread", "debug sink write failed: {}", e);
        }
    }
}

/// Emits one transition line to the `log` facade and the optional sink.
#[inline]
pub(crate) fn trace(sink: Option<&dyn DebugSink>, endpoint: &str, message: fmt::Arguments<'_>) {
    log::trace!(target: "cothread", "{}: {}", endpoint, message);
    if let Some(sink) = sink {
        sink.line(endpoint, message);
    }
}

/// Interface shared by both engines and by both sides of a coroutine.
///
/// The payload-carrying yield of the context-switching engine and the
/// payload-less yield of the thread-handoff engine are deliberately not part
/// of this trait, see [`Coroutine::yield_with`] and
/// [`ThreadCoroutine::yield_now`].
///
/// [`Coroutine::yield_with`]: crate::Coroutine::yield_with
/// [`ThreadCoroutine::yield_now`]: crate::ThreadCoroutine::yield_now
pub trait Cothread {
    /// Stores an opaque pointer in the coroutine. It is never dereferenced by
    /// this crate.
    fn set_user_data(&self, data: *mut ());

    /// Returns the pointer last stored with [`Cothread::set_user_data`], or
    /// null.
    fn user_data(&self) -> *mut ();

    /// Returns the endpoint that is currently running.
    fn current(&self) -> Side;

    /// Returns the debug name of the given endpoint.
    fn name(&self, side: Side) -> &str;

    /// Returns whether the entry function has returned.
    fn is_terminated(&self) -> bool;
}

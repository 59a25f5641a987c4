use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Cothread, DebugSink, Side, WriteSink};

#[cfg(all(context_switch, feature = "default-stack"))]
mod coroutine;

/// Sink collecting every line it receives.
#[derive(Clone, Default)]
struct Lines(Arc<Mutex<Vec<String>>>);

impl Lines {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }
}

impl DebugSink for Lines {
    fn line(&self, endpoint: &str, message: fmt::Arguments<'_>) {
        self.0.lock().push(format!("{}: {}", endpoint, message));
    }
}

/// Checks the parts of the shared interface that do not depend on the engine.
fn check_cothread(co: &dyn Cothread, caller: &str, callee: &str) {
    assert_eq!(co.name(Side::Caller), caller);
    assert_eq!(co.name(Side::Callee), callee);
    assert_eq!(co.current(), Side::Caller);

    assert!(co.user_data().is_null());
    let mut slot = 0u32;
    co.set_user_data(&mut slot as *mut u32 as *mut ());
    assert_eq!(co.user_data(), &mut slot as *mut u32 as *mut ());
    co.set_user_data(std::ptr::null_mut());
}

#[test]
fn side_other() {
    assert_eq!(Side::Caller.other(), Side::Callee);
    assert_eq!(Side::Callee.other(), Side::Caller);
}

#[test]
fn write_sink_format() {
    let sink = WriteSink::new(Vec::new());
    sink.line("caller", format_args!("saving endpoint"));
    sink.line("worker", format_args!("complete, returning to {}", "caller"));
    let out = String::from_utf8(sink.into_inner()).unwrap();
    assert_eq!(
        out,
        "caller: saving endpoint\nworker: complete, returning to caller\n"
    );
}

#[test]
fn closure_sink() {
    let seen = Arc::new(Mutex::new(String::new()));
    let seen2 = seen.clone();
    let sink = move |endpoint: &str, message: fmt::Arguments<'_>| {
        *seen2.lock() = format!("{} said {}", endpoint, message);
    };
    sink.line("callee", format_args!("yielding"));
    assert_eq!(*seen.lock(), "callee said yielding");
}

#[test]
fn error_display() {
    let err = crate::Error::NotSupported {
        primitive: crate::Primitive::Signal,
        source: std::io::Error::from(std::io::ErrorKind::Unsupported),
    };
    assert_eq!(err.to_string(), "cannot create signal: operation not supported");
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(crate::Primitive::Thread.to_string(), "thread");
}

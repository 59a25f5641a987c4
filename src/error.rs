use core::fmt;
use std::io;

use thiserror::Error;

/// Synchronization or execution resource that a coroutine needs to create.
///
/// Locks are not listed: the `parking_lot` locks used by both batons cannot
/// fail to be created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// A signal used to wake up the other side.
    Signal,

    /// The OS thread running the callee.
    Thread,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Primitive::Signal => "signal",
            Primitive::Thread => "thread",
        })
    }
}

/// Errors that can occur while initializing a coroutine.
///
/// Only resource acquisition can fail. Everything that is already set up when
/// one of these is returned has been released again, so there is nothing to
/// tear down.
#[derive(Debug, Error)]
pub enum Error {
    /// A primitive could not be created on this platform.
    #[error("cannot create {primitive}: operation not supported")]
    NotSupported {
        /// The primitive that failed.
        primitive: Primitive,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Result type used throughout this crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Reports an unrecoverable failure and aborts the process.
///
/// Used once a coroutine's synchronization state can no longer be trusted.
#[cold]
pub(crate) fn fatal(args: fmt::Arguments<'_>) -> ! {
    log::error!(target: "cothread", "{}", args);
    eprintln!("cothread: fatal: {}", args);
    std::process::abort()
}

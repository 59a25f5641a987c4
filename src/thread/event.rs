use core::sync::atomic::{AtomicU8, Ordering};

use super::Baton;
use crate::endpoint::Side;
use crate::error::Result;

/// A [`Baton`] made of two auto-reset events, one per direction.
///
/// On Windows these are native event objects. Elsewhere they are built from a
/// lock and a condition variable.
pub struct EventBaton {
    to_caller: Event,
    to_callee: Event,
    holder: AtomicU8,
}

impl EventBaton {
    fn event(&self, side: Side) -> &Event {
        match side {
            Side::Caller => &self.to_caller,
            Side::Callee => &self.to_callee,
        }
    }
}

fn side_to_u8(side: Side) -> u8 {
    match side {
        Side::Caller => 0,
        Side::Callee => 1,
    }
}

impl Baton for EventBaton {
    fn new() -> Result<Self> {
        Ok(Self {
            to_caller: Event::new()?,
            to_callee: Event::new()?,
            holder: AtomicU8::new(side_to_u8(Side::Caller)),
        })
    }

    fn current(&self) -> Side {
        match self.holder.load(Ordering::Acquire) {
            0 => Side::Caller,
            _ => Side::Callee,
        }
    }

    fn release(&self, from: Side) {
        let to = from.other();
        self.holder.store(side_to_u8(to), Ordering::Release);
        self.event(to).set();
    }

    fn acquire(&self, side: Side) {
        self.event(side).wait();
    }
}

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        use std::io;
        use std::ptr;

        use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
        use windows_sys::Win32::System::Threading::{
            CreateEventW, SetEvent, WaitForSingleObject, INFINITE,
        };

        use crate::error::{fatal, Error, Primitive};

        /// Native auto-reset event object.
        struct Event(HANDLE);

        // Event handles can be used from any thread.
        unsafe impl Send for Event {}
        unsafe impl Sync for Event {}

        impl Event {
            fn new() -> Result<Self> {
                let handle = unsafe { CreateEventW(ptr::null(), 0, 0, ptr::null()) };
                if handle == 0 {
                    return Err(Error::NotSupported {
                        primitive: Primitive::Signal,
                        source: io::Error::last_os_error(),
                    });
                }
                Ok(Self(handle))
            }

            fn set(&self) {
                if unsafe { SetEvent(self.0) } == 0 {
                    fatal(format_args!("SetEvent failed: {}", io::Error::last_os_error()));
                }
            }

            fn wait(&self) {
                if unsafe { WaitForSingleObject(self.0, INFINITE) } != WAIT_OBJECT_0 {
                    fatal(format_args!(
                        "WaitForSingleObject failed: {}",
                        io::Error::last_os_error()
                    ));
                }
            }
        }

        impl Drop for Event {
            fn drop(&mut self) {
                if unsafe { CloseHandle(self.0) } == 0 {
                    fatal(format_args!("CloseHandle failed: {}", io::Error::last_os_error()));
                }
            }
        }
    } else {
        use parking_lot::{Condvar, Mutex};

        /// Auto-reset event holding at most one pending signal.
        struct Event {
            signaled: Mutex<bool>,
            cond: Condvar,
        }

        impl Event {
            fn new() -> Result<Self> {
                Ok(Self {
                    signaled: Mutex::new(false),
                    cond: Condvar::new(),
                })
            }

            fn set(&self) {
                *self.signaled.lock() = true;
                self.cond.notify_one();
            }

            fn wait(&self) {
                let mut signaled = self.signaled.lock();
                while !*signaled {
                    self.cond.wait(&mut signaled);
                }
                *signaled = false;
            }
        }
    }
}

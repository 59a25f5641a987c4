use parking_lot::{Condvar, Mutex};

use super::Baton;
use crate::endpoint::Side;
use crate::error::Result;

/// A [`Baton`] made of one lock and one condition variable.
///
/// The lock protects the side holding the baton. Whoever does not hold it
/// waits on the condition variable.
pub struct CondvarBaton {
    holder: Mutex<Side>,
    cond: Condvar,
}

impl Baton for CondvarBaton {
    fn new() -> Result<Self> {
        Ok(Self {
            holder: Mutex::new(Side::Caller),
            cond: Condvar::new(),
        })
    }

    fn current(&self) -> Side {
        *self.holder.lock()
    }

    fn release(&self, from: Side) {
        let mut holder = self.holder.lock();
        debug_assert_eq!(*holder, from);
        *holder = from.other();
        // Only the other side can be waiting.
        self.cond.notify_one();
    }

    fn acquire(&self, side: Side) {
        let mut holder = self.holder.lock();
        while *holder != side {
            self.cond.wait(&mut holder);
        }
    }
}

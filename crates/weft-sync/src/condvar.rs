// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Condition variable usable with either mutex flavor.
//!
//! The caller passes in the guard of the mutex it holds. `wait` releases
//! that mutex, blocks, and hands back a freshly acquired guard. Only
//! `MutexGuard` and `LightweightMutexGuard` implement `CondVarGuard`, so
//! the pairing is checked at compile time.
//!
//! A generation counter under an internal lock closes the window between
//! releasing the caller's mutex and going to sleep: a signal sent after the
//! caller unlocked is never lost. Callers still re-check their predicate,
//! since a wake may be shared with other waiters.

use std::sync::{Condvar, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::time::Deadline;

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// Guard of a mutex that a `CondVar` can release and re-acquire.
pub trait CondVarGuard<'a>: sealed::Sealed + Sized {
    #[doc(hidden)]
    type Lock: 'a;

    /// Release the lock, returning the mutex it belonged to.
    #[doc(hidden)]
    fn unlock(self) -> &'a Self::Lock;

    /// Block until `lock` is held again.
    #[doc(hidden)]
    fn relock(lock: &'a Self::Lock) -> Self;
}

#[derive(Debug, Default)]
pub struct CondVar {
    generation: Mutex<u64>,
    wakeup: Condvar,
}

impl CondVar {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wake at least one waiter.
    pub fn signal(&self) -> Result<()> {
        let mut generation = self.state();
        *generation = generation.wrapping_add(1);
        self.wakeup.notify_one();
        Ok(())
    }

    /// Wake every current waiter.
    pub fn broadcast(&self) -> Result<()> {
        let mut generation = self.state();
        *generation = generation.wrapping_add(1);
        self.wakeup.notify_all();
        Ok(())
    }

    /// Release `guard`, wait for a signal for at most `timeout_ms`
    /// (0 = forever), then re-acquire the mutex.
    ///
    /// The returned guard is always held, whether the wait was signaled
    /// (`Ok`) or timed out (`Err(TimedOut)`).
    pub fn wait<'a, G: CondVarGuard<'a>>(&self, guard: G, timeout_ms: u32) -> (G, Result<()>) {
        let deadline = Deadline::from_millis(timeout_ms);

        let mut generation = self.state();
        let entered = *generation;
        let lock = guard.unlock();

        let outcome = loop {
            if *generation != entered {
                break Ok(());
            }
            generation = match deadline.remaining() {
                None => self
                    .wakeup
                    .wait(generation)
                    .unwrap_or_else(|e| e.into_inner()),
                Some(left) if left.is_zero() => break Err(Error::TimedOut),
                Some(left) => {
                    self.wakeup
                        .wait_timeout(generation, left)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
            };
        };

        // Never hold our lock while blocking on the caller's: signalers may
        // hold the caller's mutex while they signal.
        drop(generation);
        (G::relock(lock), outcome)
    }
}

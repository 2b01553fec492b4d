// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Counting semaphore.
//!
//! Permit count lives under a std mutex; waiters park on a condvar and
//! re-check the count after every wake, so spurious and interrupted
//! wakeups never surface. No fairness between waiters.

use std::sync::{Condvar, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::time::Deadline;

#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<u32>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(initial_permits: u32) -> Self {
        Self {
            permits: Mutex::new(initial_permits),
            available: Condvar::new(),
        }
    }

    fn count(&self) -> MutexGuard<'_, u32> {
        self.permits.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until a permit is available and take it.
    pub fn acquire(&self) -> Result<()> {
        self.try_acquire(0)
    }

    /// Take a permit, waiting at most `timeout_ms` (0 = forever).
    ///
    /// Returns `Err(TimedOut)` if no permit showed up in time.
    pub fn try_acquire(&self, timeout_ms: u32) -> Result<()> {
        let deadline = Deadline::from_millis(timeout_ms);
        let mut permits = self.count();
        while *permits == 0 {
            permits = match deadline.remaining() {
                None => self
                    .available
                    .wait(permits)
                    .unwrap_or_else(|e| e.into_inner()),
                Some(left) if left.is_zero() => return Err(Error::TimedOut),
                Some(left) => {
                    self.available
                        .wait_timeout(permits, left)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
            };
        }
        *permits -= 1;
        Ok(())
    }

    /// Add `permits` permits, waking up to that many waiters.
    pub fn release(&self, permits: u32) -> Result<()> {
        if permits == 0 {
            return Err(Error::invalid("release of zero permits"));
        }
        let mut count = self.count();
        *count = count
            .checked_add(permits)
            .ok_or_else(|| Error::generic("semaphore permit count overflow"))?;
        drop(count);
        if permits == 1 {
            self.available.notify_one();
        } else {
            self.available.notify_all();
        }
        Ok(())
    }

    /// Permits available right now. Stale as soon as it returns.
    pub fn available(&self) -> u32 {
        *self.count()
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}

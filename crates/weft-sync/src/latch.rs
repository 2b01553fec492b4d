// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! One-shot countdown latch.
//!
//! Threads block in `await_zero` until `count_down` has been called
//! `count` times. Built from a `LightweightMutex` and a `CondVar`.

use crate::condvar::CondVar;
use crate::error::{Error, Result};
use crate::mutex::LightweightMutex;
use crate::time::Deadline;

#[derive(Debug)]
pub struct CountDownLatch {
    count: LightweightMutex<usize>,
    changed: CondVar,
}

impl CountDownLatch {
    pub fn new(count: usize) -> Self {
        Self {
            count: LightweightMutex::new(count),
            changed: CondVar::new(),
        }
    }

    /// Decrement the count, releasing all waiters when it hits zero.
    ///
    /// Errors if the latch is already open.
    pub fn count_down(&self) -> Result<()> {
        let mut count = self.count.lock();
        if *count == 0 {
            return Err(Error::generic("latch already reached zero"));
        }
        *count -= 1;
        if *count == 0 {
            self.changed.broadcast()?;
        }
        Ok(())
    }

    /// Block until the count reaches zero, for at most `timeout_ms`
    /// (0 = forever). The timeout bounds the whole call, not each wake.
    pub fn await_zero(&self, timeout_ms: u32) -> Result<()> {
        let deadline = Deadline::from_millis(timeout_ms);
        let mut count = self.count.lock();
        while *count > 0 {
            let wait_ms = match deadline.remaining() {
                None => 0,
                Some(left) if left.is_zero() => return Err(Error::TimedOut),
                Some(left) => left
                    .as_micros()
                    .div_ceil(1000)
                    .clamp(1, u128::from(u32::MAX)) as u32,
            };
            let (guard, outcome) = self.changed.wait(count, wait_ms);
            count = guard;
            match outcome {
                // Expired waits loop back to the deadline check.
                Ok(()) | Err(Error::TimedOut) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Current count. Stale as soon as it returns.
    pub fn count(&self) -> usize {
        *self.count.lock()
    }
}

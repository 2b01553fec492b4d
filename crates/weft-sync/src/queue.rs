// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Thread-safe blocking FIFO.
//!
//! A `VecDeque` behind a `Mutex`, plus a `Semaphore` holding one permit per
//! queued element. `pop` waits on the semaphore *before* taking the mutex,
//! so the mutex is only ever held for the structural change and the two
//! locks are never nested.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::mutex::Mutex;
use crate::semaphore::Semaphore;

#[derive(Debug)]
pub struct BlockingQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Semaphore,
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Semaphore::new(0),
        }
    }

    /// Append to the tail and wake one waiting consumer.
    pub fn push(&self, value: T) {
        self.items.lock().push_back(value);
        // A u32 permit count overflowing means four billion queued items;
        // nothing sensible to do but leave the element for a non-blocking pop.
        let _ = self.available.release(1);
    }

    /// Remove the head element, waiting at most `timeout_ms` for one to
    /// arrive (0 = forever). `Err(TimedOut)` if the queue stayed empty.
    pub fn pop(&self, timeout_ms: u32) -> Result<T> {
        self.available.try_acquire(timeout_ms)?;
        self.items
            .lock()
            .pop_front()
            .ok_or_else(|| Error::generic("permit acquired but queue was empty"))
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

impl<T: Clone> BlockingQueue<T> {
    /// Copy of the head element. `InvalidArgument` when empty.
    pub fn peek(&self) -> Result<T> {
        self.items
            .lock()
            .front()
            .cloned()
            .ok_or_else(|| Error::invalid("queue is empty"))
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

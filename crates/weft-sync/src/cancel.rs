// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Stop requests for `Thread` work and pool workers.
//!
//! `Thread::cancel` and `ThreadPool::close(true)` raise the request; the
//! `Runnable` sees it through the token it was handed and returns at its
//! next convenient point. A blocked call is never interrupted.

use std::sync::atomic::{AtomicBool, Ordering};

/// Shared stop request. Starts clear; `reset` makes it reusable when the
/// owning `Thread` is started again.
#[derive(Debug, Default)]
pub struct CancelToken {
    requested: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the work to stop. Idempotent.
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.requested.store(false, Ordering::Release);
    }

    /// Whether a stop has been requested since the last `reset`.
    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

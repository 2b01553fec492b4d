// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Millisecond time helpers.
//!
//! Wait parameters across weft are `u32` milliseconds where 0 means
//! "block forever" (the socket checker is the one exception).

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic milliseconds since the first call in this process.
pub fn now_millis() -> u64 {
    let epoch = *EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as u64
}

/// Block the calling thread for `millis`.
pub fn sleep_millis(millis: u32) {
    std::thread::sleep(Duration::from_millis(u64::from(millis)));
}

/// End point of a bounded wait, or no end at all.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// `0` means infinite.
    pub fn from_millis(timeout_ms: u32) -> Self {
        if timeout_ms == 0 {
            Self::never()
        } else {
            Self::after(Duration::from_millis(u64::from(timeout_ms)))
        }
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Some(Instant::now() + timeout),
        }
    }

    pub fn never() -> Self {
        Self { at: None }
    }

    pub fn is_infinite(&self) -> bool {
        self.at.is_none()
    }

    /// Time left. `None` for an infinite deadline, `Some(ZERO)` once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }

    /// Remaining time as a `poll(2)`-style timeout: -1 for infinite,
    /// otherwise whole milliseconds rounded up so the wait never ends early.
    pub fn remaining_poll_ms(&self) -> i32 {
        match self.remaining() {
            None => -1,
            Some(d) => {
                let ms = d.as_micros().div_ceil(1000);
                ms.min(i32::MAX as u128) as i32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_monotonic() {
        let a = now_millis();
        sleep_millis(5);
        let b = now_millis();
        assert!(b >= a + 4, "a={a} b={b}");
    }

    #[test]
    fn zero_means_never() {
        let d = Deadline::from_millis(0);
        assert!(d.is_infinite());
        assert!(!d.expired());
        assert_eq!(d.remaining_poll_ms(), -1);
    }

    #[test]
    fn bounded_deadline_expires() {
        let d = Deadline::from_millis(10);
        assert!(!d.expired());
        assert!(d.remaining_poll_ms() > 0);
        sleep_millis(15);
        assert!(d.expired());
        assert_eq!(d.remaining_poll_ms(), 0);
    }
}

// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Readiness multiplexer over many sockets.
//!
//! One bounded `poll(2)` per call, level-triggered, no threads of its own.
//! Every socket reported readable gets its delegate invoked once, on the
//! calling thread, in the order the pairs were given. Hang-up and error
//! readiness count as readable: the callback's `receive` sees EOF or the
//! error.
//!
//! A listener's callback is expected to `accept` and register the new
//! connection for the next call; a client's callback drains its data.

use std::io;
use std::time::Duration;

use tracing::trace;
use weft_sync::time::Deadline;
use weft_sync::{CancelToken, Error, Mutex, Result};

use crate::socket::{SocketHandle, SocketInfoPair};
use crate::sys::{self, PollFd};

/// Poll `fds`, retrying interrupted waits with whatever is left of
/// `timeout`. A zero timeout polls once.
pub(crate) fn poll_ready(fds: &mut [PollFd], timeout: Duration) -> io::Result<usize> {
    let deadline = Deadline::after(timeout);
    loop {
        match sys::poll(fds, deadline.remaining_poll_ms()) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Wait up to `timeout_ms` (0 = don't wait) for data on any of `pairs`,
/// then run the delegate of each ready socket.
///
/// Returns the number of delegates invoked. An invalid or closed handle in
/// `pairs` fails the whole call before any delegate runs.
pub fn check_sockets_for_incoming_data(pairs: &[SocketInfoPair], timeout_ms: u32) -> Result<usize> {
    if let Some(pair) = pairs.iter().find(|p| !p.handle.is_valid()) {
        return Err(Error::invalid(format!("{} is not an open socket", pair.handle)));
    }

    let mut fds: Vec<PollFd> = pairs.iter().map(|p| sys::poll_entry(p.handle.raw())).collect();
    let ready = poll_ready(&mut fds, Duration::from_millis(u64::from(timeout_ms)))?;
    if ready == 0 {
        return Ok(0);
    }

    if let Some((pair, _)) = pairs
        .iter()
        .zip(&fds)
        .find(|(_, fd)| fd.revents & sys::POLL_INVALID != 0)
    {
        return Err(Error::invalid(format!("{} is not an open socket", pair.handle)));
    }

    let mut invoked = 0;
    for (pair, fd) in pairs.iter().zip(&fds) {
        if fd.revents & sys::POLL_READABLE != 0 {
            trace!(socket = %pair.handle, revents = fd.revents, "socket ready");
            pair.delegate.invoke(pair.handle);
            invoked += 1;
        }
    }
    Ok(invoked)
}

/// Owned, thread-safe set of sockets to watch.
///
/// `check` works on a snapshot, so delegates may `register` or
/// `unregister` while they run; changes take effect on the next call.
#[derive(Debug, Default)]
pub struct NonBlockSocketChecker {
    pairs: Mutex<Vec<SocketInfoPair>>,
}

impl NonBlockSocketChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pair: SocketInfoPair) {
        self.pairs.lock().push(pair);
    }

    /// Drop every pair watching `handle`. Returns how many were removed.
    pub fn unregister(&self, handle: SocketHandle) -> usize {
        let mut pairs = self.pairs.lock();
        let before = pairs.len();
        pairs.retain(|p| p.handle != handle);
        before - pairs.len()
    }

    pub fn snapshot(&self) -> Vec<SocketInfoPair> {
        self.pairs.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.pairs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.lock().is_empty()
    }

    /// One readiness round over the registered sockets.
    pub fn check(&self, timeout_ms: u32) -> Result<usize> {
        let pairs = self.snapshot();
        check_sockets_for_incoming_data(&pairs, timeout_ms)
    }

    /// Call `check(poll_ms)` until `token` is cancelled or a round fails.
    pub fn run(&self, poll_ms: u32, token: &CancelToken) -> Result<()> {
        while !token.is_cancelled() {
            self.check(poll_ms)?;
        }
        Ok(())
    }
}

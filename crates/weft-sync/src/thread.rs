// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! OS thread with an explicit lifecycle.
//!
//! `New -> Starting -> Running -> Terminated`, once per run. A `Thread` can
//! run again only after `join()`. Cancellation is cooperative: `cancel()`
//! sets the token handed to the `Runnable`, which is expected to poll it.
//! Dropping an un-joined `Thread` joins it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::time;

/// Unit of work executed by a `Thread` or a `ThreadPool` worker.
pub trait Runnable: Send + Sync + 'static {
    /// Do the work. Long-running work should return soon after
    /// `token.is_cancelled()` turns true.
    fn run(&self, token: &CancelToken);
}

impl<F> Runnable for F
where
    F: Fn(&CancelToken) + Send + Sync + 'static,
{
    fn run(&self, token: &CancelToken) {
        self(token)
    }
}

/// Thread lifecycle states.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Never started, or start failed.
    New = 0,
    /// `start()` accepted, OS thread not yet running the work.
    Starting = 1,
    /// Work is executing.
    Running = 2,
    /// Work returned (or panicked).
    Terminated = 3,
}

impl ThreadState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::New,
            1 => Self::Starting,
            2 => Self::Running,
            _ => Self::Terminated,
        }
    }
}

type RunResult = std::result::Result<(), String>;

pub struct Thread {
    name: Option<String>,
    state: Arc<AtomicU8>,
    cancel_token: Arc<CancelToken>,
    /// Some while started and not yet joined.
    handle: Option<JoinHandle<RunResult>>,
}

impl Thread {
    pub fn new() -> Self {
        Self {
            name: None,
            state: Arc::new(AtomicU8::new(ThreadState::New as u8)),
            cancel_token: Arc::new(CancelToken::new()),
            handle: None,
        }
    }

    /// A thread whose OS thread carries `name`.
    pub fn with_name(name: impl Into<String>) -> Self {
        let mut thread = Self::new();
        thread.name = Some(name.into());
        thread
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Spawn the OS thread and run `runnable` on it.
    ///
    /// Fails if this thread was started and has not been joined yet.
    pub fn start<R: Runnable>(&mut self, runnable: R) -> Result<()> {
        self.start_shared(Arc::new(runnable))
    }

    /// Like `start`, for work that is shared with other threads.
    pub fn start_shared(&mut self, runnable: Arc<dyn Runnable>) -> Result<()> {
        if self.handle.is_some() {
            return Err(Error::generic("thread already started and not joined"));
        }

        self.cancel_token.reset();
        self.set_state(ThreadState::Starting);

        let state = self.state.clone();
        let token = self.cancel_token.clone();
        let mut builder = thread::Builder::new();
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }

        let spawned = builder.spawn(move || {
            state.store(ThreadState::Running as u8, Ordering::Release);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| runnable.run(&token)));
            state.store(ThreadState::Terminated as u8, Ordering::Release);
            outcome.map_err(|payload| panic_message(payload.as_ref()))
        });

        match spawned {
            Ok(handle) => {
                debug!(name = ?self.name, "thread started");
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.set_state(ThreadState::New);
                Err(Error::Io(e))
            }
        }
    }

    /// Wait for the OS thread to finish.
    ///
    /// Ok if the thread was never started or is already joined. A panic in
    /// the work is reported as an error; the thread is joinable and
    /// restartable either way.
    pub fn join(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let outcome = handle.join();
        debug!(name = ?self.name, "thread joined");
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(msg)) => Err(Error::generic(format!("unit of work panicked: {msg}"))),
            Err(_) => Err(Error::generic("thread panicked")),
        }
    }

    /// Ask the running work to stop.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn reset_cancel(&self) {
        self.cancel_token.reset();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Token handed to the work on every run.
    pub fn cancel_token(&self) -> Arc<CancelToken> {
        self.cancel_token.clone()
    }

    /// Lifecycle state at the time of the call.
    pub fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True between a successful `start` and the matching `join`.
    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    /// Block the calling thread for `millis` milliseconds.
    pub fn sleep(millis: u32) {
        time::sleep_millis(millis);
    }

    fn set_state(&self, state: ThreadState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("started", &self.is_started())
            .finish()
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            warn!(name = ?self.name, error = %e, "thread failed before drop");
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

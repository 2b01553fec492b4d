// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Weft synchronization toolkit.
//!
//! OS threads with an explicit lifecycle plus the primitives needed to
//! coordinate them. Every blocking call reports its outcome as a
//! `Result`; timeouts are always `Error::TimedOut`, never a hard error.
//!
//! Components:
//! - atomic: fetch-and-op counters and an atomic flag
//! - mutex: `Mutex` and `LightweightMutex` with scoped guards
//! - semaphore: counting semaphore with timed acquire
//! - condvar: condition variable bound to either mutex flavor
//! - latch: one-shot countdown latch
//! - cancel/thread: cooperative cancellation and thread lifecycle
//! - rwlock: many-readers / one-writer lock
//! - queue: blocking FIFO (mutex + semaphore)
//! - pool: fixed-size worker pool fed by a job queue
//! - timer: periodic callbacks on a managing thread
//! - time: monotonic milliseconds and wait deadlines
//! - config: serde-loadable settings

pub mod atomic;
pub mod cancel;
pub mod condvar;
pub mod config;
pub mod error;
pub mod latch;
pub mod mutex;
pub mod pool;
pub mod queue;
pub mod rwlock;
pub mod semaphore;
pub mod thread;
pub mod time;
pub mod timer;

pub use atomic::{Atomic, AtomicFlag, AtomicInteger};
pub use cancel::CancelToken;
pub use condvar::{CondVar, CondVarGuard};
pub use error::{Error, Result};
pub use latch::CountDownLatch;
pub use mutex::{LightweightMutex, LightweightMutexGuard, Mutex, MutexGuard};
pub use pool::ThreadPool;
pub use queue::BlockingQueue;
pub use rwlock::{ReadGuard, ReadWriteLock, WriteGuard};
pub use semaphore::Semaphore;
pub use thread::{Runnable, Thread, ThreadState};
pub use timer::{Timer, TimerManager};

// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Fixed-size worker pool.
//!
//! Jobs go into one shared FIFO guarded by a `Mutex` + `CondVar`. Each
//! worker is a `Thread` whose cancel token is passed straight to the jobs
//! it runs, so `close(true)` reaches work that is already executing.
//!
//! Closing: workers keep taking jobs until the queue is empty and close
//! was requested. A cancelled worker exits after its current job and
//! leaves the rest of the queue behind.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::atomic::AtomicFlag;
use crate::cancel::CancelToken;
use crate::condvar::CondVar;
use crate::config::{PoolConfig, MAX_POOL_THREADS};
use crate::error::{Error, Result};
use crate::mutex::Mutex;
use crate::thread::{Runnable, Thread};

struct Jobs {
    queue: VecDeque<Arc<dyn Runnable>>,
    close_requested: bool,
}

struct Shared {
    jobs: Mutex<Jobs>,
    work_available: CondVar,
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<Thread>,
    closed: AtomicFlag,
}

impl ThreadPool {
    /// Spawn `min(size, MAX_POOL_THREADS)` workers. Stops at the first
    /// worker that fails to start; `size()` tells how many made it.
    pub fn new(size: u32) -> Self {
        let shared = Arc::new(Shared {
            jobs: Mutex::new(Jobs {
                queue: VecDeque::new(),
                close_requested: false,
            }),
            work_available: CondVar::new(),
        });

        let wanted = size.min(MAX_POOL_THREADS);
        let mut workers = Vec::with_capacity(wanted as usize);
        for id in 0..wanted {
            let mut worker = Thread::with_name(format!("weft-pool-{id}"));
            let shared = shared.clone();
            if let Err(e) = worker.start(move |token: &CancelToken| worker_loop(&shared, token)) {
                warn!(worker = id, error = %e, "pool worker failed to start");
                break;
            }
            workers.push(worker);
        }
        debug!(workers = workers.len(), "thread pool opened");

        Self {
            shared,
            workers,
            closed: AtomicFlag::new(false),
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.effective_size())
    }

    /// Queue `runnable` for execution on some worker.
    pub fn add<R: Runnable>(&self, runnable: R) -> Result<()> {
        self.add_shared(Arc::new(runnable))
    }

    /// Queue shared work. Fails once close was requested.
    pub fn add_shared(&self, runnable: Arc<dyn Runnable>) -> Result<()> {
        let mut jobs = self.shared.jobs.lock();
        if jobs.close_requested {
            return Err(Error::generic("thread pool is closed"));
        }
        jobs.queue.push_back(runnable);
        self.shared.work_available.signal()
    }

    /// Stop accepting work and wait for every worker to exit.
    ///
    /// With `cancel_threads`, every worker token is cancelled first: running
    /// jobs observe it and queued jobs are dropped. Without it the queue is
    /// drained. Closing an already closed pool is Ok.
    pub fn close(&mut self, cancel_threads: bool) -> Result<()> {
        if self.closed.load() {
            return Ok(());
        }
        {
            let mut jobs = self.shared.jobs.lock();
            jobs.close_requested = true;
            self.shared.work_available.broadcast()?;
        }

        if cancel_threads {
            for worker in &self.workers {
                worker.cancel();
            }
        }

        let mut first_err = None;
        for worker in &mut self.workers {
            if let Err(e) = worker.join() {
                first_err.get_or_insert(e);
            }
        }
        self.closed.store(true);
        debug!(cancelled = cancel_threads, "thread pool closed");

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// True once `close` has joined every worker.
    pub fn is_closed(&self) -> bool {
        self.closed.load()
    }

    /// Number of workers that started.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Jobs waiting for a worker.
    pub fn pending(&self) -> usize {
        self.shared.jobs.lock().queue.len()
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::from_config(&PoolConfig::default())
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("size", &self.size())
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if let Err(e) = self.close(false) {
            warn!(error = %e, "thread pool failed while closing on drop");
        }
    }
}

fn worker_loop(shared: &Shared, token: &CancelToken) {
    while !token.is_cancelled() {
        let job = {
            let mut jobs = shared.jobs.lock();
            while jobs.queue.is_empty() && !jobs.close_requested {
                // An infinite wait only returns once signalled.
                let (guard, _) = shared.work_available.wait(jobs, 0);
                jobs = guard;
            }
            match jobs.queue.pop_front() {
                Some(job) => job,
                None => break,
            }
        };
        job.run(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomic::Atomic;
    use crate::semaphore::Semaphore;
    use std::time::{Duration, Instant};

    #[test]
    fn size_is_clamped() {
        let mut pool = ThreadPool::new(100);
        assert_eq!(pool.size(), MAX_POOL_THREADS as usize);
        pool.close(false).unwrap();
    }

    #[test]
    fn runs_every_job_before_close_returns() {
        let hits = Arc::new(Atomic::new(0u32));
        let mut pool = ThreadPool::new(4);
        for _ in 0..100 {
            let h = hits.clone();
            pool.add(move |_: &CancelToken| {
                h.inc();
            })
            .unwrap();
        }
        pool.close(false).unwrap();
        assert!(pool.is_closed());
        assert_eq!(hits.load(), 100);
    }

    #[test]
    fn add_after_close_fails() {
        let mut pool = ThreadPool::new(1);
        pool.close(false).unwrap();
        assert!(pool.add(|_: &CancelToken| {}).is_err());
        pool.close(false).unwrap();
    }

    #[test]
    fn cancel_reaches_running_job() {
        let started = Arc::new(Semaphore::new(0));
        let s = started.clone();
        let mut pool = ThreadPool::new(1);
        pool.add(move |token: &CancelToken| {
            s.release(1).unwrap();
            while !token.is_cancelled() {
                Thread::sleep(1);
            }
        })
        .unwrap();
        started.try_acquire(5_000).unwrap();

        let begin = Instant::now();
        pool.close(true).unwrap();
        assert!(begin.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cancelled_close_drops_queued_jobs() {
        let gate = Arc::new(Semaphore::new(0));
        let ran = Arc::new(Atomic::new(0u32));
        let mut pool = ThreadPool::new(1);

        let g = gate.clone();
        pool.add(move |_: &CancelToken| {
            g.acquire().unwrap();
        })
        .unwrap();
        for _ in 0..10 {
            let r = ran.clone();
            pool.add(move |_: &CancelToken| {
                r.inc();
            })
            .unwrap();
        }

        let releaser = {
            let gate = gate.clone();
            std::thread::spawn(move || {
                Thread::sleep(30);
                gate.release(1).unwrap();
            })
        };
        pool.close(true).unwrap();
        releaser.join().unwrap();
        assert_eq!(ran.load(), 0);
    }

    #[test]
    fn drop_drains_queue() {
        let hits = Arc::new(Atomic::new(0u32));
        {
            let pool = ThreadPool::new(2);
            for _ in 0..20 {
                let h = hits.clone();
                pool.add(move |_: &CancelToken| {
                    Thread::sleep(1);
                    h.inc();
                })
                .unwrap();
            }
        }
        assert_eq!(hits.load(), 20);
    }

    #[test]
    fn from_config_uses_size() {
        let mut pool = ThreadPool::from_config(&PoolConfig { size: 3 });
        assert_eq!(pool.size(), 3);
        pool.close(false).unwrap();
    }
}

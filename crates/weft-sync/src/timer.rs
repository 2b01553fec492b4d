// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Periodic callbacks driven by one managing thread.
//!
//! A `TimerManager` keeps executions sorted by due time and sleeps on a
//! `CondVar` until the earliest one. Its `Thread` starts when the first
//! timer is scheduled and exits once nothing is queued; the next `start`
//! spins it up again.
//!
//! Callbacks run on the manager thread with no lock held, so they may
//! `stop`, `restart` or drop timers, their own included. A slow callback
//! delays every later execution. Do not drop the last `Timer` of a manager
//! from inside one of its callbacks: that joins the manager thread from
//! itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::atomic::Atomic;
use crate::cancel::CancelToken;
use crate::condvar::CondVar;
use crate::error::Result;
use crate::mutex::Mutex;
use crate::thread::{Runnable, Thread};
use crate::time::now_millis;

type Callback = dyn Fn() + Send + Sync;

struct Slot {
    callback: Arc<Callback>,
    interval_ms: u64,
    /// 0 means unlimited.
    max_executions: u32,
    executed: u32,
    scheduled: bool,
}

impl Slot {
    fn remaining(&self) -> u32 {
        if self.max_executions == 0 {
            u32::MAX
        } else {
            self.max_executions - self.executed
        }
    }
}

#[derive(Clone, Copy)]
struct Execution {
    due: u64,
    timer: u64,
}

#[derive(Default)]
struct Schedule {
    slots: HashMap<u64, Slot>,
    /// Sorted by `due`; equal times keep insertion order.
    queue: Vec<Execution>,
    worker_running: bool,
    shutting_down: bool,
}

impl Schedule {
    fn enqueue(&mut self, timer: u64, interval_ms: u64) {
        let due = now_millis().saturating_add(interval_ms);
        let pos = self.queue.partition_point(|e| e.due <= due);
        self.queue.insert(pos, Execution { due, timer });
    }

    fn dequeue_all(&mut self, timer: u64) {
        self.queue.retain(|e| e.timer != timer);
    }
}

#[derive(Default)]
struct Shared {
    schedule: Mutex<Schedule>,
    changed: CondVar,
}

/// Owner of the timer thread. Shared by the `Timer`s created on it.
pub struct TimerManager {
    shared: Arc<Shared>,
    worker: Mutex<Thread>,
    next_id: Atomic<u64>,
}

impl TimerManager {
    /// A manager whose thread, once started, is called `name`.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(Shared::default()),
            worker: Mutex::new(Thread::with_name(name)),
            next_id: Atomic::new(1),
        })
    }

    /// Timers with an execution queued.
    pub fn scheduled(&self) -> usize {
        let schedule = self.shared.schedule.lock();
        schedule.slots.values().filter(|s| s.scheduled).count()
    }

    /// Whether the manager thread is currently alive.
    pub fn is_running(&self) -> bool {
        self.shared.schedule.lock().worker_running
    }

    fn add(&self, slot: Slot) -> u64 {
        let id = self.next_id.inc();
        self.shared.schedule.lock().slots.insert(id, slot);
        id
    }

    fn schedule(&self, id: u64) -> Result<()> {
        let mut schedule = self.shared.schedule.lock();
        let Some(slot) = schedule.slots.get_mut(&id) else {
            return Ok(());
        };
        if slot.scheduled || slot.remaining() == 0 {
            return Ok(());
        }
        slot.scheduled = true;
        let interval_ms = slot.interval_ms;
        schedule.enqueue(id, interval_ms);

        if schedule.worker_running {
            drop(schedule);
            return self.shared.changed.signal();
        }

        // The previous worker cleared `worker_running` on its way out and
        // takes no more locks, so joining it here cannot block on us.
        let mut worker = self.worker.lock();
        if let Err(e) = worker.join() {
            warn!(error = %e, "timer thread ended with an error");
        }
        let started = worker.start(TimerLoop {
            shared: self.shared.clone(),
        });
        match started {
            Ok(()) => {
                schedule.worker_running = true;
                debug!(name = ?worker.name(), "timer thread started");
                Ok(())
            }
            Err(e) => {
                schedule.dequeue_all(id);
                if let Some(slot) = schedule.slots.get_mut(&id) {
                    slot.scheduled = false;
                }
                Err(e)
            }
        }
    }

    fn unschedule(&self, id: u64) {
        let mut schedule = self.shared.schedule.lock();
        schedule.dequeue_all(id);
        if let Some(slot) = schedule.slots.get_mut(&id) {
            slot.scheduled = false;
        }
        drop(schedule);
        let _ = self.shared.changed.signal();
    }

    fn remove(&self, id: u64) {
        let mut schedule = self.shared.schedule.lock();
        schedule.dequeue_all(id);
        schedule.slots.remove(&id);
        drop(schedule);
        let _ = self.shared.changed.signal();
    }

    fn with_slot<R>(&self, id: u64, f: impl FnOnce(&Slot) -> R) -> Option<R> {
        self.shared.schedule.lock().slots.get(&id).map(f)
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        {
            let mut schedule = self.shared.schedule.lock();
            schedule.shutting_down = true;
            schedule.queue.clear();
        }
        let _ = self.shared.changed.broadcast();
        if let Err(e) = self.worker.get_mut().join() {
            warn!(error = %e, "timer thread ended with an error");
        }
    }
}

impl fmt::Debug for TimerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerManager")
            .field("scheduled", &self.scheduled())
            .field("running", &self.is_running())
            .finish()
    }
}

struct TimerLoop {
    shared: Arc<Shared>,
}

impl Runnable for TimerLoop {
    fn run(&self, token: &CancelToken) {
        let mut schedule = self.shared.schedule.lock();
        while !token.is_cancelled() {
            if schedule.shutting_down || schedule.queue.is_empty() {
                break;
            }
            let now = now_millis();
            let next = schedule.queue[0];
            if next.due > now {
                let wait_ms = u32::try_from(next.due - now).unwrap_or(u32::MAX);
                schedule = self.shared.changed.wait(schedule, wait_ms).0;
                continue;
            }

            schedule.queue.remove(0);
            let Some(slot) = schedule.slots.get_mut(&next.timer) else {
                continue;
            };
            if slot.remaining() == 0 {
                slot.scheduled = false;
                continue;
            }
            slot.executed += 1;
            let callback = slot.callback.clone();
            let interval_ms = slot.interval_ms;
            let again = slot.remaining() > 0;
            slot.scheduled = again;
            if again {
                schedule.enqueue(next.timer, interval_ms);
            }

            drop(schedule);
            trace!(timer = next.timer, "timer fired");
            callback();
            schedule = self.shared.schedule.lock();
        }
        schedule.worker_running = false;
        debug!("timer thread idle");
    }
}

/// Calls a delegate every `interval_ms`, up to `max_executions` times
/// (0 = until stopped). Dropping the timer stops it.
pub struct Timer {
    id: u64,
    interval_ms: u64,
    manager: Arc<TimerManager>,
}

impl Timer {
    /// A stopped timer on `manager`.
    pub fn new<F>(
        manager: &Arc<TimerManager>,
        interval_ms: u64,
        max_executions: u32,
        callback: F,
    ) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = manager.add(Slot {
            callback: Arc::new(callback),
            interval_ms,
            max_executions,
            executed: 0,
            scheduled: false,
        });
        Self {
            id,
            interval_ms,
            manager: manager.clone(),
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Queue the first execution `interval_ms` from now. No-op when already
    /// running or when every execution has been used up. Fails only if the
    /// manager thread cannot be spawned.
    pub fn start(&self) -> Result<()> {
        self.manager.schedule(self.id)
    }

    /// Drop queued executions. An execution already under way completes.
    pub fn stop(&self) {
        self.manager.unschedule(self.id);
    }

    /// Stop, then start counting the interval again from now. The
    /// execution count is not reset.
    pub fn restart(&self) -> Result<()> {
        self.stop();
        self.start()
    }

    pub fn is_scheduled(&self) -> bool {
        self.manager.with_slot(self.id, |s| s.scheduled).unwrap_or(false)
    }

    /// `u32::MAX` for an unlimited timer.
    pub fn executions_remaining(&self) -> u32 {
        self.manager.with_slot(self.id, Slot::remaining).unwrap_or(0)
    }

    pub fn max_executions_reached(&self) -> bool {
        self.executions_remaining() == 0
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.manager.remove(self.id);
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.id)
            .field("interval_ms", &self.interval_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latch::CountDownLatch;
    use std::time::{Duration, Instant};

    fn counter() -> (Arc<Atomic<u32>>, impl Fn() + Send + Sync + 'static) {
        let hits = Arc::new(Atomic::new(0u32));
        let h = hits.clone();
        (hits, move || {
            h.inc();
        })
    }

    fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while !done() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        true
    }

    #[test]
    fn bounded_timer_fires_exactly_max_times() {
        let manager = TimerManager::new("timer-bounded");
        let (hits, callback) = counter();
        let timer = Timer::new(&manager, 5, 3, callback);
        assert_eq!(timer.executions_remaining(), 3);
        assert!(!timer.is_scheduled());

        timer.start().unwrap();
        assert!(wait_until(Duration::from_secs(5), || timer.max_executions_reached()));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(hits.load(), 3);
        assert!(!timer.is_scheduled());

        // Used up: starting again does nothing.
        timer.start().unwrap();
        assert!(!timer.is_scheduled());
    }

    #[test]
    fn first_execution_waits_one_interval() {
        let manager = TimerManager::new("timer-interval");
        let latch = Arc::new(CountDownLatch::new(1));
        let l = latch.clone();
        let timer = Timer::new(&manager, 40, 1, move || {
            let _ = l.count_down();
        });
        let start = Instant::now();
        timer.start().unwrap();
        latch.await_zero(5_000).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(35));
    }

    #[test]
    fn stop_halts_an_unlimited_timer() {
        let manager = TimerManager::new("timer-stop");
        let (hits, callback) = counter();
        let timer = Timer::new(&manager, 2, 0, callback);
        assert_eq!(timer.executions_remaining(), u32::MAX);

        timer.start().unwrap();
        assert!(wait_until(Duration::from_secs(5), || hits.load() >= 3));
        timer.stop();
        assert!(!timer.is_scheduled());

        // Allow an execution that was already under way to finish.
        std::thread::sleep(Duration::from_millis(20));
        let settled = hits.load();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(hits.load(), settled);
    }

    #[test]
    fn restart_resumes_after_stop() {
        let manager = TimerManager::new("timer-restart");
        let (hits, callback) = counter();
        let timer = Timer::new(&manager, 2, 0, callback);
        timer.start().unwrap();
        timer.stop();
        timer.restart().unwrap();
        assert!(timer.is_scheduled());
        assert!(wait_until(Duration::from_secs(5), || hits.load() >= 2));
    }

    #[test]
    fn shorter_interval_fires_first() {
        let manager = TimerManager::new("timer-order");
        let order = Arc::new(Mutex::new(Vec::new()));
        let slow = {
            let order = order.clone();
            Timer::new(&manager, 60, 1, move || order.lock().push("slow"))
        };
        let fast = {
            let order = order.clone();
            Timer::new(&manager, 10, 1, move || order.lock().push("fast"))
        };
        slow.start().unwrap();
        fast.start().unwrap();
        assert!(wait_until(Duration::from_secs(5), || order.lock().len() == 2));
        assert_eq!(*order.lock(), vec!["fast", "slow"]);
    }

    #[test]
    fn dropped_timer_never_fires() {
        let manager = TimerManager::new("timer-drop");
        let (hits, callback) = counter();
        let timer = Timer::new(&manager, 20, 0, callback);
        timer.start().unwrap();
        drop(timer);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(hits.load(), 0);
        assert_eq!(manager.scheduled(), 0);
    }

    #[test]
    fn manager_thread_stops_when_idle_and_restarts() {
        let manager = TimerManager::new("timer-idle");
        let (hits, callback) = counter();
        let timer = Timer::new(&manager, 2, 1, callback);
        timer.start().unwrap();
        assert!(wait_until(Duration::from_secs(5), || !manager.is_running()));
        assert_eq!(hits.load(), 1);

        let (again, callback) = counter();
        let second = Timer::new(&manager, 2, 1, callback);
        second.start().unwrap();
        assert!(wait_until(Duration::from_secs(5), || again.load() == 1));
    }

    #[test]
    fn callback_may_stop_its_own_timer() {
        let manager = TimerManager::new("timer-self-stop");
        let hits = Arc::new(Atomic::new(0u32));
        let slot: Arc<Mutex<Option<Arc<Timer>>>> = Arc::new(Mutex::new(None));
        let timer = {
            let hits = hits.clone();
            let slot = slot.clone();
            Arc::new(Timer::new(&manager, 2, 0, move || {
                hits.inc();
                if let Some(t) = slot.lock().as_ref() {
                    t.stop();
                }
            }))
        };
        *slot.lock() = Some(timer.clone());
        timer.start().unwrap();
        assert!(wait_until(Duration::from_secs(5), || hits.load() >= 1));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(hits.load(), 1);
        assert!(!timer.is_scheduled());
        slot.lock().take();
    }
}

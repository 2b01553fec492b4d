// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Many-readers / one-writer lock.
//!
//! Two `LightweightMutex`es and a `CondVar`. The writer mutex is the
//! turnstile: readers pass through it on entry, and a writer keeps it for
//! its whole critical section, so a waiting writer holds off new readers
//! and cannot be starved. The writer then sleeps on the condvar until the
//! reader count drains to zero.
//!
//! Not reentrant: taking `write` while holding `read` on the same thread
//! deadlocks.

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::condvar::CondVar;
use crate::mutex::{LightweightMutex, LightweightMutexGuard};

pub struct ReadWriteLock<T> {
    writer: LightweightMutex<()>,
    readers: LightweightMutex<u32>,
    reader_left: CondVar,
    value: UnsafeCell<T>,
}

// SAFETY: `value` is only reached through the guards below. Shared access
// (`ReadGuard`) exists only while `readers > 0`; exclusive access
// (`WriteGuard`) only while `writer` is held and `readers == 0`, and no
// reader can enter without first taking `writer`.
unsafe impl<T: Send> Send for ReadWriteLock<T> {}
unsafe impl<T: Send + Sync> Sync for ReadWriteLock<T> {}

impl<T> ReadWriteLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            writer: LightweightMutex::new(()),
            readers: LightweightMutex::new(0),
            reader_left: CondVar::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Shared access. Blocks while a writer holds or waits for the lock.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let _turnstile = self.writer.lock();
        *self.readers.lock() += 1;
        ReadGuard { lock: self }
    }

    /// Exclusive access. Blocks new readers at once, then waits for the
    /// current ones to leave.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let turnstile = self.writer.lock();
        let mut readers = self.readers.lock();
        while *readers > 0 {
            // An unbounded wait only returns once signaled.
            readers = self.reader_left.wait(readers, 0).0;
        }
        drop(readers);
        WriteGuard {
            lock: self,
            _turnstile: turnstile,
        }
    }

    pub fn with_read<R, F: FnOnce(&T) -> R>(&self, f: F) -> R {
        let guard = self.read();
        f(&guard)
    }

    pub fn with_write<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R {
        let mut guard = self.write();
        f(&mut guard)
    }

    /// Current reader count. Stale as soon as it returns.
    pub fn readers(&self) -> u32 {
        *self.readers.lock()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    fn leave_read(&self) {
        let mut readers = self.readers.lock();
        *readers = readers.saturating_sub(1);
        if *readers == 0 {
            // Never fails.
            let _ = self.reader_left.broadcast();
        }
    }
}

impl<T: Default> Default for ReadWriteLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for ReadWriteLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadWriteLock")
            .field("readers", &self.readers())
            .finish_non_exhaustive()
    }
}

/// Shared access to a `ReadWriteLock`. Leaves the read area on drop.
pub struct ReadGuard<'a, T> {
    lock: &'a ReadWriteLock<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: readers > 0 while this guard lives, so no writer is inside.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.leave_read();
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Exclusive access to a `ReadWriteLock`. Unlocks on drop.
pub struct WriteGuard<'a, T> {
    lock: &'a ReadWriteLock<T>,
    _turnstile: LightweightMutexGuard<'a, ()>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the writer mutex is held and the read area is empty.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as for `deref`, and `&mut self` makes this the only borrow.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T: fmt::Debug> fmt::Debug for WriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

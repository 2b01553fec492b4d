// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Mutex flavors.
//!
//! Both are non-recursive and release on guard drop, so every exit path
//! (early return, `?`, panic) unlocks. Locking twice from the same thread
//! deadlocks; it is not detected.
//!
//! - `Mutex` wraps `std::sync::Mutex`. Poisoning is swallowed.
//! - `LightweightMutex` wraps `parking_lot::Mutex`: smaller, no poisoning,
//!   spins briefly before parking.
//!
//! Both guard types are accepted by `CondVar::wait`.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{self, TryLockError};

use crate::condvar::{sealed, CondVarGuard};

/// Blocking mutual exclusion around a `T`.
pub struct Mutex<T> {
    inner: sync::Mutex<T>,
}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: sync::Mutex::new(value),
        }
    }

    /// Block until the lock is acquired.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        MutexGuard { lock: self, guard }
    }

    /// Acquire without blocking. `None` if another thread holds it.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        match self.inner.try_lock() {
            Ok(guard) => Some(MutexGuard { lock: self, guard }),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(e)) => Some(MutexGuard {
                lock: self,
                guard: e.into_inner(),
            }),
        }
    }

    /// Run `f` with exclusive access.
    pub fn with_lock<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut().unwrap_or_else(|e| e.into_inner())
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex").field("inner", &self.inner).finish()
    }
}

/// Scoped lock on a `Mutex`. Unlocks on drop.
pub struct MutexGuard<'a, T> {
    lock: &'a Mutex<T>,
    guard: sync::MutexGuard<'a, T>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.guard, f)
    }
}

impl<T> sealed::Sealed for MutexGuard<'_, T> {}

impl<'a, T: 'a> CondVarGuard<'a> for MutexGuard<'a, T> {
    type Lock = Mutex<T>;

    fn unlock(self) -> &'a Mutex<T> {
        self.lock
    }

    fn relock(lock: &'a Mutex<T>) -> Self {
        lock.lock()
    }
}

/// Low-overhead mutual exclusion around a `T`.
pub struct LightweightMutex<T> {
    inner: parking_lot::Mutex<T>,
}

impl<T> LightweightMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: parking_lot::const_mutex(value),
        }
    }

    pub fn lock(&self) -> LightweightMutexGuard<'_, T> {
        LightweightMutexGuard {
            lock: self,
            guard: self.inner.lock(),
        }
    }

    pub fn try_lock(&self) -> Option<LightweightMutexGuard<'_, T>> {
        self.inner
            .try_lock()
            .map(|guard| LightweightMutexGuard { lock: self, guard })
    }

    pub fn with_lock<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: Default> Default for LightweightMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for LightweightMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LightweightMutex")
            .field("inner", &self.inner)
            .finish()
    }
}

/// Scoped lock on a `LightweightMutex`. Unlocks on drop.
pub struct LightweightMutexGuard<'a, T> {
    lock: &'a LightweightMutex<T>,
    guard: parking_lot::MutexGuard<'a, T>,
}

impl<T> Deref for LightweightMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for LightweightMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: fmt::Debug> fmt::Debug for LightweightMutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.guard, f)
    }
}

impl<T> sealed::Sealed for LightweightMutexGuard<'_, T> {}

impl<'a, T: 'a> CondVarGuard<'a> for LightweightMutexGuard<'a, T> {
    type Lock = LightweightMutex<T>;

    fn unlock(self) -> &'a LightweightMutex<T> {
        self.lock
    }

    fn relock(lock: &'a LightweightMutex<T>) -> Self {
        lock.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn lock_and_mutate() {
        let m = Mutex::new(0);
        *m.lock() += 1;
        assert_eq!(m.with_lock(|v| *v), 1);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let m = Mutex::new(42);
        let held = m.lock();
        assert!(m.try_lock().is_none());
        drop(held);
        assert_eq!(*m.try_lock().unwrap(), 42);
    }

    #[test]
    fn lightweight_try_lock_fails_while_held() {
        let m = LightweightMutex::new(7);
        let held = m.lock();
        assert!(m.try_lock().is_none());
        drop(held);
        assert_eq!(m.try_lock().map(|g| *g), Some(7));
    }

    #[test]
    fn early_return_releases_lock() {
        fn bump(m: &Mutex<i32>, fail: bool) -> Result<(), ()> {
            let mut guard = m.lock();
            if fail {
                return Err(());
            }
            *guard += 1;
            Ok(())
        }
        let m = Mutex::new(0);
        assert!(bump(&m, true).is_err());
        assert!(bump(&m, false).is_ok());
        assert_eq!(*m.lock(), 1);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let m = Arc::new(Mutex::new(5));
        let m2 = m.clone();
        let _ = std::thread::spawn(move || {
            let _guard = m2.lock();
            panic!("poison it");
        })
        .join();
        assert_eq!(*m.lock(), 5);
    }

    #[test]
    fn concurrent_lock() {
        let m = Arc::new(Mutex::new(0));
        let l = Arc::new(LightweightMutex::new(0));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let m = m.clone();
                let l = l.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        m.with_lock(|v| *v += 1);
                        *l.lock() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*m.lock(), 1000);
        assert_eq!(*l.lock(), 1000);
    }
}

// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Atomic scalars.
//!
//! `Atomic<T>` covers the four integer widths; every mutator is a single
//! fetch-and-op and returns the value held *before* the operation.
//! Arithmetic wraps. Orderings are per-variable (acquire/release): no total
//! order across different atomics is promised.

use std::fmt;
use std::sync::atomic::{self, AtomicBool, Ordering};

mod sealed {
    pub trait Sealed {}
}

/// Integer types with a native atomic counterpart.
pub trait AtomicInteger: sealed::Sealed + Copy + fmt::Debug + Send + Sync + 'static {
    #[doc(hidden)]
    type Repr: Send + Sync;
    #[doc(hidden)]
    const ONE: Self;

    #[doc(hidden)]
    fn new_repr(value: Self) -> Self::Repr;
    #[doc(hidden)]
    fn load(repr: &Self::Repr, order: Ordering) -> Self;
    #[doc(hidden)]
    fn store(repr: &Self::Repr, value: Self, order: Ordering);
    #[doc(hidden)]
    fn fetch_add(repr: &Self::Repr, value: Self, order: Ordering) -> Self;
    #[doc(hidden)]
    fn fetch_sub(repr: &Self::Repr, value: Self, order: Ordering) -> Self;
}

macro_rules! atomic_integer {
    ($($ty:ty => $repr:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl AtomicInteger for $ty {
                type Repr = $repr;
                const ONE: Self = 1;

                #[inline]
                fn new_repr(value: Self) -> Self::Repr {
                    <$repr>::new(value)
                }

                #[inline]
                fn load(repr: &Self::Repr, order: Ordering) -> Self {
                    repr.load(order)
                }

                #[inline]
                fn store(repr: &Self::Repr, value: Self, order: Ordering) {
                    repr.store(value, order)
                }

                #[inline]
                fn fetch_add(repr: &Self::Repr, value: Self, order: Ordering) -> Self {
                    repr.fetch_add(value, order)
                }

                #[inline]
                fn fetch_sub(repr: &Self::Repr, value: Self, order: Ordering) -> Self {
                    repr.fetch_sub(value, order)
                }
            }
        )*
    };
}

atomic_integer! {
    i32 => atomic::AtomicI32,
    u32 => atomic::AtomicU32,
    i64 => atomic::AtomicI64,
    u64 => atomic::AtomicU64,
}

/// Lock-free integer cell shared between threads.
pub struct Atomic<T: AtomicInteger> {
    repr: T::Repr,
}

impl<T: AtomicInteger> Atomic<T> {
    pub fn new(value: T) -> Self {
        Self {
            repr: T::new_repr(value),
        }
    }

    pub fn load(&self) -> T {
        T::load(&self.repr, Ordering::Acquire)
    }

    pub fn store(&self, value: T) {
        T::store(&self.repr, value, Ordering::Release)
    }

    /// Add `value`, returning the previous value.
    pub fn add(&self, value: T) -> T {
        T::fetch_add(&self.repr, value, Ordering::AcqRel)
    }

    /// Subtract `value`, returning the previous value.
    pub fn sub(&self, value: T) -> T {
        T::fetch_sub(&self.repr, value, Ordering::AcqRel)
    }

    /// Increment by one, returning the previous value.
    pub fn inc(&self) -> T {
        self.add(T::ONE)
    }

    /// Decrement by one, returning the previous value.
    pub fn dec(&self) -> T {
        self.sub(T::ONE)
    }
}

impl<T: AtomicInteger + Default> Default for Atomic<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: AtomicInteger> fmt::Debug for Atomic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Atomic").field(&self.load()).finish()
    }
}

/// Atomic boolean.
#[derive(Debug, Default)]
pub struct AtomicFlag {
    inner: AtomicBool,
}

impl AtomicFlag {
    pub const fn new(value: bool) -> Self {
        Self {
            inner: AtomicBool::new(value),
        }
    }

    pub fn load(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }

    pub fn store(&self, value: bool) {
        self.inner.store(value, Ordering::Release)
    }

    /// Store `value`, returning the previous one.
    pub fn swap(&self, value: bool) -> bool {
        self.inner.swap(value, Ordering::AcqRel)
    }
}

/// Free-function forms over a shared `Atomic`.
pub fn atomic_add<T: AtomicInteger>(cell: &Atomic<T>, value: T) -> T {
    cell.add(value)
}

pub fn atomic_sub<T: AtomicInteger>(cell: &Atomic<T>, value: T) -> T {
    cell.sub(value)
}

pub fn atomic_inc<T: AtomicInteger>(cell: &Atomic<T>) -> T {
    cell.inc()
}

pub fn atomic_dec<T: AtomicInteger>(cell: &Atomic<T>) -> T {
    cell.dec()
}

pub fn atomic_load<T: AtomicInteger>(cell: &Atomic<T>) -> T {
    cell.load()
}

pub fn atomic_store<T: AtomicInteger>(cell: &Atomic<T>, value: T) {
    cell.store(value)
}

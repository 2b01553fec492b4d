// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Socket handles and the callbacks bound to them.

use std::fmt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::{Arc, Weak};

use crate::sys::{self, RawSocket};

/// Opaque OS socket identifier.
///
/// Produced by `TcpSocket` and `TcpServerSocket`; only those wrappers and
/// the checker look inside. Once the owning socket is closed the handle is
/// stale and must not be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketHandle(RawSocket);

impl SocketHandle {
    pub const INVALID: SocketHandle = SocketHandle(sys::INVALID_SOCKET);

    pub(crate) fn from_raw(raw: RawSocket) -> Self {
        SocketHandle(raw)
    }

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// The platform descriptor.
    pub fn raw(self) -> RawFd {
        self.0
    }
}

impl AsRawFd for SocketHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl Default for SocketHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

type Callback = dyn Fn(SocketHandle) + Send + Sync;

/// What a delegate points at. Drives equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Function(usize),
    Method { object: usize, method: usize },
    Closure(usize),
}

/// Type-erased `Fn(SocketHandle)` callback.
///
/// Two delegates compare equal when they call the same thing: the same free
/// function, the same method on the same object, or clones of the same
/// closure. A method delegate keeps its object alive.
#[derive(Clone)]
pub struct SocketDelegate {
    call: Arc<Callback>,
    target: Target,
}

impl SocketDelegate {
    /// Bind a free function.
    pub fn from_fn(function: fn(SocketHandle)) -> Self {
        Self {
            call: Arc::new(function),
            target: Target::Function(function as usize),
        }
    }

    /// Bind `method` on `object`.
    ///
    /// The delegate holds a strong reference: an object that registers its
    /// own method with a checker it owns stays alive, descriptor included,
    /// until that pair is unregistered. Use `bind_weak` to avoid the cycle.
    pub fn bind<T>(object: &Arc<T>, method: fn(&T, SocketHandle)) -> Self
    where
        T: Send + Sync + 'static,
    {
        let target = Target::Method {
            object: Arc::as_ptr(object) as *const () as usize,
            method: method as usize,
        };
        let object = object.clone();
        Self {
            call: Arc::new(move |handle| method(&object, handle)),
            target,
        }
    }

    /// Bind `method` on `object` without keeping it alive. Once the object
    /// is dropped the delegate does nothing. Compares equal to `bind` on the
    /// same object and method.
    pub fn bind_weak<T>(object: &Arc<T>, method: fn(&T, SocketHandle)) -> Self
    where
        T: Send + Sync + 'static,
    {
        let target = Target::Method {
            object: Arc::as_ptr(object) as *const () as usize,
            method: method as usize,
        };
        let object: Weak<T> = Arc::downgrade(object);
        Self {
            call: Arc::new(move |handle| {
                if let Some(object) = object.upgrade() {
                    method(&object, handle);
                }
            }),
            target,
        }
    }

    /// Bind an arbitrary closure. Only clones of the returned delegate
    /// compare equal to it.
    pub fn from_closure<F>(closure: F) -> Self
    where
        F: Fn(SocketHandle) + Send + Sync + 'static,
    {
        let call: Arc<Callback> = Arc::new(closure);
        let target = Target::Closure(Arc::as_ptr(&call) as *const () as usize);
        Self { call, target }
    }

    pub fn invoke(&self, handle: SocketHandle) {
        (self.call)(handle)
    }
}

impl PartialEq for SocketDelegate {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl Eq for SocketDelegate {}

impl fmt::Debug for SocketDelegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SocketDelegate").field(&self.target).finish()
    }
}

/// A socket and the callback to run when it has data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketInfoPair {
    pub handle: SocketHandle,
    pub delegate: SocketDelegate,
}

impl SocketInfoPair {
    pub fn new(handle: SocketHandle, delegate: SocketDelegate) -> Self {
        Self { handle, delegate }
    }
}

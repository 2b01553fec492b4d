// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Connected TCP socket.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

use tracing::{debug, warn};
use weft_sync::{Error, Result};

use super::transfer_error;
use crate::config::SocketOptions;
use crate::socket::SocketHandle;
use crate::sys::{self, RawSocket};

/// Blocking, connection-oriented socket.
///
/// Options set before `connect` are remembered and applied to the new
/// descriptor; options set afterwards go straight to the OS.
#[derive(Debug)]
pub struct TcpSocket {
    handle: SocketHandle,
    options: SocketOptions,
}

impl TcpSocket {
    /// An unconnected socket.
    pub fn new() -> Self {
        Self::with_options(SocketOptions::default())
    }

    pub fn with_options(options: SocketOptions) -> Self {
        Self {
            handle: SocketHandle::INVALID,
            options,
        }
    }

    /// Wrap a descriptor returned by `accept`.
    pub(crate) fn from_accepted(raw: RawSocket) -> Self {
        Self {
            handle: SocketHandle::from_raw(raw),
            options: SocketOptions::default(),
        }
    }

    pub fn handle(&self) -> SocketHandle {
        self.handle
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_valid()
    }

    /// Open a socket and connect it to `host:port`.
    ///
    /// `host` is a dotted IPv4 address or a name resolving to one.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if host.is_empty() || port == 0 {
            return Err(Error::invalid("connect needs a host and a non-zero port"));
        }
        if self.is_connected() {
            return Err(Error::generic("socket is already connected"));
        }
        let addr = resolve(host, port)?;

        let fd = sys::tcp_socket().map_err(Error::SocketCreate)?;
        let opened = SocketHandle::from_raw(fd);
        if let Err(e) = apply(opened, &self.options) {
            let _ = sys::close(fd);
            return Err(e);
        }
        if let Err(e) = sys::connect(fd, addr) {
            let _ = sys::close(fd);
            return Err(Error::SocketConnect(e));
        }

        self.handle = opened;
        debug!(%addr, socket = %self.handle, "connected");
        Ok(())
    }

    fn raw(&self) -> Result<RawSocket> {
        if self.handle.is_valid() {
            Ok(self.handle.raw())
        } else {
            Err(Error::SocketClosed)
        }
    }

    /// Send some of `buf`. Returns the number of bytes the OS accepted.
    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        sys::send(self.raw()?, buf).map_err(transfer_error)
    }

    /// Send all of `buf`, looping over short writes.
    pub fn send_all(&self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.send(buf)?;
            if n == 0 {
                return Err(Error::generic("send wrote zero bytes"));
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Receive into `buf`. `Ok(0)` means the peer closed the connection
    /// (or `buf` is empty).
    pub fn receive(&self, buf: &mut [u8]) -> Result<usize> {
        sys::recv(self.raw()?, buf).map_err(transfer_error)
    }

    /// Fill `buf` completely. `Err(Eof)` if the peer closes first; the
    /// bytes received so far are left in `buf`.
    pub fn receive_exact(&self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.receive(&mut buf[filled..])? {
                0 => return Err(Error::Eof),
                n => filled += n,
            }
        }
        Ok(())
    }

    /// Peer address of a connected socket.
    pub fn remote_address(&self) -> Result<SocketAddrV4> {
        Ok(sys::peer_addr(self.raw()?)?)
    }

    /// Shut down and release the descriptor. The handle is invalid
    /// afterwards even if the OS reported a failure.
    pub fn close(&mut self) -> Result<()> {
        let fd = self.raw()?;
        self.handle = SocketHandle::INVALID;
        debug!(socket = fd, "closing socket");
        sys::close(fd).map_err(Error::SocketClose)
    }

    pub fn set_buffer_size(&mut self, bytes: i32) -> Result<()> {
        if bytes <= 0 {
            return Err(Error::invalid("buffer size must be positive"));
        }
        self.options.buffer_size = Some(bytes);
        self.apply_if_open(|fd| sys::set_buffer_size(fd, bytes))
    }

    /// The size last requested with `set_buffer_size`, applied to both the
    /// send and receive buffers. `None` leaves the OS defaults.
    pub fn buffer_size(&self) -> Option<i32> {
        self.options.buffer_size
    }

    /// What the kernel actually reserved, as `(receive, send)`. May exceed
    /// the requested size: Linux doubles it.
    pub fn os_buffer_sizes(&self) -> Result<(i32, i32)> {
        Ok(sys::buffer_sizes(self.raw()?)?)
    }

    /// Linger on close for `secs` seconds, or disable lingering.
    pub fn set_linger(&mut self, enabled: bool, secs: u16) -> Result<()> {
        self.options.linger = enabled.then_some(secs);
        self.apply_if_open(|fd| sys::set_linger(fd, enabled, secs))
    }

    /// `Some(secs)` when lingering is enabled.
    pub fn linger(&self) -> Result<Option<u16>> {
        if self.is_connected() {
            let (on, secs) = sys::linger(self.handle.raw())?;
            Ok(on.then_some(secs))
        } else {
            Ok(self.options.linger)
        }
    }

    pub fn set_no_delay(&mut self, on: bool) -> Result<()> {
        self.options.no_delay = on;
        self.apply_if_open(|fd| sys::set_no_delay(fd, on))
    }

    pub fn no_delay(&self) -> Result<bool> {
        if self.is_connected() {
            Ok(sys::no_delay(self.handle.raw())?)
        } else {
            Ok(self.options.no_delay)
        }
    }

    pub fn set_keep_alive(&mut self, on: bool) -> Result<()> {
        self.options.keep_alive = on;
        self.apply_if_open(|fd| sys::set_keep_alive(fd, on))
    }

    pub fn keep_alive(&self) -> Result<bool> {
        if self.is_connected() {
            Ok(sys::keep_alive(self.handle.raw())?)
        } else {
            Ok(self.options.keep_alive)
        }
    }

    /// Bound each blocking send/receive to `millis` (0 = unbounded).
    /// An expired bound surfaces as `Err(TimedOut)`.
    pub fn set_timeout(&mut self, millis: u32) -> Result<()> {
        self.options.timeout_ms = Some(millis);
        self.apply_if_open(|fd| sys::set_timeout(fd, millis))
    }

    pub fn timeout(&self) -> Result<u32> {
        if self.is_connected() {
            Ok(sys::timeout(self.handle.raw())?)
        } else {
            Ok(self.options.timeout_ms.unwrap_or(0))
        }
    }

    /// Replace every option at once. On a connected socket each field is
    /// written to the OS, so `false` and `None` switch a setting off again.
    /// A `None` buffer size keeps whatever the kernel has.
    pub fn apply_options(&mut self, options: &SocketOptions) -> Result<()> {
        self.options = options.clone();
        if self.is_connected() {
            apply(self.handle, &self.options)?;
        }
        Ok(())
    }

    fn apply_if_open(
        &self,
        set: impl FnOnce(RawSocket) -> std::io::Result<()>,
    ) -> Result<()> {
        if self.is_connected() {
            set(self.handle.raw())?;
        }
        Ok(())
    }
}

impl Default for TcpSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TcpSocket {
    fn drop(&mut self) {
        if self.is_connected() {
            if let Err(e) = self.close() {
                warn!(error = %e, "socket close failed on drop");
            }
        }
    }
}

fn apply(handle: SocketHandle, options: &SocketOptions) -> Result<()> {
    let fd = handle.raw();
    if let Some(bytes) = options.buffer_size {
        sys::set_buffer_size(fd, bytes)?;
    }
    match options.linger {
        Some(secs) => sys::set_linger(fd, true, secs)?,
        None => sys::set_linger(fd, false, 0)?,
    }
    sys::set_no_delay(fd, options.no_delay)?;
    sys::set_keep_alive(fd, options.keep_alive)?;
    sys::set_timeout(fd, options.timeout_ms.unwrap_or(0))?;
    Ok(())
}

fn resolve(host: &str, port: u16) -> Result<SocketAddrV4> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(SocketAddrV4::new(ip, port));
    }
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| {
            addrs.find_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(v4),
                SocketAddr::V6(_) => None,
            })
        })
        .ok_or_else(|| Error::SocketAddress(host.to_string()))
}

// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Listening TCP socket.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use tracing::{debug, warn};
use weft_sync::{Error, Result};

use super::TcpSocket;
use crate::checker::poll_ready;
use crate::socket::SocketHandle;
use crate::sys::{self, RawSocket};

/// Server side of a TCP connection: `bind`, `listen`, then `accept`.
#[derive(Debug)]
pub struct TcpServerSocket {
    handle: SocketHandle,
    bound: bool,
    port: u16,
}

impl TcpServerSocket {
    /// Open an unbound listening socket.
    pub fn new() -> Result<Self> {
        let fd = sys::tcp_socket().map_err(Error::SocketCreate)?;
        Ok(Self {
            handle: SocketHandle::from_raw(fd),
            bound: false,
            port: 0,
        })
    }

    pub fn handle(&self) -> SocketHandle {
        self.handle
    }

    /// Bound port. For `bind(0, ..)` this is the port the OS picked.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    fn raw(&self) -> Result<RawSocket> {
        if self.handle.is_valid() {
            Ok(self.handle.raw())
        } else {
            Err(Error::SocketClosed)
        }
    }

    /// Bind to `port` on `address` (dotted IPv4, all interfaces if `None`).
    /// Port 0 asks the OS for an ephemeral port.
    pub fn bind(&mut self, port: u16, address: Option<&str>) -> Result<()> {
        if self.bound {
            return Err(Error::generic("server socket is already bound"));
        }
        let fd = self.raw()?;
        let ip = match address {
            None => Ipv4Addr::UNSPECIFIED,
            Some(text) => text
                .parse::<Ipv4Addr>()
                .map_err(|_| Error::SocketAddress(text.to_string()))?,
        };

        sys::set_reuse_addr(fd).map_err(Error::SocketBind)?;
        sys::bind(fd, SocketAddrV4::new(ip, port)).map_err(Error::SocketBind)?;
        self.port = if port == 0 {
            sys::local_addr(fd).map_err(Error::SocketBind)?.port()
        } else {
            port
        };
        self.bound = true;
        debug!(%ip, port = self.port, "server socket bound");
        Ok(())
    }

    /// Start accepting connections, queueing up to `backlog` of them.
    pub fn listen(&self, backlog: u8) -> Result<()> {
        if !self.bound {
            return Err(Error::invalid("listen before bind"));
        }
        sys::listen(self.raw()?, backlog)?;
        debug!(port = self.port, backlog, "listening");
        Ok(())
    }

    /// Take the next incoming connection.
    ///
    /// With `timeout_ms > 0`, gives up with `Err(TimedOut)` once the window
    /// passes without a connection. With 0, blocks until one arrives.
    pub fn accept(&self, timeout_ms: u32) -> Result<TcpSocket> {
        let fd = self.raw()?;
        if timeout_ms > 0 {
            let mut fds = [sys::poll_entry(fd)];
            if poll_ready(&mut fds, Duration::from_millis(u64::from(timeout_ms)))? == 0 {
                return Err(Error::TimedOut);
            }
        }
        let (client, peer) = sys::accept(fd)?;
        debug!(%peer, socket = client, "accepted connection");
        Ok(TcpSocket::from_accepted(client))
    }

    /// Release the listening socket. Closing twice is `SocketClosed`.
    pub fn close(&mut self) -> Result<()> {
        let fd = self.raw()?;
        self.handle = SocketHandle::INVALID;
        self.bound = false;
        debug!(port = self.port, "server socket closed");
        sys::close(fd).map_err(Error::SocketClose)
    }
}

impl Drop for TcpServerSocket {
    fn drop(&mut self) {
        if self.handle.is_valid() {
            if let Err(e) = self.close() {
                warn!(error = %e, "server socket close failed on drop");
            }
        }
    }
}

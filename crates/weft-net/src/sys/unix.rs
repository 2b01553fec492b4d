// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! BSD sockets and `poll(2)` via libc.
//!
//! IPv4 stream sockets only. Every call that can be interrupted by a
//! signal is retried here, except `poll`, whose caller owns the time
//! budget and must recompute it.

use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::unix::io::RawFd;

pub(crate) type RawSocket = RawFd;

pub(crate) const INVALID_SOCKET: RawSocket = -1;

pub(crate) type PollFd = libc::pollfd;

/// Readiness bits that mean "a read will not block".
pub(crate) const POLL_READABLE: libc::c_short = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
pub(crate) const POLL_INVALID: libc::c_short = libc::POLLNVAL;

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
)))]
const SEND_FLAGS: libc::c_int = 0;

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// Run `f` until it stops failing with EINTR.
fn retry<F: FnMut() -> isize>(mut f: F) -> io::Result<usize> {
    loop {
        let ret = f();
        if ret >= 0 {
            return Ok(ret as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn to_sockaddr(addr: SocketAddrV4) -> libc::sockaddr_in {
    let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
    sa.sin_family = libc::AF_INET as libc::sa_family_t;
    sa.sin_port = addr.port().to_be();
    sa.sin_addr = libc::in_addr {
        s_addr: u32::from(*addr.ip()).to_be(),
    };
    sa
}

fn from_sockaddr(sa: &libc::sockaddr_in) -> SocketAddrV4 {
    SocketAddrV4::new(
        Ipv4Addr::from(u32::from_be(sa.sin_addr.s_addr)),
        u16::from_be(sa.sin_port),
    )
}

const SOCKADDR_IN_LEN: libc::socklen_t = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

/// Per-socket setup shared by created and accepted sockets.
fn prepare(fd: RawSocket) -> io::Result<()> {
    let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
    cvt(unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) })?;
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    set_opt(fd, libc::SOL_SOCKET, libc::SO_NOSIGPIPE, 1 as libc::c_int)?;
    Ok(())
}

/// Open an IPv4 stream socket.
pub(crate) fn tcp_socket() -> io::Result<RawSocket> {
    let fd = cvt(unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) })?;
    if let Err(e) = prepare(fd) {
        unsafe { libc::close(fd) };
        return Err(e);
    }
    Ok(fd)
}

pub(crate) fn connect(fd: RawSocket, addr: SocketAddrV4) -> io::Result<()> {
    let sa = to_sockaddr(addr);
    cvt(unsafe {
        libc::connect(
            fd,
            &sa as *const libc::sockaddr_in as *const libc::sockaddr,
            SOCKADDR_IN_LEN,
        )
    })?;
    Ok(())
}

pub(crate) fn bind(fd: RawSocket, addr: SocketAddrV4) -> io::Result<()> {
    let sa = to_sockaddr(addr);
    cvt(unsafe {
        libc::bind(
            fd,
            &sa as *const libc::sockaddr_in as *const libc::sockaddr,
            SOCKADDR_IN_LEN,
        )
    })?;
    Ok(())
}

pub(crate) fn listen(fd: RawSocket, backlog: u8) -> io::Result<()> {
    cvt(unsafe { libc::listen(fd, libc::c_int::from(backlog)) })?;
    Ok(())
}

/// Accept one pending connection. Blocks if none is queued.
pub(crate) fn accept(fd: RawSocket) -> io::Result<(RawSocket, SocketAddrV4)> {
    let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = SOCKADDR_IN_LEN;
    let client = retry(|| unsafe {
        libc::accept(
            fd,
            &mut sa as *mut libc::sockaddr_in as *mut libc::sockaddr,
            &mut len,
        ) as isize
    })? as RawSocket;
    if let Err(e) = prepare(client) {
        unsafe { libc::close(client) };
        return Err(e);
    }
    Ok((client, from_sockaddr(&sa)))
}

pub(crate) fn local_addr(fd: RawSocket) -> io::Result<SocketAddrV4> {
    let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = SOCKADDR_IN_LEN;
    cvt(unsafe {
        libc::getsockname(
            fd,
            &mut sa as *mut libc::sockaddr_in as *mut libc::sockaddr,
            &mut len,
        )
    })?;
    Ok(from_sockaddr(&sa))
}

pub(crate) fn peer_addr(fd: RawSocket) -> io::Result<SocketAddrV4> {
    let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = SOCKADDR_IN_LEN;
    cvt(unsafe {
        libc::getpeername(
            fd,
            &mut sa as *mut libc::sockaddr_in as *mut libc::sockaddr,
            &mut len,
        )
    })?;
    Ok(from_sockaddr(&sa))
}

pub(crate) fn send(fd: RawSocket, buf: &[u8]) -> io::Result<usize> {
    retry(|| unsafe {
        libc::send(fd, buf.as_ptr() as *const libc::c_void, buf.len(), SEND_FLAGS)
    })
}

pub(crate) fn recv(fd: RawSocket, buf: &mut [u8]) -> io::Result<usize> {
    retry(|| unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) })
}

/// Shut down both directions, then release the descriptor. Shutdown
/// failure (e.g. never connected) is ignored.
pub(crate) fn close(fd: RawSocket) -> io::Result<()> {
    unsafe { libc::shutdown(fd, libc::SHUT_RDWR) };
    // Not retried: after EINTR the descriptor state is unspecified.
    cvt(unsafe { libc::close(fd) })?;
    Ok(())
}

pub(crate) fn set_opt<T: Copy>(
    fd: RawSocket,
    level: libc::c_int,
    name: libc::c_int,
    value: T,
) -> io::Result<()> {
    cvt(unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const T as *const libc::c_void,
            mem::size_of::<T>() as libc::socklen_t,
        )
    })?;
    Ok(())
}

pub(crate) fn get_opt<T: Copy>(fd: RawSocket, level: libc::c_int, name: libc::c_int) -> io::Result<T> {
    let mut value: T = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<T>() as libc::socklen_t;
    cvt(unsafe {
        libc::getsockopt(
            fd,
            level,
            name,
            &mut value as *mut T as *mut libc::c_void,
            &mut len,
        )
    })?;
    Ok(value)
}

pub(crate) fn set_reuse_addr(fd: RawSocket) -> io::Result<()> {
    set_opt(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, 1 as libc::c_int)
}

pub(crate) fn set_buffer_size(fd: RawSocket, bytes: i32) -> io::Result<()> {
    set_opt(fd, libc::SOL_SOCKET, libc::SO_RCVBUF, bytes)?;
    set_opt(fd, libc::SOL_SOCKET, libc::SO_SNDBUF, bytes)
}

/// Kernel receive and send buffer sizes. Linux reports double the
/// requested value to account for bookkeeping overhead.
pub(crate) fn buffer_sizes(fd: RawSocket) -> io::Result<(i32, i32)> {
    let recv = get_opt::<libc::c_int>(fd, libc::SOL_SOCKET, libc::SO_RCVBUF)?;
    let send = get_opt::<libc::c_int>(fd, libc::SOL_SOCKET, libc::SO_SNDBUF)?;
    Ok((recv, send))
}

pub(crate) fn set_linger(fd: RawSocket, enabled: bool, secs: u16) -> io::Result<()> {
    let linger = libc::linger {
        l_onoff: libc::c_int::from(enabled),
        l_linger: libc::c_int::from(secs),
    };
    set_opt(fd, libc::SOL_SOCKET, libc::SO_LINGER, linger)
}

pub(crate) fn linger(fd: RawSocket) -> io::Result<(bool, u16)> {
    let linger: libc::linger = get_opt(fd, libc::SOL_SOCKET, libc::SO_LINGER)?;
    let secs = u16::try_from(linger.l_linger.max(0)).unwrap_or(u16::MAX);
    Ok((linger.l_onoff != 0, secs))
}

pub(crate) fn set_no_delay(fd: RawSocket, on: bool) -> io::Result<()> {
    set_opt(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY, libc::c_int::from(on))
}

pub(crate) fn no_delay(fd: RawSocket) -> io::Result<bool> {
    Ok(get_opt::<libc::c_int>(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY)? != 0)
}

pub(crate) fn set_keep_alive(fd: RawSocket, on: bool) -> io::Result<()> {
    set_opt(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE, libc::c_int::from(on))
}

pub(crate) fn keep_alive(fd: RawSocket) -> io::Result<bool> {
    Ok(get_opt::<libc::c_int>(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE)? != 0)
}

/// Bound both send and receive blocking to `millis` (0 = no bound).
pub(crate) fn set_timeout(fd: RawSocket, millis: u32) -> io::Result<()> {
    let tv = libc::timeval {
        tv_sec: (millis / 1000) as libc::time_t,
        tv_usec: ((millis % 1000) * 1000) as libc::suseconds_t,
    };
    set_opt(fd, libc::SOL_SOCKET, libc::SO_RCVTIMEO, tv)?;
    set_opt(fd, libc::SOL_SOCKET, libc::SO_SNDTIMEO, tv)
}

pub(crate) fn timeout(fd: RawSocket) -> io::Result<u32> {
    let tv: libc::timeval = get_opt(fd, libc::SOL_SOCKET, libc::SO_RCVTIMEO)?;
    let millis = (tv.tv_sec as i64) * 1000 + (tv.tv_usec as i64) / 1000;
    Ok(u32::try_from(millis.max(0)).unwrap_or(u32::MAX))
}

pub(crate) fn poll_entry(fd: RawSocket) -> PollFd {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}

/// One `poll(2)` call. `timeout_ms` of -1 waits forever. EINTR is
/// returned to the caller.
pub(crate) fn poll(fds: &mut [PollFd], timeout_ms: i32) -> io::Result<usize> {
    let ready = cvt(unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) })?;
    Ok(ready as usize)
}

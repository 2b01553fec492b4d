// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Blocking TCP over IPv4.

mod server;
mod stream;

pub use server::TcpServerSocket;
pub use stream::TcpSocket;

use std::io;

use weft_sync::Error;

/// Map a failed send/receive. An expired `SO_RCVTIMEO`/`SO_SNDTIMEO`
/// surfaces as EAGAIN; everything else leaves the socket unusable.
fn transfer_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::TimedOut,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_is_a_timeout() {
        let e = transfer_error(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(e.is_timeout());
        let e = transfer_error(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(e, Error::Io(_)));
    }
}

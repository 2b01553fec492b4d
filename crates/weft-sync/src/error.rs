// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Return-code vocabulary shared by every weft crate.
//!
//! `Ok(..)` stands for OK. Timeouts get their own variant so callers can
//! tell an expired wait from a dead resource.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Generic failure (ERROR).
    #[error("{0}")]
    Generic(String),

    /// Bad argument or wrong object state (EINVAL).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A bounded wait expired (ETIMEOUT).
    #[error("operation timed out")]
    TimedOut,

    /// Stream exhausted before the request was satisfied (EOF).
    #[error("end of stream")]
    Eof,

    /// The socket could not be opened.
    #[error("could not create socket: {0}")]
    SocketCreate(#[source] io::Error),

    /// Operation on a socket that is not open.
    #[error("socket is not open")]
    SocketClosed,

    /// Host name or address could not be resolved or parsed.
    #[error("invalid socket address `{0}`")]
    SocketAddress(String),

    #[error("bind failed: {0}")]
    SocketBind(#[source] io::Error),

    #[error("connect failed: {0}")]
    SocketConnect(#[source] io::Error),

    #[error("close failed: {0}")]
    SocketClose(#[source] io::Error),

    /// Any other OS-level failure. The resource should be treated as dead.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn generic(msg: impl Into<String>) -> Self {
        Error::Generic(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// True for expired waits (class b), false for hard failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TimedOut)
    }

    /// True if the stream reached its end.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Eof)
    }
}

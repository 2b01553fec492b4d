// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Weft networking: blocking TCP sockets and a readiness checker that
//! dispatches per-socket callbacks.
//!
//! Sockets hand out `SocketHandle`s; pairing a handle with a
//! `SocketDelegate` and feeding the pairs to the checker gives a simple
//! single-threaded service loop. Run the loop on a `weft_sync::Thread`
//! when it should not block the caller.
//!
//! Errors use `weft_sync::Error`.

mod sys;

pub mod checker;
pub mod config;
pub mod socket;
pub mod tcp;

pub use checker::{check_sockets_for_incoming_data, NonBlockSocketChecker};
pub use config::{NetConfig, SocketOptions};
pub use socket::{SocketDelegate, SocketHandle, SocketInfoPair};
pub use tcp::{TcpServerSocket, TcpSocket};

// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Socket and server settings.
//!
//! ```toml
//! backlog = 16
//! checker_poll_ms = 50
//!
//! [socket]
//! no_delay = true
//! keep_alive = true
//! timeout_ms = 2000
//! linger = 5
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use weft_sync::config::{parse_toml, read_toml};
use weft_sync::Result;

/// Per-connection socket options. Unset fields keep the OS default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SocketOptions {
    /// Send and receive buffer size in bytes.
    pub buffer_size: Option<i32>,
    /// Seconds to linger on close with unsent data.
    pub linger: Option<u16>,
    /// Disable Nagle coalescing.
    pub no_delay: bool,
    /// Enable TCP keep-alive probes.
    pub keep_alive: bool,
    /// Bound on each blocking send/receive, in milliseconds.
    pub timeout_ms: Option<u32>,
}

/// Network settings for a server built on the checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetConfig {
    pub socket: SocketOptions,
    /// Pending-connection queue length passed to `listen`.
    pub backlog: u8,
    /// Window for each checker call in a service loop.
    pub checker_poll_ms: u32,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            socket: SocketOptions::default(),
            backlog: 10,
            checker_poll_ms: 100,
        }
    }
}

impl NetConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        parse_toml(text)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        read_toml(path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use weft_sync::Error;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(NetConfig::from_toml_str("").unwrap(), NetConfig::default());
    }

    #[test]
    fn parses_socket_table() {
        let cfg = NetConfig::from_toml_str(
            r#"
            backlog = 32

            [socket]
            no_delay = true
            timeout_ms = 250
            linger = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.backlog, 32);
        assert_eq!(cfg.checker_poll_ms, 100);
        assert!(cfg.socket.no_delay);
        assert!(!cfg.socket.keep_alive);
        assert_eq!(cfg.socket.timeout_ms, Some(250));
        assert_eq!(cfg.socket.linger, Some(2));
        assert_eq!(cfg.socket.buffer_size, None);
    }

    #[test]
    fn out_of_range_backlog_is_rejected() {
        assert!(matches!(
            NetConfig::from_toml_str("backlog = 300"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn unknown_socket_key_is_rejected() {
        assert!(matches!(
            NetConfig::from_toml_str("[socket]\nnodelay = true"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "checker_poll_ms = 5\n[socket]\nkeep_alive = true").unwrap();
        let cfg = NetConfig::from_path(file.path()).unwrap();
        assert_eq!(cfg.checker_poll_ms, 5);
        assert!(cfg.socket.keep_alive);
    }
}

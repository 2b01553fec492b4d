// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Serde-loadable settings for the sync primitives.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound on worker threads in one pool.
pub const MAX_POOL_THREADS: u32 = 64;

const DEFAULT_POOL_SIZE: u32 = 5;

/// Thread pool settings.
///
/// ```toml
/// size = 8
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Requested worker count. Clamped to `MAX_POOL_THREADS`.
    pub size: u32,
}

impl PoolConfig {
    /// Worker count the pool will actually try to spawn.
    pub fn effective_size(&self) -> u32 {
        self.size.min(MAX_POOL_THREADS)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        parse_toml(text)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        read_toml(path.as_ref())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
        }
    }
}

/// Parse `text` as TOML into `T`. Syntax and shape errors are
/// `InvalidArgument`.
pub fn parse_toml<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T> {
    toml::from_str(text).map_err(|e| Error::invalid(format!("bad configuration: {e}")))
}

/// Read and parse a TOML file. A missing or unreadable file is `Io`.
pub fn read_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|e| Error::invalid(format!("{}: {e}", path.display())))
}

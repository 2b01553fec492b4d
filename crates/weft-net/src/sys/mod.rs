// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Platform layer. One implementation per target family, picked at build
//! time; everything above this module is platform-neutral.

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub(crate) use unix::*;

#[cfg(not(unix))]
compile_error!("weft-net currently supports Unix targets only");

// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Structured logging setup.
//!
//! Domain and platform code log through `tracing` macros directly; this
//! module only wires up the global subscriber once, at process start.
//! Nothing below `info` level is emitted by default so that a default
//! deployment never surfaces key-descriptor hex dumps, which this core
//! only ever logs at `trace`.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, defaulting to `debug`
/// when `verbose` is set and `info` otherwise. Safe to call once; a second
/// call is a no-op (the underlying `tracing_subscriber::fmt().try_init()`
/// call fails silently if a subscriber is already set).
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

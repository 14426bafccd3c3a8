// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Platform abstraction.
//!
//! This daemon only ever runs against a Linux kernel with fscrypt support,
//! so unlike a portable pipeline tool there's no Windows counterpart to
//! select between at compile time. The trait still exists: it isolates the
//! handful of raw OS queries (privilege level, temp dir) behind an interface
//! tests can swap for a fake, rather than scattering `libc` calls through
//! the bootstrap logic.

use std::path::PathBuf;
use thiserror::Error;

mod unix;
pub use unix::UnixPlatform;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not supported on this platform: {0}")]
    NotSupported(String),
}

pub trait Platform: Send + Sync {
    /// `true` if the effective UID is 0. Key installation and the bind
    /// mounts in `UserManager` require root; we check eagerly rather than
    /// let the first ioctl fail with a confusing `EPERM`.
    fn is_root(&self) -> bool;

    fn temp_dir(&self) -> PathBuf;

    fn platform_name(&self) -> &'static str;
}

pub fn create_platform() -> Box<dyn Platform> {
    Box::new(UnixPlatform::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_name_is_linux() {
        assert_eq!(create_platform().platform_name(), "linux");
    }
}

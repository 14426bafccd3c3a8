// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! User identifier value object.
//!
//! `UserId` is a thin, type-safe wrapper over the OS-level numeric user
//! identifier used throughout the key-management core. It exists so call
//! sites can't accidentally pass a raw `i32` meant for something else (a
//! file descriptor, a key length) where a user identifier is expected.

use std::fmt;

/// The reserved identifier for the device owner / global user.
///
/// Global-user keys are generated once per device and restored at boot
/// before any per-user key is touched.
pub const GLOBAL_USER_ID: UserId = UserId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct UserId(pub i32);

impl UserId {
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn is_global(&self) -> bool {
        *self == GLOBAL_USER_ID
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for UserId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_user_id_is_zero() {
        assert_eq!(GLOBAL_USER_ID, UserId::new(0));
        assert!(GLOBAL_USER_ID.is_global());
    }

    #[test]
    fn ordinary_user_is_not_global() {
        assert!(!UserId::new(100).is_global());
    }
}

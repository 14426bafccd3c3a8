// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Port over the kernel filesystem-encryption control surface.
//!
//! Two code paths exist because kernels differ in what they support: the
//! v2 path installs keys by identifier via `FS_IOC_ADD_ENCRYPTION_KEY` and
//! friends; the legacy v1 path adds raw keys into the session keyring. The
//! core probes which is available once at startup (see
//! [`FsCryptControl::supports_v2`]) and uses that answer for the life of the
//! process.

use crate::error::FbeResult;
use std::path::Path;

pub const FSCRYPT_KEY_IDENTIFIER_SIZE: usize = 16;

/// Content-encryption mode for newly applied policies.
pub const CRYPTO_AES_256_XTS: u8 = 1;
/// Filename-encryption mode for newly applied policies.
pub const CRYPTO_AES_256_CTS: u8 = 4;
/// Maximum padding flag: pads filenames up to the next 32-byte boundary.
pub const FSCRYPT_POLICY_FLAGS_PAD_32: u8 = 0x03;

pub const FSCRYPT_KEY_DESC_PREFIXES: [&str; 2] = ["ext4", "f2fs"];

/// 16-byte identifier the kernel returns from a v2 key install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIdentifier(pub [u8; FSCRYPT_KEY_IDENTIFIER_SIZE]);

/// Non-fatal flags a v2 key removal can report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalStatus {
    pub other_users_still_have_key: bool,
    pub files_busy: bool,
}

/// An encryption policy for a directory: modes plus flags.
#[derive(Debug, Clone, Copy)]
pub struct EncryptionPolicy {
    pub contents_mode: u8,
    pub filenames_mode: u8,
    pub flags: u8,
}

impl EncryptionPolicy {
    pub fn standard(identifier: KeyIdentifier) -> (KeyIdentifier, EncryptionPolicy) {
        (
            identifier,
            EncryptionPolicy {
                contents_mode: CRYPTO_AES_256_XTS,
                filenames_mode: CRYPTO_AES_256_CTS,
                flags: FSCRYPT_POLICY_FLAGS_PAD_32,
            },
        )
    }
}

pub trait FsCryptControl: Send + Sync {
    /// Probes whether the v2 ioctl surface is available on the target
    /// filesystem. Called once at startup; the result governs which of the
    /// v2/legacy operations below the caller uses thereafter.
    fn supports_v2(&self, mount_point: &Path) -> bool;

    // --- v2 path ---

    fn install_key(&self, mount_point: &Path, raw_key: &[u8]) -> FbeResult<KeyIdentifier>;

    fn remove_key(&self, mount_point: &Path, identifier: &KeyIdentifier) -> FbeResult<RemovalStatus>;

    fn set_policy(&self, dir: &Path, identifier: &KeyIdentifier, policy: EncryptionPolicy) -> FbeResult<()>;

    fn get_policy(&self, dir: &Path) -> FbeResult<EncryptionPolicy>;

    // --- legacy v1 path ---

    fn keyring_search(&self, keyring: &str, key_type: &str, description: &str) -> FbeResult<Option<i32>>;

    fn keyring_add(&self, key_type: &str, description: &str, payload: &[u8], keyring: &str) -> FbeResult<i32>;

    fn keyring_unlink(&self, serial: i32, keyring: &str) -> FbeResult<()>;
}

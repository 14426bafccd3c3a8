// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Port over the hardware-backed keystore that seals and unseals raw keys.
//!
//! This trait is synchronous: the core is a blocking, multi-threaded daemon
//! (see the Concurrency & Resource Model section of the design notes), not
//! an async service, so its infrastructure ports stay plain `trait`s rather
//! than `async_trait`.

use crate::error::FbeResult;
use crate::keys::key_blob::KeyBlob;

pub const CRYPTO_KEY_ALIAS_SIZE: usize = 8;
pub const CRYPTO_KEY_SECDISC_SIZE: usize = 16;

/// Opaque handle naming a sealing key inside the keystore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAlias(pub Vec<u8>);

/// Authentication material presented by the caller; an empty token is the
/// canonical "no credential yet" auth used for device/global keys.
#[derive(Debug, Clone, Default)]
pub struct AuthToken {
    pub token: Vec<u8>,
}

impl AuthToken {
    pub fn empty() -> Self {
        Self { token: Vec::new() }
    }
}

/// Additional authenticated data bound into a seal: the anti-forensics
/// discard value, regenerated on every `StoreKey`.
#[derive(Debug, Clone)]
pub struct SecDiscard(pub Vec<u8>);

pub trait KeystoreGateway: Send + Sync {
    /// One-time process initialization. Idempotent.
    fn init(&self) -> FbeResult<()>;

    /// Fills `blob` with cryptographically strong random bytes.
    fn generate_random(&self, blob: &mut KeyBlob) -> FbeResult<()>;

    /// Creates a sealing key inside the keystore under `alias`.
    fn generate_key(&self, alias: &KeyAlias) -> FbeResult<()>;

    /// Seals `plain` under the key named by `alias`, binding `sec_discard`
    /// and `auth.token` as additional authenticated data.
    fn encrypt(
        &self,
        alias: &KeyAlias,
        sec_discard: &SecDiscard,
        auth: &AuthToken,
        plain: &KeyBlob,
    ) -> FbeResult<Vec<u8>>;

    /// Inverse of [`KeystoreGateway::encrypt`].
    fn decrypt(
        &self,
        alias: &KeyAlias,
        sec_discard: &SecDiscard,
        auth: &AuthToken,
        sealed: &[u8],
    ) -> FbeResult<KeyBlob>;

    /// Removes the sealing key. Best-effort: callers on a clear path log
    /// failures but do not fail the overall clear operation.
    fn delete_key(&self, alias: &KeyAlias) -> FbeResult<()>;
}

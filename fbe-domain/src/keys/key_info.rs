// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! In-memory and sealed projections of one key.

use super::key_blob::KeyBlob;
use crate::ports::fscrypt_control::KeyIdentifier;
use crate::ports::keystore_gateway::{KeyAlias, SecDiscard};
use sha2::{Digest, Sha512};

pub const CRYPTO_KEY_ALIAS_SIZE: usize = 8;
pub const CRYPTO_KEY_SECDISC_SIZE: usize = 16;
pub const CRYPTO_AES_256_XTS_KEY_SIZE: usize = 32;

/// The in-memory plaintext projection of a key: raw bytes plus the two
/// descriptors derived from, or assigned to, those bytes.
#[derive(Debug, Default)]
pub struct KeyInfo {
    pub key: KeyBlob,
    /// Legacy v1 descriptor: first 8 bytes of SHA-512(SHA-512(key)).
    pub key_desc: KeyBlob,
    /// v2 identifier returned by the kernel on install.
    pub key_id: Option<KeyIdentifier>,
}

impl KeyInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.key.clear();
        self.key_desc.clear();
        self.key_id = None;
    }

    /// Derives and stores `key_desc` from the current `key`. Used after
    /// generating or restoring a raw key; never called on an empty key.
    pub fn compute_key_desc(&mut self) -> Result<(), &'static str> {
        if self.key.is_empty() {
            return Err("cannot derive descriptor from an empty key");
        }
        let first = Sha512::digest(self.key.as_slice());
        let second = Sha512::digest(first);
        self.key_desc.clear();
        self.key_desc.alloc(CRYPTO_KEY_ALIAS_SIZE)?;
        self.key_desc.as_mut_slice().copy_from_slice(&second[..CRYPTO_KEY_ALIAS_SIZE]);
        Ok(())
    }
}

/// The sealed, on-disk projection of a key.
#[derive(Debug, Clone)]
pub struct KeyContext {
    pub alias: KeyAlias,
    pub sec_discard: SecDiscard,
    pub encrypted: Vec<u8>,
}

impl KeyContext {
    pub fn empty() -> Self {
        Self {
            alias: KeyAlias(Vec::new()),
            sec_discard: SecDiscard(Vec::new()),
            encrypted: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_desc_is_deterministic() {
        let mut info = KeyInfo::new();
        info.key = KeyBlob::from_vec(vec![7u8; CRYPTO_AES_256_XTS_KEY_SIZE]);
        info.compute_key_desc().unwrap();
        let first = info.key_desc.as_slice().to_vec();

        let mut info2 = KeyInfo::new();
        info2.key = KeyBlob::from_vec(vec![7u8; CRYPTO_AES_256_XTS_KEY_SIZE]);
        info2.compute_key_desc().unwrap();

        assert_eq!(first, info2.key_desc.as_slice());
        assert_eq!(first.len(), CRYPTO_KEY_ALIAS_SIZE);
    }

    #[test]
    fn descriptor_rejects_empty_key() {
        let mut info = KeyInfo::new();
        assert!(info.compute_key_desc().is_err());
    }
}

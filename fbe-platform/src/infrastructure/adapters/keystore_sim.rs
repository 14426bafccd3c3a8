// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A software keystore gateway.
//!
//! Real deployments seal keys inside a hardware-backed keystore that never
//! exposes its sealing keys to user space. This adapter provides the same
//! contract ([`fbe_domain::ports::KeystoreGateway`]) in software, with
//! AES-256-GCM as the sealing primitive, so the core is testable and
//! runnable on hardware without a secure element. It is not a substitute
//! for a hardware keystore in production: the sealing keys it generates
//! live in process memory like any other secret, wiped on drop but not
//! hardware-isolated.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use fbe_domain::error::{FbeError, FbeResult};
use fbe_domain::keys::key_blob::KeyBlob;
use fbe_domain::ports::keystore_gateway::{AuthToken, KeyAlias, KeystoreGateway, SecDiscard};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Mutex;
use zeroize::Zeroize;

const NONCE_SIZE: usize = 12;
const SEALING_KEY_SIZE: usize = 32;

struct SealingKey(Vec<u8>);

impl Drop for SealingKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// In-process software keystore. `alias` is the map key; sealing keys never
/// leave this struct.
pub struct SoftwareKeystoreGateway {
    keys: Mutex<HashMap<Vec<u8>, SealingKey>>,
}

impl SoftwareKeystoreGateway {
    pub fn new() -> Self {
        Self { keys: Mutex::new(HashMap::new()) }
    }

    fn aad(sec_discard: &SecDiscard, auth: &AuthToken) -> Vec<u8> {
        let mut aad = Vec::with_capacity(sec_discard.0.len() + auth.token.len());
        aad.extend_from_slice(&sec_discard.0);
        aad.extend_from_slice(&auth.token);
        aad
    }
}

impl Default for SoftwareKeystoreGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl KeystoreGateway for SoftwareKeystoreGateway {
    fn init(&self) -> FbeResult<()> {
        Ok(())
    }

    fn generate_random(&self, blob: &mut KeyBlob) -> FbeResult<()> {
        rand::rng().fill_bytes(blob.as_mut_slice());
        Ok(())
    }

    fn generate_key(&self, alias: &KeyAlias) -> FbeResult<()> {
        let mut raw = vec![0u8; SEALING_KEY_SIZE];
        rand::rng().fill_bytes(&mut raw);
        self.keys
            .lock()
            .map_err(|_| FbeError::internal_error("keystore lock poisoned"))?
            .insert(alias.0.clone(), SealingKey(raw));
        Ok(())
    }

    fn encrypt(
        &self,
        alias: &KeyAlias,
        sec_discard: &SecDiscard,
        auth: &AuthToken,
        plain: &KeyBlob,
    ) -> FbeResult<Vec<u8>> {
        let keys = self.keys.lock().map_err(|_| FbeError::internal_error("keystore lock poisoned"))?;
        let sealing = keys.get(&alias.0).ok_or_else(|| FbeError::not_found("no sealing key for alias"))?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&sealing.0));

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let aad = Self::aad(sec_discard, auth);
        let ciphertext = cipher
            .encrypt(nonce, Payload { msg: plain.as_slice(), aad: &aad })
            .map_err(|e| FbeError::crypto_failed(format!("seal failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(
        &self,
        alias: &KeyAlias,
        sec_discard: &SecDiscard,
        auth: &AuthToken,
        sealed: &[u8],
    ) -> FbeResult<KeyBlob> {
        if sealed.len() <= NONCE_SIZE {
            return Err(FbeError::crypto_failed("sealed blob too short"));
        }
        let keys = self.keys.lock().map_err(|_| FbeError::internal_error("keystore lock poisoned"))?;
        let sealing = keys.get(&alias.0).ok_or_else(|| FbeError::not_found("no sealing key for alias"))?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&sealing.0));

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        let aad = Self::aad(sec_discard, auth);

        let plain = cipher
            .decrypt(nonce, Payload { msg: ciphertext, aad: &aad })
            .map_err(|e| FbeError::crypto_failed(format!("unseal failed: {e}")))?;
        Ok(KeyBlob::from_vec(plain))
    }

    fn delete_key(&self, alias: &KeyAlias) -> FbeResult<()> {
        if let Ok(mut keys) = self.keys.lock() {
            keys.remove(&alias.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(b: u8) -> KeyAlias {
        KeyAlias(vec![b; 8])
    }

    #[test]
    fn seal_then_unseal_round_trips() {
        let gw = SoftwareKeystoreGateway::new();
        gw.generate_key(&alias(1)).unwrap();
        let sd = SecDiscard(vec![2; 16]);
        let auth = AuthToken { token: b"secret".to_vec() };
        let plain = KeyBlob::from_vec(vec![9u8; 32]);

        let sealed = gw.encrypt(&alias(1), &sd, &auth, &plain).unwrap();
        let recovered = gw.decrypt(&alias(1), &sd, &auth, &sealed).unwrap();
        assert_eq!(recovered.as_slice(), plain.as_slice());
    }

    #[test]
    fn wrong_auth_fails_unseal() {
        let gw = SoftwareKeystoreGateway::new();
        gw.generate_key(&alias(3)).unwrap();
        let sd = SecDiscard(vec![4; 16]);
        let good_auth = AuthToken { token: b"right".to_vec() };
        let bad_auth = AuthToken { token: b"wrong".to_vec() };
        let plain = KeyBlob::from_vec(vec![5u8; 32]);

        let sealed = gw.encrypt(&alias(3), &sd, &good_auth, &plain).unwrap();
        assert!(gw.decrypt(&alias(3), &sd, &bad_auth, &sealed).is_err());
    }

    #[test]
    fn unknown_alias_fails() {
        let gw = SoftwareKeystoreGateway::new();
        let sd = SecDiscard(vec![0; 16]);
        let auth = AuthToken::empty();
        let plain = KeyBlob::from_vec(vec![1u8; 32]);
        assert!(gw.encrypt(&alias(9), &sd, &auth, &plain).is_err());
    }

    #[test]
    fn delete_key_makes_future_operations_fail() {
        let gw = SoftwareKeystoreGateway::new();
        gw.generate_key(&alias(5)).unwrap();
        gw.delete_key(&alias(5)).unwrap();
        let sd = SecDiscard(vec![0; 16]);
        let auth = AuthToken::empty();
        let plain = KeyBlob::from_vec(vec![1u8; 32]);
        assert!(gw.encrypt(&alias(5), &sd, &auth, &plain).is_err());
    }
}

// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `BaseKey`: the lifecycle of one key, on disk and in the kernel.
//!
//! A `BaseKey` owns one directory. Its five operations move it through
//! `empty -> init -> stored -> active -> (cleared)`; see the state diagram
//! in the design notes. Nothing here is async: every step is a blocking
//! filesystem write, keystore call, or kernel ioctl.

use fbe_domain::error::{FbeError, FbeResult};
use fbe_domain::keys::key_blob::KeyBlob;
use fbe_domain::keys::key_info::{KeyContext, KeyInfo, CRYPTO_KEY_ALIAS_SIZE, CRYPTO_KEY_SECDISC_SIZE};
use fbe_domain::ports::fscrypt_control::{EncryptionPolicy, FsCryptControl, KeyIdentifier, RemovalStatus};
use fbe_domain::ports::keystore_gateway::{AuthToken, KeyAlias, KeystoreGateway, SecDiscard};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const ALIAS_FILE: &str = "alias";
const SEC_DISCARD_FILE: &str = "sec_discard";
const ENCRYPTED_FILE: &str = "encrypted";
const KEY_ID_FILE: &str = "kid";

pub struct BaseKey {
    dir: PathBuf,
    key_len: usize,
    pub info: KeyInfo,
    context: KeyContext,
    keystore: Arc<dyn KeystoreGateway>,
    fscrypt: Arc<dyn FsCryptControl>,
}

impl BaseKey {
    pub fn new(
        dir: PathBuf,
        key_len: usize,
        keystore: Arc<dyn KeystoreGateway>,
        fscrypt: Arc<dyn FsCryptControl>,
    ) -> Self {
        Self { dir, key_len, info: KeyInfo::new(), context: KeyContext::empty(), keystore, fscrypt }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Generates a fresh raw key and its legacy descriptor. Pre: `info.key`
    /// empty. Clears on any failure so a partially generated key can never
    /// be mistaken for a usable one.
    pub fn init_key(&mut self) -> FbeResult<()> {
        if !self.info.key.is_empty() {
            return Err(FbeError::bad_state("InitKey called on a non-empty key"));
        }
        let mut blob = KeyBlob::default();
        blob.alloc(self.key_len).map_err(FbeError::internal_error)?;
        if let Err(e) = self.keystore.generate_random(&mut blob) {
            warn!(error = %e, "random key generation failed");
            return Err(e);
        }
        self.info.key = blob;
        if let Err(e) = self.info.compute_key_desc() {
            self.info.clear();
            return Err(FbeError::crypto_failed(e));
        }
        debug!(dir = %self.dir.display(), "key initialized");
        Ok(())
    }

    /// Persists the key under `auth`, transactionally: writes into
    /// `<dir>.tmp`, and only replaces `<dir>` once every component file
    /// exists.
    ///
    /// If the final `rename` fails after `<dir>` has already been removed,
    /// this returns an error but the previous key directory is gone; a
    /// crash in that narrow window loses the key. This mirrors the
    /// original design's behavior rather than inventing a two-phase commit
    /// the underlying filesystem doesn't give us for free.
    pub fn store_key(&mut self, auth: &AuthToken) -> FbeResult<()> {
        let tmp = tmp_dir(&self.dir);
        if let Err(e) = std::fs::create_dir_all(&tmp) {
            return Err(FbeError::from(e));
        }

        let result = self.store_key_into(&tmp, auth);
        if let Err(e) = result {
            let _ = std::fs::remove_dir_all(&tmp);
            return Err(e);
        }

        if self.dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.dir) {
                let _ = std::fs::remove_dir_all(&tmp);
                return Err(FbeError::from(e));
            }
        }
        if let Err(e) = std::fs::rename(&tmp, &self.dir) {
            let _ = std::fs::remove_dir_all(&tmp);
            return Err(FbeError::crypto_failed(format!(
                "key directory rename failed after old directory was removed: {e}"
            )));
        }
        info!(dir = %self.dir.display(), "key stored");
        Ok(())
    }

    fn store_key_into(&mut self, tmp: &Path, auth: &AuthToken) -> FbeResult<()> {
        let mut alias_blob = KeyBlob::default();
        alias_blob.alloc(CRYPTO_KEY_ALIAS_SIZE).map_err(FbeError::internal_error)?;
        self.keystore.generate_random(&mut alias_blob)?;
        let alias = KeyAlias(alias_blob.as_slice().to_vec());
        std::fs::write(tmp.join(ALIAS_FILE), &alias.0)?;

        self.keystore.generate_key(&alias)?;

        let mut sec_discard_blob = KeyBlob::default();
        sec_discard_blob.alloc(CRYPTO_KEY_SECDISC_SIZE).map_err(FbeError::internal_error)?;
        self.keystore.generate_random(&mut sec_discard_blob)?;
        let sec_discard = SecDiscard(sec_discard_blob.as_slice().to_vec());
        std::fs::write(tmp.join(SEC_DISCARD_FILE), &sec_discard.0)?;

        let sealed = self.keystore.encrypt(&alias, &sec_discard, auth, &self.info.key)?;
        std::fs::write(tmp.join(ENCRYPTED_FILE), &sealed)?;

        self.context = KeyContext { alias, sec_discard, encrypted: sealed };
        Ok(())
    }

    /// Loads the sealed key from disk and unseals it under `auth`. Clears
    /// `info.key` on any failure, including an authentication mismatch.
    pub fn restore_key(&mut self, auth: &AuthToken) -> FbeResult<()> {
        let result = self.restore_key_inner(auth);
        if result.is_err() {
            self.info.clear();
        }
        result
    }

    fn restore_key_inner(&mut self, auth: &AuthToken) -> FbeResult<()> {
        let alias = KeyAlias(std::fs::read(self.dir.join(ALIAS_FILE))?);
        let sec_discard = SecDiscard(std::fs::read(self.dir.join(SEC_DISCARD_FILE))?);
        let sealed = std::fs::read(self.dir.join(ENCRYPTED_FILE))?;

        let plain = self.keystore.decrypt(&alias, &sec_discard, auth, &sealed)?;
        self.info.key = plain;
        self.info.compute_key_desc().map_err(FbeError::crypto_failed)?;
        self.context = KeyContext { alias, sec_discard, encrypted: sealed };
        debug!(dir = %self.dir.display(), "key restored");
        Ok(())
    }

    /// Installs the raw key into the kernel via the v2 control surface and
    /// immediately clears it from memory: no raw key may persist in
    /// user-space past this call.
    pub fn active_key(&mut self, mount_point: &Path) -> FbeResult<()> {
        if self.info.key.is_empty() {
            return Err(FbeError::bad_state("ActiveKey called on an empty key"));
        }
        let identifier = self.fscrypt.install_key(mount_point, self.info.key.as_slice())?;
        std::fs::write(self.dir.join(KEY_ID_FILE), identifier.0)?;
        self.info.key_id = Some(identifier);
        self.info.key.clear();
        info!(dir = %self.dir.display(), "key activated (v2)");
        Ok(())
    }

    /// Legacy v1 install: adds the raw key into the session keyring under
    /// both filesystem-prefix descriptions, then clears the raw key.
    pub fn active_key_legacy(&mut self) -> FbeResult<()> {
        if self.info.key.is_empty() || self.info.key_desc.is_empty() {
            return Err(FbeError::bad_state("ActiveKeyLegacy requires key and descriptor"));
        }
        ensure_fscrypt_keyring(&*self.fscrypt)?;
        for prefix in fbe_domain::ports::fscrypt_control::FSCRYPT_KEY_DESC_PREFIXES {
            let description = format!("{prefix}:{}", hex::encode(self.info.key_desc.as_slice()));
            let payload = legacy_payload(self.info.key.as_slice());
            self.fscrypt.keyring_add("logon", &description, &payload, "@s")?;
        }
        self.info.key.clear();
        info!(dir = %self.dir.display(), "key activated (legacy)");
        Ok(())
    }

    /// Removes the key from the kernel (v2) and clears the in-memory
    /// descriptor/identifier. Non-fatal removal flags are logged, not
    /// propagated as errors.
    pub fn clear_key(&mut self, mount_point: &Path) -> FbeResult<()> {
        let identifier = match self.info.key_id.take() {
            Some(id) => id,
            None => return Ok(()),
        };
        let status = self.fscrypt.remove_key(mount_point, &identifier)?;
        log_removal_status(&status);
        self.info.key_desc.clear();
        Ok(())
    }

    /// Legacy v1 teardown: deletes the sealing key and unlinks both
    /// keyring entries, tolerating individual failures.
    pub fn clear_key_legacy(&mut self) -> FbeResult<()> {
        if let Err(e) = self.keystore.delete_key(&self.context.alias) {
            warn!(error = %e, "keystore delete_key failed during clear");
        }
        for prefix in fbe_domain::ports::fscrypt_control::FSCRYPT_KEY_DESC_PREFIXES {
            let description = format!("{prefix}:{}", hex::encode(self.info.key_desc.as_slice()));
            match self.fscrypt.keyring_search("@s", "logon", &description) {
                Ok(Some(serial)) => {
                    if let Err(e) = self.fscrypt.keyring_unlink(serial, "@s") {
                        warn!(error = %e, prefix, "keyring unlink failed during clear");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, prefix, "keyring search failed during clear"),
            }
        }
        self.info.clear();
        Ok(())
    }

    pub fn standard_policy(&self) -> Option<(KeyIdentifier, EncryptionPolicy)> {
        self.info.key_id.clone().map(EncryptionPolicy::standard)
    }

    /// Installs this key using whichever control surface the running
    /// kernel supports, selected once at daemon start (see
    /// [`FsCryptControl::supports_v2`]) and passed down by the caller.
    pub fn activate(&mut self, mount_point: &Path, v2_supported: bool) -> FbeResult<()> {
        if v2_supported {
            self.active_key(mount_point)
        } else {
            self.active_key_legacy()
        }
    }

    /// Inverse of [`BaseKey::activate`].
    pub fn deactivate(&mut self, mount_point: &Path, v2_supported: bool) -> FbeResult<()> {
        if v2_supported {
            self.clear_key(mount_point)
        } else {
            self.clear_key_legacy()
        }
    }
}

fn tmp_dir(dir: &Path) -> PathBuf {
    let mut os = dir.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

fn legacy_payload(raw_key: &[u8]) -> Vec<u8> {
    // struct fscrypt_key { u32 mode; u8 raw[FSCRYPT_MAX_KEY_SIZE]; u32 size; }
    // in the kernel keyring payload convention used by the v1 path.
    const AES_256_XTS_MODE: u32 = 1;
    let mut payload = Vec::with_capacity(4 + raw_key.len() + 4);
    payload.extend_from_slice(&AES_256_XTS_MODE.to_le_bytes());
    payload.extend_from_slice(raw_key);
    payload.extend_from_slice(&(raw_key.len() as u32).to_le_bytes());
    payload
}

fn ensure_fscrypt_keyring(fscrypt: &dyn FsCryptControl) -> FbeResult<()> {
    if fscrypt.keyring_search("@s", "keyring", "fscrypt")?.is_none() {
        fscrypt.keyring_add("keyring", "fscrypt", &[], "@s")?;
    }
    Ok(())
}

fn log_removal_status(status: &RemovalStatus) {
    if status.files_busy {
        warn!("key removed but some files are still busy");
    }
    if status.other_users_still_have_key {
        debug!("key removal: other users still reference this key");
    }
}

// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `KeyManager`: the process-wide catalog of live keys.
//!
//! Every mutation of the catalog goes through a single coarse mutex. Given
//! how infrequent user lifecycle events are compared to file I/O
//! throughput, a finer-grained locking scheme would add risk (the on-disk
//! `<dir>.tmp` rename convention in [`crate::keys::BaseKey::store_key`]
//! assumes callers are already serialized) without a measurable benefit.

use crate::config::DaemonConfig;
use crate::keys::BaseKey;
use fbe_domain::error::{FbeError, FbeResult};
use fbe_domain::keys::key_info::CRYPTO_AES_256_XTS_KEY_SIZE;
use fbe_domain::ports::fscrypt_control::FsCryptControl;
use fbe_domain::ports::keystore_gateway::{AuthToken, KeystoreGateway};
use fbe_domain::value_objects::encryption_level::{EncryptionLevel, KeyFlags};
use fbe_domain::value_objects::user_id::{UserId, GLOBAL_USER_ID};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

struct Catalog {
    global_el1_key: Option<BaseKey>,
    user_el1_keys: HashMap<UserId, BaseKey>,
    user_el2_keys: HashMap<UserId, BaseKey>,
}

impl Catalog {
    fn new() -> Self {
        Self { global_el1_key: None, user_el1_keys: HashMap::new(), user_el2_keys: HashMap::new() }
    }
}

pub struct KeyManager {
    config: DaemonConfig,
    keystore: Arc<dyn KeystoreGateway>,
    fscrypt: Arc<dyn FsCryptControl>,
    catalog: Mutex<Catalog>,
    /// Result of the one-time v2-vs-legacy capability probe (see
    /// `FsCryptControl::supports_v2`). Fixed for the life of the process.
    v2_supported: bool,
}

impl KeyManager {
    pub fn new(config: DaemonConfig, keystore: Arc<dyn KeystoreGateway>, fscrypt: Arc<dyn FsCryptControl>) -> Self {
        let v2_supported = fscrypt.supports_v2(&config.fs_mount_point);
        Self { config, keystore, fscrypt, catalog: Mutex::new(Catalog::new()), v2_supported }
    }

    fn lock(&self) -> FbeResult<std::sync::MutexGuard<'_, Catalog>> {
        self.catalog.lock().map_err(|_| FbeError::internal_error("key catalog lock poisoned"))
    }

    fn new_base_key(&self, dir: PathBuf) -> BaseKey {
        BaseKey::new(dir, CRYPTO_AES_256_XTS_KEY_SIZE, self.keystore.clone(), self.fscrypt.clone())
    }

    fn user_el1_dir(&self, user: UserId) -> PathBuf {
        self.config.user_el1_root().join(user.as_i32().to_string())
    }

    fn user_el2_dir(&self, user: UserId) -> PathBuf {
        self.config.user_el2_root().join(user.as_i32().to_string())
    }

    /// Ensures the EL0 device key exists, generating it on first boot and
    /// restoring it on every boot thereafter. Idempotent.
    #[instrument(skip(self))]
    pub fn init_global_device_key(&self) -> FbeResult<()> {
        let mut catalog = self.lock()?;
        if catalog.global_el1_key.is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(self.config.storage_daemon_dir())?;
        let dir = self.config.device_el1_dir();
        let existed = dir.exists();

        let mut key = self.new_base_key(dir.clone());
        let auth = AuthToken::empty();
        if existed {
            key.init_key()?;
            key.restore_key(&auth).inspect_err(|_| {
                let _ = key.deactivate(&self.config.fs_mount_point, self.v2_supported);
            })?;
        } else {
            std::fs::create_dir_all(&dir)?;
            key.init_key()?;
            key.store_key(&auth).inspect_err(|_| {
                let _ = key.deactivate(&self.config.fs_mount_point, self.v2_supported);
            })?;
        }
        key.activate(&self.config.fs_mount_point, self.v2_supported)?;
        catalog.global_el1_key = Some(key);
        info!("global device key ready");
        Ok(())
    }

    /// Creates the storage-daemon directory tree, ensures EL1/EL2 keys for
    /// the reserved global user exist, and restores every on-disk EL1 user
    /// key into the catalog. EL2 keys of ordinary users are *not*
    /// auto-restored here; they require [`KeyManager::active_user_key`]
    /// once the user authenticates.
    #[instrument(skip(self))]
    pub fn init_global_user_keys(&self) -> FbeResult<()> {
        std::fs::create_dir_all(self.config.user_el1_root())?;
        std::fs::create_dir_all(self.config.user_el2_root())?;

        self.ensure_user_key(GLOBAL_USER_ID, KeyFlags::EL1 | KeyFlags::EL2, &AuthToken::empty())?;

        let el1_root = self.config.user_el1_root();
        if el1_root.is_dir() {
            for entry in std::fs::read_dir(&el1_root)? {
                let entry = entry?;
                let Some(user) = dir_name_as_user_id(&entry.path()) else { continue };
                if user == GLOBAL_USER_ID {
                    continue;
                }
                if let Err(e) = self.restore_user_key(user, KeyFlags::EL1, &AuthToken::empty()) {
                    warn!(user = user.as_i32(), error = %e, "failed to restore EL1 key at boot");
                }
            }
        }
        Ok(())
    }

    fn has_el_key(catalog: &Catalog, user: UserId, flags: KeyFlags) -> bool {
        (flags.contains(KeyFlags::EL1) && catalog.user_el1_keys.contains_key(&user))
            || (flags.contains(KeyFlags::EL2) && catalog.user_el2_keys.contains_key(&user))
    }

    fn ensure_user_key(&self, user: UserId, flags: KeyFlags, auth: &AuthToken) -> FbeResult<()> {
        if flags.contains(KeyFlags::EL1) {
            self.generate_or_restore_one(user, self.user_el1_dir(user), auth, true)?;
        }
        if flags.contains(KeyFlags::EL2) {
            self.generate_or_restore_one(user, self.user_el2_dir(user), auth, false)?;
        }
        Ok(())
    }

    fn generate_or_restore_one(&self, user: UserId, dir: PathBuf, auth: &AuthToken, is_el1: bool) -> FbeResult<()> {
        {
            let catalog = self.lock()?;
            if Self::has_el_key(&catalog, user, if is_el1 { KeyFlags::EL1 } else { KeyFlags::EL2 }) {
                return Ok(());
            }
        }
        let existed = dir.exists();
        let mut key = self.new_base_key(dir.clone());
        key.init_key()?;
        if existed {
            key.restore_key(auth)?;
        } else {
            std::fs::create_dir_all(&dir)?;
            key.store_key(auth)?;
        }
        key.activate(&self.config.fs_mount_point, self.v2_supported)?;

        let mut catalog = self.lock()?;
        if is_el1 {
            catalog.user_el1_keys.insert(user, key);
        } else {
            catalog.user_el2_keys.insert(user, key);
        }
        Ok(())
    }

    fn restore_user_key(&self, user: UserId, flags: KeyFlags, auth: &AuthToken) -> FbeResult<()> {
        self.ensure_user_key(user, flags, auth)
    }

    /// Generates EL1 then EL2 keys for a new user. Refuses if either
    /// directory already exists on disk. Rolls back EL1 if EL2 fails.
    #[instrument(skip(self, auth))]
    pub fn generate_user_keys(&self, user: UserId, flags: KeyFlags, auth: &AuthToken) -> FbeResult<()> {
        let el1_dir = self.user_el1_dir(user);
        let el2_dir = self.user_el2_dir(user);
        if (flags.contains(KeyFlags::EL1) && el1_dir.exists()) || (flags.contains(KeyFlags::EL2) && el2_dir.exists())
        {
            return Err(FbeError::already_exists(format!("user {user} already has key material")));
        }

        if flags.contains(KeyFlags::EL1) {
            self.generate_or_restore_one(user, el1_dir, auth, true)?;
        }
        if flags.contains(KeyFlags::EL2) {
            if let Err(e) = self.generate_or_restore_one(user, el2_dir, auth, false) {
                warn!(user = user.as_i32(), error = %e, "EL2 key generation failed, rolling back EL1");
                let _ = self.delete_user_keys(user);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Tears down both levels for `user`: clears the kernel install,
    /// removes the on-disk tree, and erases the catalog entry. Safe to
    /// call when the user has no keys.
    #[instrument(skip(self))]
    pub fn delete_user_keys(&self, user: UserId) -> FbeResult<()> {
        self.teardown_level(user, true)?;
        self.teardown_level(user, false)?;
        Ok(())
    }

    fn teardown_level(&self, user: UserId, is_el1: bool) -> FbeResult<()> {
        let mut catalog = self.lock()?;
        let existing = if is_el1 { catalog.user_el1_keys.remove(&user) } else { catalog.user_el2_keys.remove(&user) };
        drop(catalog);

        if let Some(mut key) = existing {
            if let Err(e) = key.deactivate(&self.config.fs_mount_point, self.v2_supported) {
                warn!(user = user.as_i32(), error = %e, "clear_key failed during delete");
            }
        }
        let dir = if is_el1 { self.user_el1_dir(user) } else { self.user_el2_dir(user) };
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(FbeError::from)?;
        }
        Ok(())
    }

    /// Re-seals the EL2 key under `new_auth`. The restore step uses the
    /// same auth the caller supplies for storing, matching the observed
    /// upstream behavior rather than a rotation protocol the keystore
    /// contract doesn't define (see design notes).
    #[instrument(skip(self, new_auth))]
    pub fn update_user_auth(&self, user: UserId, new_auth: &AuthToken) -> FbeResult<()> {
        let mut catalog = self.lock()?;
        let key = catalog
            .user_el2_keys
            .get_mut(&user)
            .ok_or_else(|| FbeError::not_found(format!("no EL2 key for user {user}")))?;
        key.restore_key(new_auth)?;
        key.store_key(new_auth)?;
        // The key is already installed in the kernel (key_id stays set); the
        // raw key must not linger in user-space once it's resealed on disk.
        key.info.key.clear();
        Ok(())
    }

    /// Restores the EL2 key from disk under `auth`, installs it into the
    /// kernel, and catalogs it. Requires the EL2 directory to exist and no
    /// catalog entry yet.
    #[instrument(skip(self, auth))]
    pub fn active_user_key(&self, user: UserId, auth: &AuthToken) -> FbeResult<()> {
        {
            let catalog = self.lock()?;
            if catalog.user_el2_keys.contains_key(&user) {
                return Err(FbeError::already_exists(format!("EL2 key for user {user} already active")));
            }
        }
        let dir = self.user_el2_dir(user);
        if !dir.exists() {
            return Err(FbeError::not_found(format!("no EL2 key directory for user {user}")));
        }
        let mut key = self.new_base_key(dir);
        key.init_key()?;
        key.restore_key(auth)?;
        key.activate(&self.config.fs_mount_point, self.v2_supported)?;

        let mut catalog = self.lock()?;
        catalog.user_el2_keys.insert(user, key);
        Ok(())
    }

    /// Removes the EL2 key from the kernel and catalog; on-disk material
    /// remains so the user can be re-activated later.
    #[instrument(skip(self))]
    pub fn inactive_user_key(&self, user: UserId) -> FbeResult<()> {
        let mut catalog = self.lock()?;
        let mut key = catalog
            .user_el2_keys
            .remove(&user)
            .ok_or_else(|| FbeError::not_found(format!("no active EL2 key for user {user}")))?;
        drop(catalog);
        key.deactivate(&self.config.fs_mount_point, self.v2_supported)
    }

    /// Applies the key installed at `level` as the encryption policy for
    /// each path in `paths`. Fails fast on the first path that cannot be
    /// tagged.
    #[instrument(skip(self, paths))]
    pub fn set_directory_el_policy(&self, user: UserId, level: EncryptionLevel, paths: &[PathBuf]) -> FbeResult<()> {
        let catalog = self.lock()?;
        let key = match level {
            EncryptionLevel::El1 => catalog.user_el1_keys.get(&user),
            EncryptionLevel::El2 => catalog.user_el2_keys.get(&user),
            EncryptionLevel::El0 => {
                return Err(FbeError::bad_state("directory policy applies only to EL1/EL2 keys"))
            }
        }
        .ok_or_else(|| FbeError::not_found(format!("no active key for user {user}")))?;

        let (identifier, policy) = key
            .standard_policy()
            .ok_or_else(|| FbeError::bad_state("key has no installed identifier"))?;
        for path in paths {
            self.fscrypt.set_policy(path, &identifier, policy)?;
        }
        Ok(())
    }
}

fn dir_name_as_user_id(path: &Path) -> Option<UserId> {
    path.file_name()?.to_str()?.parse::<i32>().ok().map(UserId::new)
}

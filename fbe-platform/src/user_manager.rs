// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `UserManager`: per-user directory lifecycle.
//!
//! Tracks each user through `Created -> Prepared -> Started` and back.
//! Every transition is guarded by [`UserManager::check_state`]; an
//! out-of-order request (starting a user whose directories were never
//! prepared, say) is rejected rather than silently fixed up.

use crate::config::DaemonConfig;
use fbe_domain::error::{FbeError, FbeResult};
use fbe_domain::value_objects::encryption_level::KeyFlags;
use fbe_domain::value_objects::user_id::UserId;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, instrument, warn};

const UMOUNT_RETRY_TIMES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    Created,
    Prepared,
    Started,
}

struct DirSpec {
    template: &'static str,
    mode: u32,
}

impl DirSpec {
    const fn new(template: &'static str, mode: u32) -> Self {
        Self { template, mode }
    }

    fn render(&self, root: &std::path::Path, user: UserId) -> PathBuf {
        root.join(self.template.replace("%d", &user.as_i32().to_string()).trim_start_matches('/'))
    }
}

pub struct UserManager {
    config: DaemonConfig,
    users: Mutex<HashMap<UserId, UserState>>,
}

impl UserManager {
    pub fn new(config: DaemonConfig) -> Self {
        Self { config, users: Mutex::new(HashMap::new()) }
    }

    fn users(&self) -> FbeResult<std::sync::MutexGuard<'_, HashMap<UserId, UserState>>> {
        self.users.lock().map_err(|_| FbeError::internal_error("user table lock poisoned"))
    }

    fn check_state(&self, user: UserId, expected: UserState) -> FbeResult<()> {
        let users = self.users()?;
        match users.get(&user) {
            None => Err(FbeError::not_found(format!("user {user} not known"))),
            Some(state) if *state == expected => Ok(()),
            Some(state) => Err(FbeError::bad_state(format!(
                "user {user} is in state {state:?}, expected {expected:?}"
            ))),
        }
    }

    #[instrument(skip(self))]
    pub fn add_user(&self, user: UserId) -> FbeResult<()> {
        let mut users = self.users()?;
        if users.contains_key(&user) {
            return Err(FbeError::already_exists(format!("user {user} already added")));
        }
        users.insert(user, UserState::Created);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn remove_user(&self, user: UserId) -> FbeResult<()> {
        self.check_state(user, UserState::Created)?;
        self.users()?.remove(&user);
        Ok(())
    }

    fn el1_root_dirs(&self) -> Vec<(PathBuf, DirSpec)> {
        vec![
            (self.config.app_el1_root.clone(), DirSpec::new("%d", self.config.dir_mode)),
            (self.config.el1_root.clone(), DirSpec::new("%d", self.config.dir_mode)),
            (self.config.chipset_el1_root.clone(), DirSpec::new("%d", self.config.dir_mode)),
        ]
    }

    fn el1_sub_dirs(&self) -> Vec<(PathBuf, DirSpec)> {
        vec![
            (self.config.app_el1_root.clone(), DirSpec::new("%d/base", self.config.dir_mode)),
            (self.config.app_el1_root.clone(), DirSpec::new("%d/database", self.config.dir_mode)),
        ]
    }

    fn el2_sub_dirs(&self) -> Vec<(PathBuf, DirSpec)> {
        vec![
            (self.config.el2_root.clone(), DirSpec::new("%d/hmdfs", self.config.dir_mode)),
            (self.config.el2_root.clone(), DirSpec::new("%d/hmdfs/files", self.config.dir_mode)),
            (self.config.el2_root.clone(), DirSpec::new("%d/hmdfs/data", self.config.dir_mode)),
        ]
    }

    fn hmdfs_dirs(&self) -> Vec<(PathBuf, DirSpec)> {
        vec![
            (self.config.media_root.clone(), DirSpec::new("%d", self.config.dir_mode)),
            (self.config.media_root.clone(), DirSpec::new("%d/local", self.config.dir_mode)),
        ]
    }

    fn create_all(&self, specs: &[(PathBuf, DirSpec)], user: UserId) -> FbeResult<()> {
        for (root, spec) in specs {
            let path = spec.render(root, user);
            std::fs::create_dir_all(&path).map_err(FbeError::from)?;
            set_mode(&path, spec.mode)?;
        }
        Ok(())
    }

    /// Creates the EL1/EL2/hmdfs directory trees for `user`, as selected by
    /// `flags`. Each step rolls back to `Created` on failure by leaving
    /// whatever was already created in place — matching the upstream
    /// behavior of reporting the first failure without attempting to undo
    /// partial directory creation, which is itself idempotent to retry.
    #[instrument(skip(self))]
    pub fn prepare_user_dirs(&self, user: UserId, flags: KeyFlags) -> FbeResult<()> {
        self.check_state(user, UserState::Created)?;

        if flags.contains(KeyFlags::EL1) {
            self.create_all(&self.el1_root_dirs(), user).map_err(|e| FbeError::PrepareDirFailed(e.to_string()))?;
            self.create_all(&self.el1_sub_dirs(), user).map_err(|e| FbeError::PrepareDirFailed(e.to_string()))?;
        }
        if flags.contains(KeyFlags::EL2) {
            let el2_roots = vec![(self.config.el2_root.clone(), DirSpec::new("%d", self.config.dir_mode))];
            self.create_all(&el2_roots, user).map_err(|e| FbeError::PrepareDirFailed(e.to_string()))?;
            self.create_all(&self.el2_sub_dirs(), user).map_err(|e| FbeError::PrepareDirFailed(e.to_string()))?;
        }
        self.create_all(&self.hmdfs_dirs(), user).map_err(|e| FbeError::PrepareDirFailed(e.to_string()))?;

        let mut users = self.users()?;
        users.insert(user, UserState::Prepared);
        info!(user = user.as_i32(), "user directories prepared");
        Ok(())
    }

    /// Removes the EL1/EL2/hmdfs trees. Attempts every removal even after
    /// one fails, to maximize cleanup, and returns the first error seen.
    #[instrument(skip(self))]
    pub fn destroy_user_dirs(&self, user: UserId, flags: KeyFlags) -> FbeResult<()> {
        self.check_state(user, UserState::Prepared)?;

        let mut first_err = None;
        let mut remove_dir = |path: PathBuf| {
            if path.exists() {
                if let Err(e) = std::fs::remove_dir_all(&path) {
                    warn!(path = %path.display(), error = %e, "failed to remove directory");
                    if first_err.is_none() {
                        first_err = Some(FbeError::DestroyDirFailed(e.to_string()));
                    }
                }
            }
        };

        if flags.contains(KeyFlags::EL1) {
            for (root, spec) in self.el1_root_dirs() {
                remove_dir(spec.render(&root, user));
            }
        }
        if flags.contains(KeyFlags::EL2) {
            remove_dir(self.config.el2_root.join(user.as_i32().to_string()));
        }
        for (root, spec) in self.hmdfs_dirs() {
            remove_dir(spec.render(&root, user));
        }

        if let Some(e) = first_err {
            return Err(e);
        }
        self.users()?.insert(user, UserState::Created);
        Ok(())
    }

    fn hmdfs_source(&self, user: UserId) -> PathBuf {
        self.config.el2_root.join(format!("{user}/hmdfs/files"))
    }

    fn hmdfs_target(&self, user: UserId) -> PathBuf {
        self.config.media_root.join(format!("{user}/local"))
    }

    /// Bind-mounts the per-user hmdfs source onto its public mount point.
    #[instrument(skip(self))]
    pub fn start_user(&self, user: UserId) -> FbeResult<()> {
        self.check_state(user, UserState::Prepared)?;
        bind_mount(&self.hmdfs_source(user), &self.hmdfs_target(user))?;
        self.users()?.insert(user, UserState::Started);
        info!(user = user.as_i32(), "user started");
        Ok(())
    }

    /// Unmounts the per-user bind mount, retrying on `EBUSY` up to
    /// [`UMOUNT_RETRY_TIMES`] times before giving up.
    #[instrument(skip(self))]
    pub fn stop_user(&self, user: UserId) -> FbeResult<()> {
        self.check_state(user, UserState::Started)?;
        let target = self.hmdfs_target(user);

        for _ in 0..UMOUNT_RETRY_TIMES {
            match unmount(&target) {
                Ok(()) => {
                    self.users()?.insert(user, UserState::Prepared);
                    info!(user = user.as_i32(), "user stopped");
                    return Ok(());
                }
                Err(e) if e.raw_os_error() == Some(libc::EBUSY) => continue,
                Err(e) => return Err(FbeError::UmountFailed(e.to_string())),
            }
        }
        Err(FbeError::UmountFailed(format!("{target:?} still busy after {UMOUNT_RETRY_TIMES} attempts")))
    }
}

fn bind_mount(source: &std::path::Path, target: &std::path::Path) -> FbeResult<()> {
    use std::ffi::CString;
    let src = CString::new(source.as_os_str().as_encoded_bytes()).map_err(|e| FbeError::MountFailed(e.to_string()))?;
    let dst = CString::new(target.as_os_str().as_encoded_bytes()).map_err(|e| FbeError::MountFailed(e.to_string()))?;
    let rc = unsafe {
        libc::mount(src.as_ptr(), dst.as_ptr(), std::ptr::null(), libc::MS_BIND, std::ptr::null())
    };
    if rc != 0 {
        return Err(FbeError::MountFailed(std::io::Error::last_os_error().to_string()));
    }
    Ok(())
}

fn unmount(target: &std::path::Path) -> std::io::Result<()> {
    use std::ffi::CString;
    let dst = CString::new(target.as_os_str().as_encoded_bytes())?;
    let rc = unsafe { libc::umount(dst.as_ptr()) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn set_mode(path: &std::path::Path, mode: u32) -> FbeResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(FbeError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (UserManager, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let config = DaemonConfig::rooted_at(tmp.path());
        (UserManager::new(config), tmp)
    }

    #[test]
    fn add_then_remove_user() {
        let (mgr, _tmp) = manager();
        let user = UserId::new(42);
        mgr.add_user(user).unwrap();
        mgr.remove_user(user).unwrap();
        assert!(mgr.users().unwrap().get(&user).is_none());
    }

    #[test]
    fn double_add_rejected() {
        let (mgr, _tmp) = manager();
        let user = UserId::new(1);
        mgr.add_user(user).unwrap();
        assert!(mgr.add_user(user).is_err());
    }

    #[test]
    fn prepare_requires_created_state() {
        let (mgr, _tmp) = manager();
        let user = UserId::new(7);
        assert!(mgr.prepare_user_dirs(user, KeyFlags::EL1).is_err());
    }

    #[test]
    fn prepare_then_destroy_round_trips() {
        let (mgr, _tmp) = manager();
        let user = UserId::new(100);
        mgr.add_user(user).unwrap();
        mgr.prepare_user_dirs(user, KeyFlags::EL1 | KeyFlags::EL2).unwrap();
        assert_eq!(*mgr.users().unwrap().get(&user).unwrap(), UserState::Prepared);
        mgr.destroy_user_dirs(user, KeyFlags::EL1 | KeyFlags::EL2).unwrap();
        assert_eq!(*mgr.users().unwrap().get(&user).unwrap(), UserState::Created);
    }

    #[test]
    fn starting_unprepared_user_is_rejected() {
        let (mgr, _tmp) = manager();
        let user = UserId::new(5);
        mgr.add_user(user).unwrap();
        assert!(mgr.start_user(user).is_err());
    }
}

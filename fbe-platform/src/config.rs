// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Daemon configuration.
//!
//! The distilled paths this core operates on (`/data/service/el1/...` and
//! friends) are hard-coded in the original design. Here they're
//! configuration defaults instead, loaded through `config`/`serde` the way
//! the donor pipeline loads its settings, so tests can point the whole
//! core at a [`tempfile::TempDir`] instead of requiring root and a real
//! kernel.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// `/data/service/el0` — device-wide, available before any user exists.
    pub el0_root: PathBuf,
    /// `/data/service/el1/public` — per-user, available once a user is
    /// created but before authentication.
    pub el1_root: PathBuf,
    /// `/data/service/el2` — per-user, available only after authentication.
    pub el2_root: PathBuf,
    /// `/data/app/el1`
    pub app_el1_root: PathBuf,
    /// `/data/chipset/el1`
    pub chipset_el1_root: PathBuf,
    /// `/storage/media`
    pub media_root: PathBuf,

    /// Directory mode applied to freshly created EL1/EL2/hmdfs roots.
    pub dir_mode: u32,

    /// The filesystem mount point keys are installed against via the
    /// kernel fscrypt ioctls.
    pub fs_mount_point: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            el0_root: PathBuf::from("/data/service/el0"),
            el1_root: PathBuf::from("/data/service/el1/public"),
            el2_root: PathBuf::from("/data/service/el2"),
            app_el1_root: PathBuf::from("/data/app/el1"),
            chipset_el1_root: PathBuf::from("/data/chipset/el1"),
            media_root: PathBuf::from("/storage/media"),
            dir_mode: 0o711,
            fs_mount_point: PathBuf::from("/data"),
        }
    }
}

impl DaemonConfig {
    /// Loads configuration from `path` (TOML), falling back to defaults for
    /// any field the file omits.
    pub fn load(path: &std::path::Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Config::try_from(&DaemonConfig::default())?)
            .add_source(config::File::from(path).required(false))
            .build()?
            .try_deserialize()
    }

    /// Builds a configuration rooted at `root`, for tests that need
    /// `/data/...`-shaped layout without touching the real filesystem.
    pub fn rooted_at(root: &std::path::Path) -> Self {
        Self {
            el0_root: root.join("el0"),
            el1_root: root.join("el1/public"),
            el2_root: root.join("el2"),
            app_el1_root: root.join("app_el1"),
            chipset_el1_root: root.join("chipset_el1"),
            media_root: root.join("media"),
            dir_mode: 0o711,
            fs_mount_point: root.to_path_buf(),
        }
    }

    pub fn storage_daemon_dir(&self) -> PathBuf {
        self.el0_root.join("storage_daemon")
    }

    pub fn device_el1_dir(&self) -> PathBuf {
        self.storage_daemon_dir().join("sd")
    }

    pub fn user_el1_root(&self) -> PathBuf {
        self.el1_root.join("storage_daemon/sd/el1")
    }

    pub fn user_el2_root(&self) -> PathBuf {
        self.el1_root.join("storage_daemon/sd/el2")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_distilled_paths() {
        let cfg = DaemonConfig::default();
        assert_eq!(cfg.device_el1_dir(), PathBuf::from("/data/service/el0/storage_daemon/sd"));
        assert_eq!(
            cfg.user_el1_root(),
            PathBuf::from("/data/service/el1/public/storage_daemon/sd/el1")
        );
    }

    #[test]
    fn rooted_config_stays_under_root() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = DaemonConfig::rooted_at(tmp.path());
        assert!(cfg.device_el1_dir().starts_with(tmp.path()));
    }
}

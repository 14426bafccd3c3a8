// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Admin command-line surface.
//!
//! Every subcommand is a thin, one-shot invocation of a single
//! [`fbe_platform::KeyManager`] or [`fbe_platform::UserManager`] operation —
//! this binary doesn't run as a long-lived service itself (see
//! [`crate::run_daemon`] for the resident mode), it's the tool an init
//! script or higher-level storage daemon shells out to.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fbe-daemon", version, about = "File-based-encryption key management core")]
pub struct Cli {
    /// Path to a TOML configuration file overriding the built-in defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Use verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run as a resident admin-request server until a shutdown signal arrives.
    Serve,

    /// Generate or restore the device-wide EL1 key. Idempotent.
    InitGlobalDeviceKey,

    /// Generate or restore the reserved global user's keys and restore every
    /// on-disk EL1 user key found at boot.
    InitGlobalUserKeys,

    /// Register a new user in the directory-lifecycle table.
    AddUser { user_id: i32 },

    /// Remove a user from the directory-lifecycle table. Requires the user
    /// to have no prepared directories.
    RemoveUser { user_id: i32 },

    /// Generate EL1/EL2 keys for a user. Auth is supplied as raw bytes on
    /// stdin; pass nothing to use the empty (no-credential) token.
    GenerateUserKeys {
        user_id: i32,
        #[arg(long)]
        el1: bool,
        #[arg(long)]
        el2: bool,
    },

    /// Tear down a user's keys, uninstalling them from the kernel first.
    DeleteUserKeys { user_id: i32 },

    /// Re-seal a user's EL2 key under a new auth token read from stdin.
    UpdateUserAuth { user_id: i32 },

    /// Restore and install a user's EL2 key under the auth token read from
    /// stdin (post-authentication unlock).
    ActiveUserKey { user_id: i32 },

    /// Remove a user's EL2 key from the kernel without deleting it on disk.
    InactiveUserKey { user_id: i32 },

    /// Create the EL1/EL2/hmdfs directory trees for a user.
    PrepareUserDirs {
        user_id: i32,
        #[arg(long)]
        el1: bool,
        #[arg(long)]
        el2: bool,
    },

    /// Remove the EL1/EL2/hmdfs directory trees for a user.
    DestroyUserDirs {
        user_id: i32,
        #[arg(long)]
        el1: bool,
        #[arg(long)]
        el2: bool,
    },

    /// Bind-mount the user's hmdfs storage into its public mount point.
    StartUser { user_id: i32 },

    /// Unmount the user's hmdfs bind mount, retrying on a busy mount point.
    StopUser { user_id: i32 },
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}

// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Module
//!
//! Sits outside the domain/platform layers and owns everything that touches
//! the process itself:
//!
//! - **Entry point** — parses CLI arguments and dispatches to a single
//!   [`fbe_platform::KeyManager`]/[`fbe_platform::UserManager`] operation, or
//!   starts the resident admin loop.
//! - **Signal handling** — SIGTERM/SIGINT trigger [`shutdown::ShutdownCoordinator`].
//! - **Platform abstraction** — [`platform`].
//! - **Exit codes** — [`exit_code`] maps [`fbe_domain::FbeError`] onto
//!   `sysexits.h`-style process exit statuses.

pub mod cli;
pub mod exit_code;
pub mod logger;
pub mod platform;
pub mod shutdown;

pub use cli::{Cli, Command};
pub use exit_code::{map_error_to_exit_code, result_to_exit_code, ExitCode};

use anyhow::Context;
use cli::Command as Cmd;
use fbe_domain::ports::keystore_gateway::AuthToken;
use fbe_domain::value_objects::encryption_level::KeyFlags;
use fbe_domain::value_objects::user_id::UserId;
use fbe_platform::infrastructure::adapters::{LinuxFsCryptControl, SoftwareKeystoreGateway};
use fbe_platform::{DaemonConfig, KeyManager, UserManager};
use shutdown::ShutdownCoordinator;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

/// Everything the dispatch loop needs, wired once at startup.
pub struct App {
    pub key_manager: KeyManager,
    pub user_manager: UserManager,
}

impl App {
    pub fn new(config: DaemonConfig) -> Self {
        let keystore = Arc::new(SoftwareKeystoreGateway::new());
        let fscrypt = Arc::new(LinuxFsCryptControl::new());
        let key_manager = KeyManager::new(config.clone(), keystore, fscrypt);
        let user_manager = UserManager::new(config);
        Self { key_manager, user_manager }
    }
}

fn read_auth_from_stdin() -> anyhow::Result<AuthToken> {
    let mut token = Vec::new();
    std::io::stdin().read_to_end(&mut token).context("reading auth token from stdin")?;
    Ok(AuthToken { token })
}

fn flags_from(el1: bool, el2: bool) -> KeyFlags {
    let mut flags = KeyFlags::from_bits(0);
    if el1 {
        flags = flags | KeyFlags::EL1;
    }
    if el2 {
        flags = flags | KeyFlags::EL2;
    }
    flags
}

/// Runs one subcommand to completion. Returns an error the caller maps to
/// an exit code via [`exit_code::result_to_exit_code`].
pub fn dispatch(app: &App, command: Command) -> anyhow::Result<()> {
    match command {
        Cmd::Serve => unreachable!("Serve is handled by run_daemon, not dispatch"),
        Cmd::InitGlobalDeviceKey => app.key_manager.init_global_device_key().map_err(anyhow::Error::from),
        Cmd::InitGlobalUserKeys => app.key_manager.init_global_user_keys().map_err(anyhow::Error::from),
        Cmd::AddUser { user_id } => app.user_manager.add_user(UserId::new(user_id)).map_err(anyhow::Error::from),
        Cmd::RemoveUser { user_id } => {
            app.user_manager.remove_user(UserId::new(user_id)).map_err(anyhow::Error::from)
        }
        Cmd::GenerateUserKeys { user_id, el1, el2 } => {
            let auth = read_auth_from_stdin()?;
            app.key_manager
                .generate_user_keys(UserId::new(user_id), flags_from(el1, el2), &auth)
                .map_err(anyhow::Error::from)
        }
        Cmd::DeleteUserKeys { user_id } => {
            app.key_manager.delete_user_keys(UserId::new(user_id)).map_err(anyhow::Error::from)
        }
        Cmd::UpdateUserAuth { user_id } => {
            let auth = read_auth_from_stdin()?;
            app.key_manager.update_user_auth(UserId::new(user_id), &auth).map_err(anyhow::Error::from)
        }
        Cmd::ActiveUserKey { user_id } => {
            let auth = read_auth_from_stdin()?;
            app.key_manager.active_user_key(UserId::new(user_id), &auth).map_err(anyhow::Error::from)
        }
        Cmd::InactiveUserKey { user_id } => {
            app.key_manager.inactive_user_key(UserId::new(user_id)).map_err(anyhow::Error::from)
        }
        Cmd::PrepareUserDirs { user_id, el1, el2 } => app
            .user_manager
            .prepare_user_dirs(UserId::new(user_id), flags_from(el1, el2))
            .map_err(anyhow::Error::from),
        Cmd::DestroyUserDirs { user_id, el1, el2 } => app
            .user_manager
            .destroy_user_dirs(UserId::new(user_id), flags_from(el1, el2))
            .map_err(anyhow::Error::from),
        Cmd::StartUser { user_id } => app.user_manager.start_user(UserId::new(user_id)).map_err(anyhow::Error::from),
        Cmd::StopUser { user_id } => app.user_manager.stop_user(UserId::new(user_id)).map_err(anyhow::Error::from),
    }
}

/// Installs SIGTERM/SIGINT handlers that trigger `coordinator.initiate_shutdown()`,
/// then blocks the calling thread until one arrives.
#[cfg(unix)]
pub fn run_until_signal(coordinator: &ShutdownCoordinator) {
    use std::sync::atomic::{AtomicBool, Ordering};
    static SIGNALED: AtomicBool = AtomicBool::new(false);

    extern "C" fn handler(_sig: libc::c_int) {
        SIGNALED.store(true, Ordering::SeqCst);
    }

    unsafe {
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }

    while !SIGNALED.load(Ordering::SeqCst) {
        coordinator.token().wait(Duration::from_millis(200));
        if coordinator.token().is_cancelled() {
            break;
        }
    }
    coordinator.initiate_shutdown();
}

/// Resident mode: brings up both global keys, then waits for a shutdown
/// signal before tearing down cleanly.
pub fn run_daemon(app: &App) -> anyhow::Result<()> {
    app.key_manager.init_global_device_key()?;
    app.key_manager.init_global_user_keys()?;

    let coordinator = ShutdownCoordinator::new(Duration::from_secs(shutdown::DEFAULT_GRACE_PERIOD_SECS));
    tracing::info!("fbe-daemon ready");
    run_until_signal(&coordinator);
    coordinator.wait_for_grace_period();
    tracing::info!("fbe-daemon shut down");
    Ok(())
}

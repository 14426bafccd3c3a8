// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

use fbe_bootstrap::cli::Command;
use fbe_bootstrap::{dispatch, result_to_exit_code, run_daemon, App};
use fbe_platform::{logging, DaemonConfig};

fn main() -> std::process::ExitCode {
    let cli = fbe_bootstrap::cli::parse();

    logging::init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => match DaemonConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load configuration from {}: {e}", path.display());
                return fbe_bootstrap::ExitCode::DataErr.into();
            }
        },
        None => DaemonConfig::default(),
    };

    let app = App::new(config);

    let result = match cli.command {
        Command::Serve => run_daemon(&app),
        other => dispatch(&app, other),
    };

    result_to_exit_code(result)
}

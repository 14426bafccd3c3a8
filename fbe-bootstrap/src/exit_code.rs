// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Maps [`fbe_domain::ErrorKind`] onto process exit codes following the BSD
//! `sysexits.h` convention, so a caller scripting this daemon's admin CLI can
//! branch on exit status instead of parsing stderr text.

use fbe_domain::{ErrorKind, FbeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Ok = 0,
    Usage = 64,
    DataErr = 65,
    NoInput = 66,
    Unavailable = 69,
    Software = 70,
    CantCreate = 73,
    Temporary = 75,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

pub fn map_error_to_exit_code(error: &FbeError) -> ExitCode {
    match error.kind() {
        ErrorKind::NotFound => ExitCode::NoInput,
        ErrorKind::AlreadyExists => ExitCode::DataErr,
        ErrorKind::BadState => ExitCode::DataErr,
        ErrorKind::MountFailed | ErrorKind::UmountFailed => ExitCode::Temporary,
        ErrorKind::PrepareDirFailed | ErrorKind::DestroyDirFailed => ExitCode::CantCreate,
        ErrorKind::NoMemory => ExitCode::Unavailable,
        ErrorKind::CryptoFailed => ExitCode::Software,
    }
}

pub fn result_to_exit_code(result: anyhow::Result<()>) -> std::process::ExitCode {
    match result {
        Ok(()) => ExitCode::Ok.into(),
        Err(e) => match e.downcast_ref::<FbeError>() {
            Some(fbe_err) => {
                tracing::error!(error = %fbe_err, "operation failed");
                map_error_to_exit_code(fbe_err).into()
            }
            None => {
                tracing::error!(error = %e, "operation failed");
                ExitCode::Software.into()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_no_input() {
        let err = FbeError::not_found("missing");
        assert_eq!(map_error_to_exit_code(&err), ExitCode::NoInput);
    }

    #[test]
    fn already_exists_maps_to_data_err() {
        let err = FbeError::already_exists("dup");
        assert_eq!(map_error_to_exit_code(&err), ExitCode::DataErr);
    }

    #[test]
    fn mount_failure_is_temporary() {
        let err = FbeError::MountFailed("busy".into());
        assert_eq!(map_error_to_exit_code(&err), ExitCode::Temporary);
    }
}

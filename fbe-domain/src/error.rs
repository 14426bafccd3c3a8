// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! Errors raised by the key-management core are grouped into a small set of
//! kinds so that callers outside this crate (an IPC façade, an admin CLI) can
//! map them onto whatever status representation they use, without depending
//! on the message text.

use thiserror::Error;

/// The taxonomy a caller cares about: not every distinct failure, just enough
/// to decide what status code or retry policy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoMemory,
    NotFound,
    AlreadyExists,
    BadState,
    MountFailed,
    UmountFailed,
    PrepareDirFailed,
    DestroyDirFailed,
    CryptoFailed,
}

/// Domain-specific errors for the key-management core.
#[derive(Error, Debug, Clone)]
pub enum FbeError {
    #[error("out of memory: {0}")]
    NoMemory(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid state: {0}")]
    BadState(String),

    #[error("mount failed: {0}")]
    MountFailed(String),

    #[error("unmount failed: {0}")]
    UmountFailed(String),

    #[error("failed to prepare directories: {0}")]
    PrepareDirFailed(String),

    #[error("failed to destroy directories: {0}")]
    DestroyDirFailed(String),

    #[error("cryptographic operation failed: {0}")]
    CryptoFailed(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl FbeError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn bad_state(msg: impl Into<String>) -> Self {
        Self::BadState(msg.into())
    }

    pub fn crypto_failed(msg: impl Into<String>) -> Self {
        Self::CryptoFailed(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Best-effort classification used by callers that need a stable, small
    /// set of outcomes (exit codes, IPC status) rather than the message text.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FbeError::NoMemory(_) => ErrorKind::NoMemory,
            FbeError::NotFound(_) => ErrorKind::NotFound,
            FbeError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            FbeError::BadState(_) => ErrorKind::BadState,
            FbeError::MountFailed(_) => ErrorKind::MountFailed,
            FbeError::UmountFailed(_) => ErrorKind::UmountFailed,
            FbeError::PrepareDirFailed(_) => ErrorKind::PrepareDirFailed,
            FbeError::DestroyDirFailed(_) => ErrorKind::DestroyDirFailed,
            FbeError::CryptoFailed(_)
            | FbeError::IoError(_)
            | FbeError::SerializationError(_)
            | FbeError::InternalError(_) => ErrorKind::CryptoFailed,
        }
    }

    /// Whether a caller might reasonably retry the operation unchanged.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FbeError::MountFailed(_) | FbeError::UmountFailed(_) | FbeError::IoError(_))
    }
}

impl From<std::io::Error> for FbeError {
    fn from(err: std::io::Error) -> Self {
        FbeError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for FbeError {
    fn from(err: serde_json::Error) -> Self {
        FbeError::SerializationError(err.to_string())
    }
}

pub type FbeResult<T> = Result<T, FbeError>;

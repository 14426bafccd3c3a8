// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # FBE Domain
//!
//! Pure, synchronous business logic for the file-based-encryption
//! key-management core: the key and sealed-context data model, the ports
//! the platform layer must implement (a hardware keystore, the kernel
//! filesystem-encryption control surface), value objects, and the error
//! taxonomy.
//!
//! Nothing in this crate touches a filesystem, a socket, or a kernel
//! ioctl directly — those concerns live behind the traits in [`ports`] and
//! are implemented by `fbe-platform`. This crate has no `tokio` dependency
//! either: every operation here is a plain, blocking function call.
//!
//! ## Domain-Driven Design concepts used here
//!
//! - **Value Objects** ([`value_objects`]): small, immutable, self-validating
//!   types such as [`value_objects::UserId`] and [`value_objects::EncryptionLevel`].
//! - **Ports** ([`ports`]): traits describing capabilities the domain needs
//!   from the outside world without depending on how they're implemented.
//! - **Errors** ([`error`]): a single taxonomy shared by every layer above
//!   this one.

pub mod error;
pub mod keys;
pub mod ports;
pub mod value_objects;

pub use error::{ErrorKind, FbeError, FbeResult};

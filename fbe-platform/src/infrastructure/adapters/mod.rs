// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Concrete implementations of the domain's ports.

pub mod fscrypt_linux;
pub mod keystore_sim;

pub use fscrypt_linux::LinuxFsCryptControl;
pub use keystore_sim::SoftwareKeystoreGateway;

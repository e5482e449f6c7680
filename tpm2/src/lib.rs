// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Pure Rust TPM 2.0 command layer
//!
//! This crate implements the subset of TPM 2.0 commands required to anchor
//! key-encryption-keys in a TPM, communicating directly with the TPM device
//! without C library dependencies.
//!
//! ## Features
//!
//! - **Cross-compilation friendly**: Easy to cross-compile for different targets
//! - **Direct device communication**: Talks directly to `/dev/tpmrm0` or `/dev/tpm0`
//!
//! ## Supported Commands
//!
//! - Key operations: `CreatePrimary` (storage and null hierarchies, with
//!   caller-supplied sensitive data), `Create`, `Load`, `FlushContext`
//! - Secret wrapping: `EncryptDecrypt` (AES-CFB), `RSA_Encrypt`, `RSA_Decrypt`
//!   (OAEP), under password or PCR policy authorization
//! - Random: `GetRandom`
//! - Sessions: PCR policy sessions (`StartAuthSession`, `PolicyPCR`,
//!   `PolicyGetDigest`), flushed on scope exit
//!
//! ## Example
//!
//! ```no_run
//! use tpm2::TpmContext;
//!
//! let mut ctx = TpmContext::new(None)?; // Auto-detect TPM device
//! let random_bytes = ctx.get_random(32)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

mod commands;
mod constants;
mod device;
mod session;
mod types;
mod wire;

pub use commands::TpmContext;
pub use constants::*;
pub use types::*;

// Re-export device for advanced usage
pub use device::{TpmCommand, TpmDevice, TpmResponse};
pub use session::PcrPolicySession;
pub use wire::{Marshal, Unmarshal, WireReader, WireWrite};

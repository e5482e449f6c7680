// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! # LetsConfide: TPM-bound secrets management
//!
//! LetsConfide secures small collections of named secrets (database
//! credentials, API keys) by binding their confidentiality to a TPM 2.0
//! module. Plaintext secrets are supplied in a YAML configuration; after the
//! first parse the file is rewritten to contain only ciphertext plus the key
//! material needed to reconstitute decryption, itself bound to TPM-resident
//! keys and to platform measurement state (PCRs).
//!
//! ## Architecture
//!
//! Three layers of keys protect the data:
//!
//! ```text
//! ┌─────────────────────┐   ┌──────────────────────┐   ┌─────────────────┐
//! │ TPM primary key     │──▶│ Storage KEK          │   │ Ephemeral KEK   │
//! │ (storage hierarchy) │   │ (PCR policy gated)   │   │ (null hierarchy)│
//! └─────────────────────┘   └──────────┬───────────┘   └────────┬────────┘
//!                                      │ wraps                  │ wraps
//!                           ┌──────────▼───────────┐   ┌────────▼────────┐
//!                           │ Storage DEK          │   │ Ephemeral DEK   │
//!                           │ (AES-256-GCM, host)  │   │ (AES-256-GCM)   │
//!                           └──────────┬───────────┘   └────────┬────────┘
//!                                      │ encrypts               │ encrypts
//!                           ┌──────────▼───────────┐   ┌────────▼────────┐
//!                           │ Persisted secrets    │   │ In-memory values│
//!                           └──────────────────────┘   └─────────────────┘
//! ```
//!
//! Data encryption keys exist at rest only in TPM-wrapped form and are
//! resolved into RAM for the minimum window required; every resolved key and
//! intermediate plaintext buffer is erased on scope exit.
//!
//! ## Usage
//!
//! ```no_run
//! use letsconfide::platform::tpm::TpmDeviceFactory;
//!
//! # fn main() -> anyhow::Result<()> {
//! let factory = TpmDeviceFactory::new(None)?;
//! let manager = letsconfide::parse("secrets.yaml", &factory)?;
//!
//! let session = manager.start_data_access_session()?;
//! let password = session.decrypt("database_pwd")?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
mod crypto;
mod dek;
mod headers;
mod blob;
mod manager;
mod parser;
pub mod platform;

pub use blob::EncryptedBlob;
pub use dek::{HostDek, ResolvedDek, IV_SIZE, KEY_SIZE, SEED_SIZE};
pub use headers::{CipherKind, ConfigHeaders, PcrHash};
pub use manager::{DataAccessSession, SecretsManager};
pub use parser::parse;

// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! The security-device seam.
//!
//! A [`SecurityDevice`] exposes the key-encryption-keys the host DEK layer
//! wraps under; [`DeviceFactory`] manufactures devices, either fresh (first
//! ingest) or reconstituted from persisted tokens (reopen). The production
//! implementation is TPM-backed; tests substitute a software fake.

use anyhow::Result;
use zeroize::Zeroizing;

use crate::headers::ConfigHeaders;

pub mod tpm;

/// A device holding the TPM-resident key-encryption-keys.
///
/// All operations are blocking and may take hundreds of milliseconds; the
/// TPM-backed implementation serializes every command behind a process-wide
/// mutex. Implementations flush device-held resources when dropped.
pub trait SecurityDevice {
    /// Wrap a data encryption key under the persistent storage KEK.
    fn wrap(&mut self, dek: &[u8]) -> Result<Vec<u8>>;

    /// Unwrap a storage-wrapped data encryption key.
    fn unwrap(&mut self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>>;

    /// Wrap a data encryption key under the ephemeral KEK.
    fn wrap_ephemeral(&mut self, dek: &[u8]) -> Result<Vec<u8>>;

    /// Unwrap an ephemeral-wrapped data encryption key.
    fn unwrap_ephemeral(&mut self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>>;

    /// Draw random bytes from the device RNG.
    fn random_bytes(&mut self, n: usize) -> Result<Vec<u8>>;
}

/// A factory responsible for manufacturing [`SecurityDevice`]s.
pub trait DeviceFactory {
    /// Open a device reconstituted from persisted device tokens.
    fn open_device(
        &self,
        headers: &ConfigHeaders,
        device_tokens: &[Vec<u8>],
    ) -> Result<Box<dyn SecurityDevice>>;

    /// Create a new device and return the persistent tokens that later
    /// reconstitute its state from storage.
    fn create_device(
        &self,
        headers: &ConfigHeaders,
    ) -> Result<(Box<dyn SecurityDevice>, Vec<Vec<u8>>)>;
}

// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Host-side data encryption keys.
//!
//! A [`HostDek`] is an AES-256-GCM key applied to data on the host CPU. At
//! rest it exists only in device-wrapped form; [`HostDek::resolve`] produces
//! the short-lived cleartext copy, which erases itself when dropped.
//!
//! The 64-byte seed determines the GCM parameters: the IV is the first 12
//! bytes, the associated data the remaining 52.

use anyhow::{bail, Result};
use zeroize::Zeroizing;

use crate::crypto::{aes_gcm_open, aes_gcm_seal, is_zero};
use crate::platform::SecurityDevice;

/// Key size in bytes (AES-256).
pub const KEY_SIZE: usize = 32;
/// Seed size in bytes.
pub const SEED_SIZE: usize = 64;
/// GCM initialization vector size in bytes.
pub const IV_SIZE: usize = 12;

/// A data encryption key held in device-wrapped form.
#[derive(Debug, Clone)]
pub struct HostDek {
    is_ephemeral: bool,
    wrapped: Vec<u8>,
    iv: [u8; IV_SIZE],
    aad: Vec<u8>,
}

impl HostDek {
    /// Generate a new key with a fresh seed drawn from the device.
    pub fn generate(is_ephemeral: bool, device: &mut dyn SecurityDevice) -> Result<Self> {
        let seed = device.random_bytes(SEED_SIZE)?;
        Self::generate_with_seed(is_ephemeral, device, &seed)
    }

    /// Generate a new key using the caller's seed.
    ///
    /// The key is drawn from the device RNG independently of the seed.
    /// Candidates whose first 16 bytes are all zero are resampled; the
    /// behavior is preserved for reproducibility, not as a security measure.
    pub fn generate_with_seed(
        is_ephemeral: bool,
        device: &mut dyn SecurityDevice,
        seed: &[u8],
    ) -> Result<Self> {
        if seed.len() != SEED_SIZE {
            bail!("Invalid seed size {}", seed.len());
        }
        let key = loop {
            let candidate = Zeroizing::new(device.random_bytes(KEY_SIZE)?);
            if candidate.len() != KEY_SIZE {
                bail!("Device returned a key of unexpected size");
            }
            if !is_zero(&candidate[..KEY_SIZE / 2]) {
                break candidate;
            }
        };
        let wrapped = if is_ephemeral {
            device.wrap_ephemeral(&key)?
        } else {
            device.wrap(&key)?
        };
        Self::from_parts(is_ephemeral, wrapped, seed)
    }

    /// Reconstitute a key from its wrapped form and seed. No device call.
    pub fn from_parts(is_ephemeral: bool, wrapped: Vec<u8>, seed: &[u8]) -> Result<Self> {
        if seed.len() != SEED_SIZE {
            bail!("Invalid seed size {}", seed.len());
        }
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&seed[..IV_SIZE]);
        Ok(Self {
            is_ephemeral,
            wrapped,
            iv,
            aad: seed[IV_SIZE..].to_vec(),
        })
    }

    /// The device-wrapped key bytes.
    pub fn wrapped(&self) -> &[u8] {
        &self.wrapped
    }

    /// Unwrap this key through the device, yielding a short-lived cleartext
    /// copy. Resolution is the expensive step: it blocks on the TPM.
    pub fn resolve(&self, device: &mut dyn SecurityDevice) -> Result<ResolvedDek> {
        let cleartext = if self.is_ephemeral {
            device.unwrap_ephemeral(&self.wrapped)?
        } else {
            device.unwrap(&self.wrapped)?
        };
        if cleartext.len() != KEY_SIZE {
            bail!("Unexpected decrypted key size");
        }
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(&cleartext);
        Ok(ResolvedDek {
            key,
            iv: self.iv,
            aad: self.aad.clone(),
        })
    }

    /// Resolve, encrypt, and drop the cleartext key again.
    pub fn encrypt(&self, device: &mut dyn SecurityDevice, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.resolve(device)?.encrypt(plaintext)
    }

    /// Resolve, decrypt, and drop the cleartext key again.
    pub fn decrypt(
        &self,
        device: &mut dyn SecurityDevice,
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        self.resolve(device)?.decrypt(ciphertext)
    }
}

/// A resolved (cleartext) copy of a [`HostDek`]. The key bytes are erased
/// when the value is dropped, on success and failure paths alike.
pub struct ResolvedDek {
    key: Zeroizing<[u8; KEY_SIZE]>,
    iv: [u8; IV_SIZE],
    aad: Vec<u8>,
}

impl std::fmt::Debug for ResolvedDek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedDek").finish_non_exhaustive()
    }
}

impl ResolvedDek {
    /// Encrypt with the resolved key. The error is deliberately opaque.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        aes_gcm_seal(&self.key, &self.iv, &self.aad, plaintext)
            .map_err(|_| anyhow::anyhow!("Could not encrypt data: Plain text is invalid."))
    }

    /// Decrypt with the resolved key. A tag mismatch is fatal and the error
    /// is deliberately opaque.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        aes_gcm_open(&self.key, &self.iv, &self.aad, ciphertext)
            .map_err(|_| anyhow::anyhow!("Could not decrypt data: Invalid cipher text."))
    }
}

// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! The persisted form of a sealed configuration.

/// Encrypted data as stored in the sealed YAML file.
///
/// `device_tokens` is the ordered list of opaque byte arrays the security
/// device needs to reconstitute its storage key; for a TPM this is the
/// private and public blobs of the storage KEK.
#[derive(Debug, Clone)]
pub struct EncryptedBlob {
    seed: Vec<u8>,
    encrypted_key: Vec<u8>,
    cipher_data: Vec<u8>,
    device_tokens: Vec<Vec<u8>>,
}

impl EncryptedBlob {
    pub fn new(
        seed: Vec<u8>,
        encrypted_key: Vec<u8>,
        cipher_data: Vec<u8>,
        device_tokens: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            seed,
            encrypted_key,
            cipher_data,
            device_tokens,
        }
    }

    /// The seed a non-ephemeral host DEK is reconstituted from.
    pub fn seed(&self) -> &[u8] {
        &self.seed
    }

    /// The device-wrapped data encryption key.
    pub fn encrypted_key(&self) -> &[u8] {
        &self.encrypted_key
    }

    /// The serialized secrets list, encrypted under the storage DEK.
    pub fn cipher_data(&self) -> &[u8] {
        &self.cipher_data
    }

    pub fn device_tokens(&self) -> &[Vec<u8>] {
        &self.device_tokens
    }
}

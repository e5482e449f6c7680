// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! DEK wrap/unwrap framing for AES-CFB key-encryption-keys.
//!
//! The handler owns the stored form of a CFB-wrapped DEK: the 32-byte key is
//! extended with 32 bytes of random padding before encryption, and the
//! emitted frame is the sized-byte-array `[iv, ciphertext]`. The frame IV is
//! drawn fresh for every wrap and rejected if all-zero.

use anyhow::{bail, Context, Result};
use zeroize::Zeroizing;

use crate::codec;
use crate::crypto::is_zero;
use crate::dek::KEY_SIZE;

/// CFB initialization vector size (one AES block).
pub(crate) const CFB_IV_SIZE: usize = 16;
/// Size of the padded block fed into the cipher.
pub(crate) const WRAPPED_PAYLOAD_SIZE: usize = 2 * KEY_SIZE;

/// The cipher backing a wrap: a device-held AES-CFB key plus the device RNG.
pub(crate) trait CfbKek {
    fn random_bytes(&mut self, n: usize) -> Result<Vec<u8>>;

    /// Encrypt one payload. `frame_iv` is the IV recorded in the emitted
    /// frame; a backing with a fixed device-side IV may ignore it.
    fn cfb_encrypt(&mut self, frame_iv: &[u8], data: &[u8]) -> Result<Vec<u8>>;

    fn cfb_decrypt(&mut self, frame_iv: &[u8], data: &[u8]) -> Result<Vec<u8>>;
}

/// Wrap a 32-byte DEK.
pub(crate) fn wrap_dek(kek: &mut dyn CfbKek, dek: &[u8]) -> Result<Vec<u8>> {
    if dek.len() != KEY_SIZE {
        bail!("Unexpected AES256 key size");
    }

    let mut input = Zeroizing::new(Vec::with_capacity(WRAPPED_PAYLOAD_SIZE));
    input.extend_from_slice(dek);
    input.extend_from_slice(&kek.random_bytes(KEY_SIZE)?);

    let iv = loop {
        let candidate = kek.random_bytes(CFB_IV_SIZE)?;
        if !is_zero(&candidate) {
            break candidate;
        }
    };

    let ciphertext = kek.cfb_encrypt(&iv, &input)?;
    codec::encode(&[iv.as_slice(), ciphertext.as_slice()])
}

/// Unwrap a wrapped DEK. The inverse of [`wrap_dek`].
pub(crate) fn unwrap_dek(kek: &mut dyn CfbKek, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let parts = codec::decode(wrapped).context("Encrypted key format is invalid")?;
    if parts.len() != 2 {
        bail!("Encrypted key format is invalid");
    }
    let decrypted = Zeroizing::new(kek.cfb_decrypt(&parts[0], &parts[1])?);
    if decrypted.len() != WRAPPED_PAYLOAD_SIZE {
        bail!("Unexpected decrypted key size");
    }
    Ok(Zeroizing::new(decrypted[..KEY_SIZE].to_vec()))
}

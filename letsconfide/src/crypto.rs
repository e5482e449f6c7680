// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Host-side cryptographic primitives: AES-256-GCM and PKCS#7 padding.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{anyhow, bail, Result};
use zeroize::Zeroizing;

/// Block size the secrets layer pads names and values to.
pub(crate) const PAD_BLOCK: usize = 32;

/// Encrypt or decrypt with AES-256-GCM (12-byte IV, 128-bit tag).
///
/// The associated data is authenticated by the GCM MAC but not encrypted.
/// Failures are reported without any key or text material.
pub(crate) fn aes_gcm_seal(
    key: &[u8; 32],
    iv: &[u8; 12],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| anyhow!("Invalid AES-256 key"))?;
    cipher
        .encrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| anyhow!("AES-GCM encryption failed"))
}

pub(crate) fn aes_gcm_open(
    key: &[u8; 32],
    iv: &[u8; 12],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| anyhow!("Invalid AES-256 key"))?;
    cipher
        .decrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| anyhow!("AES-GCM decryption failed"))
}

/// Add PKCS#7 padding. A full block of padding is appended when the input
/// length is already a multiple of the block size.
pub(crate) fn pkcs7_pad(data: &[u8]) -> Zeroizing<Vec<u8>> {
    let pad = PAD_BLOCK - (data.len() % PAD_BLOCK);
    let mut result = Zeroizing::new(Vec::with_capacity(data.len() + pad));
    result.extend_from_slice(data);
    result.resize(data.len() + pad, pad as u8);
    result
}

/// Remove PKCS#7 padding, verifying that the trailing pad bytes all carry the
/// pad length.
pub(crate) fn pkcs7_strip(padded: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let pad = match padded.last() {
        Some(&b) if b as usize >= 1 && b as usize <= PAD_BLOCK => b as usize,
        _ => bail!("Unable to remove padding in encrypted data"),
    };
    if padded.len() < pad || padded[padded.len() - pad..].iter().any(|&b| b as usize != pad) {
        bail!("Unable to remove padding in encrypted data");
    }
    Ok(Zeroizing::new(padded[..padded.len() - pad].to_vec()))
}

/// Whether every byte of the sequence is zero.
pub(crate) fn is_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

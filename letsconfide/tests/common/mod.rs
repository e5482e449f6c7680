// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! A software security device for tests.
//!
//! The fake derives its storage wrapping key from the device tokens with
//! HMAC-SHA256, wraps with AES-256-GCM under a fixed nonce and treats the
//! ephemeral wrap as the identity. Fixed nonces are not secure; this exists
//! only to exercise the host-side layers without TPM hardware.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use letsconfide::platform::{DeviceFactory, SecurityDevice};
use letsconfide::ConfigHeaders;

const TEST_NONCE: &[u8; 12] = b"0123456789ab";
const TOKEN_SIZE: usize = 128;

pub struct FakeDeviceFactory;

impl DeviceFactory for FakeDeviceFactory {
    fn open_device(
        &self,
        _headers: &ConfigHeaders,
        device_tokens: &[Vec<u8>],
    ) -> Result<Box<dyn SecurityDevice>> {
        Ok(Box::new(FakeSecurityDevice::from_tokens(
            device_tokens.to_vec(),
        )?))
    }

    fn create_device(
        &self,
        _headers: &ConfigHeaders,
    ) -> Result<(Box<dyn SecurityDevice>, Vec<Vec<u8>>)> {
        let tokens = vec![random_bytes(TOKEN_SIZE), random_bytes(TOKEN_SIZE)];
        let device = FakeSecurityDevice::from_tokens(tokens.clone())?;
        Ok((Box::new(device), tokens))
    }
}

struct FakeSecurityDevice {
    aes256_key: [u8; 32],
}

impl FakeSecurityDevice {
    fn from_tokens(tokens: Vec<Vec<u8>>) -> Result<Self> {
        if tokens.len() != 2 {
            return Err(anyhow!("fake device expects 2 tokens, got {}", tokens.len()));
        }
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&tokens[0])
            .map_err(|_| anyhow!("invalid HMAC key"))?;
        mac.update(&tokens[1]);
        let aes256_key: [u8; 32] = mac.finalize().into_bytes().into();
        Ok(Self { aes256_key })
    }
}

impl SecurityDevice for FakeSecurityDevice {
    fn wrap(&mut self, dek: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(&self.aes256_key).expect("key size");
        cipher
            .encrypt(Nonce::from_slice(TEST_NONCE), dek)
            .map_err(|_| anyhow!("fake wrap failed"))
    }

    fn unwrap(&mut self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let cipher = Aes256Gcm::new_from_slice(&self.aes256_key).expect("key size");
        cipher
            .decrypt(Nonce::from_slice(TEST_NONCE), wrapped)
            .map(Zeroizing::new)
            .map_err(|_| anyhow!("fake unwrap failed"))
    }

    fn wrap_ephemeral(&mut self, dek: &[u8]) -> Result<Vec<u8>> {
        Ok(dek.to_vec())
    }

    fn unwrap_ephemeral(&mut self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(wrapped.to_vec()))
    }

    fn random_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(random_bytes(n))
    }
}

fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 command implementations
//!
//! This module provides high-level TPM operations.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

use super::constants::*;
use super::device::*;
use super::session::PcrPolicySession;
use super::types::*;

/// Pure Rust TPM context
pub struct TpmContext {
    device: TpmDevice,
}

impl TpmContext {
    /// Create a new TPM context with the given device path
    pub fn new(tcti_path: Option<&str>) -> Result<Self> {
        let device = match tcti_path {
            Some(path) => TpmDevice::open(path)?,
            None => TpmDevice::detect()?,
        };

        Ok(Self { device })
    }

    /// Get the device path
    pub fn device_path(&self) -> &Path {
        self.device.path()
    }

    // ==================== Random Number Generation ====================

    /// Generate random bytes using the TPM's hardware RNG
    pub fn get_random(&mut self, num_bytes: usize) -> Result<Vec<u8>> {
        tpm_get_random(&mut self.device, num_bytes)
    }

    // ==================== Sessions ====================

    /// Start a PCR policy session bound to the given selection.
    pub fn begin_policy_session(&mut self, pcrs: &TpmlPcrSelection) -> Result<PcrPolicySession<'_>> {
        PcrPolicySession::begin(&mut self.device, pcrs)
    }

    // ==================== Key Operations ====================

    /// Create a primary key in the specified hierarchy.
    ///
    /// `sensitive` carries the caller-supplied authValue and secret data;
    /// null-hierarchy keys are deterministically recreated from the same
    /// sensitive values and template.
    pub fn create_primary(
        &mut self,
        hierarchy: u32,
        template: &TpmtPublic,
        sensitive: &Tpm2bSensitiveCreate,
        creation_pcrs: &TpmlPcrSelection,
    ) -> Result<u32> {
        let public = Tpm2bPublic::from_template(template);

        let mut cmd = TpmCommand::with_sessions(TpmCc::CreatePrimary);
        // primaryHandle (hierarchy)
        cmd.handle(hierarchy);
        // Authorization area
        cmd.auth_none();
        // inSensitive
        cmd.append(sensitive);
        // inPublic
        cmd.append(&public);
        // outsideInfo (empty)
        cmd.sized_empty();
        // creationPCR
        cmd.append(creation_pcrs);

        let response = self.device.execute(&cmd.finalize())?;
        response.require_ok().context("CreatePrimary failed")?;

        // For commands with sessions, the handle comes BEFORE the parameter
        // size in the response.
        let handle = response.reader().be_u32()?;

        debug!("created primary key with handle 0x{:08x}", handle);
        Ok(handle)
    }

    /// Load a key from its private and public blobs under a parent.
    pub fn load(&mut self, parent_handle: u32, private: &[u8], public: &[u8]) -> Result<u32> {
        let mut cmd = TpmCommand::with_sessions(TpmCc::Load);
        // parentHandle
        cmd.handle(parent_handle);
        // Authorization area
        cmd.auth_none();
        // inPrivate
        cmd.sized(private);
        // inPublic
        cmd.sized(public);

        let response = self.device.execute(&cmd.finalize())?;
        response.require_ok().context("Load failed")?;

        let handle = response.reader().be_u32()?;

        debug!("loaded key with handle 0x{:08x}", handle);
        Ok(handle)
    }

    /// Flush a context (handle)
    pub fn flush_context(&mut self, handle: u32) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::FlushContext);
        cmd.handle(handle);

        let response = self.device.execute(&cmd.finalize())?;
        response.require_ok().context("FlushContext failed")?;

        Ok(())
    }

    // ==================== Wrapping Operations ====================

    /// Run `EncryptDecrypt` on a symmetric key authorized by password.
    pub fn encrypt_decrypt(
        &mut self,
        key_handle: u32,
        auth_value: &[u8],
        decrypt: bool,
        iv: &[u8],
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let mut cmd = TpmCommand::with_sessions(TpmCc::EncryptDecrypt);
        cmd.handle(key_handle);
        cmd.auth_password(auth_value);
        // decrypt (yes/no)
        cmd.byte(decrypt as u8);
        // mode
        cmd.be_u16(TpmAlgId::Cfb.to_u16());
        // ivIn
        cmd.sized(iv);
        // inData
        cmd.sized(data);

        let response = self.device.execute(&cmd.finalize())?;
        response.require_ok().context("EncryptDecrypt failed")?;

        let out_data = response.params()?.sized()?;
        Ok(out_data)
    }

    /// Run `RSA_Encrypt` (OAEP-SHA256). A public-key operation: no
    /// authorization is required.
    pub fn rsa_encrypt(&mut self, key_handle: u32, message: &[u8]) -> Result<Vec<u8>> {
        let mut cmd = TpmCommand::new(TpmCc::RsaEncrypt);
        cmd.handle(key_handle);
        // message
        cmd.sized(message);
        // inScheme
        cmd.append(&TpmtRsaScheme::oaep_sha256());
        // label (empty)
        cmd.sized_empty();

        let response = self.device.execute(&cmd.finalize())?;
        response.require_ok().context("RSA_Encrypt failed")?;

        let out_data = response.params()?.sized()?;
        Ok(out_data)
    }

    /// Run `RSA_Decrypt` (OAEP-SHA256) on a key authorized by password.
    pub fn rsa_decrypt(
        &mut self,
        key_handle: u32,
        auth_value: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        let mut cmd = TpmCommand::with_sessions(TpmCc::RsaDecrypt);
        cmd.handle(key_handle);
        cmd.auth_password(auth_value);
        // cipherText
        cmd.sized(ciphertext);
        // inScheme
        cmd.append(&TpmtRsaScheme::oaep_sha256());
        // label (empty)
        cmd.sized_empty();

        let response = self.device.execute(&cmd.finalize())?;
        response.require_ok().context("RSA_Decrypt failed")?;

        let message = response.params()?.sized()?;
        Ok(message)
    }
}

/// Generate random bytes from the TPM. The TPM returns at most 48 bytes per
/// `GetRandom`, so larger requests loop and concatenate.
pub(crate) fn tpm_get_random(device: &mut TpmDevice, num_bytes: usize) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(num_bytes);

    while result.len() < num_bytes {
        let remaining = num_bytes - result.len();
        let request_size = remaining.min(48) as u16;

        let mut cmd = TpmCommand::new(TpmCc::GetRandom);
        cmd.be_u16(request_size);

        let response = device.execute(&cmd.finalize())?;
        response.require_ok().context("GetRandom failed")?;

        let random_bytes = response.params()?.sized()?;
        result.extend_from_slice(&random_bytes);
    }

    result.truncate(num_bytes);
    Ok(result)
}

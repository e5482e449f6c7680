// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 PCR policy sessions
//!
//! A policy session authorizes storage-key operations against the current
//! platform measurement state. The session handle is a TPM resource; the
//! guard flushes it on every exit path.

use anyhow::{Context, Result};

use super::commands::tpm_get_random;
use super::constants::*;
use super::device::*;
use super::types::*;
use super::wire::Unmarshal;

/// A PCR policy session, flushed when the guard is dropped.
///
/// The guard holds exclusive access to the device for its lifetime, so every
/// command issued under the session goes through the guard.
pub struct PcrPolicySession<'a> {
    device: &'a mut TpmDevice,
    handle: u32,
}

impl<'a> PcrPolicySession<'a> {
    /// Start a policy session and immediately bind it to the given PCR
    /// selection. The empty PCR digest instructs the TPM to compute the
    /// digest from the current PCR contents.
    pub fn begin(device: &'a mut TpmDevice, pcrs: &TpmlPcrSelection) -> Result<Self> {
        let nonce_caller = tpm_get_random(device, 16)?;

        let mut cmd = TpmCommand::new(TpmCc::StartAuthSession);
        // tpmKey (TPM_RH_NULL: not a salted session)
        cmd.handle(tpm_rh::NULL);
        // bind (TPM_RH_NULL: not a bound session)
        cmd.handle(tpm_rh::NULL);
        // nonceCaller
        cmd.sized(&nonce_caller);
        // encryptedSalt (empty)
        cmd.sized_empty();
        // sessionType
        cmd.byte(TpmSe::Policy as u8);
        // symmetric (NULL: no parameter encryption)
        cmd.append(&TpmtSymDefObject::null());
        // authHash
        cmd.be_u16(TpmAlgId::Sha256.to_u16());

        let response = device.execute(&cmd.finalize())?;
        response.require_ok().context("StartAuthSession failed")?;

        let mut reader = response.reader();
        let handle = reader.be_u32()?;
        let _nonce_tpm = reader.sized()?;

        let mut session = Self { device, handle };
        session.policy_pcr(pcrs)?;
        Ok(session)
    }

    fn policy_pcr(&mut self, pcrs: &TpmlPcrSelection) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::PolicyPcr);
        // policySession
        cmd.handle(self.handle);
        // pcrDigest (empty: the TPM computes the digest of the selected PCRs)
        cmd.sized_empty();
        // pcrs
        cmd.append(pcrs);

        let response = self.device.execute(&cmd.finalize())?;
        response.require_ok().context("PolicyPCR failed")?;

        Ok(())
    }

    /// Read the session's current policy digest, for embedding as the
    /// `authPolicy` of a key created under this policy.
    pub fn policy_digest(&mut self) -> Result<Vec<u8>> {
        let mut cmd = TpmCommand::new(TpmCc::PolicyGetDigest);
        cmd.handle(self.handle);

        let response = self.device.execute(&cmd.finalize())?;
        response.require_ok().context("PolicyGetDigest failed")?;

        let digest = response.params()?.sized()?;
        Ok(digest)
    }

    /// Run `EncryptDecrypt` on a symmetric key authorized by this session.
    pub fn encrypt_decrypt(
        &mut self,
        key_handle: u32,
        decrypt: bool,
        iv: &[u8],
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let mut cmd = TpmCommand::with_sessions(TpmCc::EncryptDecrypt);
        cmd.handle(key_handle);
        cmd.auth_policy(self.handle);
        cmd.byte(decrypt as u8);
        cmd.be_u16(TpmAlgId::Cfb.to_u16());
        cmd.sized(iv);
        cmd.sized(data);

        let response = self.device.execute(&cmd.finalize())?;
        response.require_ok().context("EncryptDecrypt failed")?;

        let out_data = response.params()?.sized()?;
        Ok(out_data)
    }

    /// Run `RSA_Decrypt` (OAEP-SHA256) on a key authorized by this session.
    pub fn rsa_decrypt(&mut self, key_handle: u32, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let mut cmd = TpmCommand::with_sessions(TpmCc::RsaDecrypt);
        cmd.handle(key_handle);
        cmd.auth_policy(self.handle);
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

    /// Create a child object under the parent, embedding the supplied
    /// template. The parent is authorized with its own (empty) password; the
    /// session exists so the template can carry this policy's digest.
    pub fn create(&mut self, parent_handle: u32, template: &TpmtPublic) -> Result<(Vec<u8>, Vec<u8>)> {
        let public = Tpm2bPublic::from_template(template);

        let mut cmd = TpmCommand::with_sessions(TpmCc::Create);
        cmd.handle(parent_handle);
        cmd.auth_none();
        // inSensitive (empty: HMAC auth of children is not used)
        cmd.append(&Tpm2bSensitiveCreate::empty());
        // inPublic
        cmd.append(&public);
        // outsideInfo (empty)
        cmd.sized_empty();
        // creationPCR (empty)
        cmd.append(&TpmlPcrSelection::default());

        let response = self.device.execute(&cmd.finalize())?;
        response.require_ok().context("Create failed")?;

        let mut params = response.params()?;
        let out_private = Tpm2bPrivate::unmarshal(&mut params)?;
        let out_public = Tpm2bPublic::unmarshal(&mut params)?;

        Ok((out_private.buffer, out_public.public_area))
    }
}

impl Drop for PcrPolicySession<'_> {
    fn drop(&mut self) {
        let mut cmd = TpmCommand::new(TpmCc::FlushContext);
        cmd.handle(self.handle);
        match self.device.execute(&cmd.finalize()) {
            Ok(response) if response.ok() => {}
            Ok(response) => tracing::warn!(
                "leaked TPM session slot 0x{:08x}: flush rejected 0x{:08x}",
                self.handle,
                response.code
            ),
            Err(err) => tracing::warn!(
                "leaked TPM session slot 0x{:08x}: {err:#}",
                self.handle
            ),
        }
    }
}

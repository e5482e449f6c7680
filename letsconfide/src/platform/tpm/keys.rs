// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! TPM-resident key objects.
//!
//! Three keys anchor the hierarchy: a primary key in the storage hierarchy
//! (parent only), a storage KEK gated by the PCR policy, and an ephemeral
//! KEK in the null hierarchy that disappears with the TPM's reset and is
//! deterministically recreated from its token list.

use anyhow::{bail, Context, Result};
use tpm2::{
    tpm_rh, Tpm2bDigest, Tpm2bSensitiveCreate, TpmAlgId, TpmContext, TpmaObject, TpmlPcrSelection,
    TpmsPcrSelection, TpmtPublic, TpmtRsaScheme, TpmtSymDefObject,
};
use zeroize::Zeroizing;

use super::wrap::{self, CfbKek, CFB_IV_SIZE};
use crate::codec;
use crate::headers::{CipherKind, ConfigHeaders, PcrHash};

/// The PCR selection a policy session authenticates against.
pub(crate) fn pcr_selection(headers: &ConfigHeaders) -> TpmlPcrSelection {
    let alg = match headers.pcr_hash() {
        PcrHash::Sha1 => TpmAlgId::Sha1,
        PcrHash::Sha256 => TpmAlgId::Sha256,
    };
    TpmlPcrSelection::single(TpmsPcrSelection::from_mask(alg, headers.pcr_selection()))
}

/// Creation-PCR parameter naming PCR 0 in the SHA-256 bank.
fn creation_pcr0() -> TpmlPcrSelection {
    TpmlPcrSelection::single(TpmsPcrSelection::new(TpmAlgId::Sha256, vec![1, 0, 0]))
}

/// Create the primary key the storage KEK hangs off. Used only as a parent.
pub(crate) fn create_primary_key(ctx: &mut TpmContext, headers: &ConfigHeaders) -> Result<u32> {
    let kind = headers.primary_key_type();
    match kind {
        CipherKind::Aes128 | CipherKind::Aes256 => {
            let attributes = TpmaObject::new()
                .with_restricted()
                .with_decrypt()
                .with_fixed_tpm()
                .with_fixed_parent()
                .with_user_with_auth()
                .with_sensitive_data_origin();
            let template = TpmtPublic::aes_cfb(kind.key_bits(), attributes, Tpm2bDigest::empty());
            ctx.create_primary(
                tpm_rh::OWNER,
                &template,
                &Tpm2bSensitiveCreate::empty(),
                &creation_pcr0(),
            )
        }
        CipherKind::Rsa1024 | CipherKind::Rsa2048 => {
            let attributes = TpmaObject::new()
                .with_restricted()
                .with_decrypt()
                .with_fixed_tpm()
                .with_fixed_parent()
                .with_user_with_auth()
                .with_no_da()
                .with_sensitive_data_origin();
            // Parameter-encrypting primary: NULL scheme, AES-128-CFB symmetric.
            let template = TpmtPublic::rsa(
                kind.key_bits(),
                attributes,
                Tpm2bDigest::empty(),
                TpmtRsaScheme::null(),
                TpmtSymDefObject::aes_cfb(128),
            );
            ctx.create_primary(
                tpm_rh::OWNER,
                &template,
                &Tpm2bSensitiveCreate::empty(),
                &TpmlPcrSelection::default(),
            )
        }
    }
    .with_context(|| format!("Unable to create {} primary key", kind.name()))
}

/// The persistent storage KEK, a child of the primary gated by the PCR
/// policy. Tokens are the private and public blobs the key is reloaded from.
pub(crate) struct StorageKek {
    kind: CipherKind,
    handle: u32,
    tokens: Vec<Vec<u8>>,
}

impl StorageKek {
    /// Generate a new storage KEK under the primary, embedding the current
    /// policy digest as its `authPolicy`.
    pub(crate) fn create(
        ctx: &mut TpmContext,
        primary_handle: u32,
        headers: &ConfigHeaders,
    ) -> Result<Self> {
        let kind = headers.storage_key_type();
        let pcrs = pcr_selection(headers);

        let mut session = ctx.begin_policy_session(&pcrs)?;
        let policy_digest = Tpm2bDigest::new(session.policy_digest()?);
        let template = match kind {
            CipherKind::Aes128 | CipherKind::Aes256 => {
                let attributes = TpmaObject::new()
                    .with_sign_encrypt()
                    .with_decrypt()
                    .with_fixed_tpm()
                    .with_fixed_parent()
                    .with_sensitive_data_origin();
                TpmtPublic::aes_cfb(kind.key_bits(), attributes, policy_digest)
            }
            CipherKind::Rsa1024 | CipherKind::Rsa2048 => {
                let attributes = TpmaObject::new()
                    .with_decrypt()
                    .with_fixed_tpm()
                    .with_fixed_parent()
                    .with_no_da()
                    .with_sensitive_data_origin();
                TpmtPublic::rsa(
                    kind.key_bits(),
                    attributes,
                    policy_digest,
                    TpmtRsaScheme::oaep_sha256(),
                    TpmtSymDefObject::null(),
                )
            }
        };
        let (private, public) = session
            .create(primary_handle, &template)
            .context("Unable to create storage key")?;
        drop(session);

        let handle = ctx.load(primary_handle, &private, &public)?;
        Ok(Self {
            kind,
            handle,
            tokens: vec![private, public],
        })
    }

    /// Reconstitute a previously generated storage KEK from its tokens.
    pub(crate) fn load(
        ctx: &mut TpmContext,
        primary_handle: u32,
        headers: &ConfigHeaders,
        tokens: &[Vec<u8>],
    ) -> Result<Self> {
        if tokens.len() != 2 {
            bail!(
                "Could not reconstitute storage key invalid number of tokens {}",
                tokens.len()
            );
        }
        let handle = ctx
            .load(primary_handle, &tokens[0], &tokens[1])
            .context("Unable to load storage key")?;
        Ok(Self {
            kind: headers.storage_key_type(),
            handle,
            tokens: tokens.to_vec(),
        })
    }

    pub(crate) fn handle(&self) -> u32 {
        self.handle
    }

    pub(crate) fn tokens(&self) -> &[Vec<u8>] {
        &self.tokens
    }

    /// Wrap a DEK. AES keys emit the `[iv, ciphertext]` frame; RSA keys emit
    /// the raw OAEP ciphertext (a public-key operation, no session needed).
    pub(crate) fn wrap(
        &self,
        ctx: &mut TpmContext,
        pcrs: &TpmlPcrSelection,
        dek: &[u8],
    ) -> Result<Vec<u8>> {
        if self.kind.is_rsa() {
            return ctx.rsa_encrypt(self.handle, dek);
        }
        let iv = ctx.get_random(CFB_IV_SIZE)?;
        let mut session = ctx.begin_policy_session(pcrs)?;
        let ciphertext = session.encrypt_decrypt(self.handle, false, &iv, dek)?;
        drop(session);
        codec::encode(&[iv.as_slice(), ciphertext.as_slice()])
    }

    /// Unwrap a wrapped DEK under a fresh policy session.
    pub(crate) fn unwrap(
        &self,
        ctx: &mut TpmContext,
        pcrs: &TpmlPcrSelection,
        wrapped: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        if self.kind.is_rsa() {
            let mut session = ctx.begin_policy_session(pcrs)?;
            return Ok(Zeroizing::new(session.rsa_decrypt(self.handle, wrapped)?));
        }
        let parts = codec::decode(wrapped).context("Encrypted key format is invalid")?;
        if parts.len() != 2 {
            bail!("Encrypted key format is invalid");
        }
        let mut session = ctx.begin_policy_session(pcrs)?;
        let decrypted = session.encrypt_decrypt(self.handle, true, &parts[0], &parts[1])?;
        Ok(Zeroizing::new(decrypted))
    }
}

/// The ephemeral KEK, a primary key in the null hierarchy. Its authority
/// vanishes with the TPM's reset; the token list deterministically recreates
/// the same key within one platform cycle.
pub(crate) struct EphemeralKek {
    kind: CipherKind,
    handle: u32,
    tokens: Vec<Vec<u8>>,
}

impl EphemeralKek {
    /// Create the ephemeral KEK, generating fresh tokens if none are given.
    ///
    /// AES tokens are `[iv, authValue, secretData]`; RSA tokens are
    /// `[authValue, secretData]`.
    pub(crate) fn create(
        ctx: &mut TpmContext,
        headers: &ConfigHeaders,
        tokens: Option<&[Vec<u8>]>,
    ) -> Result<Self> {
        let kind = headers.ephemeral_key_type();
        match kind {
            CipherKind::Aes128 | CipherKind::Aes256 => {
                let tokens = match tokens {
                    None => vec![
                        // Initialization vector, one AES block.
                        ctx.get_random(CFB_IV_SIZE)?,
                        // authValue, sized to the object's SHA-256 name hash.
                        ctx.get_random(32)?,
                        // secretData must equal the key size.
                        ctx.get_random(usize::from(kind.key_bits() / 8))?,
                    ],
                    Some(t) => {
                        if t.len() != 3 {
                            bail!(
                                "Could not reconstitute ephemeral key invalid number of tokens {}",
                                t.len()
                            );
                        }
                        t.to_vec()
                    }
                };
                let attributes = TpmaObject::new()
                    .with_sign_encrypt()
                    .with_decrypt()
                    .with_fixed_tpm()
                    .with_fixed_parent()
                    .with_user_with_auth();
                let template =
                    TpmtPublic::aes_cfb(kind.key_bits(), attributes, Tpm2bDigest::empty());
                let sensitive =
                    Tpm2bSensitiveCreate::with_secret(tokens[1].clone(), tokens[2].clone());
                let handle = ctx
                    .create_primary(tpm_rh::NULL, &template, &sensitive, &creation_pcr0())
                    .context("Unable to create ephemeral key")?;
                Ok(Self {
                    kind,
                    handle,
                    tokens,
                })
            }
            CipherKind::Rsa1024 | CipherKind::Rsa2048 => {
                let tokens = match tokens {
                    None => vec![ctx.get_random(32)?, ctx.get_random(32)?],
                    Some(t) => {
                        if t.len() != 2 {
                            bail!(
                                "Could not reconstitute ephemeral key invalid number of tokens {}",
                                t.len()
                            );
                        }
                        t.to_vec()
                    }
                };
                let attributes = TpmaObject::new()
                    .with_decrypt()
                    .with_fixed_tpm()
                    .with_fixed_parent()
                    .with_no_da()
                    .with_user_with_auth()
                    .with_sensitive_data_origin();
                let template = TpmtPublic::rsa(
                    kind.key_bits(),
                    attributes,
                    Tpm2bDigest::empty(),
                    TpmtRsaScheme::oaep_sha256(),
                    TpmtSymDefObject::null(),
                );
                let sensitive =
                    Tpm2bSensitiveCreate::with_secret(tokens[0].clone(), tokens[1].clone());
                let handle = ctx
                    .create_primary(tpm_rh::NULL, &template, &sensitive, &TpmlPcrSelection::default())
                    .context("Unable to create ephemeral key")?;
                Ok(Self {
                    kind,
                    handle,
                    tokens,
                })
            }
        }
    }

    pub(crate) fn handle(&self) -> u32 {
        self.handle
    }

    pub(crate) fn tokens(&self) -> &[Vec<u8>] {
        &self.tokens
    }

    fn auth_value(&self) -> &[u8] {
        match self.kind {
            CipherKind::Aes128 | CipherKind::Aes256 => &self.tokens[1],
            CipherKind::Rsa1024 | CipherKind::Rsa2048 => &self.tokens[0],
        }
    }

    pub(crate) fn wrap(&self, ctx: &mut TpmContext, dek: &[u8]) -> Result<Vec<u8>> {
        if self.kind.is_rsa() {
            return ctx.rsa_encrypt(self.handle, dek);
        }
        let mut kek = EphemeralCipher { ctx, key: self };
        wrap::wrap_dek(&mut kek, dek)
    }

    pub(crate) fn unwrap(
        &self,
        ctx: &mut TpmContext,
        wrapped: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        if self.kind.is_rsa() {
            return Ok(Zeroizing::new(ctx.rsa_decrypt(
                self.handle,
                self.auth_value(),
                wrapped,
            )?));
        }
        let mut kek = EphemeralCipher { ctx, key: self };
        wrap::unwrap_dek(&mut kek, wrapped)
    }
}

/// CFB backing for the AES ephemeral key. The cipher always runs under the
/// fixed IV from the token list; the framed IV only randomizes the stored
/// form. The fixed IV is never applied to non-DEK payloads.
struct EphemeralCipher<'a> {
    ctx: &'a mut TpmContext,
    key: &'a EphemeralKek,
}

impl CfbKek for EphemeralCipher<'_> {
    fn random_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ctx.get_random(n)
    }

    fn cfb_encrypt(&mut self, _frame_iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        self.ctx.encrypt_decrypt(
            self.key.handle,
            self.key.auth_value(),
            false,
            &self.key.tokens[0],
            data,
        )
    }

    fn cfb_decrypt(&mut self, _frame_iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        self.ctx.encrypt_decrypt(
            self.key.handle,
            self.key.auth_value(),
            true,
            &self.key.tokens[0],
            data,
        )
    }
}

// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 data types

use anyhow::Result;

use super::constants::*;
use super::wire::{Marshal, Unmarshal, WireReader, WireWrite};

/// TPM2B_DIGEST - Variable length digest
#[derive(Debug, Clone, Default)]
pub struct Tpm2bDigest {
    pub buffer: Vec<u8>,
}

impl Tpm2bDigest {
    pub fn new(data: Vec<u8>) -> Self {
        Self { buffer: data }
    }

    pub fn empty() -> Self {
        Self { buffer: Vec::new() }
    }
}

impl Marshal for Tpm2bDigest {
    fn marshal(&self, out: &mut Vec<u8>) {
        out.sized(&self.buffer);
    }
}

/// TPMS_PCR_SELECTION - PCR selection for a single hash algorithm
#[derive(Debug, Clone)]
pub struct TpmsPcrSelection {
    pub hash: TpmAlgId,
    pub pcr_select: Vec<u8>, // Bitmap of selected PCRs
}

impl TpmsPcrSelection {
    pub fn new(hash: TpmAlgId, pcr_select: Vec<u8>) -> Self {
        Self { hash, pcr_select }
    }

    /// Build a selection from the low 24 bits of a mask.
    /// Byte 0 carries PCRs 0-7, byte 1 PCRs 8-15, byte 2 PCRs 16-23.
    pub fn from_mask(hash: TpmAlgId, mask: u32) -> Self {
        let pcr_select = vec![
            (mask & 0xFF) as u8,
            ((mask >> 8) & 0xFF) as u8,
            ((mask >> 16) & 0xFF) as u8,
        ];
        Self { hash, pcr_select }
    }
}

impl Marshal for TpmsPcrSelection {
    fn marshal(&self, out: &mut Vec<u8>) {
        out.be_u16(self.hash.to_u16());
        out.push(self.pcr_select.len() as u8);
        out.extend_from_slice(&self.pcr_select);
    }
}

/// TPML_PCR_SELECTION - List of PCR selections
#[derive(Debug, Clone, Default)]
pub struct TpmlPcrSelection {
    pub pcr_selections: Vec<TpmsPcrSelection>,
}

impl TpmlPcrSelection {
    pub fn single(selection: TpmsPcrSelection) -> Self {
        Self {
            pcr_selections: vec![selection],
        }
    }
}

impl Marshal for TpmlPcrSelection {
    fn marshal(&self, out: &mut Vec<u8>) {
        out.be_u32(self.pcr_selections.len() as u32);
        for selection in &self.pcr_selections {
            selection.marshal(out);
        }
    }
}

/// TPMT_SYM_DEF_OBJECT - Symmetric algorithm definition
#[derive(Debug, Clone, Copy)]
pub struct TpmtSymDefObject {
    pub algorithm: TpmAlgId,
    pub key_bits: u16,
    pub mode: TpmAlgId,
}

impl TpmtSymDefObject {
    pub fn null() -> Self {
        Self {
            algorithm: TpmAlgId::Null,
            key_bits: 0,
            mode: TpmAlgId::Null,
        }
    }

    pub fn aes_cfb(key_bits: u16) -> Self {
        Self {
            algorithm: TpmAlgId::Aes,
            key_bits,
            mode: TpmAlgId::Cfb,
        }
    }
}

impl Marshal for TpmtSymDefObject {
    fn marshal(&self, out: &mut Vec<u8>) {
        out.be_u16(self.algorithm.to_u16());
        if self.algorithm != TpmAlgId::Null {
            out.be_u16(self.key_bits);
            out.be_u16(self.mode.to_u16());
        }
    }
}

/// TPMT_RSA_SCHEME - RSA key scheme
#[derive(Debug, Clone, Copy)]
pub struct TpmtRsaScheme {
    pub scheme: TpmAlgId,
    pub hash_alg: Option<TpmAlgId>,
}

impl TpmtRsaScheme {
    pub fn null() -> Self {
        Self {
            scheme: TpmAlgId::Null,
            hash_alg: None,
        }
    }

    pub fn oaep_sha256() -> Self {
        Self {
            scheme: TpmAlgId::Oaep,
            hash_alg: Some(TpmAlgId::Sha256),
        }
    }
}

impl Marshal for TpmtRsaScheme {
    fn marshal(&self, out: &mut Vec<u8>) {
        out.be_u16(self.scheme.to_u16());
        if let Some(hash) = self.hash_alg {
            out.be_u16(hash.to_u16());
        }
    }
}

/// TPMS_RSA_PARMS - RSA key parameters
#[derive(Debug, Clone)]
pub struct TpmsRsaParms {
    pub symmetric: TpmtSymDefObject,
    pub scheme: TpmtRsaScheme,
    pub key_bits: u16,
    pub exponent: u32,
}

impl Marshal for TpmsRsaParms {
    fn marshal(&self, out: &mut Vec<u8>) {
        self.symmetric.marshal(out);
        self.scheme.marshal(out);
        out.be_u16(self.key_bits);
        out.be_u32(self.exponent);
    }
}

/// TPMT_PUBLIC - Public area template
#[derive(Debug, Clone)]
pub struct TpmtPublic {
    pub type_alg: TpmAlgId,
    pub name_alg: TpmAlgId,
    pub object_attributes: TpmaObject,
    pub auth_policy: Tpm2bDigest,
    pub parameters: TpmtPublicParms,
    pub unique: TpmtPublicUnique,
}

/// TPMU_PUBLIC_PARMS - Public parameters union
#[derive(Debug, Clone)]
pub enum TpmtPublicParms {
    /// TPMS_SYMCIPHER_PARMS is a bare TPMT_SYM_DEF_OBJECT
    SymCipher(TpmtSymDefObject),
    Rsa(TpmsRsaParms),
}

impl Marshal for TpmtPublicParms {
    fn marshal(&self, out: &mut Vec<u8>) {
        match self {
            TpmtPublicParms::SymCipher(parms) => parms.marshal(out),
            TpmtPublicParms::Rsa(parms) => parms.marshal(out),
        }
    }
}

/// TPMU_PUBLIC_ID - Unique identifier union
#[derive(Debug, Clone)]
pub enum TpmtPublicUnique {
    SymCipher(Vec<u8>), // TPM2B_DIGEST
    Rsa(Vec<u8>),       // TPM2B_PUBLIC_KEY_RSA
}

impl Marshal for TpmtPublicUnique {
    fn marshal(&self, out: &mut Vec<u8>) {
        match self {
            TpmtPublicUnique::SymCipher(digest) => out.sized(digest),
            TpmtPublicUnique::Rsa(modulus) => out.sized(modulus),
        }
    }
}

impl TpmtPublic {
    /// AES-CFB symmetric cipher template with SHA-256 name algorithm.
    pub fn aes_cfb(key_bits: u16, attributes: TpmaObject, auth_policy: Tpm2bDigest) -> Self {
        Self {
            type_alg: TpmAlgId::SymCipher,
            name_alg: TpmAlgId::Sha256,
            object_attributes: attributes,
            auth_policy,
            parameters: TpmtPublicParms::SymCipher(TpmtSymDefObject::aes_cfb(key_bits)),
            unique: TpmtPublicUnique::SymCipher(Vec::new()),
        }
    }

    /// RSA template with SHA-256 name algorithm and exponent 65537.
    pub fn rsa(
        key_bits: u16,
        attributes: TpmaObject,
        auth_policy: Tpm2bDigest,
        scheme: TpmtRsaScheme,
        symmetric: TpmtSymDefObject,
    ) -> Self {
        Self {
            type_alg: TpmAlgId::Rsa,
            name_alg: TpmAlgId::Sha256,
            object_attributes: attributes,
            auth_policy,
            parameters: TpmtPublicParms::Rsa(TpmsRsaParms {
                symmetric,
                scheme,
                key_bits,
                exponent: 65537,
            }),
            unique: TpmtPublicUnique::Rsa(Vec::new()),
        }
    }
}

impl Marshal for TpmtPublic {
    fn marshal(&self, out: &mut Vec<u8>) {
        out.be_u16(self.type_alg.to_u16());
        out.be_u16(self.name_alg.to_u16());
        out.be_u32(self.object_attributes.0);
        self.auth_policy.marshal(out);
        self.parameters.marshal(out);
        self.unique.marshal(out);
    }
}

/// TPM2B_PUBLIC - Public area with size prefix
#[derive(Debug, Clone)]
pub struct Tpm2bPublic {
    pub public_area: Vec<u8>, // Raw marshalled TPMT_PUBLIC
}

impl Tpm2bPublic {
    pub fn from_template(template: &TpmtPublic) -> Self {
        Self {
            public_area: template.to_bytes(),
        }
    }
}

impl Marshal for Tpm2bPublic {
    fn marshal(&self, out: &mut Vec<u8>) {
        out.sized(&self.public_area);
    }
}

impl Unmarshal for Tpm2bPublic {
    fn unmarshal(reader: &mut WireReader<'_>) -> Result<Self> {
        Ok(Self {
            public_area: reader.sized()?,
        })
    }
}

/// TPM2B_PRIVATE - Private area
#[derive(Debug, Clone)]
pub struct Tpm2bPrivate {
    pub buffer: Vec<u8>,
}

impl Marshal for Tpm2bPrivate {
    fn marshal(&self, out: &mut Vec<u8>) {
        out.sized(&self.buffer);
    }
}

impl Unmarshal for Tpm2bPrivate {
    fn unmarshal(reader: &mut WireReader<'_>) -> Result<Self> {
        Ok(Self {
            buffer: reader.sized()?,
        })
    }
}

/// TPM2B_SENSITIVE_CREATE - Sensitive data for object creation
#[derive(Debug, Clone, Default)]
pub struct Tpm2bSensitiveCreate {
    pub user_auth: Vec<u8>,
    pub data: Vec<u8>,
}

impl Tpm2bSensitiveCreate {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_secret(user_auth: Vec<u8>, data: Vec<u8>) -> Self {
        Self { user_auth, data }
    }
}

impl Marshal for Tpm2bSensitiveCreate {
    fn marshal(&self, out: &mut Vec<u8>) {
        // The inner TPMS_SENSITIVE_CREATE, wrapped with its own size.
        let mut inner = Vec::with_capacity(4 + self.user_auth.len() + self.data.len());
        inner.sized(&self.user_auth);
        inner.sized(&self.data);
        out.sized(&inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcr_selection_from_mask() {
        // Bit 16 of the mask selects PCR 16, i.e. bit 0 of byte 2.
        let sel = TpmsPcrSelection::from_mask(TpmAlgId::Sha256, 0x10000);
        assert_eq!(sel.pcr_select, vec![0x00, 0x00, 0x01]);

        // PCRs 0, 1, 2, 7 live in byte 0.
        let sel = TpmsPcrSelection::from_mask(TpmAlgId::Sha256, 0b1000_0111);
        assert_eq!(sel.pcr_select, vec![0x87, 0x00, 0x00]);
    }

    #[test]
    fn test_sym_def_marshal() {
        let def = TpmtSymDefObject::aes_cfb(256);
        assert_eq!(def.to_bytes(), vec![0x00, 0x06, 0x01, 0x00, 0x00, 0x43]);

        let null = TpmtSymDefObject::null();
        assert_eq!(null.to_bytes(), vec![0x00, 0x10]);
    }

    #[test]
    fn test_sensitive_create_marshal() {
        let sens = Tpm2bSensitiveCreate::with_secret(vec![0xAA; 2], vec![0xBB; 3]);
        // outer size (2) + auth tpm2b (2 + 2) + data tpm2b (2 + 3)
        let bytes = sens.to_bytes();
        assert_eq!(
            bytes,
            vec![0x00, 0x09, 0x00, 0x02, 0xAA, 0xAA, 0x00, 0x03, 0xBB, 0xBB, 0xBB]
        );
    }

    #[test]
    fn test_aes_template_marshal() {
        let template = TpmtPublic::aes_cfb(
            128,
            TpmaObject::new().with_decrypt().with_sign_encrypt(),
            Tpm2bDigest::empty(),
        );
        let bytes = template.to_bytes();
        // type (2) + nameAlg (2) + attributes (4) + authPolicy (2) + symdef (6) + unique (2)
        assert_eq!(bytes.len(), 18);
        assert_eq!(&bytes[0..2], &[0x00, 0x25]); // TPM_ALG_SYMCIPHER
        assert_eq!(&bytes[2..4], &[0x00, 0x0B]); // TPM_ALG_SHA256
    }
}

// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Configuration headers as specified in the input YAML file.

use anyhow::{bail, Result};
use std::hash::{Hash, Hasher};

/// Largest PCR selection mask; the selection uses only the first 24 bits.
const MAX_PCR_SELECTION: u32 = 0x00FF_FFFF;

/// Types of key-encryption-key ciphers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherKind {
    // AES-192 is disabled in the TPM reference implementation, see
    // TpmProfile.h in the TCG Part 4 supporting routines.
    Aes128,
    Aes256,
    Rsa1024,
    Rsa2048,
}

impl CipherKind {
    /// Number of bits defining the key.
    pub fn key_bits(self) -> u16 {
        match self {
            CipherKind::Aes128 => 128,
            CipherKind::Aes256 => 256,
            CipherKind::Rsa1024 => 1024,
            CipherKind::Rsa2048 => 2048,
        }
    }

    pub fn is_rsa(self) -> bool {
        matches!(self, CipherKind::Rsa1024 | CipherKind::Rsa2048)
    }

    pub fn is_aes(self) -> bool {
        matches!(self, CipherKind::Aes128 | CipherKind::Aes256)
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherKind::Aes128 => "AES128",
            CipherKind::Aes256 => "AES256",
            CipherKind::Rsa1024 => "RSA1024",
            CipherKind::Rsa2048 => "RSA2048",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "AES128" => Ok(CipherKind::Aes128),
            "AES256" => Ok(CipherKind::Aes256),
            "RSA1024" => Ok(CipherKind::Rsa1024),
            "RSA2048" => Ok(CipherKind::Rsa2048),
            _ => bail!("Invalid cipher type \"{value}\""),
        }
    }
}

/// Types of PCR bank hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcrHash {
    Sha1,
    Sha256,
}

impl PcrHash {
    pub fn name(self) -> &'static str {
        match self {
            PcrHash::Sha1 => "SHA1",
            PcrHash::Sha256 => "SHA256",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "SHA1" => Ok(PcrHash::Sha1),
            "SHA256" => Ok(PcrHash::Sha256),
            _ => bail!("Invalid hash type \"{value}\""),
        }
    }
}

/// The `headers` mapping of the configuration file.
#[derive(Debug, Clone, Copy)]
pub struct ConfigHeaders {
    primary_key_type: CipherKind,
    storage_key_type: CipherKind,
    ephemeral_key_type: CipherKind,
    // Only the first 24 bits of the selection are used.
    pcr_selection: u32,
    pcr_hash: PcrHash,
}

impl ConfigHeaders {
    /// Default header values. The default selection picks PCR 16.
    pub const DEFAULT: ConfigHeaders = ConfigHeaders {
        primary_key_type: CipherKind::Aes256,
        storage_key_type: CipherKind::Aes256,
        ephemeral_key_type: CipherKind::Aes256,
        pcr_selection: 0x10000,
        pcr_hash: PcrHash::Sha256,
    };

    pub fn new(
        primary_key_type: CipherKind,
        storage_key_type: CipherKind,
        ephemeral_key_type: CipherKind,
        pcr_selection: u32,
        pcr_hash: PcrHash,
    ) -> Result<Self> {
        if pcr_selection > MAX_PCR_SELECTION {
            bail!("PCR selection is too large.");
        }
        if pcr_selection == 0 {
            bail!("PCR selection must be greater than zero.");
        }
        Ok(Self {
            primary_key_type,
            storage_key_type,
            ephemeral_key_type,
            pcr_selection,
            pcr_hash,
        })
    }

    pub fn primary_key_type(&self) -> CipherKind {
        self.primary_key_type
    }

    pub fn storage_key_type(&self) -> CipherKind {
        self.storage_key_type
    }

    pub fn ephemeral_key_type(&self) -> CipherKind {
        self.ephemeral_key_type
    }

    pub fn pcr_selection(&self) -> u32 {
        self.pcr_selection
    }

    pub fn pcr_hash(&self) -> PcrHash {
        self.pcr_hash
    }
}

// The ephemeral key type does not partition persistent state: two header sets
// differing only there address the same sealed file. Equality and hashing
// deliberately ignore it.
impl PartialEq for ConfigHeaders {
    fn eq(&self, other: &Self) -> bool {
        self.primary_key_type == other.primary_key_type
            && self.storage_key_type == other.storage_key_type
            && self.pcr_selection == other.pcr_selection
            && self.pcr_hash == other.pcr_hash
    }
}

impl Eq for ConfigHeaders {}

impl Hash for ConfigHeaders {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.primary_key_type.hash(state);
        self.storage_key_type.hash(state);
        self.pcr_selection.hash(state);
        self.pcr_hash.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let d = ConfigHeaders::DEFAULT;
        assert_eq!(d.primary_key_type(), CipherKind::Aes256);
        assert_eq!(d.storage_key_type(), CipherKind::Aes256);
        assert_eq!(d.ephemeral_key_type(), CipherKind::Aes256);
        assert_eq!(d.pcr_selection(), 0x10000);
        assert_eq!(d.pcr_hash(), PcrHash::Sha256);
    }

    #[test]
    fn test_pcr_selection_bounds() {
        let make = |sel| {
            ConfigHeaders::new(
                CipherKind::Aes256,
                CipherKind::Aes256,
                CipherKind::Aes256,
                sel,
                PcrHash::Sha256,
            )
        };
        assert!(make(1).is_ok());
        assert!(make(0x00FF_FFFF).is_ok());
        assert_eq!(
            make(0).unwrap_err().to_string(),
            "PCR selection must be greater than zero."
        );
        assert_eq!(
            make(0x0100_0000).unwrap_err().to_string(),
            "PCR selection is too large."
        );
    }

    #[test]
    fn test_equality_ignores_ephemeral_type() {
        let a = ConfigHeaders::new(
            CipherKind::Aes256,
            CipherKind::Aes128,
            CipherKind::Aes256,
            1,
            PcrHash::Sha256,
        )
        .unwrap();
        let b = ConfigHeaders::new(
            CipherKind::Aes256,
            CipherKind::Aes128,
            CipherKind::Rsa2048,
            1,
            PcrHash::Sha256,
        )
        .unwrap();
        assert_eq!(a, b);

        let c = ConfigHeaders::new(
            CipherKind::Aes256,
            CipherKind::Aes128,
            CipherKind::Aes256,
            2,
            PcrHash::Sha256,
        )
        .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_cipher_kind_parse() {
        assert_eq!(CipherKind::parse("AES128").unwrap(), CipherKind::Aes128);
        assert_eq!(CipherKind::parse("RSA2048").unwrap(), CipherKind::Rsa2048);
        assert!(CipherKind::parse("AES192").is_err());
        assert!(PcrHash::parse("SHA512").is_err());
    }
}

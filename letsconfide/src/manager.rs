// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! The secrets manager.
//!
//! A [`SecretsManager`] is obtained by parsing the YAML configuration file,
//! see [`crate::parse`]. In memory it holds the secret names in cleartext
//! (for lookup; names are considered non-sensitive) and every value PKCS#7
//! padded and encrypted under an ephemeral DEK. Decryption happens through
//! short-lived [`DataAccessSession`]s.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::blob::EncryptedBlob;
use crate::codec;
use crate::crypto::{pkcs7_pad, pkcs7_strip};
use crate::dek::{HostDek, SEED_SIZE};
use crate::headers::ConfigHeaders;
use crate::platform::DeviceFactory;

/// A facade for accessing the services provided by LetsConfide.
pub struct SecretsManager<'f> {
    headers: ConfigHeaders,
    factory: &'f dyn DeviceFactory,
    /// Values are PKCS#7 padded and encrypted with an ephemeral key.
    data_map: HashMap<String, Vec<u8>>,
    ephemeral_key: HostDek,
    encrypted: EncryptedBlob,
}

impl<'f> SecretsManager<'f> {
    /// Build a manager from plaintext configuration entries, sealing them in
    /// the process. The iteration order of `entries` is the serialization
    /// order of the persisted secrets list.
    pub(crate) fn from_plaintext(
        headers: ConfigHeaders,
        factory: &'f dyn DeviceFactory,
        mut entries: Vec<(String, String)>,
    ) -> Result<Self> {
        let (mut device, device_tokens) = factory.create_device(&headers)?;
        let dev = device.as_mut();

        let ephemeral_key = HostDek::generate(true, dev)?;
        let seed = dev.random_bytes(SEED_SIZE)?;
        let storage_key = HostDek::generate_with_seed(false, dev, &seed)?;

        let mut data_map = HashMap::new();
        let mut list: Vec<Zeroizing<Vec<u8>>> = Vec::with_capacity(entries.len() * 2);
        {
            let resolved = ephemeral_key.resolve(dev)?;
            for (name, value) in &entries {
                let padded_value = pkcs7_pad(value.as_bytes());
                data_map.insert(name.clone(), resolved.encrypt(&padded_value)?);
                list.push(pkcs7_pad(name.as_bytes()));
                list.push(padded_value);
            }
        }
        let serialized = Zeroizing::new(codec::encode(&list)?);
        drop(list);
        let cipher_data = storage_key.encrypt(dev, &serialized)?;

        for (_, value) in entries.iter_mut() {
            value.zeroize();
        }

        debug!("sealed {} secrets", data_map.len());
        Ok(Self {
            headers,
            factory,
            data_map,
            ephemeral_key,
            encrypted: EncryptedBlob::new(
                seed,
                storage_key.wrapped().to_vec(),
                cipher_data,
                device_tokens,
            ),
        })
    }

    /// Rebuild a manager from a previously sealed configuration.
    ///
    /// The storage DEK is reconstituted from the persisted `{encryptedKey,
    /// seed}`; the in-memory value map is regenerated by decrypting the
    /// secrets list and re-encrypting each still-padded value under a DEK
    /// reconstituted from the same material.
    pub(crate) fn from_encrypted(
        headers: ConfigHeaders,
        factory: &'f dyn DeviceFactory,
        encrypted: EncryptedBlob,
    ) -> Result<Self> {
        let mut device = factory.open_device(&headers, encrypted.device_tokens())?;
        let dev = device.as_mut();

        let storage_key =
            HostDek::from_parts(false, encrypted.encrypted_key().to_vec(), encrypted.seed())?;
        let serialized = storage_key.decrypt(dev, encrypted.cipher_data())?;
        let parts: Vec<Zeroizing<Vec<u8>>> = codec::decode(&serialized)?
            .into_iter()
            .map(Zeroizing::new)
            .collect();
        if parts.len() % 2 != 0 {
            bail!("EncryptedData do not contain key value pairs");
        }

        let ephemeral_key =
            HostDek::from_parts(false, encrypted.encrypted_key().to_vec(), encrypted.seed())?;
        let mut data_map = HashMap::new();
        {
            let resolved = ephemeral_key.resolve(dev)?;
            for pair in parts.chunks_exact(2) {
                // Names are kept in cleartext for lookup; the stripped
                // buffer is erased when it drops.
                let name = String::from_utf8_lossy(&pkcs7_strip(&pair[0])?).into_owned();
                data_map.insert(name, resolved.encrypt(&pair[1])?);
            }
        }

        debug!("reopened {} sealed secrets", data_map.len());
        Ok(Self {
            headers,
            factory,
            data_map,
            ephemeral_key,
            encrypted,
        })
    }

    /// Configuration headers.
    pub fn headers(&self) -> &ConfigHeaders {
        &self.headers
    }

    /// The sealed form of the managed secrets.
    pub fn encrypted_data(&self) -> &EncryptedBlob {
        &self.encrypted
    }

    /// Start a session for accessing secret values.
    ///
    /// Initialization resolves the in-memory DEK through the device (TPM)
    /// and is therefore slow, in the order of hundreds of milliseconds.
    /// Decrypting entries afterwards is a host-only operation.
    pub fn start_data_access_session(&self) -> Result<DataAccessSession<'_>> {
        let mut device = self
            .factory
            .open_device(&self.headers, self.encrypted.device_tokens())?;
        let resolved = self.ephemeral_key.resolve(device.as_mut())?;
        // The device closes here; the resolved key stays in RAM for the
        // session's lifetime and is erased when the session drops.
        Ok(DataAccessSession {
            data_map: &self.data_map,
            resolved,
        })
    }
}

/// A session used to access encrypted data. Dropping the session erases the
/// resolved key.
pub struct DataAccessSession<'m> {
    data_map: &'m HashMap<String, Vec<u8>>,
    resolved: crate::dek::ResolvedDek,
}

impl DataAccessSession<'_> {
    /// Decrypt the value stored under `name`.
    pub fn decrypt(&self, name: &str) -> Result<Zeroizing<String>> {
        let encrypted = self
            .data_map
            .get(name)
            // Do not reveal the queried name.
            .ok_or_else(|| anyhow!("Key not found"))?;
        let padded = self.resolved.decrypt(encrypted)?;
        let stripped = pkcs7_strip(&padded)?;
        Ok(Zeroizing::new(
            String::from_utf8_lossy(&stripped).into_owned(),
        ))
    }
}

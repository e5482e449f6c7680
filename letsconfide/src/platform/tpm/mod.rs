// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! TPM-backed security devices.
//!
//! The factory owns the single TPM connection of the process behind a mutex;
//! every command a device issues is strictly serialized through it. TPM
//! operations are slow (hundreds of milliseconds) because TPMs are resource
//! constrained.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tpm2::{TpmContext, TpmlPcrSelection};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::{DeviceFactory, SecurityDevice};
use crate::headers::ConfigHeaders;

mod keys;
mod wrap;

use keys::{create_primary_key, pcr_selection, EphemeralKek, StorageKek};

/// Device factory that manufactures TPM-backed devices.
///
/// One instance per application: it holds the process-wide TPM handle, and
/// the ephemeral token list is generated once and shared by every device it
/// opens afterwards (same tokens, same null-hierarchy key).
pub struct TpmDeviceFactory {
    tpm: Arc<Mutex<TpmContext>>,
    ephemeral_tokens: Mutex<Option<Vec<Vec<u8>>>>,
}

impl TpmDeviceFactory {
    /// Connect to a TPM device, auto-detecting the path if none is given.
    pub fn new(tcti_path: Option<&str>) -> Result<Self> {
        Ok(Self::from_context(TpmContext::new(tcti_path)?))
    }

    pub fn from_context(ctx: TpmContext) -> Self {
        Self {
            tpm: Arc::new(Mutex::new(ctx)),
            ephemeral_tokens: Mutex::new(None),
        }
    }

    fn device(
        &self,
        headers: &ConfigHeaders,
        storage_tokens: Option<&[Vec<u8>]>,
    ) -> Result<TpmSecurityDevice> {
        let mut ephemeral_tokens = lock(&self.ephemeral_tokens);
        let mut ctx = lock(&self.tpm);
        let device = TpmSecurityDevice::open(
            self.tpm.clone(),
            &mut ctx,
            headers,
            storage_tokens,
            ephemeral_tokens.as_deref(),
        )?;
        if ephemeral_tokens.is_none() {
            *ephemeral_tokens = Some(device.ephemeral.tokens().to_vec());
        }
        Ok(device)
    }
}

impl DeviceFactory for TpmDeviceFactory {
    fn open_device(
        &self,
        headers: &ConfigHeaders,
        device_tokens: &[Vec<u8>],
    ) -> Result<Box<dyn SecurityDevice>> {
        Ok(Box::new(self.device(headers, Some(device_tokens))?))
    }

    fn create_device(
        &self,
        headers: &ConfigHeaders,
    ) -> Result<(Box<dyn SecurityDevice>, Vec<Vec<u8>>)> {
        let device = self.device(headers, None)?;
        let tokens = device.storage.tokens().to_vec();
        Ok((Box::new(device), tokens))
    }
}

/// A security device bound to TPM-resident keys. Handles are flushed when
/// the device is dropped.
pub struct TpmSecurityDevice {
    tpm: Arc<Mutex<TpmContext>>,
    pcrs: TpmlPcrSelection,
    primary_handle: u32,
    storage: StorageKek,
    ephemeral: EphemeralKek,
}

impl TpmSecurityDevice {
    fn open(
        tpm: Arc<Mutex<TpmContext>>,
        ctx: &mut TpmContext,
        headers: &ConfigHeaders,
        storage_tokens: Option<&[Vec<u8>]>,
        ephemeral_tokens: Option<&[Vec<u8>]>,
    ) -> Result<Self> {
        let primary_handle = create_primary_key(ctx, headers)?;
        let storage = match storage_tokens {
            Some(tokens) => StorageKek::load(ctx, primary_handle, headers, tokens)?,
            None => StorageKek::create(ctx, primary_handle, headers)?,
        };
        let ephemeral = EphemeralKek::create(ctx, headers, ephemeral_tokens)?;
        debug!(
            "opened TPM device: primary 0x{:08x}, storage 0x{:08x}, ephemeral 0x{:08x}",
            primary_handle,
            storage.handle(),
            ephemeral.handle()
        );
        Ok(Self {
            tpm,
            pcrs: pcr_selection(headers),
            primary_handle,
            storage,
            ephemeral,
        })
    }
}

impl SecurityDevice for TpmSecurityDevice {
    fn wrap(&mut self, dek: &[u8]) -> Result<Vec<u8>> {
        let mut ctx = lock(&self.tpm);
        self.storage.wrap(&mut ctx, &self.pcrs, dek)
    }

    fn unwrap(&mut self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let mut ctx = lock(&self.tpm);
        self.storage.unwrap(&mut ctx, &self.pcrs, wrapped)
    }

    fn wrap_ephemeral(&mut self, dek: &[u8]) -> Result<Vec<u8>> {
        let mut ctx = lock(&self.tpm);
        self.ephemeral.wrap(&mut ctx, dek)
    }

    fn unwrap_ephemeral(&mut self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let mut ctx = lock(&self.tpm);
        self.ephemeral.unwrap(&mut ctx, wrapped)
    }

    fn random_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut ctx = lock(&self.tpm);
        ctx.get_random(n)
    }
}

impl Drop for TpmSecurityDevice {
    fn drop(&mut self) {
        let mut ctx = lock(&self.tpm);
        for (name, handle) in [
            ("storage", self.storage.handle()),
            ("primary", self.primary_handle),
            ("ephemeral", self.ephemeral.handle()),
        ] {
            if let Err(err) = ctx.flush_context(handle) {
                warn!("failed to flush {name} key handle 0x{handle:08x}: {err:#}");
            }
        }
    }
}

/// Recover the guard even if another thread panicked mid-command; the TPM
/// state itself stays consistent because commands are atomic at the device.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

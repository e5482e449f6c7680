// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! TPM device transport, command builder and response parser.
//!
//! The transport is a plain read/write exchange on the kernel's TPM
//! character device. Every command is a 10-byte header (tag, size, command
//! code) followed by handles, an optional authorization area, and
//! parameters; the builder collects the body and assembles the header when
//! the command is finalized, so no size field is patched afterwards.

use anyhow::{anyhow, bail, ensure, Context, Result};
use fs_err as fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use super::constants::*;
use super::wire::{Marshal, WireReader, WireWrite};

/// Command and response header size: tag, size, code.
const HEADER_SIZE: usize = 10;

/// Upper bound on one response. The largest reply this crate parses is a
/// `CreatePrimary` response carrying a public area and creation data, well
/// under one page.
const RESPONSE_BUFFER_SIZE: usize = 4096;

/// An open TPM character device.
pub struct TpmDevice {
    file: fs::File,
    path: PathBuf,
}

impl TpmDevice {
    /// Open a TPM device. A `device:` prefix is accepted for TCTI-style
    /// configuration values.
    pub fn open(path: &str) -> Result<Self> {
        let device_path = PathBuf::from(path.trim_start_matches("device:"));
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&device_path)?;
        debug!("using TPM device {}", device_path.display());
        Ok(Self {
            file,
            path: device_path,
        })
    }

    /// Open the first TPM device the kernel exposes, preferring the
    /// resource-managed node.
    pub fn detect() -> Result<Self> {
        for candidate in ["/dev/tpmrm0", "/dev/tpm0"] {
            if Path::new(candidate).exists() {
                return Self::open(candidate);
            }
        }
        bail!("no TPM device found (tried /dev/tpmrm0 and /dev/tpm0)")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Submit one command and parse its response. Only sizes and response
    /// codes are traced; command and response bodies may carry key material.
    pub fn execute(&mut self, command: &[u8]) -> Result<TpmResponse> {
        trace!(bytes = command.len(), "submitting TPM command");
        self.file
            .write_all(command)
            .context("failed to write TPM command")?;

        let mut buffer = vec![0u8; RESPONSE_BUFFER_SIZE];
        let received = self
            .file
            .read(&mut buffer)
            .context("failed to read TPM response")?;

        let response = TpmResponse::parse(&buffer[..received])?;
        trace!(bytes = received, code = response.code, "TPM response received");
        Ok(response)
    }
}

/// Builds one TPM command.
pub struct TpmCommand {
    tag: TpmSt,
    code: TpmCc,
    body: Vec<u8>,
}

impl TpmCommand {
    /// A command without an authorization area.
    pub fn new(code: TpmCc) -> Self {
        Self {
            tag: TpmSt::NoSessions,
            code,
            body: Vec::with_capacity(64),
        }
    }

    /// A command carrying an authorization area.
    pub fn with_sessions(code: TpmCc) -> Self {
        Self {
            tag: TpmSt::Sessions,
            ..Self::new(code)
        }
    }

    pub fn handle(&mut self, handle: u32) {
        self.body.be_u32(handle);
    }

    pub fn byte(&mut self, value: u8) {
        self.body.push(value);
    }

    pub fn be_u16(&mut self, value: u16) {
        self.body.be_u16(value);
    }

    /// Append a TPM2B parameter.
    pub fn sized(&mut self, payload: &[u8]) {
        self.body.sized(payload);
    }

    /// Append an empty TPM2B parameter.
    pub fn sized_empty(&mut self) {
        self.body.be_u16(0);
    }

    /// Append a marshallable structure.
    pub fn append<T: Marshal>(&mut self, value: &T) {
        value.marshal(&mut self.body);
    }

    /// Empty-password authorization, for objects with `userWithAuth` and no
    /// auth value set.
    pub fn auth_none(&mut self) {
        self.auth_password(&[]);
    }

    /// Password authorization carrying the object's auth value.
    pub fn auth_password(&mut self, auth_value: &[u8]) {
        // Authorization area size, then one TPMS_AUTH_COMMAND: the password
        // session handle, no nonce, no attributes, the auth value.
        self.body.be_u32((9 + auth_value.len()) as u32);
        self.body.be_u32(tpm_rh::PW);
        self.body.be_u16(0);
        self.body.push(0);
        self.body.sized(auth_value);
    }

    /// Authorization through a policy session.
    pub fn auth_policy(&mut self, session_handle: u32) {
        self.body.be_u32(9);
        self.body.be_u32(session_handle);
        self.body.be_u16(0);
        self.body.push(TpmaSa::CONTINUE_SESSION);
        self.body.be_u16(0);
    }

    /// Assemble the wire form: header followed by the body.
    pub fn finalize(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.body.len());
        out.be_u16(self.tag.to_u16());
        out.be_u32((HEADER_SIZE + self.body.len()) as u32);
        out.be_u32(self.code.to_u32());
        out.extend_from_slice(&self.body);
        out
    }
}

/// A parsed TPM response.
#[derive(Debug)]
pub struct TpmResponse {
    pub tag: TpmSt,
    pub code: u32,
    body: Vec<u8>,
}

impl TpmResponse {
    /// Parse a response, validating the declared size against what the
    /// device actually returned.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        ensure!(
            raw.len() >= HEADER_SIZE,
            "TPM response too short: {} bytes",
            raw.len()
        );
        let mut header = WireReader::new(raw);
        let tag_raw = header.be_u16()?;
        let tag = TpmSt::from_u16(tag_raw)
            .ok_or_else(|| anyhow!("invalid TPM response tag 0x{tag_raw:04x}"))?;
        let declared = header.be_u32()? as usize;
        ensure!(
            (HEADER_SIZE..=raw.len()).contains(&declared),
            "TPM response size field {declared} does not match the {} bytes received",
            raw.len()
        );
        let code = header.be_u32()?;

        Ok(Self {
            tag,
            code,
            body: raw[HEADER_SIZE..declared].to_vec(),
        })
    }

    pub fn ok(&self) -> bool {
        self.code == 0
    }

    pub fn require_ok(&self) -> Result<()> {
        ensure!(self.ok(), "TPM returned error code 0x{:08x}", self.code);
        Ok(())
    }

    /// Reader over the raw response body. Responses that return a handle
    /// carry it here, before the parameter area.
    pub fn reader(&self) -> WireReader<'_> {
        WireReader::new(&self.body)
    }

    /// Reader over the response parameters, past the parameter-size word
    /// that session-tagged responses carry.
    pub fn params(&self) -> Result<WireReader<'_>> {
        let mut reader = self.reader();
        if self.tag == TpmSt::Sessions {
            reader.be_u32()?;
        }
        Ok(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_header() {
        let mut cmd = TpmCommand::new(TpmCc::GetRandom);
        cmd.be_u16(32); // request 32 random bytes

        let bytes = cmd.finalize();
        assert_eq!(&bytes[0..2], &[0x80, 0x01]); // TPM_ST_NO_SESSIONS
        assert_eq!(&bytes[6..10], &[0x00, 0x00, 0x01, 0x7B]); // TPM_CC_GetRandom

        let size = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        assert_eq!(size as usize, bytes.len());
    }

    #[test]
    fn test_password_auth_area() {
        let mut cmd = TpmCommand::with_sessions(TpmCc::EncryptDecrypt);
        cmd.handle(0x80000001);
        cmd.auth_password(&[0xAB; 4]);

        let bytes = cmd.finalize();
        // header (10) + handle (4), then the authorization area
        let auth = &bytes[14..];
        assert_eq!(&auth[0..4], &[0x00, 0x00, 0x00, 0x0D]); // size = 9 + 4
        assert_eq!(&auth[4..8], &0x40000009u32.to_be_bytes()); // TPM_RS_PW
        assert_eq!(&auth[11..13], &[0x00, 0x04]); // auth value length
        assert_eq!(&auth[13..], &[0xAB; 4]);
    }

    #[test]
    fn test_response_parse() {
        // Minimal success response
        let raw = vec![
            0x80, 0x01, // TPM_ST_NO_SESSIONS
            0x00, 0x00, 0x00, 0x0A, // size = 10
            0x00, 0x00, 0x00, 0x00, // TPM_RC_SUCCESS
        ];

        let response = TpmResponse::parse(&raw).unwrap();
        assert!(response.ok());
        assert_eq!(response.reader().remaining(), 0);
    }

    #[test]
    fn test_response_size_field_validated() {
        let raw = vec![
            0x80, 0x01, //
            0x00, 0x00, 0x00, 0x0C, // claims 12 bytes, only 10 received
            0x00, 0x00, 0x00, 0x00,
        ];
        assert!(TpmResponse::parse(&raw).is_err());
    }

    #[test]
    fn test_error_code_reported() {
        let raw = vec![
            0x80, 0x01, //
            0x00, 0x00, 0x00, 0x0A, //
            0x00, 0x00, 0x09, 0x8E, // TPM_RC_AUTH_FAIL
        ];
        let response = TpmResponse::parse(&raw).unwrap();
        assert!(!response.ok());
        assert_eq!(
            response.require_ok().unwrap_err().to_string(),
            "TPM returned error code 0x0000098e"
        );
    }
}

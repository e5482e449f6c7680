// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Configuration file parsing and sealing.
//!
//! The configuration is consumed at the YAML event level so every error can
//! carry the 1-based line it was found on and aliases can be rejected
//! outright. A plaintext file (`headers` + `data`) is sealed in place after
//! a successful parse; a sealed file (`headers` + `encryptedData`) is left
//! untouched.

use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use fs_err as fs;
use std::collections::HashSet;
use tracing::debug;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::Marker;
use yaml_rust2::yaml::{Hash, Yaml};
use yaml_rust2::YamlEmitter;

use crate::blob::EncryptedBlob;
use crate::codec;
use crate::headers::{CipherKind, ConfigHeaders, PcrHash};
use crate::manager::SecretsManager;
use crate::platform::DeviceFactory;

/// The configuration reader is bounded for safety.
const MAX_CONFIG_SIZE: usize = 256 * 1024;

/// Base64 chunk width of persisted byte arrays.
const CHUNK_SIZE: usize = 32;

/// Parse the configuration file and produce a [`SecretsManager`].
///
/// If the file holds plaintext data it is rewritten in sealed form after a
/// successful parse.
pub fn parse<'f>(
    path: impl AsRef<Path>,
    factory: &'f dyn DeviceFactory,
) -> Result<SecretsManager<'f>> {
    parse_file(path.as_ref(), factory)
}

fn parse_file<'f>(path: &Path, factory: &'f dyn DeviceFactory) -> Result<SecretsManager<'f>> {
    let text = read_config(path)?;
    let mut cursor = EventCursor::collect(&text)?;

    cursor.expect(&[EventKind::StreamStart])?;
    cursor.expect(&[EventKind::DocumentStart])?;
    cursor.expect(&[EventKind::MappingStart])?;

    let mut headers = ConfigHeaders::DEFAULT;
    let mut key = cursor.expect_scalar()?;
    if key == "headers" {
        headers = read_headers(&mut cursor)?;
        key = cursor.expect_scalar()?;
    }

    let manager = if key == "data" {
        let entries = read_data(&mut cursor)?;
        let manager = SecretsManager::from_plaintext(headers, factory, entries)?;
        debug!("sealing configuration in place: {}", path.display());
        write_encrypted_yaml(path, manager.headers(), manager.encrypted_data())?;
        manager
    } else if key == "encryptedData" {
        let blob = read_encrypted_data(&mut cursor)?;
        SecretsManager::from_encrypted(headers, factory, blob)?
    } else {
        return Err(field_not_defined("encryptedData"));
    };

    cursor.expect(&[EventKind::MappingEnd])?;
    cursor.expect(&[EventKind::DocumentEnd])?;
    cursor.expect(&[EventKind::StreamEnd])?;

    Ok(manager)
}

/// Read the file contents, refusing streams past the size bound.
fn read_config(path: &Path) -> Result<String> {
    let file = fs::File::open(path)?;
    let mut data = Vec::new();
    file.take(MAX_CONFIG_SIZE as u64 + 1)
        .read_to_end(&mut data)
        .with_context(|| format!("Unable to read config file {}", path.display()))?;
    if data.len() > MAX_CONFIG_SIZE {
        bail!("The config is too large.");
    }
    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn field_not_defined(field: &str) -> anyhow::Error {
    anyhow!("Property \"{field}\" is not defined")
}

/// Event shapes the parser distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    StreamStart,
    StreamEnd,
    DocumentStart,
    DocumentEnd,
    MappingStart,
    MappingEnd,
    SequenceStart,
    SequenceEnd,
    Scalar,
    Alias,
    Other,
}

fn kind_of(event: &Event) -> EventKind {
    match event {
        Event::StreamStart => EventKind::StreamStart,
        Event::StreamEnd => EventKind::StreamEnd,
        Event::DocumentStart => EventKind::DocumentStart,
        Event::DocumentEnd => EventKind::DocumentEnd,
        Event::MappingStart(..) => EventKind::MappingStart,
        Event::MappingEnd => EventKind::MappingEnd,
        Event::SequenceStart(..) => EventKind::SequenceStart,
        Event::SequenceEnd => EventKind::SequenceEnd,
        Event::Scalar(..) => EventKind::Scalar,
        Event::Alias(..) => EventKind::Alias,
        _ => EventKind::Other,
    }
}

fn validate(event: &Event, mark: Marker, expected: &[EventKind]) -> Result<()> {
    let kind = kind_of(event);
    if expected.contains(&kind) {
        return Ok(());
    }
    let detail = if kind == EventKind::Alias {
        ": YAML aliases are not supported"
    } else {
        ""
    };
    bail!(
        "Error parsing YAML file: Unexpected entry{detail} at line {}",
        mark.line()
    )
}

/// The YAML event stream of the whole document, consumed left to right.
struct EventCursor {
    events: std::vec::IntoIter<(Event, Marker)>,
}

impl EventCursor {
    fn collect(text: &str) -> Result<Self> {
        #[derive(Default)]
        struct Collector(Vec<(Event, Marker)>);

        impl MarkedEventReceiver for Collector {
            fn on_event(&mut self, event: Event, mark: Marker) {
                self.0.push((event, mark));
            }
        }

        let mut collector = Collector::default();
        Parser::new_from_str(text)
            .load(&mut collector, true)
            .map_err(|e| anyhow!("Error parsing YAML file: {e}"))?;
        Ok(Self {
            events: collector.0.into_iter(),
        })
    }

    fn next(&mut self) -> Result<(Event, Marker)> {
        self.events
            .next()
            .ok_or_else(|| anyhow!("Error parsing YAML file: Unexpected end of config file"))
    }

    fn expect(&mut self, expected: &[EventKind]) -> Result<(Event, Marker)> {
        let (event, mark) = self.next()?;
        validate(&event, mark, expected)?;
        Ok((event, mark))
    }

    fn expect_scalar(&mut self) -> Result<String> {
        match self.expect(&[EventKind::Scalar])? {
            (Event::Scalar(value, ..), _) => Ok(value),
            _ => unreachable!("validated as scalar"),
        }
    }
}

/// Iterates the entries of one YAML mapping, mirroring the event order the
/// parser delivers: one lookahead entry, keys checked for duplicates.
struct MappingReader<'a> {
    cursor: &'a mut EventCursor,
    pending: (Event, Marker),
    seen_keys: HashSet<String>,
    current_line: usize,
}

impl<'a> MappingReader<'a> {
    fn begin(cursor: &'a mut EventCursor) -> Result<Self> {
        cursor.expect(&[EventKind::MappingStart])?;
        let pending = Self::next_entry(cursor)?;
        Ok(Self {
            cursor,
            pending,
            seen_keys: HashSet::new(),
            current_line: 0,
        })
    }

    fn next_entry(cursor: &mut EventCursor) -> Result<(Event, Marker)> {
        cursor.expect(&[
            EventKind::Scalar,
            EventKind::MappingEnd,
            EventKind::SequenceStart,
            EventKind::SequenceEnd,
        ])
    }

    fn has_next(&self) -> bool {
        matches!(
            kind_of(&self.pending.0),
            EventKind::Scalar | EventKind::SequenceStart
        )
    }

    /// 1-based line of the most recently consumed entry.
    fn current_line(&self) -> usize {
        self.current_line
    }

    fn advance(&mut self, expected: &[EventKind]) -> Result<Event> {
        self.current_line = self.pending.1.line();
        validate(&self.pending.0, self.pending.1, expected)?;
        let next = Self::next_entry(self.cursor)?;
        let (event, _) = std::mem::replace(&mut self.pending, next);
        Ok(event)
    }

    fn next_scalar(&mut self) -> Result<String> {
        let event = self.advance(&[
            EventKind::Scalar,
            EventKind::MappingEnd,
            EventKind::SequenceStart,
        ])?;
        match event {
            Event::Scalar(value, ..) => Ok(value),
            _ => bail!(
                "Error parsing YAML file: Unexpected entry at line {}",
                self.current_line
            ),
        }
    }

    /// The next key of the mapping; duplicate keys are rejected.
    fn next_key(&mut self) -> Result<String> {
        let key = self.next_scalar()?;
        if !self.seen_keys.insert(key.clone()) {
            bail!(
                "Error parsing YAML file: Duplicate key at line {}",
                self.current_line
            );
        }
        Ok(key)
    }

    fn next_value(&mut self) -> Result<String> {
        self.next_scalar()
    }

    /// A byte-array value: a sequence of Base64 chunks, concatenated.
    fn next_byte_array(&mut self) -> Result<Vec<u8>> {
        self.advance(&[EventKind::SequenceStart])?;
        let mut result = Vec::new();
        loop {
            match self.advance(&[EventKind::Scalar, EventKind::SequenceEnd])? {
                Event::Scalar(chunk, ..) => {
                    let bytes = STANDARD.decode(chunk.as_bytes()).map_err(|_| {
                        anyhow!(
                            "Error parsing YAML file: Invalid Base64 data at line {}",
                            self.current_line
                        )
                    })?;
                    result.extend_from_slice(&bytes);
                }
                _ => break,
            }
        }
        Ok(result)
    }
}

/// Read the `headers` mapping; missing fields keep their defaults.
fn read_headers(cursor: &mut EventCursor) -> Result<ConfigHeaders> {
    let defaults = ConfigHeaders::DEFAULT;
    let mut primary_key_type = defaults.primary_key_type();
    let mut storage_key_type = defaults.storage_key_type();
    let mut ephemeral_key_type = defaults.ephemeral_key_type();
    let mut pcr_selection = defaults.pcr_selection();
    let mut pcr_hash = defaults.pcr_hash();

    let mut reader = MappingReader::begin(cursor)?;
    while reader.has_next() {
        let key = reader.next_key()?;
        match key.as_str() {
            "primaryKeyType" => primary_key_type = CipherKind::parse(&reader.next_value()?)?,
            "storageKeyType" => storage_key_type = CipherKind::parse(&reader.next_value()?)?,
            "ephemeralKeyType" => ephemeral_key_type = CipherKind::parse(&reader.next_value()?)?,
            "pcrSelection" => {
                let value = reader.next_value()?;
                pcr_selection = value
                    .parse::<u32>()
                    .map_err(|_| anyhow!("Invalid pcrSelection value \"{value}\""))?;
            }
            "pcrHash" => pcr_hash = PcrHash::parse(&reader.next_value()?)?,
            _ => bail!(
                "Error parsing YAML file: Invalid config header at line {}",
                reader.current_line()
            ),
        }
    }
    ConfigHeaders::new(
        primary_key_type,
        storage_key_type,
        ephemeral_key_type,
        pcr_selection,
        pcr_hash,
    )
}

/// Read the plaintext `data` mapping in file order.
fn read_data(cursor: &mut EventCursor) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();
    let mut reader = MappingReader::begin(cursor)?;
    while reader.has_next() {
        let key = reader.next_key()?;
        let value = reader.next_value()?;
        entries.push((key, value));
    }
    Ok(entries)
}

/// Read the `encryptedData` mapping of a sealed file.
fn read_encrypted_data(cursor: &mut EventCursor) -> Result<EncryptedBlob> {
    let mut seed = None;
    let mut encrypted_key = None;
    let mut cipher_data = None;
    let mut device_tokens = None;

    let mut reader = MappingReader::begin(cursor)?;
    while reader.has_next() {
        let key = reader.next_scalar()?;
        match key.as_str() {
            "seed" => seed = Some(reader.next_byte_array()?),
            "encryptedKey" => encrypted_key = Some(reader.next_byte_array()?),
            "cipherData" => cipher_data = Some(reader.next_byte_array()?),
            "deviceTokens" => device_tokens = Some(codec::decode(&reader.next_byte_array()?)?),
            _ => bail!(
                "Error parsing YAML file: Invalid key {key} at line {}",
                reader.current_line()
            ),
        }
    }

    Ok(EncryptedBlob::new(
        seed.ok_or_else(|| field_not_defined("seed"))?,
        encrypted_key.ok_or_else(|| field_not_defined("encryptedKey"))?,
        cipher_data.ok_or_else(|| field_not_defined("cipherData"))?,
        device_tokens.ok_or_else(|| field_not_defined("deviceTokens"))?,
    ))
}

/// Overwrite the configuration file with its sealed layout.
fn write_encrypted_yaml(path: &Path, headers: &ConfigHeaders, blob: &EncryptedBlob) -> Result<()> {
    let key = |name: &str| Yaml::String(name.to_string());

    let mut heads = Hash::new();
    heads.insert(
        key("primaryKeyType"),
        key(headers.primary_key_type().name()),
    );
    heads.insert(
        key("storageKeyType"),
        key(headers.storage_key_type().name()),
    );
    heads.insert(
        key("ephemeralKeyType"),
        key(headers.ephemeral_key_type().name()),
    );
    heads.insert(
        key("pcrSelection"),
        Yaml::String(headers.pcr_selection().to_string()),
    );
    heads.insert(key("pcrHash"), key(headers.pcr_hash().name()));

    let mut encrypted = Hash::new();
    encrypted.insert(key("seed"), chunked(blob.seed()));
    encrypted.insert(key("encryptedKey"), chunked(blob.encrypted_key()));
    encrypted.insert(key("cipherData"), chunked(blob.cipher_data()));
    encrypted.insert(
        key("deviceTokens"),
        chunked(&codec::encode(blob.device_tokens())?),
    );

    let mut root = Hash::new();
    root.insert(key("headers"), Yaml::Hash(heads));
    root.insert(key("encryptedData"), Yaml::Hash(encrypted));

    let mut out = String::new();
    YamlEmitter::new(&mut out)
        .dump(&Yaml::Hash(root))
        .map_err(|e| anyhow!("Unable to write the encrypted YAML file: {e}"))?;
    out.push('\n');
    fs::write(path, out).context("Unable to write the encrypted YAML file")?;
    Ok(())
}

/// Split a byte array into a YAML sequence of Base64-encoded chunks.
fn chunked(bytes: &[u8]) -> Yaml {
    Yaml::Array(
        bytes
            .chunks(CHUNK_SIZE)
            .map(|chunk| Yaml::String(STANDARD.encode(chunk)))
            .collect(),
    )
}

// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Configuration parsing behavior against the software fake device.

mod common;

use std::fs;
use std::path::PathBuf;

use common::FakeDeviceFactory;
use letsconfide::{CipherKind, ConfigHeaders, PcrHash};
use tempfile::TempDir;

fn write_config(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("config.yaml");
    fs::write(&path, text).unwrap();
    path
}

fn parse_err(text: &str) -> String {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, text);
    letsconfide::parse(&path, &FakeDeviceFactory)
        .err()
        .expect("parse must fail")
        .to_string()
}

#[test]
fn test_empty_yaml_file() {
    let message = parse_err("");
    assert!(
        message.starts_with("Error parsing YAML file: Unexpected entry"),
        "unexpected message: {message}"
    );
}

#[test]
fn test_duplicate_header() {
    let message = parse_err(
        "headers:\n\
         \x20 storageKeyType: AES256\n\
         \x20 storageKeyType: AES256\n\
         \x20 pcrSelection: \"1\"\n\
         \x20 pcrHash: SHA256\n\
         data:\n\
         \x20 my_passwd: \"ub,KbVsh/XUj~=~F#\"\n",
    );
    assert_eq!(message, "Error parsing YAML file: Duplicate key at line 3");
}

#[test]
fn test_invalid_header() {
    let message = parse_err(
        "headers:\n\
         \x20 primaryKeyType: AES256\n\
         \x20 storageKeyType2: AES256\n\
         data:\n\
         \x20 my_passwd: \"x\"\n",
    );
    assert_eq!(
        message,
        "Error parsing YAML file: Invalid config header at line 3"
    );
}

#[test]
fn test_duplicate_data() {
    let message = parse_err(
        "headers:\n\
         \x20 primaryKeyType: AES256\n\
         \x20 storageKeyType: AES256\n\
         \x20 pcrSelection: \"1\"\n\
         \x20 pcrHash: SHA256\n\
         data:\n\
         \x20 my_passwd: \"a\"\n\
         \x20 my_passwd: \"b\"\n",
    );
    assert_eq!(message, "Error parsing YAML file: Duplicate key at line 8");
}

#[test]
fn test_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "data:\n  pwd1: \"ub,KbVsh/XUj~=~F#\"\n");

    let manager = letsconfide::parse(&path, &FakeDeviceFactory).unwrap();
    assert_eq!(*manager.headers(), ConfigHeaders::DEFAULT);
    assert_eq!(
        manager.headers().ephemeral_key_type(),
        ConfigHeaders::DEFAULT.ephemeral_key_type()
    );

    let session = manager.start_data_access_session().unwrap();
    let value = session.decrypt("pwd1").unwrap();
    assert_eq!(value.as_str(), "ub,KbVsh/XUj~=~F#");
    assert_eq!(value.chars().count(), 17);

    // The file on disk no longer carries plaintext.
    let sealed = fs::read_to_string(&path).unwrap();
    assert!(sealed.contains("encryptedData:"));
    assert!(!sealed.starts_with("data:") && !sealed.contains("\ndata:"));
}

#[test]
fn test_partial_defaults() {
    assert_partial_defaults("primaryKeyType");
    assert_partial_defaults("storageKeyType");
    assert_partial_defaults("pcrSelection");
    assert_partial_defaults("pcrHash");
}

fn assert_partial_defaults(missing_header: &str) {
    let all: [(&str, &str); 4] = [
        ("primaryKeyType", "RSA2048"),
        ("storageKeyType", "AES128"),
        ("pcrSelection", "\"2\""),
        ("pcrHash", "SHA1"),
    ];
    let mut text = String::from("headers:\n");
    for (name, value) in all {
        if name != missing_header {
            text.push_str(&format!("  {name}: {value}\n"));
        }
    }
    text.push_str("data:\n  pwd1: \"x\"\n");

    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, &text);
    let manager = letsconfide::parse(&path, &FakeDeviceFactory).unwrap();
    let headers = manager.headers();

    let defaults = ConfigHeaders::DEFAULT;
    match missing_header {
        "primaryKeyType" => {
            assert_eq!(headers.primary_key_type(), defaults.primary_key_type())
        }
        "storageKeyType" => {
            assert_eq!(headers.storage_key_type(), defaults.storage_key_type())
        }
        "pcrSelection" => assert_eq!(headers.pcr_selection(), defaults.pcr_selection()),
        "pcrHash" => assert_eq!(headers.pcr_hash(), defaults.pcr_hash()),
        other => panic!("unknown header {other}"),
    }

    // The supplied fields kept their configured values.
    if missing_header != "storageKeyType" {
        assert_eq!(headers.storage_key_type(), CipherKind::Aes128);
    }
    if missing_header != "pcrHash" {
        assert_eq!(headers.pcr_hash(), PcrHash::Sha1);
    }
}

#[test]
fn test_data_is_not_a_mapping() {
    let message = parse_err(
        "headers:\n\
         \x20 primaryKeyType: AES256\n\
         data: foobar\n",
    );
    assert_eq!(message, "Error parsing YAML file: Unexpected entry at line 3");
}

#[test]
fn test_missing_data() {
    let message = parse_err(
        "headers:\n\
         \x20 primaryKeyType: AES256\n",
    );
    assert!(
        message.starts_with("Error parsing YAML file: Unexpected entry"),
        "unexpected message: {message}"
    );
}

#[test]
fn test_unknown_top_level_key() {
    let message = parse_err("foo:\n  bar: baz\n");
    assert_eq!(message, "Property \"encryptedData\" is not defined");
}

#[test]
fn test_missing_encrypted_field() {
    let message = parse_err(
        "headers:\n\
         \x20 pcrHash: SHA256\n\
         encryptedData:\n\
         \x20 seed:\n\
         \x20   - AAAA\n",
    );
    assert_eq!(message, "Property \"encryptedKey\" is not defined");
}

#[test]
fn test_aliases_rejected() {
    let message = parse_err(
        "data:\n\
         \x20 a: &x secret\n\
         \x20 b: *x\n",
    );
    assert_eq!(
        message,
        "Error parsing YAML file: Unexpected entry: YAML aliases are not supported at line 3"
    );
}

#[test]
fn test_config_too_large() {
    let text = format!("data:\n  a: \"b\"\n#{}\n", "x".repeat(256 * 1024));
    let message = parse_err(&text);
    assert_eq!(message, "The config is too large.");
}

#[test]
fn test_invalid_cipher_value() {
    let message = parse_err(
        "headers:\n\
         \x20 storageKeyType: AES192\n\
         data:\n\
         \x20 a: \"b\"\n",
    );
    assert_eq!(message, "Invalid cipher type \"AES192\"");
}

#[test]
fn test_pcr_selection_bounds() {
    let zero = parse_err(
        "headers:\n\
         \x20 pcrSelection: \"0\"\n\
         data:\n\
         \x20 a: \"b\"\n",
    );
    assert_eq!(zero, "PCR selection must be greater than zero.");

    let large = parse_err(
        "headers:\n\
         \x20 pcrSelection: \"16777216\"\n\
         data:\n\
         \x20 a: \"b\"\n",
    );
    assert_eq!(large, "PCR selection is too large.");
}

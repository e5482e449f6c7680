// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! End-to-end seal/reopen behavior against the software fake device.

mod common;

use std::fs;
use std::path::{Path, PathBuf};

use common::FakeDeviceFactory;
use letsconfide::{CipherKind, PcrHash, SecretsManager};
use tempfile::TempDir;

/// The secrets exercised by every round trip, covering empty names and
/// values plus values on the padding block boundaries.
fn test_data() -> Vec<(&'static str, &'static str)> {
    vec![
        ("primary_passwd", "ub,KbVsh/XUj~=~F#"),
        ("my_password", "U7MeKLkU8te4FbZZ"),
        ("database_pwd", "4R4SHY97sDv9GnH7"),
        ("hello", "fSGvnu6b4VSGUFFm"),
        ("weak", "0123456789"),
        ("empty", ""),
        ("", "empty"),
        ("16bytePwd", "0123456789abcdef"),
        ("32bytePwd", "0123456789abcdef0123456789abcdef"),
        (
            "48bytePwd",
            "0123456789abcdef0123456789abcdef0123456789abcdef",
        ),
        (
            "64bytePwd",
            "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
        ),
        (
            "96bytePwd",
            "0123456789abcdef0123456789abcdef0123456789abcdef\
             0123456789abcdef0123456789abcdef0123456789abcdef",
        ),
        (
            "128bytePwd",
            "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef\
             0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
        ),
    ]
}

fn write_plaintext_config(dir: &TempDir) -> PathBuf {
    let mut text = String::from(
        "headers:\n\
         \x20 primaryKeyType: AES256\n\
         \x20 storageKeyType: AES256\n\
         \x20 ephemeralKeyType: AES256\n\
         \x20 pcrSelection: \"65536\"\n\
         \x20 pcrHash: SHA256\n\
         data:\n",
    );
    for (name, value) in test_data() {
        text.push_str(&format!("  \"{name}\": \"{value}\"\n"));
    }
    let path = dir.path().join("secrets.yaml");
    fs::write(&path, text).unwrap();
    path
}

fn assert_all_secrets(manager: &SecretsManager) {
    let session = manager.start_data_access_session().unwrap();
    for (name, value) in test_data() {
        let decrypted = session.decrypt(name).unwrap();
        assert_eq!(decrypted.as_str(), value, "secret {name:?}");
    }
}

fn assert_headers(manager: &SecretsManager) {
    let headers = manager.headers();
    assert_eq!(headers.primary_key_type(), CipherKind::Aes256);
    assert_eq!(headers.storage_key_type(), CipherKind::Aes256);
    assert_eq!(headers.pcr_selection(), 65536);
    assert_eq!(headers.pcr_hash(), PcrHash::Sha256);
}

fn assert_sealed(path: &Path) {
    let text = fs::read_to_string(path).unwrap();
    assert!(text.contains("encryptedData:"));
    assert!(text.contains("seed:"));
    assert!(text.contains("encryptedKey:"));
    assert!(text.contains("cipherData:"));
    assert!(text.contains("deviceTokens:"));
    assert!(!text.starts_with("data:") && !text.contains("\ndata:"));
}

#[test]
fn test_seal_then_reopen() {
    let dir = TempDir::new().unwrap();
    let path = write_plaintext_config(&dir);
    let factory = FakeDeviceFactory;

    // First parse: plaintext in, sealed file out.
    let from_raw = letsconfide::parse(&path, &factory).unwrap();
    assert_headers(&from_raw);
    assert_all_secrets(&from_raw);
    assert_sealed(&path);

    // Second parse: reopen the sealed file.
    let from_encrypted = letsconfide::parse(&path, &factory).unwrap();
    assert_headers(&from_encrypted);
    assert_all_secrets(&from_encrypted);

    // The sealed material is carried over unchanged.
    assert_eq!(
        from_raw.encrypted_data().seed(),
        from_encrypted.encrypted_data().seed()
    );
    assert_eq!(
        from_raw.encrypted_data().encrypted_key(),
        from_encrypted.encrypted_data().encrypted_key()
    );
    assert_eq!(
        from_raw.encrypted_data().cipher_data(),
        from_encrypted.encrypted_data().cipher_data()
    );
    assert_eq!(
        from_raw.encrypted_data().device_tokens(),
        from_encrypted.encrypted_data().device_tokens()
    );
}

#[test]
fn test_reopen_does_not_rewrite_file() {
    let dir = TempDir::new().unwrap();
    let path = write_plaintext_config(&dir);
    let factory = FakeDeviceFactory;

    letsconfide::parse(&path, &factory).unwrap();
    let sealed_once = fs::read_to_string(&path).unwrap();

    letsconfide::parse(&path, &factory).unwrap();
    let sealed_twice = fs::read_to_string(&path).unwrap();

    assert_eq!(sealed_once, sealed_twice);
}

#[test]
fn test_unknown_secret_name() {
    let dir = TempDir::new().unwrap();
    let path = write_plaintext_config(&dir);
    let factory = FakeDeviceFactory;

    let manager = letsconfide::parse(&path, &factory).unwrap();
    let session = manager.start_data_access_session().unwrap();
    let err = session.decrypt("foobar").unwrap_err();
    assert_eq!(err.to_string(), "Key not found");
}

#[test]
fn test_blob_accessors() {
    let dir = TempDir::new().unwrap();
    let path = write_plaintext_config(&dir);
    let factory = FakeDeviceFactory;

    let manager = letsconfide::parse(&path, &factory).unwrap();
    let blob = manager.encrypted_data();
    assert_eq!(blob.seed().len(), letsconfide::SEED_SIZE);
    assert_eq!(blob.device_tokens().len(), 2);
    // GCM ciphertext carries the 16-byte tag.
    assert!(blob.cipher_data().len() > 16);
    assert!(!blob.encrypted_key().is_empty());
}

#[test]
fn test_sessions_are_independent() {
    let dir = TempDir::new().unwrap();
    let path = write_plaintext_config(&dir);
    let factory = FakeDeviceFactory;

    let manager = letsconfide::parse(&path, &factory).unwrap();
    {
        let session = manager.start_data_access_session().unwrap();
        assert_eq!(session.decrypt("hello").unwrap().as_str(), "fSGvnu6b4VSGUFFm");
        // The resolved key is erased when the session drops here.
    }
    let session = manager.start_data_access_session().unwrap();
    assert_eq!(session.decrypt("weak").unwrap().as_str(), "0123456789");
}

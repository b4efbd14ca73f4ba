//! Integration tests for password-based key derivation

use hearth::secure::kdf::{
    derive_key_with_params, generate_salt, KdfParams, KEY_LEN, MIN_SALT_LEN, SALT_LEN,
};
use hearth::secure::{derive_and_protect_key, derive_key_from_password, SecureMemoryError, SecureString};
use serial_test::serial;
use std::str::FromStr;

const LIGHT: KdfParams = KdfParams {
    time_cost: 1,
    memory_cost_kib: 64,
    parallelism: 1,
};

fn password(text: &str) -> SecureString {
    SecureString::from_str(text).unwrap()
}

#[test]
#[serial]
fn test_default_derivation_is_deterministic() {
    let salt = [0x42u8; SALT_LEN];
    let first = derive_key_from_password(&password("correct horse"), &salt).unwrap();
    let second = derive_key_from_password(&password("correct horse"), &salt).unwrap();

    assert_eq!(first.len(), KEY_LEN);
    assert_eq!(first, second);
}

#[test]
#[serial]
fn test_inputs_change_the_key() {
    let salt = [1u8; SALT_LEN];
    let base = derive_key_with_params(&password("alpha"), &salt, LIGHT).unwrap();
    let other_password = derive_key_with_params(&password("alphb"), &salt, LIGHT).unwrap();
    let other_salt = derive_key_with_params(&password("alpha"), &[2u8; SALT_LEN], LIGHT).unwrap();

    assert_ne!(base, other_password);
    assert_ne!(base, other_salt);
}

#[test]
#[serial]
fn test_work_factor_changes_the_key() {
    let salt = [3u8; SALT_LEN];
    let light = derive_key_with_params(&password("pw"), &salt, LIGHT).unwrap();
    let heavier = derive_key_with_params(
        &password("pw"),
        &salt,
        KdfParams {
            time_cost: 2,
            ..LIGHT
        },
    )
    .unwrap();
    assert_ne!(light, heavier);
}

#[test]
#[serial]
fn test_empty_password_is_accepted() {
    let key = derive_key_with_params(&SecureString::new(), &[9u8; SALT_LEN], LIGHT).unwrap();
    assert_eq!(key.len(), KEY_LEN);
}

#[test]
fn test_short_salt_is_rejected() {
    let result = derive_key_with_params(&password("pw"), &[0u8; MIN_SALT_LEN - 1], LIGHT);
    assert!(matches!(result, Err(SecureMemoryError::Derivation(_))));
}

#[test]
fn test_generated_salts_differ() {
    let a = generate_salt();
    let b = generate_salt();
    assert_eq!(a.len(), SALT_LEN);
    assert_ne!(a, b);
}

#[test]
#[serial]
fn test_protected_key_matches_buffer() {
    let salt = [7u8; SALT_LEN];
    let buffer = derive_key_from_password(&password("pw"), &salt).unwrap();
    let key = derive_and_protect_key(&password("pw"), &salt).unwrap();

    assert!(key.is_sealed());
    assert_eq!(key.as_bytes(), buffer.as_slice());
}

//! Integration tests for the secure memory containers
//!
//! Locking pages draws on the process-wide RLIMIT_MEMLOCK budget, so every
//! test that allocates runs under #[serial].

use hearth::secure::{
    secure_zero, GuardedBuffer, LockedBuffer, SecureBuffer, SecureKey, SecureString,
};
use serial_test::serial;
use std::str::FromStr;

#[test]
fn test_secure_zero_clears_every_byte() {
    let mut bytes = *b"correct horse battery staple";
    secure_zero(&mut bytes);
    assert!(bytes.iter().all(|&b| b == 0));

    let mut empty: [u8; 0] = [];
    secure_zero(&mut empty);
}

#[test]
#[serial]
fn test_locked_buffer_lifecycle() {
    let mut buffer = LockedBuffer::new(100).unwrap();
    assert_eq!(buffer.len(), 100);
    assert!(buffer.capacity() >= 100);
    assert!(buffer.is_locked());
    assert!(buffer.as_slice().iter().all(|&b| b == 0));

    buffer.as_mut_slice()[..3].copy_from_slice(b"abc");
    assert_eq!(&buffer.as_slice()[..3], b"abc");

    buffer.release();
    assert!(buffer.is_empty());
    assert!(!buffer.is_locked());
    assert!(buffer.as_slice().is_empty());
}

#[test]
fn test_zero_sized_buffers_are_null() {
    let locked = LockedBuffer::new(0).unwrap();
    assert!(!locked.is_locked());
    assert_eq!(locked.capacity(), 0);

    let guarded = GuardedBuffer::new(0).unwrap();
    assert!(guarded.is_empty());
    assert_eq!(guarded.capacity(), 0);
}

#[test]
#[serial]
fn test_move_leaves_null_source() {
    let mut first = LockedBuffer::from_slice(b"secret").unwrap();
    let second = std::mem::take(&mut first);
    assert!(first.is_empty());
    assert!(!first.is_locked());
    assert_eq!(second.as_slice(), b"secret");
}

#[test]
#[serial]
fn test_guarded_buffer_protection_toggle() {
    let mut buffer = GuardedBuffer::new(64).unwrap();
    buffer.as_mut_slice().unwrap().fill(7);

    buffer.make_readonly().unwrap();
    assert!(buffer.is_readonly());
    assert!(buffer.as_slice().iter().all(|&b| b == 7));

    buffer.make_readwrite().unwrap();
    buffer.as_mut_slice().unwrap()[0] = 9;
    assert_eq!(buffer.as_slice()[0], 9);
}

#[test]
#[serial]
fn test_secure_string_operations() {
    let mut password = SecureString::from_str("hunter").unwrap();
    password.push('2').unwrap();
    password.push_str("!").unwrap();
    assert_eq!(password.as_str(), "hunter2!");
    assert_eq!(password.len(), 8);
    assert!(password.is_locked());

    let moved = std::mem::take(&mut password);
    assert!(password.is_empty());
    assert_eq!(moved.as_str(), "hunter2!");

    let mut cleared = moved;
    cleared.clear();
    assert!(cleared.is_empty());
}

#[test]
#[serial]
fn test_secure_string_from_string_and_equality() {
    let a = SecureString::try_from(String::from("pässwörd")).unwrap();
    let b = SecureString::try_from("pässwörd").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.as_str().chars().count(), 8);
}

#[test]
#[serial]
fn test_secrets_are_redacted_in_debug() {
    let password = SecureString::from_str("topsecret").unwrap();
    let key = SecureKey::new(&[0xAB; 32]).unwrap();
    let buffer = SecureBuffer::from_slice(b"topsecret").unwrap();

    for rendered in [
        format!("{:?}", password),
        format!("{:?}", key),
        format!("{:?}", buffer),
    ] {
        assert!(!rendered.contains("topsecret"));
        assert!(!rendered.to_lowercase().contains("abab"));
    }
}

#[test]
#[serial]
fn test_secure_key_is_sealed() {
    let key = SecureKey::new(&[1, 2, 3, 4]).unwrap();
    assert!(key.is_sealed());
    assert_eq!(key.as_bytes(), &[1, 2, 3, 4]);
    assert_eq!(key.len(), 4);

    let mut key = key;
    let taken = std::mem::take(&mut key);
    assert!(key.is_empty());
    assert_eq!(taken.as_ref(), &[1, 2, 3, 4]);
}

#[test]
#[serial]
fn test_secure_buffer_roundtrip() {
    let mut buffer = SecureBuffer::zeroed(16).unwrap();
    assert_eq!(buffer.len(), 16);
    buffer.as_mut_slice().copy_from_slice(&[5; 16]);
    assert_eq!(buffer, SecureBuffer::from_slice(&[5; 16]).unwrap());
}

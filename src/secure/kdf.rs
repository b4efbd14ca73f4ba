//! Password-based key derivation.
//!
//! Keys are derived with Argon2id (version 0x13). The default work factor is
//! fixed so the same password and salt produce the same key on every build
//! and platform:
//!
//! | parameter   | value            |
//! |-------------|------------------|
//! | time cost   | 2 passes         |
//! | memory cost | 65536 KiB (64 MiB) |
//! | parallelism | 1 lane           |
//! | output      | 32 bytes         |
//!
//! # Example
//!
//! ```no_run
//! use hearth::secure::{kdf, SecureString};
//! use std::str::FromStr;
//!
//! # fn example() -> Result<(), hearth::secure::SecureMemoryError> {
//! let password = SecureString::from_str("correct horse battery staple")?;
//! let salt = kdf::generate_salt();
//! let key = kdf::derive_and_protect_key(&password, &salt)?;
//! assert_eq!(key.len(), kdf::KEY_LEN);
//! # Ok(())
//! # }
//! ```

use super::buffer::SecureBuffer;
use super::error::{Result, SecureMemoryError};
use super::key::SecureKey;
use super::string::SecureString;
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

/// Derived key length in bytes
pub const KEY_LEN: usize = 32;

/// Default number of Argon2 passes
pub const DEFAULT_TIME_COST: u32 = 2;

/// Default Argon2 memory in KiB
pub const DEFAULT_MEMORY_COST_KIB: u32 = 65536;

/// Default Argon2 lanes
pub const DEFAULT_PARALLELISM: u32 = 1;

/// Shortest salt accepted
pub const MIN_SALT_LEN: usize = 8;

/// Length of salts produced by [`generate_salt`]
pub const SALT_LEN: usize = 16;

/// Argon2id work factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KdfParams {
    pub time_cost: u32,
    pub memory_cost_kib: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            time_cost: DEFAULT_TIME_COST,
            memory_cost_kib: DEFAULT_MEMORY_COST_KIB,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

impl KdfParams {
    fn to_argon2(self) -> Result<Params> {
        Params::new(
            self.memory_cost_kib,
            self.time_cost,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| SecureMemoryError::Derivation(format!("invalid parameters: {}", e)))
    }
}

/// Derives a 32-byte key from `password` and `salt` with the default work factor
pub fn derive_key_from_password(password: &SecureString, salt: &[u8]) -> Result<SecureBuffer> {
    derive_key_with_params(password, salt, KdfParams::default())
}

/// Derives a 32-byte key with an explicit work factor
pub fn derive_key_with_params(
    password: &SecureString,
    salt: &[u8],
    params: KdfParams,
) -> Result<SecureBuffer> {
    if salt.len() < MIN_SALT_LEN {
        return Err(SecureMemoryError::Derivation(format!(
            "salt must be at least {} bytes, got {}",
            MIN_SALT_LEN,
            salt.len()
        )));
    }

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);
    let mut output = SecureBuffer::zeroed(KEY_LEN)?;

    debug!(
        time_cost = params.time_cost,
        memory_cost_kib = params.memory_cost_kib,
        parallelism = params.parallelism,
        "Deriving key"
    );

    argon2
        .hash_password_into(password.as_bytes(), salt, output.as_mut_slice())
        .map_err(|e| SecureMemoryError::Derivation(e.to_string()))?;

    Ok(output)
}

/// Derives a key and seals it straight into a [`SecureKey`]
pub fn derive_and_protect_key(password: &SecureString, salt: &[u8]) -> Result<SecureKey> {
    SecureKey::from_buffer(derive_key_from_password(password, salt)?)
}

/// Random salt from the operating system RNG
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

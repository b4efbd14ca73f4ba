//! Memory for secrets
//!
//! Primitives that keep key material and passwords out of swap and wipe them
//! on every destruction path:
//!
//! - [`secure_zero`]: non-elidable wipe
//! - [`LockedBuffer`]: page-aligned, `mlock`ed heap memory
//! - [`GuardedBuffer`]: locked memory between two `PROT_NONE` guard pages
//! - [`SecureBuffer`], [`SecureString`], [`SecureKey`]: typed secret holders
//! - [`kdf`]: Argon2id password-based key derivation
//!
//! Construction either fully succeeds or fails with a [`SecureMemoryError`]
//! after releasing whatever it acquired.

mod buffer;
mod error;
mod guarded;
pub mod kdf;
mod key;
mod locked;
pub mod platform;
mod string;
mod zero;

pub use buffer::SecureBuffer;
pub use error::{Result, SecureMemoryError};
pub use guarded::GuardedBuffer;
pub use kdf::{derive_and_protect_key, derive_key_from_password, KdfParams};
pub use key::SecureKey;
pub use locked::LockedBuffer;
pub use string::SecureString;
pub use zero::{secure_zero, secure_zero_raw};

use super::buffer::SecureBuffer;
use super::error::Result;
use super::guarded::GuardedBuffer;
use std::fmt;

/// Fixed-size key material sealed in guarded, read-only memory.
///
/// The bytes are written once at construction, then the pages are switched
/// to read-only so any later write faults. Move-only; `std::mem::take`
/// leaves a zero-length key behind.
#[derive(Default)]
pub struct SecureKey {
    mem: GuardedBuffer,
}

impl SecureKey {
    pub fn new(bytes: &[u8]) -> Result<Self> {
        let mut mem = GuardedBuffer::new(bytes.len())?;
        mem.as_mut_slice()?.copy_from_slice(bytes);
        mem.make_readonly()?;
        Ok(Self { mem })
    }

    /// Seals the contents of `buffer`; the buffer is wiped on return
    pub fn from_buffer(buffer: SecureBuffer) -> Result<Self> {
        Self::new(buffer.as_slice())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.mem.as_slice()
    }

    pub fn len(&self) -> usize {
        self.mem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.mem.is_readonly()
    }
}

impl AsRef<[u8]> for SecureKey {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for SecureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureKey([REDACTED; {}])", self.len())
    }
}

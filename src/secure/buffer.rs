use super::error::Result;
use super::locked::LockedBuffer;
use std::fmt;

/// Length-tracked secret bytes on locked pages.
///
/// This is what key derivation hands back: the caller owns the bytes and
/// they are wiped when the buffer goes away.
#[derive(Default)]
pub struct SecureBuffer {
    inner: LockedBuffer,
}

impl SecureBuffer {
    /// A zero-filled buffer of `len` bytes
    pub fn zeroed(len: usize) -> Result<Self> {
        Ok(Self {
            inner: LockedBuffer::new(len)?,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: LockedBuffer::from_slice(bytes)?,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.inner.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.inner.as_mut_slice()
    }

    /// Whether the backing pages are still locked (false after a move-out)
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl AsRef<[u8]> for SecureBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Comparison runs over every byte regardless of where the first
/// difference is.
impl PartialEq for SecureBuffer {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.as_slice(), other.as_slice());
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

impl Eq for SecureBuffer {}

impl fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBuffer([REDACTED; {}])", self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_zeroed_buffer() {
        let buffer = SecureBuffer::zeroed(32).unwrap();
        assert_eq!(buffer.len(), 32);
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    #[serial]
    fn test_equality() {
        let a = SecureBuffer::from_slice(b"abc").unwrap();
        let b = SecureBuffer::from_slice(b"abc").unwrap();
        let c = SecureBuffer::from_slice(b"abd").unwrap();
        let d = SecureBuffer::from_slice(b"ab").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    #[serial]
    fn test_debug_is_redacted() {
        let buffer = SecureBuffer::from_slice(b"secret").unwrap();
        let debug = format!("{:?}", buffer);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("REDACTED"));
    }
}

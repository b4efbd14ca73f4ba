use super::error::Result;
use super::locked::LockedBuffer;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

/// UTF-8 text held in locked, zero-on-drop memory.
///
/// Not `Clone`: a copy would be a second replica of the secret. Use
/// `std::mem::take` to move the contents out; the source is left empty and
/// unlocked.
#[derive(Default)]
pub struct SecureString {
    buf: LockedBuffer,
}

impl SecureString {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `text` into locked memory and wipes the original heap copy
    pub fn from_string(mut text: String) -> Result<Self> {
        let secure = Self::from_str(&text);
        text.zeroize();
        secure
    }

    pub fn as_str(&self) -> &str {
        // SAFETY: the buffer is only ever filled from `&str` values, and
        // appends happen at char boundaries.
        unsafe { std::str::from_utf8_unchecked(self.buf.as_slice()) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends `text`, reallocating into a fresh locked buffer. The old
    /// buffer is wiped when it is dropped.
    pub fn push_str(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let old = self.buf.as_slice();
        let mut grown = LockedBuffer::new(old.len() + text.len())?;
        let dst = grown.as_mut_slice();
        dst[..old.len()].copy_from_slice(old);
        dst[old.len()..].copy_from_slice(text.as_bytes());
        self.buf = grown;
        Ok(())
    }

    pub fn push(&mut self, ch: char) -> Result<()> {
        let mut tmp = [0u8; 4];
        let encoded = ch.encode_utf8(&mut tmp);
        let result = self.push_str(encoded);
        tmp.zeroize();
        result
    }

    /// Wipes and releases the contents
    pub fn clear(&mut self) {
        self.buf.release();
    }

    /// Whether the contents currently sit on locked pages
    pub fn is_locked(&self) -> bool {
        self.buf.is_locked()
    }
}

impl FromStr for SecureString {
    type Err = super::SecureMemoryError;

    /// Copies `text` into locked memory
    fn from_str(text: &str) -> Result<Self> {
        Ok(Self {
            buf: LockedBuffer::from_slice(text.as_bytes())?,
        })
    }
}

impl TryFrom<&str> for SecureString {
    type Error = super::SecureMemoryError;

    fn try_from(value: &str) -> Result<Self> {
        Self::from_str(value)
    }
}

impl TryFrom<String> for SecureString {
    type Error = super::SecureMemoryError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_string(value)
    }
}

impl PartialEq for SecureString {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.as_bytes(), other.as_bytes());
        a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

impl Eq for SecureString {}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureString")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_str() {
        let s = SecureString::from_str("correct horse").unwrap();
        assert_eq!(s.as_str(), "correct horse");
        assert_eq!(s.len(), 13);
        assert!(s.is_locked());

        let parsed: SecureString = "correct horse".parse().unwrap();
        assert_eq!(parsed, s);
    }

    #[test]
    #[serial]
    fn test_clear_wipes_contents() {
        let mut s = SecureString::from_str("swordfish").unwrap();
        crate::secure::zero::take_last_release();
        s.clear();
        assert_eq!(crate::secure::zero::take_last_release(), Some(true));
        assert!(s.is_empty());
    }

    #[test]
    #[serial]
    fn test_take_leaves_source_empty() {
        let mut source = SecureString::from_str("password").unwrap();
        let moved = std::mem::take(&mut source);
        assert_eq!(moved.as_str(), "password");
        assert!(source.is_empty());
        assert!(!source.is_locked());
        assert_eq!(source.as_str(), "");
    }

    #[test]
    #[serial]
    fn test_push_str_and_char() {
        let mut s = SecureString::new();
        s.push_str("pä").unwrap();
        s.push('ß').unwrap();
        s.push_str("").unwrap();
        assert_eq!(s.as_str(), "päß");
    }

    #[test]
    #[serial]
    fn test_clear() {
        let mut s = SecureString::from_str("abc").unwrap();
        s.clear();
        assert!(s.is_empty());
        assert!(!s.is_locked());
    }

    #[test]
    #[serial]
    fn test_try_from_string() {
        let s = SecureString::try_from(String::from("hunter2")).unwrap();
        assert_eq!(s, SecureString::from_str("hunter2").unwrap());
    }

    #[test]
    fn test_debug_hides_contents() {
        let s = SecureString::new();
        assert_eq!(format!("{:?}", s), "SecureString { len: 0, .. }");
    }
}

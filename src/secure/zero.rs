use std::sync::atomic::{compiler_fence, Ordering};
use zeroize::Zeroize;

/// Overwrites `buf` with zeroes in a way the optimiser cannot elide.
///
/// Every secret-holding type in this module calls this from `Drop`.
pub fn secure_zero(buf: &mut [u8]) {
    buf.zeroize();
    compiler_fence(Ordering::SeqCst);
}

/// Raw-pointer variant of [`secure_zero`] for memory not yet wrapped in a slice.
///
/// # Safety
///
/// `ptr` must be valid for writes of `len` bytes.
pub unsafe fn secure_zero_raw(ptr: *mut u8, len: usize) {
    if len == 0 || ptr.is_null() {
        return;
    }
    secure_zero(std::slice::from_raw_parts_mut(ptr, len));
}

#[cfg(test)]
thread_local! {
    static LAST_RELEASE_ZEROED: std::cell::Cell<Option<bool>> = const { std::cell::Cell::new(None) };
}

/// Notes whether `region` is all zeroes just before it is handed back to
/// the allocator or unmapped
#[cfg(test)]
pub(crate) fn note_release(region: &[u8]) {
    let zeroed = region.iter().all(|&b| b == 0);
    LAST_RELEASE_ZEROED.with(|cell| cell.set(Some(zeroed)));
}

/// Result of the most recent [`note_release`] on this thread, cleared on read
#[cfg(test)]
pub(crate) fn take_last_release() -> Option<bool> {
    LAST_RELEASE_ZEROED.with(|cell| cell.take())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_zero_clears_all_bytes() {
        let mut buf = [0xAAu8; 64];
        secure_zero(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_secure_zero_raw_partial() {
        let mut buf = [0x55u8; 16];
        unsafe { secure_zero_raw(buf.as_mut_ptr(), 8) };
        assert!(buf[..8].iter().all(|&b| b == 0));
        assert!(buf[8..].iter().all(|&b| b == 0x55));
    }

    #[test]
    fn test_secure_zero_raw_null_is_noop() {
        unsafe { secure_zero_raw(std::ptr::null_mut(), 32) };
    }
}

//! Thin wrappers over the OS memory primitives used by the secure buffers.
//!
//! All functions report failures as `io::Error::last_os_error()` so callers
//! can attach sizes and turn them into [`SecureMemoryError`](super::SecureMemoryError).

use std::io;
use std::ptr::NonNull;
use std::sync::OnceLock;

const FALLBACK_PAGE_SIZE: usize = 4096;

/// Page protection applied with `mprotect`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    NoAccess,
    ReadOnly,
    ReadWrite,
}

impl Protection {
    fn as_flags(self) -> libc::c_int {
        match self {
            Protection::NoAccess => libc::PROT_NONE,
            Protection::ReadOnly => libc::PROT_READ,
            Protection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
        }
    }
}

/// Returns the system page size, cached after the first query
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf has no memory-safety preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            FALLBACK_PAGE_SIZE
        }
    })
}

/// Rounds `len` up to a whole number of pages.
///
/// Returns `None` on overflow. Zero stays zero.
pub fn round_to_pages(len: usize) -> Option<usize> {
    let page = page_size();
    len.checked_add(page - 1).map(|v| v / page * page)
}

/// Current `RLIMIT_MEMLOCK` soft limit in bytes, `None` when unlimited or unknown
pub fn lock_limit() -> Option<u64> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit struct.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut limit) };
    if rc != 0 || limit.rlim_cur == libc::RLIM_INFINITY {
        return None;
    }
    Some(limit.rlim_cur as u64)
}

/// Pins `len` bytes at `ptr` into physical memory.
///
/// # Safety
///
/// `ptr..ptr+len` must be a mapped region owned by the caller.
pub unsafe fn lock(ptr: *const u8, len: usize) -> io::Result<()> {
    if libc::mlock(ptr.cast(), len) != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Releases a lock taken with [`lock`].
///
/// # Safety
///
/// `ptr..ptr+len` must be a mapped region owned by the caller.
pub unsafe fn unlock(ptr: *const u8, len: usize) -> io::Result<()> {
    if libc::munlock(ptr.cast(), len) != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Changes the protection of a page-aligned region.
///
/// # Safety
///
/// `ptr` must be page aligned and `ptr..ptr+len` must lie inside a mapping
/// owned by the caller. No live references may observe the region while it
/// is inaccessible.
pub unsafe fn protect(ptr: *mut u8, len: usize, protection: Protection) -> io::Result<()> {
    if libc::mprotect(ptr.cast(), len, protection.as_flags()) != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Maps `len` bytes of private, zero-filled, read-write memory.
pub fn map_anonymous(len: usize) -> io::Result<NonNull<u8>> {
    // SAFETY: anonymous private mapping with a null hint; the kernel picks
    // the address and the result is checked against MAP_FAILED.
    let raw = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if raw == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    exclude_from_core_dumps(raw.cast(), len);
    NonNull::new(raw.cast()).ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))
}

/// Unmaps a region obtained from [`map_anonymous`].
///
/// # Safety
///
/// `ptr` and `len` must describe exactly one live mapping.
pub unsafe fn unmap(ptr: *mut u8, len: usize) -> io::Result<()> {
    if libc::munmap(ptr.cast(), len) != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn exclude_from_core_dumps(ptr: *mut u8, len: usize) {
    // SAFETY: advisory call on a mapping we just created; failure is harmless.
    let rc = unsafe { libc::madvise(ptr.cast(), len, libc::MADV_DONTDUMP) };
    if rc != 0 {
        tracing::debug!(
            "madvise(MADV_DONTDUMP) failed: {}",
            io::Error::last_os_error()
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn exclude_from_core_dumps(_ptr: *mut u8, _len: usize) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        let page = page_size();
        assert!(page >= 4096);
        assert!(page.is_power_of_two());
    }

    #[test]
    fn test_round_to_pages() {
        let page = page_size();
        assert_eq!(round_to_pages(0), Some(0));
        assert_eq!(round_to_pages(1), Some(page));
        assert_eq!(round_to_pages(page), Some(page));
        assert_eq!(round_to_pages(page + 1), Some(2 * page));
        assert_eq!(round_to_pages(usize::MAX), None);
    }

    #[test]
    fn test_map_protect_unmap() {
        let page = page_size();
        let ptr = map_anonymous(page).unwrap();
        unsafe {
            *ptr.as_ptr() = 7;
            protect(ptr.as_ptr(), page, Protection::ReadOnly).unwrap();
            assert_eq!(*ptr.as_ptr(), 7);
            protect(ptr.as_ptr(), page, Protection::ReadWrite).unwrap();
            unmap(ptr.as_ptr(), page).unwrap();
        }
    }
}

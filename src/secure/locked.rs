use super::error::{Result, SecureMemoryError};
use super::platform;
use super::zero::secure_zero;
use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;
use tracing::{debug, warn};

/// Page-aligned heap memory pinned into RAM for its whole lifetime.
///
/// The allocation is rounded up to whole pages, zero-initialised, locked with
/// `mlock`, and wiped before it is unlocked and released. A zero-sized buffer
/// is the null state: it owns no memory and holds no lock.
pub struct LockedBuffer {
    alloc: Option<(NonNull<u8>, Layout)>,
    len: usize,
}

// SAFETY: the buffer exclusively owns its allocation.
unsafe impl Send for LockedBuffer {}
unsafe impl Sync for LockedBuffer {}

impl LockedBuffer {
    /// Allocates and locks `len` bytes.
    ///
    /// If locking fails the allocation is released before the error is
    /// returned, so nothing leaks on partial failure.
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(Self::empty());
        }

        let page = platform::page_size();
        let capacity = platform::round_to_pages(len).ok_or(SecureMemoryError::InvalidSize(len))?;
        let layout = Layout::from_size_align(capacity, page)
            .map_err(|_| SecureMemoryError::InvalidSize(len))?;

        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(SecureMemoryError::Allocation { size: capacity })?;

        // SAFETY: ptr..ptr+capacity is the allocation we just made.
        if let Err(source) = unsafe { platform::lock(ptr.as_ptr(), capacity) } {
            // SAFETY: same pointer and layout as the allocation above.
            unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
            return Err(SecureMemoryError::Lock {
                size: capacity,
                source,
            });
        }

        debug!(len, capacity, "Locked secure buffer");

        Ok(Self {
            alloc: Some((ptr, layout)),
            len,
        })
    }

    /// Allocates a locked buffer holding a copy of `bytes`
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let mut buffer = Self::new(bytes.len())?;
        buffer.as_mut_slice().copy_from_slice(bytes);
        Ok(buffer)
    }

    /// The null state: no allocation, no lock
    pub const fn empty() -> Self {
        Self {
            alloc: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes actually locked (page rounded)
    pub fn capacity(&self) -> usize {
        self.alloc.map(|(_, layout)| layout.size()).unwrap_or(0)
    }

    /// Whether this buffer currently holds a locked allocation
    pub fn is_locked(&self) -> bool {
        self.alloc.is_some()
    }

    pub fn as_slice(&self) -> &[u8] {
        match self.alloc {
            // SAFETY: the allocation is at least `len` bytes and initialised.
            Some((ptr, _)) => unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.len) },
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.alloc {
            // SAFETY: as above, and `&mut self` guarantees exclusivity.
            Some((ptr, _)) => unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.len) },
            None => &mut [],
        }
    }

    /// Wipes, unlocks and frees the allocation, leaving the null state
    pub fn release(&mut self) {
        let Some((ptr, layout)) = self.alloc.take() else {
            return;
        };
        self.len = 0;

        // SAFETY: ptr/layout describe our live allocation; nothing else
        // references it once `alloc` is taken.
        unsafe {
            secure_zero(std::slice::from_raw_parts_mut(ptr.as_ptr(), layout.size()));
            if let Err(e) = platform::unlock(ptr.as_ptr(), layout.size()) {
                warn!("Failed to unlock secure buffer: {}", e);
            }
            #[cfg(test)]
            super::zero::note_release(std::slice::from_raw_parts(ptr.as_ptr(), layout.size()));
            alloc::dealloc(ptr.as_ptr(), layout);
        }
    }
}

impl Default for LockedBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for LockedBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for LockedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

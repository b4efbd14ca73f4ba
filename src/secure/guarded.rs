use super::error::{Result, SecureMemoryError};
use super::platform::{self, Protection};
use super::zero::secure_zero;
use std::fmt;
use std::ptr::NonNull;
use tracing::{debug, warn};

/// Locked memory flanked by inaccessible guard pages.
///
/// Layout of the mapping:
///
/// ```text
/// | guard (PROT_NONE) | data pages (locked) | guard (PROT_NONE) |
/// ```
///
/// Reading or writing one byte before or past the data pages faults
/// immediately. The data pages can be switched between read-write and
/// read-only with [`make_readonly`](Self::make_readonly) /
/// [`make_readwrite`](Self::make_readwrite).
pub struct GuardedBuffer {
    mapping: Option<Mapping>,
    len: usize,
    readonly: bool,
}

#[derive(Clone, Copy)]
struct Mapping {
    base: NonNull<u8>,
    total: usize,
    data_capacity: usize,
}

impl Mapping {
    fn data(&self) -> *mut u8 {
        // SAFETY: the data pages start one page into the mapping.
        unsafe { self.base.as_ptr().add(platform::page_size()) }
    }
}

// SAFETY: the buffer exclusively owns its mapping.
unsafe impl Send for GuardedBuffer {}
unsafe impl Sync for GuardedBuffer {}

impl GuardedBuffer {
    /// Maps `len` bytes (rounded up to pages) between two guard pages and
    /// locks the data pages. Any failure unmaps everything before returning.
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(Self::empty());
        }

        let page = platform::page_size();
        let data_capacity =
            platform::round_to_pages(len).ok_or(SecureMemoryError::InvalidSize(len))?;
        let total = data_capacity
            .checked_add(2 * page)
            .ok_or(SecureMemoryError::InvalidSize(len))?;

        let base = platform::map_anonymous(total)
            .map_err(|source| SecureMemoryError::Map { size: total, source })?;
        let mapping = Mapping {
            base,
            total,
            data_capacity,
        };

        if let Err(e) = Self::arm(&mapping) {
            // SAFETY: the mapping was created above and is not referenced elsewhere.
            if let Err(unmap_err) = unsafe { platform::unmap(base.as_ptr(), total) } {
                warn!("Failed to unmap guarded buffer after setup error: {}", unmap_err);
            }
            return Err(e);
        }

        debug!(len, data_capacity, total, "Mapped guarded buffer");

        Ok(Self {
            mapping: Some(mapping),
            len,
            readonly: false,
        })
    }

    fn arm(mapping: &Mapping) -> Result<()> {
        let page = platform::page_size();
        let front = mapping.base.as_ptr();
        let data = mapping.data();
        // SAFETY: all three ranges lie inside the fresh mapping.
        unsafe {
            let back = data.add(mapping.data_capacity);
            platform::protect(front, page, Protection::NoAccess)
                .map_err(|source| SecureMemoryError::Protect { size: page, source })?;
            platform::protect(back, page, Protection::NoAccess)
                .map_err(|source| SecureMemoryError::Protect { size: page, source })?;
            platform::lock(data, mapping.data_capacity).map_err(|source| {
                SecureMemoryError::Lock {
                    size: mapping.data_capacity,
                    source,
                }
            })?;
        }
        Ok(())
    }

    /// The null state: no mapping
    pub const fn empty() -> Self {
        Self {
            mapping: None,
            len: 0,
            readonly: false,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Size of the data region in bytes (page rounded)
    pub fn capacity(&self) -> usize {
        self.mapping.map(|m| m.data_capacity).unwrap_or(0)
    }

    pub fn as_slice(&self) -> &[u8] {
        match self.mapping {
            // SAFETY: data pages are readable in both protection modes.
            Some(m) => unsafe { std::slice::from_raw_parts(m.data(), self.len) },
            None => &[],
        }
    }

    /// Mutable view of the data; switches the pages back to read-write first
    /// if they were sealed.
    pub fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        if self.readonly {
            self.make_readwrite()?;
        }
        Ok(match self.mapping {
            // SAFETY: pages are read-write and `&mut self` guarantees exclusivity.
            Some(m) => unsafe { std::slice::from_raw_parts_mut(m.data(), self.len) },
            None => &mut [],
        })
    }

    /// Seals the data pages; writes fault until [`make_readwrite`](Self::make_readwrite)
    pub fn make_readonly(&mut self) -> Result<()> {
        self.set_protection(Protection::ReadOnly)?;
        self.readonly = true;
        Ok(())
    }

    pub fn make_readwrite(&mut self) -> Result<()> {
        self.set_protection(Protection::ReadWrite)?;
        self.readonly = false;
        Ok(())
    }

    fn set_protection(&mut self, protection: Protection) -> Result<()> {
        let Some(m) = self.mapping else {
            return Ok(());
        };
        // SAFETY: data pages belong to our mapping; `&mut self` means no
        // outstanding slices.
        unsafe { platform::protect(m.data(), m.data_capacity, protection) }.map_err(|source| {
            SecureMemoryError::Protect {
                size: m.data_capacity,
                source,
            }
        })
    }
}

impl Default for GuardedBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for GuardedBuffer {
    fn drop(&mut self) {
        let Some(m) = self.mapping.take() else {
            return;
        };

        if self.readonly {
            // SAFETY: data pages belong to the mapping being torn down.
            if let Err(e) =
                unsafe { platform::protect(m.data(), m.data_capacity, Protection::ReadWrite) }
            {
                // Wiping read-only pages would fault; unmapping still discards them.
                warn!("Failed to unseal guarded buffer before wipe: {}", e);
                // SAFETY: exact mapping created in `new`.
                if let Err(e) = unsafe { platform::unmap(m.base.as_ptr(), m.total) } {
                    warn!("Failed to unmap guarded buffer: {}", e);
                }
                return;
            }
        }

        // SAFETY: data pages are read-write and exclusively owned here.
        unsafe {
            secure_zero(std::slice::from_raw_parts_mut(m.data(), m.data_capacity));
            if let Err(e) = platform::unlock(m.data(), m.data_capacity) {
                warn!("Failed to unlock guarded buffer: {}", e);
            }
            #[cfg(test)]
            super::zero::note_release(std::slice::from_raw_parts(m.data(), m.data_capacity));
            if let Err(e) = platform::unmap(m.base.as_ptr(), m.total) {
                warn!("Failed to unmap guarded buffer: {}", e);
            }
        }
    }
}

impl fmt::Debug for GuardedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("readonly", &self.readonly)
            .finish_non_exhaustive()
    }
}

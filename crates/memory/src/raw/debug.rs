//! Page-mapped raw allocator for use-after-free hunting
//!
//! Every allocation is its own anonymous mapping, so a freed or protected
//! range can be made to fault on access instead of silently reading stale
//! data. Platforms without `mmap` fall back to the C heap and paint
//! protected memory with [`PROTECT_PATTERN`].

use core::ptr::NonNull;

use super::RawAllocator;

/// Byte written over protected memory when access protection is unavailable
pub const PROTECT_PATTERN: u8 = 0xEF;

/// Raw allocator built on anonymous page mappings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DebugRawAllocator;

impl DebugRawAllocator {
    /// Create a new debug allocator
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
// SAFETY: mmap returns page-aligned, zero-filled, private memory that no
// other mapping aliases.
unsafe impl RawAllocator for DebugRawAllocator {
    fn try_allocate(&self, size: usize, hint: Option<NonNull<u8>>) -> Option<NonNull<u8>> {
        let addr = hint.map_or(core::ptr::null_mut(), |h| h.as_ptr().cast::<libc::c_void>());

        // SAFETY: FFI call to mmap. We pass:
        // - addr: a placement hint only (no MAP_FIXED), or null
        // - len: non-zero, rounded to pages by the OS
        // - fd=-1, offset=0: anonymous mapping (no file)
        // The OS validates all parameters and returns MAP_FAILED on error.
        let ptr = unsafe {
            libc::mmap(
                addr,
                size.max(1),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            None
        } else {
            NonNull::new(ptr.cast::<u8>())
        }
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>) {
        panic!("DebugRawAllocator cannot deallocate without a size on page-mapped platforms");
    }

    unsafe fn deallocate_sized(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: FFI call to munmap. Caller guarantees ptr/size describe a
        // mapping made by try_allocate.
        let rc = unsafe { libc::munmap(ptr.as_ptr().cast(), size.max(1)) };
        debug_assert_eq!(rc, 0, "munmap of {size} bytes at {ptr:p} failed");
    }

    unsafe fn protect(&self, ptr: NonNull<u8>, size: usize) {
        // Replace the range with an inaccessible mapping. MAP_FIXED discards
        // the old pages atomically, so the range stays reserved and a later
        // munmap with the original size still succeeds.
        // SAFETY: caller guarantees the range lies inside one of our mappings.
        let remapped = unsafe {
            libc::mmap(
                ptr.as_ptr().cast(),
                size,
                libc::PROT_NONE,
                libc::MAP_FIXED | libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if remapped == libc::MAP_FAILED {
            tracing::debug!(?ptr, size, "protect: remap failed, painting instead");
            // SAFETY: the range is still mapped read/write because the
            // remap did not happen.
            unsafe { ptr.as_ptr().write_bytes(PROTECT_PATTERN, size) };
        }
    }
}

#[cfg(not(unix))]
// SAFETY: delegates to malloc/free, see `MallocAllocator`.
unsafe impl RawAllocator for DebugRawAllocator {
    fn try_allocate(&self, size: usize, hint: Option<NonNull<u8>>) -> Option<NonNull<u8>> {
        super::MallocAllocator.try_allocate(size, hint)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        // SAFETY: forwarded caller contract.
        unsafe { super::MallocAllocator.deallocate(ptr) }
    }

    unsafe fn protect(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: caller guarantees the range is inside a live allocation.
        unsafe { ptr.as_ptr().write_bytes(PROTECT_PATTERN, size) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_round_trip() {
        let raw = DebugRawAllocator::new();
        let size = 3 * 4096;
        let ptr = raw.allocate(size, None).unwrap();
        // SAFETY: the mapping is `size` bytes long and writable.
        unsafe {
            assert_eq!(*ptr.as_ptr(), 0, "anonymous mappings start zeroed");
            ptr.as_ptr().write_bytes(7, size);
            assert_eq!(*ptr.as_ptr().add(size - 1), 7);
            raw.deallocate_sized(ptr, size);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_mappings_are_page_aligned() {
        let raw = DebugRawAllocator;
        let ptr = raw.allocate(100, None).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 4096, 0);
        // SAFETY: allocated above with the same size.
        unsafe { raw.deallocate_sized(ptr, 100) };
    }

    #[cfg(unix)]
    #[test]
    fn test_protect_then_unmap() {
        let raw = DebugRawAllocator;
        let size = 2 * 4096;
        let ptr = raw.allocate(size, None).unwrap();
        // SAFETY: the range is ours and not touched after protecting.
        unsafe {
            raw.protect(ptr, size);
            raw.deallocate_sized(ptr, size);
        }
    }

    #[cfg(unix)]
    #[test]
    #[should_panic(expected = "cannot deallocate without a size")]
    fn test_unsized_deallocate_is_fatal() {
        let raw = DebugRawAllocator;
        let ptr = raw.allocate(4096, None).unwrap();
        // SAFETY: panics before touching the mapping.
        unsafe { raw.deallocate(ptr) };
    }
}

//! Contiguous memory segments

use core::fmt;
use core::ptr::NonNull;

/// One contiguous region of memory: a base address and a size.
///
/// A segment is a handle, not an owner. The allocator that produced it owns
/// the memory until the segment is handed back. Two segments are equal when
/// both base and size match.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemorySegment {
    base: NonNull<u8>,
    size: usize,
}

impl MemorySegment {
    /// Describe `size` bytes starting at `base`.
    ///
    /// # Safety
    /// `[base, base + size)` must lie within a single allocation that stays
    /// live for as long as the segment (or anything derived from it) is used.
    pub const unsafe fn from_raw_parts(base: NonNull<u8>, size: usize) -> Self {
        Self { base, size }
    }

    /// First byte of the segment
    #[inline]
    pub const fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Raw pointer to the first byte
    #[inline]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Size in bytes
    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Address one past the last byte
    #[inline]
    pub fn end_addr(&self) -> usize {
        self.base.as_ptr() as usize + self.size
    }

    /// True if `ptr` points inside the segment
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        addr >= self.base.as_ptr() as usize && addr < self.end_addr()
    }

    /// The `size` bytes starting `offset` bytes into this segment
    ///
    /// # Panics
    /// If the requested range does not fit.
    pub fn subsegment(&self, offset: usize, size: usize) -> MemorySegment {
        assert!(
            offset.checked_add(size).is_some_and(|end| end <= self.size),
            "subsegment {offset}+{size} outside segment of {} bytes",
            self.size
        );
        // SAFETY: offset <= self.size, so the pointer stays within (or one
        // past) the allocation this segment describes.
        let base = unsafe { self.base.add(offset) };
        Self { base, size }
    }
}

impl fmt::Debug for MemorySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySegment")
            .field("base", &self.base)
            .field("size", &self.size)
            .finish()
    }
}

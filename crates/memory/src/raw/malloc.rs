//! C heap raw allocator

use core::ptr::NonNull;

use super::RawAllocator;

/// Raw allocator backed by `malloc` / `free`
///
/// The default raw allocator. `free` does not need a size, so both
/// deallocation paths work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MallocAllocator;

impl MallocAllocator {
    /// Create a new malloc allocator
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

// SAFETY: malloc returns memory aligned for any fundamental type (at least
// 16 bytes on every supported 64-bit target) and never aliases a live block.
unsafe impl RawAllocator for MallocAllocator {
    fn try_allocate(&self, size: usize, _hint: Option<NonNull<u8>>) -> Option<NonNull<u8>> {
        // malloc(0) may legally return null; ask for one byte instead so a
        // null always means exhaustion.
        // SAFETY: FFI call with a non-zero size; the result is null-checked.
        let ptr = unsafe { libc::malloc(size.max(1)) };
        NonNull::new(ptr.cast::<u8>())
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        // SAFETY: caller guarantees `ptr` came from malloc and is released once.
        unsafe { libc::free(ptr.as_ptr().cast()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_allocation() {
        let raw = MallocAllocator;
        let ptr = raw.allocate(128, None).unwrap();
        // SAFETY: 128 bytes were just allocated.
        unsafe {
            ptr.as_ptr().write_bytes(0xAB, 128);
            assert_eq!(*ptr.as_ptr().add(127), 0xAB);
            raw.deallocate_sized(ptr, 128);
        }
    }

    #[test]
    fn test_zero_sized_allocation() {
        let raw = MallocAllocator;
        let ptr = raw.try_allocate(0, None).expect("zero-size request still succeeds");
        // SAFETY: allocated above, freed once.
        unsafe { raw.deallocate(ptr) };
    }

    #[test]
    fn test_interchangeable_instances() {
        let a = MallocAllocator;
        let b = MallocAllocator::new();
        assert_eq!(a, b);
        let ptr = a.allocate(64, None).unwrap();
        // SAFETY: any malloc allocator may free memory from another.
        unsafe { b.deallocate(ptr) };
    }

    #[test]
    fn test_alignment() {
        let raw = MallocAllocator;
        let ptr = raw.allocate(24, None).unwrap();
        assert_eq!(ptr.as_ptr() as usize % super::super::MIN_ALIGN, 0);
        // SAFETY: allocated above.
        unsafe { raw.deallocate_sized(ptr, 24) };
    }

    #[test]
    fn test_thread_safety_markers() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MallocAllocator>();
    }
}

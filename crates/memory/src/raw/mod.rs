//! Raw allocators: the stateless bottom layer of the allocator stack
//!
//! A raw allocator hands out untyped memory straight from the platform
//! (the C heap, anonymous page mappings, or an embedder's routines).
//! Instances carry no state, so any instance of a concrete type can free
//! memory that another instance of the same type allocated. Instances of
//! different types are never interchangeable; the backing allocator is
//! generic over a single concrete type so the compiler enforces this.
//!
//! # Safety
//!
//! [`RawAllocator`] is an unsafe trait. Implementors must return pointers
//! that are valid for reads and writes of the requested size, aligned at
//! least to [`MIN_ALIGN`], and not aliased by any other live allocation.

mod custom;
mod debug;
mod malloc;
mod tracking;

use core::ptr::NonNull;

pub use custom::{AllocateFn, CustomAllocator, DeallocateFn, NoLongerUsedFn};
pub use debug::{DebugRawAllocator, PROTECT_PATTERN};
pub use malloc::MallocAllocator;
pub use tracking::{AllocationTracker, TrackerSnapshot, TrackingAllocator};

use crate::error::{MemoryError, MemoryResult};

/// Alignment every raw allocation is guaranteed to satisfy
pub const MIN_ALIGN: usize = 16;

/// Stateless source of untyped memory
///
/// # Safety
///
/// See the [module documentation](self).
pub unsafe trait RawAllocator {
    /// Allocate at least `size` bytes, or `None` when the platform refuses.
    ///
    /// `hint` is an address the caller would like the memory near; most
    /// implementations ignore it.
    fn try_allocate(&self, size: usize, hint: Option<NonNull<u8>>) -> Option<NonNull<u8>>;

    /// Allocate at least `size` bytes, reporting failure as
    /// [`MemoryError::OutOfMemory`]
    fn allocate(&self, size: usize, hint: Option<NonNull<u8>>) -> MemoryResult<NonNull<u8>> {
        self.try_allocate(size, hint)
            .ok_or_else(|| MemoryError::out_of_memory(size))
    }

    /// Release memory without knowing its size
    ///
    /// Some allocators cannot do this and panic; prefer
    /// [`deallocate_sized`](Self::deallocate_sized) whenever the size is known.
    ///
    /// # Safety
    /// - `ptr` must come from an allocator of the same concrete type
    /// - `ptr` must not be used afterwards or released twice
    unsafe fn deallocate(&self, ptr: NonNull<u8>);

    /// Release memory whose size is known
    ///
    /// # Safety
    /// Same as [`deallocate`](Self::deallocate); `size` must be the size
    /// passed to the allocation that produced `ptr`.
    unsafe fn deallocate_sized(&self, ptr: NonNull<u8>, size: usize) {
        let _ = size;
        // SAFETY: forwarded caller contract.
        unsafe { self.deallocate(ptr) }
    }

    /// Make `[ptr, ptr + size)` inaccessible until it is deallocated.
    ///
    /// Used to catch use-after-free. The default does nothing.
    ///
    /// # Safety
    /// The range must lie inside one live allocation of this allocator, and
    /// nothing may read or write it afterwards.
    unsafe fn protect(&self, ptr: NonNull<u8>, size: usize) {
        let _ = (ptr, size);
    }
}

// SAFETY: forwards every call to the referenced allocator, preserving its
// guarantees.
unsafe impl<A: RawAllocator + ?Sized> RawAllocator for &A {
    #[inline]
    fn try_allocate(&self, size: usize, hint: Option<NonNull<u8>>) -> Option<NonNull<u8>> {
        (**self).try_allocate(size, hint)
    }

    #[inline]
    fn allocate(&self, size: usize, hint: Option<NonNull<u8>>) -> MemoryResult<NonNull<u8>> {
        (**self).allocate(size, hint)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).deallocate(ptr) }
    }

    #[inline]
    unsafe fn deallocate_sized(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).deallocate_sized(ptr, size) }
    }

    #[inline]
    unsafe fn protect(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).protect(ptr, size) }
    }
}

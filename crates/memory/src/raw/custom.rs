//! Raw allocator that dispatches to embedder-supplied routines

use core::ffi::c_void;
use core::fmt;
use core::ptr::{self, NonNull};

use super::RawAllocator;

/// Allocation routine: `(size, hint) -> memory or null`
pub type AllocateFn = unsafe extern "C" fn(size: usize, hint: *mut c_void) -> *mut c_void;

/// Release routine: `(memory)`
pub type DeallocateFn = unsafe extern "C" fn(ptr: *mut c_void);

/// Optional notification that a range will not be touched again before it
/// is released: `(memory, size)`
pub type NoLongerUsedFn = unsafe extern "C" fn(ptr: *mut c_void, size: usize);

/// Raw allocator that forwards to host-provided function pointers
///
/// Costs one indirect call per operation. All instances compare equal:
/// like every raw allocator it is treated as stateless, so two custom
/// allocators built from different routines must not be mixed.
#[derive(Clone, Copy)]
pub struct CustomAllocator {
    allocate: AllocateFn,
    deallocate: DeallocateFn,
    no_longer_used: Option<NoLongerUsedFn>,
}

impl CustomAllocator {
    /// Create an allocator from the host's routines.
    ///
    /// # Safety
    ///
    /// `allocate` must return null or memory valid for `size` bytes, aligned
    /// to [`MIN_ALIGN`](super::MIN_ALIGN) and not aliased elsewhere.
    /// `deallocate` must accept every non-null pointer `allocate` returns.
    /// `no_longer_used`, if given, must tolerate any live range.
    pub const unsafe fn new(
        allocate: AllocateFn,
        deallocate: DeallocateFn,
        no_longer_used: Option<NoLongerUsedFn>,
    ) -> Self {
        Self {
            allocate,
            deallocate,
            no_longer_used,
        }
    }

    /// Whether a no-longer-used callback was supplied
    pub fn has_no_longer_used(&self) -> bool {
        self.no_longer_used.is_some()
    }
}

impl fmt::Debug for CustomAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAllocator")
            .field("no_longer_used", &self.no_longer_used.is_some())
            .finish_non_exhaustive()
    }
}

impl PartialEq for CustomAllocator {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for CustomAllocator {}

// SAFETY: upheld by the contract of `CustomAllocator::new`.
unsafe impl RawAllocator for CustomAllocator {
    fn try_allocate(&self, size: usize, hint: Option<NonNull<u8>>) -> Option<NonNull<u8>> {
        let hint = hint.map_or(ptr::null_mut(), |h| h.as_ptr().cast::<c_void>());
        // SAFETY: the routine was vouched for in `new`.
        let ptr = unsafe { (self.allocate)(size, hint) };
        NonNull::new(ptr.cast::<u8>())
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        // SAFETY: caller guarantees `ptr` came from `allocate`.
        unsafe { (self.deallocate)(ptr.as_ptr().cast()) }
    }

    unsafe fn protect(&self, ptr: NonNull<u8>, size: usize) {
        if let Some(no_longer_used) = self.no_longer_used {
            // SAFETY: caller guarantees the range is live and unused.
            unsafe { no_longer_used(ptr.as_ptr().cast(), size) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static ALLOCATED: AtomicUsize = AtomicUsize::new(0);
    static FREED: AtomicUsize = AtomicUsize::new(0);
    static RETIRED_BYTES: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn host_allocate(size: usize, _hint: *mut c_void) -> *mut c_void {
        ALLOCATED.fetch_add(1, Ordering::SeqCst);
        // SAFETY: plain malloc call.
        unsafe { libc::malloc(size) }
    }

    unsafe extern "C" fn host_deallocate(ptr: *mut c_void) {
        FREED.fetch_add(1, Ordering::SeqCst);
        // SAFETY: every pointer handed out came from malloc.
        unsafe { libc::free(ptr) }
    }

    unsafe extern "C" fn host_no_longer_used(_ptr: *mut c_void, size: usize) {
        RETIRED_BYTES.fetch_add(size, Ordering::SeqCst);
    }

    unsafe extern "C" fn host_refuse(_size: usize, _hint: *mut c_void) -> *mut c_void {
        ptr::null_mut()
    }

    #[test]
    fn test_routes_through_host_functions() {
        // SAFETY: the host routines wrap malloc/free.
        let raw = unsafe {
            CustomAllocator::new(host_allocate, host_deallocate, Some(host_no_longer_used))
        };
        let before_alloc = ALLOCATED.load(Ordering::SeqCst);
        let before_free = FREED.load(Ordering::SeqCst);

        let ptr = raw.allocate(256, None).unwrap();
        // SAFETY: live 256-byte allocation.
        unsafe {
            raw.protect(ptr, 256);
            raw.deallocate_sized(ptr, 256);
        }

        assert!(ALLOCATED.load(Ordering::SeqCst) > before_alloc);
        assert!(FREED.load(Ordering::SeqCst) > before_free);
        assert!(RETIRED_BYTES.load(Ordering::SeqCst) >= 256);
    }

    #[test]
    fn test_protect_without_callback_is_noop() {
        // SAFETY: the host routines wrap malloc/free.
        let raw = unsafe { CustomAllocator::new(host_allocate, host_deallocate, None) };
        assert!(!raw.has_no_longer_used());
        let ptr = raw.allocate(32, None).unwrap();
        // SAFETY: live allocation.
        unsafe {
            raw.protect(ptr, 32);
            raw.deallocate(ptr);
        }
    }

    #[test]
    fn test_refusal_maps_to_out_of_memory() {
        // SAFETY: refusing every request is a valid allocation routine.
        let raw = unsafe { CustomAllocator::new(host_refuse, host_deallocate, None) };
        assert!(raw.try_allocate(64, None).is_none());
        let err = raw.allocate(64, None).unwrap_err();
        assert_eq!(err.code(), "MEM:ALLOC:OOM");
    }

    #[test]
    fn test_all_instances_equal() {
        // SAFETY: see above.
        let a = unsafe { CustomAllocator::new(host_allocate, host_deallocate, None) };
        // SAFETY: see above.
        let b = unsafe { CustomAllocator::new(host_refuse, host_deallocate, None) };
        assert_eq!(a, b);
    }
}

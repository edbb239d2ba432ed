//! Constructing values directly inside a segment
//!
//! The segment owns its memory, so nothing placed here is ever dropped by
//! this module: [`destroy_in`] exists only so call sites read symmetrically.

use core::mem::{align_of, size_of};
use core::ptr::NonNull;

use crate::segment::MemorySegment;
use crate::utils::is_aligned_ptr;

/// Storage for `size` bytes at the start of `segment`, if it is big enough
pub fn place_raw(segment: &MemorySegment, size: usize) -> Option<NonNull<u8>> {
    (segment.size() >= size).then(|| segment.base())
}

/// Move `value` into the start of `segment`
///
/// Returns `None`, writing nothing, when the segment is too small or its
/// base is not aligned for `T`. `value` is dropped in that case.
///
/// # Safety
///
/// The segment must describe live, writable memory not otherwise in use,
/// and the caller becomes responsible for the value's destructor (if any).
pub unsafe fn place<T>(segment: &MemorySegment, value: T) -> Option<NonNull<T>> {
    let base = place_raw(segment, size_of::<T>())?;
    if !is_aligned_ptr(base.as_ptr(), align_of::<T>()) {
        return None;
    }
    let ptr = base.cast::<T>();
    // SAFETY: size and alignment checked above; the caller guarantees the
    // memory is live and unused.
    unsafe { ptr.write(value) };
    Some(ptr)
}

/// Counterpart to [`place`]; intentionally does nothing
#[inline]
pub fn destroy_in<T: ?Sized>(ptr: NonNull<T>, segment: &MemorySegment) {
    let _ = (ptr, segment);
}

//! Single-threaded bump region over provider segments
//!
//! # Safety
//!
//! A [`Region`] bumps through segments obtained from a [`SegmentProvider`]:
//! - RefCell for the provider, segment list and finalizer list
//! - Cell for the current segment and offset (single-threaded)
//! - No individual deallocation; everything goes back on [`Region::release`]
//!
//! ## Invariants
//!
//! - `offset <= current.size()` whenever `current` is set
//! - Allocations never overlap (the offset only moves forward)
//! - Every segment in `segments` came from `provider` and is returned once
//! - Finalizers point at live values until `release` runs them
//!
//! Pointers handed out stay valid until `release` (or drop). Both take
//! `&mut self`, so no reference returned by `alloc` can outlive them.

use core::alloc::Layout;
use core::cell::{Cell, Ref, RefCell};
use core::fmt;
use core::mem;
use core::ptr::{self, NonNull};

use crate::error::{MemoryError, MemoryResult};
use crate::provider::SegmentProvider;
use crate::segment::MemorySegment;
use crate::utils::checked_align_up;

/// Type-erased destructor for a value living in the region
struct Finalizer {
    ptr: NonNull<u8>,
    drop_fn: unsafe fn(NonNull<u8>),
}

/// Drops the `T` at `ptr`
///
/// # Safety
/// `ptr` must point at a live, initialized `T` that is never used again.
unsafe fn drop_erased<T>(ptr: NonNull<u8>) {
    // SAFETY: forwarded caller contract.
    unsafe { ptr.cast::<T>().drop_in_place() }
}

/// Bump allocator whose memory comes from a segment provider
///
/// # Examples
///
/// ```
/// use jitkit_memory::{BackingMemoryAllocator, BackingMemoryConfig, MallocAllocator, Region};
///
/// let backing = BackingMemoryAllocator::new(MallocAllocator, BackingMemoryConfig::new(4096));
/// let region = Region::new(backing);
///
/// let n = region.alloc(41_u32)?;
/// *n += 1;
/// assert_eq!(*n, 42);
///
/// let name = region.alloc_str("entry")?;
/// assert_eq!(name, "entry");
/// # Ok::<(), jitkit_memory::MemoryError>(())
/// ```
pub struct Region<P: SegmentProvider> {
    provider: RefCell<P>,
    segments: RefCell<Vec<MemorySegment>>,
    current: Cell<Option<MemorySegment>>,
    offset: Cell<usize>,
    bytes_used: Cell<usize>,
    finalizers: RefCell<Vec<Finalizer>>,
}

impl<P: SegmentProvider> Region<P> {
    /// Create an empty region; no segment is requested until first use
    pub fn new(provider: P) -> Self {
        Self {
            provider: RefCell::new(provider),
            segments: RefCell::new(Vec::new()),
            current: Cell::new(None),
            offset: Cell::new(0),
            bytes_used: Cell::new(0),
            finalizers: RefCell::new(Vec::new()),
        }
    }

    /// Allocate `size` bytes aligned to `align`
    ///
    /// Zero-sized requests return a dangling, aligned pointer without
    /// touching any segment.
    ///
    /// # Errors
    ///
    /// - [`MemoryError::InvalidAlignment`] if `align` is not a power of two
    /// - [`MemoryError::SizeOverflow`] if the padded size overflows
    /// - whatever the provider reports when a new segment is needed
    pub fn allocate(&self, size: usize, align: usize) -> MemoryResult<NonNull<u8>> {
        if !align.is_power_of_two() {
            return Err(MemoryError::invalid_alignment(align));
        }
        if size == 0 {
            // SAFETY: a power of two is never zero.
            return Ok(unsafe { NonNull::new_unchecked(ptr::without_provenance_mut(align)) });
        }

        if let Some(ptr) = self.bump(size, align) {
            return Ok(ptr);
        }

        let needed = size
            .checked_add(align - 1)
            .ok_or_else(|| MemoryError::size_overflow(size, align))?;
        self.grow(needed)?;

        self.bump(size, align)
            .ok_or_else(|| MemoryError::segment_too_small(needed, self.remaining()))
    }

    /// Try to carve `size` bytes out of the current segment
    fn bump(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let segment = self.current.get()?;
        let offset = self.offset.get();
        let addr = segment.as_ptr() as usize + offset;
        let padding = checked_align_up(addr, align)? - addr;
        let start = offset.checked_add(padding)?;
        let end = start.checked_add(size)?;
        if end > segment.size() {
            return None;
        }

        self.offset.set(end);
        self.bytes_used.set(self.bytes_used.get() + size);
        // SAFETY: start < end <= segment.size(), so the pointer is inside
        // the segment and derived from its base.
        Some(unsafe { segment.base().add(start) })
    }

    fn grow(&self, needed: usize) -> MemoryResult<()> {
        let segment = self.provider.borrow_mut().request(needed)?;
        self.segments.borrow_mut().push(segment);
        self.current.set(Some(segment));
        self.offset.set(0);
        tracing::trace!(size = segment.size(), needed, "region took a new segment");
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.current
            .get()
            .map_or(0, |segment| segment.size() - self.offset.get())
    }

    /// Move `value` into the region
    ///
    /// If `T` needs dropping, its destructor runs on [`release`](Self::release).
    #[must_use = "allocated memory must be used"]
    pub fn alloc<T>(&self, value: T) -> MemoryResult<&mut T> {
        let ptr = self
            .allocate(mem::size_of::<T>(), mem::align_of::<T>())?
            .cast::<T>();

        if mem::needs_drop::<T>() {
            self.finalizers.borrow_mut().push(Finalizer {
                ptr: ptr.cast(),
                drop_fn: drop_erased::<T>,
            });
        }

        // SAFETY: Initializing allocated memory and creating reference.
        // - ptr is aligned for T and has room for it (allocate guarantees)
        // - the memory is not shared with any other allocation
        // - the reference is bound to &self, and release needs &mut self
        unsafe {
            ptr.write(value);
            Ok(&mut *ptr.as_ptr())
        }
    }

    /// Copy a slice into the region
    #[must_use = "allocated memory must be used"]
    pub fn alloc_slice_copy<T: Copy>(&self, slice: &[T]) -> MemoryResult<&mut [T]> {
        let layout = Layout::for_value(slice);
        let ptr = self.allocate(layout.size(), layout.align())?.cast::<T>();

        // SAFETY: Copying slice to allocated memory.
        // - ptr is valid and aligned for slice.len() elements of T
        // - source and destination cannot overlap (fresh allocation)
        // - for empty slices ptr is dangling but aligned, which is allowed
        unsafe {
            ptr::copy_nonoverlapping(slice.as_ptr(), ptr.as_ptr(), slice.len());
            Ok(&mut *ptr::slice_from_raw_parts_mut(ptr.as_ptr(), slice.len()))
        }
    }

    /// Copy a string into the region
    #[must_use = "allocated memory must be used"]
    pub fn alloc_str(&self, s: &str) -> MemoryResult<&mut str> {
        let bytes = self.alloc_slice_copy(s.as_bytes())?;
        // SAFETY: the bytes were copied verbatim from a valid &str.
        Ok(unsafe { core::str::from_utf8_unchecked_mut(bytes) })
    }

    /// Run pending finalizers (newest first) and return every segment
    pub fn release(&mut self) {
        let finalizers = mem::take(self.finalizers.get_mut());
        for finalizer in finalizers.into_iter().rev() {
            // SAFETY: each finalizer was registered for a live value written
            // by `alloc`, and no reference to it survives `&mut self`.
            unsafe { (finalizer.drop_fn)(finalizer.ptr) };
        }

        let provider = self.provider.get_mut();
        for segment in self.segments.get_mut().drain(..) {
            provider.release(segment);
        }
        self.current.set(None);
        self.offset.set(0);
        self.bytes_used.set(0);
    }

    /// Bytes handed out since creation or the last release, excluding padding
    #[inline]
    pub fn bytes_used(&self) -> usize {
        self.bytes_used.get()
    }

    /// Segments currently held
    pub fn segment_count(&self) -> usize {
        self.segments.borrow().len()
    }

    /// Destructors waiting to run
    pub fn finalizer_count(&self) -> usize {
        self.finalizers.borrow().len()
    }

    /// The segment provider
    ///
    /// # Panics
    /// If called while the region is requesting a segment.
    pub fn provider(&self) -> Ref<'_, P> {
        self.provider.borrow()
    }
}

impl<P: SegmentProvider> Drop for Region<P> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<P: SegmentProvider> fmt::Debug for Region<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("bytes_used", &self.bytes_used.get())
            .field("segments", &self.segment_count())
            .field("finalizers", &self.finalizer_count())
            .finish_non_exhaustive()
    }
}

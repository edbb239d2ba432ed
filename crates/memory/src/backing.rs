//! Backing memory: large segments straight from a raw allocator
//!
//! [`BackingMemoryAllocator`] is the layer every other allocator in the
//! compiler sits on. It hands out [`MemorySegment`]s of at least a fixed
//! minimum size, keeps a list of everything outstanding, and optionally
//! refuses to grow past a byte limit. Running out of the limit is a
//! recoverable error; handing back a segment it never produced is a bug
//! and panics.

use core::fmt;
use core::ptr::NonNull;
use std::collections::VecDeque;

use crate::config::{BackingMemoryConfig, DiagnosticLevel};
use crate::error::{MemoryError, MemoryResult};
use crate::provider::SegmentProvider;
use crate::raw::{MallocAllocator, RawAllocator};
use crate::segment::MemorySegment;

/// Emit a backing-memory diagnostic when the configured level allows it
macro_rules! memlog {
    ($self:expr, Summary, $($arg:tt)+) => {
        if $self.diagnostics.enabled(DiagnosticLevel::Summary) {
            tracing::debug!(target: "jitkit_memory::backing", $($arg)+);
        }
    };
    ($self:expr, Detail, $($arg:tt)+) => {
        if $self.diagnostics.enabled(DiagnosticLevel::Detail) {
            tracing::debug!(target: "jitkit_memory::backing", $($arg)+);
        }
    };
    ($self:expr, Verbose, $($arg:tt)+) => {
        if $self.diagnostics.enabled(DiagnosticLevel::Verbose) {
            tracing::trace!(target: "jitkit_memory::backing", $($arg)+);
        }
    };
}

/// Segment allocator over a single concrete raw allocator
///
/// # Examples
///
/// ```
/// use jitkit_memory::{BackingMemoryAllocator, BackingMemoryConfig, MallocAllocator};
///
/// let config = BackingMemoryConfig::new(4096).with_allocation_limit(8192);
/// let mut backing = BackingMemoryAllocator::new(MallocAllocator, config);
///
/// let a = backing.allocate(100, None)?;
/// assert_eq!(a.size(), 4096);
/// let b = backing.allocate(4096, None)?;
/// assert!(backing.allocate(1, None).is_err());
///
/// backing.deallocate(a);
/// backing.deallocate(b);
/// assert_eq!(backing.bytes_allocated(), 0);
/// # Ok::<(), jitkit_memory::MemoryError>(())
/// ```
pub struct BackingMemoryAllocator<A: RawAllocator = MallocAllocator> {
    raw: A,
    minimum_allocation_size: usize,
    allocation_limit: usize,
    bytes_allocated: usize,
    /// Newest first
    segments: VecDeque<MemorySegment>,
    diagnostics: DiagnosticLevel,
}

impl<A: RawAllocator> BackingMemoryAllocator<A> {
    /// Create a backing allocator drawing from `raw`.
    ///
    /// # Panics
    ///
    /// If the minimum allocation size is not a power of two, or if a non-zero
    /// limit is smaller than the minimum allocation size. Use
    /// [`BackingMemoryConfig::validate`] to check untrusted settings first.
    pub fn new(raw: A, config: BackingMemoryConfig) -> Self {
        assert!(
            config.minimum_allocation_size.is_power_of_two(),
            "minimum allocation size {} must be a power of two",
            config.minimum_allocation_size
        );
        assert!(
            config.allocation_limit == 0
                || config.allocation_limit >= config.minimum_allocation_size,
            "allocation limit {} is below the minimum allocation size {}",
            config.allocation_limit,
            config.minimum_allocation_size
        );

        Self {
            raw,
            minimum_allocation_size: config.minimum_allocation_size,
            allocation_limit: config.allocation_limit,
            bytes_allocated: 0,
            segments: VecDeque::new(),
            diagnostics: config.diagnostics,
        }
    }

    /// Allocate a segment of at least `requested` bytes
    ///
    /// The segment is never smaller than the minimum allocation size. On any
    /// error the allocator is left exactly as it was.
    ///
    /// # Errors
    ///
    /// - [`MemoryError::LimitExceeded`] when the segment would push usage
    ///   past the limit
    /// - [`MemoryError::OutOfMemory`] when the raw allocator refuses
    /// - [`MemoryError::BookkeepingFailed`] when the segment list cannot grow
    pub fn allocate(
        &mut self,
        requested: usize,
        hint: Option<NonNull<u8>>,
    ) -> MemoryResult<MemorySegment> {
        let size = requested.max(self.minimum_allocation_size);
        memlog!(
            self,
            Summary,
            requested,
            size,
            "allocate request {requested} will allocate at least {size}"
        );

        if self.allocation_limit != 0
            && self
                .bytes_allocated
                .checked_add(size)
                .is_none_or(|total| total > self.allocation_limit)
        {
            memlog!(
                self,
                Summary,
                size,
                allocated = self.bytes_allocated,
                limit = self.allocation_limit,
                "allocation would exceed limit"
            );
            return Err(MemoryError::limit_exceeded(
                size,
                self.bytes_allocated,
                self.allocation_limit,
            ));
        }

        let memory = self.raw.allocate(size, hint)?;
        memlog!(self, Detail, ptr = ?memory, size, "raw allocation");

        if self.segments.try_reserve(1).is_err() {
            memlog!(self, Detail, ptr = ?memory, "segment list full, releasing raw memory");
            // SAFETY: `memory` was just obtained from `self.raw` with `size`
            // and has not been shared.
            unsafe { self.raw.deallocate_sized(memory, size) };
            return Err(MemoryError::bookkeeping_failed(size));
        }

        // SAFETY: the raw allocator returned `size` bytes at `memory`, and
        // they stay live until this allocator releases the segment.
        let segment = unsafe { MemorySegment::from_raw_parts(memory, size) };
        self.segments.push_front(segment);
        self.bytes_allocated += size;

        memlog!(
            self,
            Detail,
            segment = ?segment,
            bytes_allocated = self.bytes_allocated,
            "segment recorded"
        );
        Ok(segment)
    }

    /// Non-failing form of [`allocate`](Self::allocate)
    pub fn try_allocate(
        &mut self,
        requested: usize,
        hint: Option<NonNull<u8>>,
    ) -> Option<MemorySegment> {
        self.allocate(requested, hint).ok()
    }

    /// Return a segment to the raw allocator
    ///
    /// # Panics
    ///
    /// If `segment` is not currently outstanding from this allocator. The
    /// allocator is not modified before the panic.
    pub fn deallocate(&mut self, segment: MemorySegment) {
        memlog!(
            self,
            Summary,
            base = ?segment.base(),
            size = segment.size(),
            "deallocate request"
        );

        let position = self.segments.iter().position(|candidate| {
            memlog!(self, Verbose, segment = ?candidate, "iterating segment");
            *candidate == segment
        });

        let Some(index) = position else {
            panic!(
                "deallocating a segment not owned by this allocator: {segment:?} \
                 ({} segments, {} bytes outstanding)",
                self.segments.len(),
                self.bytes_allocated
            );
        };

        self.segments.remove(index);
        self.bytes_allocated -= segment.size();
        memlog!(
            self,
            Detail,
            segment = ?segment,
            bytes_allocated = self.bytes_allocated,
            "segment released"
        );

        // SAFETY: the segment was produced by `allocate` from `self.raw` with
        // exactly this base and size, and it is no longer tracked.
        unsafe { self.raw.deallocate_sized(segment.base(), segment.size()) };
    }

    /// Release every outstanding segment
    pub fn deallocate_segments(&mut self) {
        while let Some(&front) = self.segments.front() {
            self.deallocate(front);
        }
        assert_eq!(
            self.bytes_allocated, 0,
            "byte count out of sync with segment list"
        );
    }

    /// Change the allocation limit; 0 means unlimited
    ///
    /// # Panics
    ///
    /// If the new limit is non-zero and not above current usage.
    pub fn set_allocation_limit(&mut self, new_limit: usize) {
        assert!(
            new_limit == 0 || self.bytes_allocated < new_limit,
            "allocation limit {new_limit} must exceed the {} bytes already allocated",
            self.bytes_allocated
        );
        self.allocation_limit = new_limit;
    }

    /// Bytes held in outstanding segments
    #[inline]
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Current limit; 0 means unlimited
    #[inline]
    pub fn allocation_limit(&self) -> usize {
        self.allocation_limit
    }

    /// Smallest segment this allocator produces
    #[inline]
    pub fn minimum_allocation_size(&self) -> usize {
        self.minimum_allocation_size
    }

    /// Number of outstanding segments
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Outstanding segments, newest first
    pub fn segments(&self) -> impl ExactSizeIterator<Item = &MemorySegment> + '_ {
        self.segments.iter()
    }

    /// True if `segment` is outstanding from this allocator
    pub fn contains(&self, segment: &MemorySegment) -> bool {
        self.segments.contains(segment)
    }

    /// True if a request of `size` bytes is served by a minimum-size segment
    #[inline]
    pub fn fits_in_minimum_size_segment(&self, size: usize) -> bool {
        size <= self.minimum_allocation_size
    }

    /// Configured diagnostic level
    #[inline]
    pub fn diagnostics(&self) -> DiagnosticLevel {
        self.diagnostics
    }

    /// The raw allocator segments come from
    #[inline]
    pub fn raw(&self) -> &A {
        &self.raw
    }
}

impl<A: RawAllocator> SegmentProvider for BackingMemoryAllocator<A> {
    fn request(&mut self, size: usize) -> MemoryResult<MemorySegment> {
        self.allocate(size, None)
    }

    fn release(&mut self, segment: MemorySegment) {
        self.deallocate(segment);
    }

    fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    fn allocation_limit(&self) -> usize {
        self.allocation_limit
    }

    fn set_allocation_limit(&mut self, limit: usize) {
        BackingMemoryAllocator::set_allocation_limit(self, limit);
    }
}

impl<A: RawAllocator> Drop for BackingMemoryAllocator<A> {
    fn drop(&mut self) {
        self.deallocate_segments();
    }
}

impl<A: RawAllocator + fmt::Debug> fmt::Debug for BackingMemoryAllocator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackingMemoryAllocator")
            .field("raw", &self.raw)
            .field("minimum_allocation_size", &self.minimum_allocation_size)
            .field("allocation_limit", &self.allocation_limit)
            .field("bytes_allocated", &self.bytes_allocated)
            .field("segments", &self.segments.len())
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

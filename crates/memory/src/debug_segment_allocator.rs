//! Segment provider that poisons released memory instead of reusing it
//!
//! Every request gets its own backing segment. When a segment comes back it
//! is handed to the raw allocator's [`protect`](RawAllocator::protect) hook
//! (an inaccessible mapping for [`DebugRawAllocator`], the embedder's
//! no-longer-used callback for a custom allocator) and parked. Parked
//! segments are only returned to the raw allocator when the provider is
//! dropped, so a stale pointer into released memory faults or reads a
//! recognizable pattern instead of someone else's data.

use core::fmt;

use crate::backing::BackingMemoryAllocator;
use crate::config::DiagnosticLevel;
use crate::error::MemoryResult;
use crate::provider::SegmentProvider;
use crate::raw::{DebugRawAllocator, RawAllocator};
use crate::segment::MemorySegment;

macro_rules! debuglog {
    ($self:expr, $level:ident, $($arg:tt)+) => {
        if $self.backing.diagnostics().enabled(DiagnosticLevel::$level) {
            tracing::debug!(target: "jitkit_memory::debug_segments", $($arg)+);
        }
    };
}

/// Provider for hunting use-after-release bugs in region-allocated data
///
/// # Examples
///
/// ```
/// use jitkit_memory::{
///     BackingMemoryAllocator, BackingMemoryConfig, DebugRawAllocator, DebugSegmentAllocator,
///     SegmentProvider,
/// };
///
/// let backing = BackingMemoryAllocator::new(DebugRawAllocator, BackingMemoryConfig::new(4096));
/// let mut segments = DebugSegmentAllocator::new(backing);
///
/// let segment = segments.request(100)?;
/// segments.release(segment);
/// assert_eq!(segments.bytes_allocated(), 0);
/// assert_eq!(segments.released_segments(), 1);
/// assert_eq!(segments.system_bytes_allocated(), 4096);
/// # Ok::<(), jitkit_memory::MemoryError>(())
/// ```
pub struct DebugSegmentAllocator<A: RawAllocator = DebugRawAllocator> {
    backing: BackingMemoryAllocator<A>,
    released: Vec<MemorySegment>,
    released_bytes: usize,
}

impl<A: RawAllocator> DebugSegmentAllocator<A> {
    /// Draw one backing segment per request from `backing`
    pub fn new(backing: BackingMemoryAllocator<A>) -> Self {
        Self {
            backing,
            released: Vec::new(),
            released_bytes: 0,
        }
    }

    /// Obtain a fresh backing segment of at least `requested` bytes
    pub fn allocate(&mut self, requested: usize) -> MemoryResult<MemorySegment> {
        let segment = self.backing.allocate(requested, None)?;
        debuglog!(self, Summary, requested, segment = ?segment, "debug segment handed out");
        Ok(segment)
    }

    /// Protect `segment` and keep it out of circulation until drop
    ///
    /// # Panics
    ///
    /// If `segment` is not live from this allocator, including a segment
    /// that was already released.
    pub fn deallocate(&mut self, segment: MemorySegment) {
        let owned = self.backing.contains(&segment) && !self.released.contains(&segment);
        assert!(
            owned,
            "segment {segment:?} is not live in this debug segment allocator"
        );

        // SAFETY: the segment is live in `backing`, which got it from this
        // raw allocator with exactly this base and size, and the caller gave
        // up all access by releasing it.
        unsafe { self.backing.raw().protect(segment.base(), segment.size()) };

        if self.released.try_reserve(1).is_err() {
            debuglog!(self, Detail, segment = ?segment, "released list full, freeing now");
            self.backing.deallocate(segment);
            return;
        }
        self.released.push(segment);
        self.released_bytes += segment.size();
        debuglog!(
            self,
            Summary,
            segment = ?segment,
            parked = self.released.len(),
            "debug segment protected"
        );
    }

    /// Segments protected and parked so far
    #[inline]
    pub fn released_segments(&self) -> usize {
        self.released.len()
    }

    /// True if `segment` was released and is parked
    pub fn is_released(&self, segment: &MemorySegment) -> bool {
        self.released.contains(segment)
    }

    /// The backing allocator segments come from
    #[inline]
    pub fn backing(&self) -> &BackingMemoryAllocator<A> {
        &self.backing
    }
}

impl<A: RawAllocator> SegmentProvider for DebugSegmentAllocator<A> {
    fn request(&mut self, size: usize) -> MemoryResult<MemorySegment> {
        self.allocate(size)
    }

    fn release(&mut self, segment: MemorySegment) {
        self.deallocate(segment);
    }

    fn bytes_allocated(&self) -> usize {
        self.backing.bytes_allocated() - self.released_bytes
    }

    fn system_bytes_allocated(&self) -> usize {
        self.backing.bytes_allocated()
    }

    fn allocation_limit(&self) -> usize {
        self.backing.allocation_limit()
    }

    fn set_allocation_limit(&mut self, limit: usize) {
        self.backing.set_allocation_limit(limit);
    }
}

impl<A: RawAllocator> Drop for DebugSegmentAllocator<A> {
    fn drop(&mut self) {
        debuglog!(
            self,
            Summary,
            parked = self.released.len(),
            bytes = self.released_bytes,
            "freeing protected segments"
        );
        for segment in self.released.drain(..) {
            if self.backing.diagnostics().enabled(DiagnosticLevel::Verbose) {
                tracing::trace!(target: "jitkit_memory::debug_segments", segment = ?segment, "free");
            }
            self.backing.deallocate(segment);
        }
        self.released_bytes = 0;
    }
}

impl<A: RawAllocator> fmt::Debug for DebugSegmentAllocator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugSegmentAllocator")
            .field("live_bytes", &self.bytes_allocated())
            .field("released_segments", &self.released.len())
            .field("released_bytes", &self.released_bytes)
            .finish()
    }
}

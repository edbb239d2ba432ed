//! Block sub-allocation on top of backing memory
//!
//! Compilations ask for many small segments. Going to the backing allocator
//! for each would round every request up to the minimum segment size, so
//! [`SegmentAllocator`] takes minimum-size chunks from the backing layer
//! and carves them into block-aligned pieces. Freed pieces are cut back
//! into blocks and kept on a free list.

use core::fmt;
use std::collections::VecDeque;

use crate::backing::BackingMemoryAllocator;
use crate::error::{MemoryError, MemoryResult};
use crate::provider::SegmentProvider;
use crate::raw::{MallocAllocator, RawAllocator};
use crate::segment::MemorySegment;
use crate::utils::checked_align_up;

/// The backing chunk currently being carved, with its bump offset
#[derive(Debug, Clone, Copy)]
struct Chunk {
    segment: MemorySegment,
    used: usize,
}

impl Chunk {
    fn remaining(&self) -> usize {
        self.segment.size() - self.used
    }

    fn take(&mut self, size: usize) -> MemorySegment {
        let piece = self.segment.subsegment(self.used, size);
        self.used += size;
        piece
    }
}

/// Hands out block-multiple segments carved from backing memory
///
/// # Examples
///
/// ```
/// use jitkit_memory::{
///     BackingMemoryAllocator, BackingMemoryConfig, MallocAllocator, SegmentAllocator,
/// };
///
/// let backing = BackingMemoryAllocator::new(MallocAllocator, BackingMemoryConfig::new(1 << 16));
/// let mut segments = SegmentAllocator::new(backing, 4096);
///
/// let a = segments.allocate(10)?;
/// assert_eq!(a.size(), 4096);
/// segments.deallocate(a);
/// assert_eq!(segments.free_blocks(), 1);
///
/// // the freed block is handed out again
/// assert_eq!(segments.allocate(4096)?, a);
/// # Ok::<(), jitkit_memory::MemoryError>(())
/// ```
pub struct SegmentAllocator<A: RawAllocator = MallocAllocator> {
    backing: BackingMemoryAllocator<A>,
    block_size: usize,
    current: Option<Chunk>,
    /// Pushed at the front, reused from the back
    free: VecDeque<MemorySegment>,
    allocated: Vec<MemorySegment>,
    bytes_in_use: usize,
}

impl<A: RawAllocator> SegmentAllocator<A> {
    /// Build a segment allocator over `backing`.
    ///
    /// Chunks are taken lazily, so construction never allocates.
    ///
    /// # Panics
    ///
    /// If `block_size` is not a power of two or does not divide the backing
    /// minimum allocation size.
    pub fn new(backing: BackingMemoryAllocator<A>, block_size: usize) -> Self {
        assert!(
            block_size.is_power_of_two(),
            "block size {block_size} must be a power of two"
        );
        assert!(
            block_size <= backing.minimum_allocation_size(),
            "block size {block_size} must divide the backing minimum size {}",
            backing.minimum_allocation_size()
        );

        Self {
            backing,
            block_size,
            current: None,
            free: VecDeque::new(),
            allocated: Vec::new(),
            bytes_in_use: 0,
        }
    }

    /// Allocate a segment of at least `requested` bytes
    ///
    /// The size is rounded up to a whole number of blocks; a zero-byte
    /// request gets one block.
    ///
    /// # Errors
    ///
    /// Whatever the backing allocator reports when it has to grow, or
    /// [`MemoryError::SizeOverflow`] if rounding overflows.
    pub fn allocate(&mut self, requested: usize) -> MemoryResult<MemorySegment> {
        let rounded = checked_align_up(requested.max(1), self.block_size)
            .ok_or_else(|| MemoryError::size_overflow(requested, self.block_size))?;

        if self.allocated.try_reserve(1).is_err() {
            return Err(MemoryError::bookkeeping_failed(rounded));
        }

        let segment = if rounded == self.block_size
            && let Some(recycled) = self.free.pop_back()
        {
            recycled
        } else if self.backing.fits_in_minimum_size_segment(rounded) {
            self.allocate_from_chunk(rounded)?
        } else {
            self.backing.allocate(rounded, None)?
        };

        self.allocated.push(segment);
        self.bytes_in_use += segment.size();
        tracing::trace!(size = segment.size(), requested, "segment allocated");
        Ok(segment)
    }

    fn allocate_from_chunk(&mut self, size: usize) -> MemoryResult<MemorySegment> {
        match &mut self.current {
            Some(chunk) if chunk.remaining() >= size => return Ok(chunk.take(size)),
            _ => {}
        }

        let fresh = self
            .backing
            .allocate(self.backing.minimum_allocation_size(), None)?;
        self.claim_remaining();
        let chunk = self.current.insert(Chunk {
            segment: fresh,
            used: 0,
        });
        Ok(chunk.take(size))
    }

    /// Split whatever is left of the current chunk into free blocks
    fn claim_remaining(&mut self) {
        let Some(mut chunk) = self.current.take() else {
            return;
        };
        while chunk.remaining() >= self.block_size {
            let block = chunk.take(self.block_size);
            self.free.push_front(block);
        }
    }

    /// Return a segment produced by [`allocate`](Self::allocate)
    ///
    /// # Panics
    ///
    /// If the segment is not currently allocated from here.
    pub fn deallocate(&mut self, segment: MemorySegment) {
        let Some(index) = self.allocated.iter().position(|s| *s == segment) else {
            panic!("segment {segment:?} was not allocated by this segment allocator");
        };
        self.allocated.swap_remove(index);
        self.bytes_in_use -= segment.size();

        if segment.size() == self.block_size {
            self.free.push_front(segment);
        } else if self.backing.fits_in_minimum_size_segment(segment.size()) {
            let mut offset = 0;
            while offset < segment.size() {
                self.free
                    .push_front(segment.subsegment(offset, self.block_size));
                offset += self.block_size;
            }
        } else {
            self.backing.deallocate(segment);
        }
    }

    /// Allocation granularity
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Blocks waiting on the free list
    #[inline]
    pub fn free_blocks(&self) -> usize {
        self.free.len()
    }

    /// Bytes currently handed out to callers
    #[inline]
    pub fn bytes_in_use(&self) -> usize {
        self.bytes_in_use
    }

    /// Number of segments currently handed out
    #[inline]
    pub fn segments_in_use(&self) -> usize {
        self.allocated.len()
    }

    /// The backing allocator chunks come from
    #[inline]
    pub fn backing(&self) -> &BackingMemoryAllocator<A> {
        &self.backing
    }
}

impl<A: RawAllocator> SegmentProvider for SegmentAllocator<A> {
    fn request(&mut self, size: usize) -> MemoryResult<MemorySegment> {
        self.allocate(size)
    }

    fn release(&mut self, segment: MemorySegment) {
        self.deallocate(segment);
    }

    fn bytes_allocated(&self) -> usize {
        self.bytes_in_use
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

impl<A: RawAllocator> Drop for SegmentAllocator<A> {
    fn drop(&mut self) {
        self.free.clear();
        self.allocated.clear();
        self.current = None;
        self.backing.deallocate_segments();
    }
}

impl<A: RawAllocator> fmt::Debug for SegmentAllocator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentAllocator")
            .field("block_size", &self.block_size)
            .field("bytes_in_use", &self.bytes_in_use)
            .field("segments_in_use", &self.allocated.len())
            .field("free_blocks", &self.free.len())
            .field("system_bytes", &self.backing.bytes_allocated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackingMemoryConfig;
    use crate::raw::{AllocationTracker, TrackingAllocator};
    use pretty_assertions::assert_eq;

    const BLOCK: usize = 1024;
    const MIN: usize = 8 * BLOCK;

    fn allocator(limit: usize) -> SegmentAllocator {
        let backing = BackingMemoryAllocator::new(
            MallocAllocator,
            BackingMemoryConfig::new(MIN).with_allocation_limit(limit),
        );
        SegmentAllocator::new(backing, BLOCK)
    }

    #[test]
    fn rounds_to_blocks() {
        let mut s = allocator(0);
        assert_eq!(s.allocate(0).unwrap().size(), BLOCK);
        assert_eq!(s.allocate(1).unwrap().size(), BLOCK);
        assert_eq!(s.allocate(BLOCK + 1).unwrap().size(), 2 * BLOCK);
        assert_eq!(s.bytes_in_use(), 4 * BLOCK);
        // all three fit in one chunk
        assert_eq!(s.backing().segment_count(), 1);
    }

    #[test]
    fn carves_consecutively_from_chunk() {
        let mut s = allocator(0);
        let a = s.allocate(BLOCK).unwrap();
        let b = s.allocate(BLOCK).unwrap();
        assert_eq!(b.as_ptr() as usize, a.end_addr());
    }

    #[test]
    fn exhausted_chunk_remainder_becomes_free_blocks() {
        let mut s = allocator(0);
        let big = s.allocate(6 * BLOCK).unwrap();
        assert_eq!(s.free_blocks(), 0);

        // needs 3 blocks, only 2 remain
        let next = s.allocate(3 * BLOCK).unwrap();
        assert_eq!(s.backing().segment_count(), 2);
        assert_eq!(s.free_blocks(), 2);
        assert!(!big.contains(next.as_ptr()));

        // a single block comes from the reclaimed remainder
        let recycled = s.allocate(BLOCK).unwrap();
        assert_eq!(s.free_blocks(), 1);
        assert!(s.backing().segments().any(|chunk| chunk.contains(recycled.as_ptr())));
    }

    #[test]
    fn large_request_gets_dedicated_segment() {
        let mut s = allocator(0);
        let big = s.allocate(MIN + 1).unwrap();
        assert_eq!(big.size(), MIN + BLOCK);
        assert!(s.backing().contains(&big));

        s.deallocate(big);
        assert!(!s.backing().contains(&big));
        assert_eq!(s.backing().bytes_allocated(), 0);
    }

    #[test]
    fn multi_block_release_splits_into_blocks() {
        let mut s = allocator(0);
        let seg = s.allocate(3 * BLOCK).unwrap();
        s.deallocate(seg);
        assert_eq!(s.free_blocks(), 3);
        assert_eq!(s.bytes_in_use(), 0);
    }

    #[test]
    fn limit_errors_propagate() {
        let mut s = allocator(MIN);
        s.allocate(MIN).unwrap();
        let err = s.allocate(1).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(s.segments_in_use(), 1);
    }

    #[test]
    #[should_panic(expected = "was not allocated by this segment allocator")]
    fn double_release_panics() {
        let mut s = allocator(0);
        let seg = s.allocate(1).unwrap();
        s.deallocate(seg);
        s.deallocate(seg);
    }

    #[test]
    #[should_panic(expected = "must divide")]
    fn oversized_block_panics() {
        let backing = BackingMemoryAllocator::new(MallocAllocator, BackingMemoryConfig::new(1024));
        let _ = SegmentAllocator::new(backing, 2048);
    }

    #[test]
    fn drop_returns_all_backing_memory() {
        let tracker = AllocationTracker::new();
        {
            let backing = BackingMemoryAllocator::new(
                TrackingAllocator::new(MallocAllocator, &tracker),
                BackingMemoryConfig::new(MIN),
            );
            let mut s = SegmentAllocator::new(backing, BLOCK);
            s.allocate(1).unwrap();
            s.allocate(MIN * 2).unwrap();
            let freed = s.allocate(BLOCK * 2).unwrap();
            s.deallocate(freed);
        }
        tracker.verify().unwrap();
    }
}

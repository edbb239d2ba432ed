//! The seam between segment sources and the regions that consume them

use crate::error::MemoryResult;
use crate::segment::MemorySegment;

/// Something that hands out and takes back memory segments
///
/// Implemented by [`BackingMemoryAllocator`](crate::BackingMemoryAllocator)
/// (large power-of-two segments straight from a raw allocator) and by
/// [`SegmentAllocator`](crate::SegmentAllocator) (block-sized pieces carved
/// out of those).
pub trait SegmentProvider {
    /// Obtain a segment of at least `size` bytes
    fn request(&mut self, size: usize) -> MemoryResult<MemorySegment>;

    /// Return a segment previously obtained from [`request`](Self::request).
    ///
    /// # Panics
    /// Implementations panic if the segment did not come from them.
    fn release(&mut self, segment: MemorySegment);

    /// Bytes currently held by callers
    fn bytes_allocated(&self) -> usize;

    /// Bytes this provider holds from the system, including cached free space
    fn system_bytes_allocated(&self) -> usize {
        self.bytes_allocated()
    }

    /// Current ceiling on system bytes; 0 means unlimited
    fn allocation_limit(&self) -> usize;

    /// Change the ceiling
    ///
    /// # Panics
    /// If the new limit is not above current usage.
    fn set_allocation_limit(&mut self, limit: usize);
}

impl<P: SegmentProvider + ?Sized> SegmentProvider for &mut P {
    fn request(&mut self, size: usize) -> MemoryResult<MemorySegment> {
        (**self).request(size)
    }

    fn release(&mut self, segment: MemorySegment) {
        (**self).release(segment);
    }

    fn bytes_allocated(&self) -> usize {
        (**self).bytes_allocated()
    }

    fn system_bytes_allocated(&self) -> usize {
        (**self).system_bytes_allocated()
    }

    fn allocation_limit(&self) -> usize {
        (**self).allocation_limit()
    }

    fn set_allocation_limit(&mut self, limit: usize) {
        (**self).set_allocation_limit(limit);
    }
}

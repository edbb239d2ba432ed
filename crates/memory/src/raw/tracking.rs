//! Allocation accounting
//!
//! [`TrackingAllocator`] wraps another raw allocator and counts every call
//! in an [`AllocationTracker`]. At the end of a compilation the tracker can
//! prove that everything handed out came back. Each call is also charged to
//! the wrapper's [`AllocationCategory`], and totals for a category include
//! everything charged to its subcategories.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::RawAllocator;
use crate::category::AllocationCategory;
use crate::error::{MemoryError, MemoryResult};

/// Point-in-time copy of the tracker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerSnapshot {
    /// Successful allocations
    pub allocations: usize,
    /// Deallocations (sized and unsized)
    pub deallocations: usize,
    /// Bytes handed out
    pub allocated_bytes: usize,
    /// Bytes returned through sized deallocation
    pub deallocated_bytes: usize,
}

impl TrackerSnapshot {
    /// Bytes still outstanding
    pub fn live_bytes(&self) -> usize {
        self.allocated_bytes.saturating_sub(self.deallocated_bytes)
    }

    /// True when every allocation has a matching deallocation
    pub fn is_balanced(&self) -> bool {
        self.allocations == self.deallocations && self.allocated_bytes == self.deallocated_bytes
    }

    fn add(&mut self, other: &Self) {
        self.allocations += other.allocations;
        self.deallocations += other.deallocations;
        self.allocated_bytes += other.allocated_bytes;
        self.deallocated_bytes += other.deallocated_bytes;
    }
}

/// Counters shared by a tracking allocator and its copies
#[derive(Debug, Default)]
pub struct AllocationTracker {
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    allocated_bytes: AtomicUsize,
    deallocated_bytes: AtomicUsize,
    /// Exact category charged, first use first
    by_category: Mutex<Vec<(AllocationCategory, TrackerSnapshot)>>,
}

impl AllocationTracker {
    /// Create a tracker with all counters at zero
    pub const fn new() -> Self {
        Self {
            allocations: AtomicUsize::new(0),
            deallocations: AtomicUsize::new(0),
            allocated_bytes: AtomicUsize::new(0),
            deallocated_bytes: AtomicUsize::new(0),
            by_category: Mutex::new(Vec::new()),
        }
    }

    /// Count one uncategorized allocation of `size` bytes
    pub fn record_allocation(&self, size: usize) {
        self.record_allocation_in(AllocationCategory::NONE, size);
    }

    /// Count one allocation of `size` bytes charged to `category`
    pub fn record_allocation_in(&self, category: AllocationCategory, size: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.allocated_bytes.fetch_add(size, Ordering::Relaxed);
        self.charge(category, |totals| {
            totals.allocations += 1;
            totals.allocated_bytes += size;
        });
    }

    /// Count one uncategorized deallocation; `size` is `None` when the
    /// caller did not know it
    pub fn record_deallocation(&self, size: Option<usize>) {
        self.record_deallocation_in(AllocationCategory::NONE, size);
    }

    /// Count one deallocation charged to `category`
    pub fn record_deallocation_in(&self, category: AllocationCategory, size: Option<usize>) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);
        if let Some(size) = size {
            self.deallocated_bytes.fetch_add(size, Ordering::Relaxed);
        }
        self.charge(category, |totals| {
            totals.deallocations += 1;
            totals.deallocated_bytes += size.unwrap_or(0);
        });
    }

    fn charge(&self, category: AllocationCategory, update: impl FnOnce(&mut TrackerSnapshot)) {
        let mut by_category = self.by_category.lock();
        let index = match by_category
            .iter()
            .position(|(charged, _)| charged.is_exact_match(category))
        {
            Some(index) => index,
            None => {
                by_category.push((category, TrackerSnapshot::default()));
                by_category.len() - 1
            }
        };
        update(&mut by_category[index].1);
    }

    /// Totals for `category` and everything assigned under it
    ///
    /// [`AllocationCategory::NONE`] matches every category, so its totals
    /// equal [`snapshot`](Self::snapshot).
    pub fn category_snapshot(&self, category: AllocationCategory) -> TrackerSnapshot {
        let mut totals = TrackerSnapshot::default();
        for (charged, counts) in self.by_category.lock().iter() {
            if charged.is_match(category) {
                totals.add(counts);
            }
        }
        totals
    }

    /// Totals per exact category, in order of first use
    pub fn categories(&self) -> Vec<(AllocationCategory, TrackerSnapshot)> {
        self.by_category.lock().clone()
    }

    /// Read all counters
    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
            allocated_bytes: self.allocated_bytes.load(Ordering::Relaxed),
            deallocated_bytes: self.deallocated_bytes.load(Ordering::Relaxed),
        }
    }

    /// Log the counters at debug level
    pub fn report(&self) {
        let snap = self.snapshot();
        tracing::debug!(
            allocations = snap.allocations,
            deallocations = snap.deallocations,
            allocated_bytes = snap.allocated_bytes,
            deallocated_bytes = snap.deallocated_bytes,
            "allocation tracker"
        );
        for (category, counts) in self.categories() {
            tracing::debug!(
                category = category.raw(),
                allocations = counts.allocations,
                deallocations = counts.deallocations,
                allocated_bytes = counts.allocated_bytes,
                deallocated_bytes = counts.deallocated_bytes,
                "allocation tracker category"
            );
        }
    }

    /// Check that every allocation was returned
    pub fn verify(&self) -> MemoryResult<()> {
        let snap = self.snapshot();
        if snap.is_balanced() {
            tracing::debug!(allocations = snap.allocations, "allocation verification passed");
            Ok(())
        } else {
            tracing::warn!(
                allocations = snap.allocations,
                deallocations = snap.deallocations,
                live_bytes = snap.live_bytes(),
                "allocation verification failed"
            );
            Err(MemoryError::UnbalancedTracker {
                allocations: snap.allocations,
                deallocations: snap.deallocations,
                live_bytes: snap.live_bytes(),
            })
        }
    }
}

/// Raw allocator that records every call in a borrowed tracker
///
/// Copies share the tracker, so they stay interchangeable exactly like the
/// wrapped allocator.
#[derive(Debug, Clone, Copy)]
pub struct TrackingAllocator<'t, A> {
    inner: A,
    tracker: &'t AllocationTracker,
    category: AllocationCategory,
}

impl<'t, A: RawAllocator> TrackingAllocator<'t, A> {
    /// Wrap `inner`, counting uncategorized into `tracker`
    pub fn new(inner: A, tracker: &'t AllocationTracker) -> Self {
        Self::with_category(inner, tracker, AllocationCategory::NONE)
    }

    /// Wrap `inner`, charging every call to `category`
    pub fn with_category(
        inner: A,
        tracker: &'t AllocationTracker,
        category: AllocationCategory,
    ) -> Self {
        Self {
            inner,
            tracker,
            category,
        }
    }

    /// Category this allocator charges
    pub fn category(&self) -> AllocationCategory {
        self.category
    }

    /// The tracker being updated
    pub fn tracker(&self) -> &'t AllocationTracker {
        self.tracker
    }

    /// The wrapped allocator
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: PartialEq> PartialEq for TrackingAllocator<'_, A> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
            && core::ptr::eq(self.tracker, other.tracker)
            && self.category == other.category
    }
}

// SAFETY: every call is forwarded unchanged to `inner`.
unsafe impl<A: RawAllocator> RawAllocator for TrackingAllocator<'_, A> {
    fn try_allocate(&self, size: usize, hint: Option<NonNull<u8>>) -> Option<NonNull<u8>> {
        let ptr = self.inner.try_allocate(size, hint)?;
        self.tracker.record_allocation_in(self.category, size);
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        self.tracker.record_deallocation_in(self.category, None);
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.deallocate(ptr) }
    }

    unsafe fn deallocate_sized(&self, ptr: NonNull<u8>, size: usize) {
        self.tracker.record_deallocation_in(self.category, Some(size));
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.deallocate_sized(ptr, size) }
    }

    unsafe fn protect(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.protect(ptr, size) }
    }
}

//! # jitkit-memory
//!
//! Layered memory management for a JIT compiler.
//!
//! From the bottom up:
//! - [`raw`]: stateless raw allocators (C heap, page mappings, embedder
//!   callbacks, plus an accounting wrapper that can charge allocations to
//!   an [`AllocationCategory`])
//! - [`BackingMemoryAllocator`]: large segments with a byte limit and an
//!   outstanding-segment list
//! - [`SegmentAllocator`]: block-sized pieces carved from backing segments
//! - [`DebugSegmentAllocator`]: one backing segment per request, protected
//!   on release and only freed on drop
//! - [`Region`]: a bump arena over any [`SegmentProvider`]
//! - [`placement`]: constructing values directly inside a segment
//!
//! ## Quick Start
//!
//! ```rust
//! use jitkit_memory::prelude::*;
//!
//! let config = RegionConfig::default();
//! let backing = BackingMemoryAllocator::new(MallocAllocator, config.backing);
//! let region = Region::new(SegmentAllocator::new(backing, config.block_size));
//!
//! let bytes = region.alloc_slice_copy(&[0x90_u8, 0xC3])?;
//! assert_eq!(bytes.len(), 2);
//! # Ok::<(), MemoryError>(())
//! ```
//!
//! ## Errors and panics
//!
//! Running out of memory or hitting the allocation limit is an ordinary
//! [`MemoryError`]. Misuse (returning a segment the allocator does not own,
//! lowering the limit below current usage, bad construction parameters)
//! panics.
//!
//! ## Features
//!
//! - `serde` (default): deserializable configuration types

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::perf)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// inline(always) on small alignment helpers is intentional for hot paths
#![allow(clippy::inline_always)]
#![allow(clippy::return_self_not_must_use)]

pub mod backing;
pub mod category;
pub mod config;
pub mod debug_segment_allocator;
pub mod error;
pub mod placement;
pub mod provider;
pub mod raw;
pub mod region;
pub mod segment;
pub mod segment_allocator;
pub mod utils;

pub use backing::BackingMemoryAllocator;
pub use category::{AllocationCategory, AllocationCategoryService, allocation_categories};
pub use config::{
    BACKING_MEMORY_DEBUG_ENV, BackingMemoryConfig, DEFAULT_BLOCK_SIZE,
    DEFAULT_MINIMUM_SEGMENT_SIZE, DiagnosticLevel, RegionConfig,
};
pub use debug_segment_allocator::DebugSegmentAllocator;
pub use error::{MemoryError, MemoryResult};
pub use placement::{destroy_in, place, place_raw};
pub use provider::SegmentProvider;
pub use raw::{
    AllocationTracker, CustomAllocator, DebugRawAllocator, MIN_ALIGN, MallocAllocator,
    RawAllocator, TrackerSnapshot, TrackingAllocator,
};
pub use region::Region;
pub use segment::MemorySegment;
pub use segment_allocator::SegmentAllocator;

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        BackingMemoryAllocator, BackingMemoryConfig, DiagnosticLevel, MallocAllocator,
        MemoryError, MemoryResult, MemorySegment, RawAllocator, Region, RegionConfig,
        SegmentAllocator, SegmentProvider,
    };
}

/// Region type used for per-compilation data: heap-backed, block recycled
pub type HeapRegion = Region<SegmentAllocator<MallocAllocator>>;

/// Build a [`HeapRegion`] from a validated configuration
///
/// # Errors
///
/// [`MemoryError::InvalidConfig`] if `config` does not validate.
pub fn heap_region(config: &RegionConfig) -> MemoryResult<HeapRegion> {
    config.validate()?;
    let backing = BackingMemoryAllocator::new(MallocAllocator, config.backing);
    Ok(Region::new(SegmentAllocator::new(backing, config.block_size)))
}

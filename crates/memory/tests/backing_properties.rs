//! Behavioural properties of the backing allocator

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr::NonNull;

use jitkit_memory::prelude::*;
use jitkit_memory::{AllocationTracker, TrackingAllocator};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Allocate(usize),
    /// Index into the live list, taken modulo its length
    Deallocate(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0_usize..20_000).prop_map(Op::Allocate),
        2 => any::<usize>().prop_map(Op::Deallocate),
    ]
}

proptest! {
    #[test]
    fn limit_is_never_exceeded_and_bytes_match_live_segments(
        min_shift in 8_u32..14,
        limit_factor in 1_usize..8,
        ops in prop::collection::vec(op(), 1..64),
    ) {
        let min = 1_usize << min_shift;
        let limit = min * limit_factor;
        let mut backing = BackingMemoryAllocator::new(
            MallocAllocator,
            BackingMemoryConfig::new(min).with_allocation_limit(limit),
        );
        let mut live: Vec<MemorySegment> = Vec::new();

        for op in ops {
            match op {
                Op::Allocate(n) => {
                    let before = backing.bytes_allocated();
                    match backing.allocate(n, None) {
                        Ok(seg) => live.push(seg),
                        Err(err) => {
                            prop_assert!(err.is_retryable());
                            prop_assert_eq!(backing.bytes_allocated(), before);
                        }
                    }
                }
                Op::Deallocate(i) if !live.is_empty() => {
                    let seg = live.swap_remove(i % live.len());
                    backing.deallocate(seg);
                }
                Op::Deallocate(_) => {}
            }

            prop_assert!(backing.bytes_allocated() <= limit);
            let sum: usize = live.iter().map(MemorySegment::size).sum();
            prop_assert_eq!(backing.bytes_allocated(), sum);
            prop_assert_eq!(backing.segment_count(), live.len());
        }
    }

    #[test]
    fn segments_are_at_least_requested_and_minimum(
        min_shift in 4_u32..16,
        requested in 0_usize..100_000,
    ) {
        let min = 1_usize << min_shift;
        let mut backing = BackingMemoryAllocator::new(MallocAllocator, BackingMemoryConfig::new(min));
        let seg = backing.allocate(requested, None).unwrap();
        prop_assert!(seg.size() >= requested.max(min));
    }

    #[test]
    fn deallocate_segments_leaves_nothing(
        sizes in prop::collection::vec(0_usize..50_000, 0..32),
    ) {
        let tracker = AllocationTracker::new();
        {
            let mut backing = BackingMemoryAllocator::new(
                TrackingAllocator::new(MallocAllocator, &tracker),
                BackingMemoryConfig::new(1024),
            );
            for n in sizes {
                backing.allocate(n, None).unwrap();
            }
            backing.deallocate_segments();
            prop_assert_eq!(backing.bytes_allocated(), 0);
            prop_assert_eq!(backing.segment_count(), 0);
        }
        prop_assert!(tracker.snapshot().is_balanced());
    }
}

#[test]
fn non_power_of_two_minimum_panics() {
    for min in [0_usize, 3, 100, 4095] {
        let result = catch_unwind(|| {
            BackingMemoryAllocator::new(MallocAllocator, BackingMemoryConfig::new(min))
        });
        assert!(result.is_err(), "minimum {min} should be rejected");
    }
}

#[test]
fn untracked_segment_panics_without_changing_state() {
    let mut backing = BackingMemoryAllocator::new(MallocAllocator, BackingMemoryConfig::new(4096));
    let kept = backing.allocate(10, None).unwrap();

    let mut buf = vec![0_u8; 4096];
    // SAFETY: the buffer outlives the segment.
    let stranger =
        unsafe { MemorySegment::from_raw_parts(NonNull::new(buf.as_mut_ptr()).unwrap(), 4096) };

    let result = catch_unwind(AssertUnwindSafe(|| backing.deallocate(stranger)));
    assert!(result.is_err());
    assert_eq!(backing.bytes_allocated(), 4096);
    assert!(backing.contains(&kept));

    backing.deallocate(kept);
}

#[test]
fn limit_scenario_with_oversized_second_request() {
    let mut backing = BackingMemoryAllocator::new(
        MallocAllocator,
        BackingMemoryConfig::new(4096).with_allocation_limit(8192),
    );

    let first = backing.allocate(100, None).unwrap();
    assert_eq!(backing.bytes_allocated(), 4096);

    let err = backing.allocate(5000, None).unwrap_err();
    assert_eq!(
        err,
        MemoryError::LimitExceeded {
            requested: 5000,
            allocated: 4096,
            limit: 8192,
        }
    );
    assert_eq!(backing.bytes_allocated(), 4096);

    backing.deallocate(first);
    let second = backing.allocate(5000, None).unwrap();
    assert_eq!(second.size(), 5000);
    assert_eq!(backing.bytes_allocated(), 5000);
}

#[test]
fn lowering_limit_below_usage_panics() {
    let mut backing = BackingMemoryAllocator::new(MallocAllocator, BackingMemoryConfig::new(4096));
    backing.allocate(8000, None).unwrap();

    let result = catch_unwind(AssertUnwindSafe(|| backing.set_allocation_limit(4096)));
    assert!(result.is_err());
    assert_eq!(backing.allocation_limit(), 0);
}

#[test]
fn diagnostics_run_under_a_subscriber() {
    let _guard = jitkit_log::init_test().unwrap();
    let mut backing = BackingMemoryAllocator::new(
        MallocAllocator,
        BackingMemoryConfig::new(512)
            .with_allocation_limit(1024)
            .with_diagnostics(DiagnosticLevel::Verbose),
    );
    let a = backing.allocate(1, None).unwrap();
    let b = backing.allocate(1, None).unwrap();
    assert!(backing.allocate(1, None).is_err());
    backing.deallocate(a);
    backing.deallocate(b);
}

//! Standalone error types for jitkit-memory
//!
//! Only recoverable conditions live here. Broken invariants (freeing a
//! segment the allocator never handed out, a non power-of-two segment size,
//! lowering a limit below current usage) panic instead.

use thiserror::Error;

// ============================================================================
// Main Error Types
// ============================================================================

/// Memory management errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    // --- Allocation Errors ---
    #[error("Out of memory: raw allocator could not provide {size} bytes")]
    OutOfMemory { size: usize },

    #[error(
        "Allocation limit exceeded: requested {requested} bytes with {allocated} allocated (limit: {limit})"
    )]
    LimitExceeded {
        requested: usize,
        allocated: usize,
        limit: usize,
    },

    #[error("Could not record segment of {size} bytes; raw memory was released")]
    BookkeepingFailed { size: usize },

    #[error("Invalid alignment: {align}")]
    InvalidAlignment { align: usize },

    #[error("Size overflow: {size} bytes with {align} byte alignment")]
    SizeOverflow { size: usize, align: usize },

    // --- Segment Errors ---
    #[error("Segment too small: {required} bytes required, {available} available")]
    SegmentTooSmall { required: usize, available: usize },

    // --- Configuration Errors ---
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // --- Tracking Errors ---
    #[error(
        "Unbalanced allocation tracker: {allocations} allocations, {deallocations} deallocations, {live_bytes} live bytes"
    )]
    UnbalancedTracker {
        allocations: usize,
        deallocations: usize,
        live_bytes: usize,
    },
}

impl MemoryError {
    /// Check if error is retryable
    ///
    /// A limit refusal can succeed once segments are returned; raw
    /// exhaustion and configuration mistakes cannot.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }

    /// True for every flavor of "could not get memory"
    #[must_use]
    pub fn is_out_of_memory(&self) -> bool {
        matches!(
            self,
            Self::OutOfMemory { .. } | Self::LimitExceeded { .. } | Self::BookkeepingFailed { .. }
        )
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfMemory { .. } => "MEM:ALLOC:OOM",
            Self::LimitExceeded { .. } => "MEM:ALLOC:LIMIT",
            Self::BookkeepingFailed { .. } => "MEM:ALLOC:BOOKKEEPING",
            Self::InvalidAlignment { .. } => "MEM:ALLOC:ALIGN",
            Self::SizeOverflow { .. } => "MEM:ALLOC:OVERFLOW",
            Self::SegmentTooSmall { .. } => "MEM:SEGMENT:TOO_SMALL",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
            Self::UnbalancedTracker { .. } => "MEM:TRACKER:UNBALANCED",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create out of memory error
    pub fn out_of_memory(size: usize) -> Self {
        tracing::warn!(size, "raw allocation failed");
        Self::OutOfMemory { size }
    }

    /// Create limit exceeded error
    pub fn limit_exceeded(requested: usize, allocated: usize, limit: usize) -> Self {
        Self::LimitExceeded {
            requested,
            allocated,
            limit,
        }
    }

    /// Create bookkeeping failure error
    pub fn bookkeeping_failed(size: usize) -> Self {
        tracing::error!(size, "segment bookkeeping allocation failed");
        Self::BookkeepingFailed { size }
    }

    /// Create invalid alignment error
    pub fn invalid_alignment(align: usize) -> Self {
        Self::InvalidAlignment { align }
    }

    /// Create size overflow error
    pub fn size_overflow(size: usize, align: usize) -> Self {
        Self::SizeOverflow { size, align }
    }

    /// Create segment too small error
    pub fn segment_too_small(required: usize, available: usize) -> Self {
        Self::SegmentTooSmall {
            required,
            available,
        }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// Generic result type alias
pub type Result<T> = MemoryResult<T>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(MemoryError::out_of_memory(16).code(), "MEM:ALLOC:OOM");
        assert_eq!(
            MemoryError::limit_exceeded(8192, 4096, 8192).code(),
            "MEM:ALLOC:LIMIT"
        );
        assert_eq!(
            MemoryError::invalid_config("zero block").code(),
            "MEM:CONFIG:INVALID"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(MemoryError::limit_exceeded(1, 2, 3).is_retryable());
        assert!(!MemoryError::out_of_memory(1).is_retryable());
        assert!(!MemoryError::invalid_alignment(3).is_retryable());
    }

    #[test]
    fn test_out_of_memory_family() {
        assert!(MemoryError::out_of_memory(1).is_out_of_memory());
        assert!(MemoryError::bookkeeping_failed(1).is_out_of_memory());
        assert!(MemoryError::limit_exceeded(1, 2, 3).is_out_of_memory());
        assert!(!MemoryError::segment_too_small(8, 4).is_out_of_memory());
    }

    #[test]
    fn test_error_display() {
        let error = MemoryError::limit_exceeded(8192, 4096, 8192);
        let text = error.to_string();
        assert!(text.contains("8192"));
        assert!(text.contains("4096"));
    }
}

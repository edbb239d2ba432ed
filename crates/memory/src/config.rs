//! Allocator configuration
//!
//! Every knob is an explicit value handed to a constructor. The only place
//! that consults the process environment is [`DiagnosticLevel::from_env`],
//! and callers decide whether to use it.

use core::fmt;

use crate::error::{MemoryError, MemoryResult};

/// Environment variable holding the backing-memory diagnostic level
pub const BACKING_MEMORY_DEBUG_ENV: &str = "OMRDebug_BackingMemory";

/// Default minimum size of a backing segment (64 KiB)
pub const DEFAULT_MINIMUM_SEGMENT_SIZE: usize = 1 << 16;

/// Default block size used by the segment allocator (4 KiB)
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 12;

/// How much the backing allocator reports about its own work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DiagnosticLevel {
    /// No output
    #[default]
    Off = 0,
    /// About one line per allocate / deallocate call
    Summary = 1,
    /// Extra detail inside each call
    Detail = 2,
    /// Everything, including every segment visited while searching
    Verbose = 3,
}

impl DiagnosticLevel {
    /// Parse a level the way the environment variable is read: only the
    /// first character counts, digits above 3 saturate, anything else is off.
    pub fn parse(value: &str) -> Self {
        match value.as_bytes().first() {
            Some(b'1') => Self::Summary,
            Some(b'2') => Self::Detail,
            Some(b'3'..=b'9') => Self::Verbose,
            _ => Self::Off,
        }
    }

    /// Read [`BACKING_MEMORY_DEBUG_ENV`]; unset means [`DiagnosticLevel::Off`]
    pub fn from_env() -> Self {
        std::env::var(BACKING_MEMORY_DEBUG_ENV)
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    /// True when messages tagged with `level` should be emitted
    #[inline]
    pub fn enabled(self, level: DiagnosticLevel) -> bool {
        level != Self::Off && self >= level
    }
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Configuration for a [`BackingMemoryAllocator`](crate::BackingMemoryAllocator)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BackingMemoryConfig {
    /// Smallest segment ever requested from the raw allocator; power of two
    pub minimum_allocation_size: usize,

    /// Ceiling on total bytes held in segments; 0 means unlimited
    pub allocation_limit: usize,

    /// Diagnostic verbosity
    pub diagnostics: DiagnosticLevel,
}

impl Default for BackingMemoryConfig {
    fn default() -> Self {
        Self {
            minimum_allocation_size: DEFAULT_MINIMUM_SEGMENT_SIZE,
            allocation_limit: 0,
            diagnostics: DiagnosticLevel::Off,
        }
    }
}

impl BackingMemoryConfig {
    /// Create a configuration with the given minimum segment size
    pub fn new(minimum_allocation_size: usize) -> Self {
        Self {
            minimum_allocation_size,
            ..Self::default()
        }
    }

    /// Set the allocation limit
    #[must_use = "builder methods must be chained or built"]
    pub fn with_allocation_limit(mut self, limit: usize) -> Self {
        self.allocation_limit = limit;
        self
    }

    /// Set the diagnostic level
    #[must_use = "builder methods must be chained or built"]
    pub fn with_diagnostics(mut self, level: DiagnosticLevel) -> Self {
        self.diagnostics = level;
        self
    }

    /// Check the invariants the allocator constructor asserts
    pub fn validate(&self) -> MemoryResult<()> {
        if !self.minimum_allocation_size.is_power_of_two() {
            return Err(MemoryError::invalid_config(format!(
                "minimum allocation size {} is not a power of two",
                self.minimum_allocation_size
            )));
        }
        if self.allocation_limit != 0 && self.allocation_limit < self.minimum_allocation_size {
            return Err(MemoryError::invalid_config(format!(
                "allocation limit {} is below the minimum allocation size {}",
                self.allocation_limit, self.minimum_allocation_size
            )));
        }
        Ok(())
    }
}

/// Configuration for a region built on a segment allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegionConfig {
    /// Granularity of the segment allocator; divides the backing minimum
    pub block_size: usize,

    /// Backing allocator settings
    pub backing: BackingMemoryConfig,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            backing: BackingMemoryConfig::default(),
        }
    }
}

impl RegionConfig {
    /// Set the block size
    #[must_use = "builder methods must be chained or built"]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Replace the backing configuration
    #[must_use = "builder methods must be chained or built"]
    pub fn with_backing(mut self, backing: BackingMemoryConfig) -> Self {
        self.backing = backing;
        self
    }

    /// Check every invariant the allocator constructors assert
    pub fn validate(&self) -> MemoryResult<()> {
        self.backing.validate()?;
        if !self.block_size.is_power_of_two()
            || self.block_size > self.backing.minimum_allocation_size
        {
            return Err(MemoryError::invalid_config(format!(
                "block size {} must be a power of two no larger than {}",
                self.block_size, self.backing.minimum_allocation_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0", DiagnosticLevel::Off)]
    #[case("1", DiagnosticLevel::Summary)]
    #[case("2", DiagnosticLevel::Detail)]
    #[case("3", DiagnosticLevel::Verbose)]
    #[case("7", DiagnosticLevel::Verbose)]
    #[case("2 please", DiagnosticLevel::Detail)]
    #[case("", DiagnosticLevel::Off)]
    #[case("yes", DiagnosticLevel::Off)]
    fn parses_levels(#[case] raw: &str, #[case] expected: DiagnosticLevel) {
        assert_eq!(DiagnosticLevel::parse(raw), expected);
    }

    #[test]
    fn level_gating() {
        assert!(DiagnosticLevel::Detail.enabled(DiagnosticLevel::Summary));
        assert!(DiagnosticLevel::Detail.enabled(DiagnosticLevel::Detail));
        assert!(!DiagnosticLevel::Detail.enabled(DiagnosticLevel::Verbose));
        assert!(!DiagnosticLevel::Verbose.enabled(DiagnosticLevel::Off));
    }

    #[test]
    fn validate_rejects_bad_backing_config() {
        assert!(BackingMemoryConfig::new(4096).validate().is_ok());
        assert!(BackingMemoryConfig::new(3000).validate().is_err());
        assert!(
            BackingMemoryConfig::new(4096)
                .with_allocation_limit(1024)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn validate_rejects_oversized_blocks() {
        let config = RegionConfig::default()
            .with_backing(BackingMemoryConfig::new(4096))
            .with_block_size(8192);
        assert!(config.validate().is_err());
        assert!(config.with_block_size(1024).validate().is_ok());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_with_defaults() {
        let config: RegionConfig = serde_json::from_str(
            r#"{ "backing": { "allocation_limit": 1048576, "diagnostics": "summary" } }"#,
        )
        .unwrap();
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.backing.allocation_limit, 1 << 20);
        assert_eq!(
            config.backing.minimum_allocation_size,
            DEFAULT_MINIMUM_SEGMENT_SIZE
        );
        assert_eq!(config.backing.diagnostics, DiagnosticLevel::Summary);
    }
}

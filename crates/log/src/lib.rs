//! # jitkit-log
//!
//! Logging setup shared by the jitkit crates.
//!
//! The memory and IR crates only emit `tracing` events; an embedder (or a
//! test) decides where they go by installing a subscriber through this
//! crate.
//!
//! ```rust,no_run
//! use jitkit_log::prelude::*;
//!
//! fn main() -> LogResult<()> {
//!     let _guard = jitkit_log::auto_init()?;
//!     info!(segments = 4, "backing memory ready");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod builder;
mod config;
mod error;
mod macros;
mod timing;
mod writer;

use std::sync::OnceLock;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Format, Level, WriterConfig};
pub use error::{LogError, LogResult};
pub use timing::{Timer, TimerGuard};

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Level, LogResult, Timer, auto_init, debug, error, info, init, init_with, instrument,
        span, trace, warn,
    };

    pub use tracing::{Span, field};
}

// Re-export tracing macros
pub use tracing::{debug, error, info, instrument, span, trace, warn};

static TEST_INIT: OnceLock<()> = OnceLock::new();

/// Auto-detect and initialize the best logging configuration
pub fn auto_init() -> LogResult<LoggerGuard> {
    if std::env::var("JITKIT_LOG").is_ok() || std::env::var("RUST_LOG").is_ok() {
        init_with(Config::from_env())
    } else if cfg!(debug_assertions) {
        init_with(Config::development())
    } else {
        init_with(Config::production())
    }
}

/// Initialize with default configuration
pub fn init() -> LogResult<LoggerGuard> {
    init_with(Config::default())
}

/// Initialize with custom configuration
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

/// Initialize for tests.
///
/// Safe to call from every test: the first call installs a subscriber that
/// writes through the test harness, later calls are no-ops.
pub fn init_test() -> LogResult<LoggerGuard> {
    let mut result = Ok(LoggerGuard::noop());
    TEST_INIT.get_or_init(|| {
        if !tracing::dispatcher::has_been_set() {
            result = match init_with(Config::test()) {
                Err(LogError::AlreadyInitialized) => Ok(LoggerGuard::noop()),
                other => other,
            };
        }
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_test_is_idempotent() {
        init_test().unwrap();
        init_test().unwrap();
        info!("captured by the test writer");
        assert!(tracing::dispatcher::has_been_set());
    }

    #[test]
    fn second_global_install_fails() {
        init_test().unwrap();
        let err = init_with(Config::test()).unwrap_err();
        assert!(matches!(err, LogError::AlreadyInitialized));
    }

    #[test]
    fn log_error_passes_value_through() {
        let err = log_error!(LogError::Config("missing level".into()));
        assert!(err.to_string().contains("missing level"));
    }
}

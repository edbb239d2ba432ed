//! Error handling for jitkit-log

use thiserror::Error;

/// Result type for logger operations
pub type LogResult<T> = Result<T, LogError>;

/// Error type for logger operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LogError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filter parsing error
    #[error("Invalid filter '{directive}': {reason}")]
    Filter {
        /// The directive that failed to parse
        directive: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber was installed before this one
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LogError::Filter {
            directive: "debug[".into(),
            reason: "syntax error".into(),
        };
        assert!(err.to_string().contains("Invalid filter 'debug['"));
        assert_eq!(
            LogError::AlreadyInitialized.to_string(),
            "a global tracing subscriber is already installed"
        );
    }
}

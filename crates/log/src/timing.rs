//! Performance timing utilities

use std::time::{Duration, Instant};

/// A timer that measures execution time
#[derive(Debug)]
pub struct Timer {
    name: String,
    start: Instant,
    level: tracing::Level,
    threshold: Option<Duration>,
}

impl Timer {
    /// Create a new timer
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            level: tracing::Level::DEBUG,
            threshold: None,
        }
    }

    /// Set the log level
    #[must_use = "builder methods must be chained or built"]
    pub fn level(mut self, level: tracing::Level) -> Self {
        self.level = level;
        self
    }

    /// Only log if duration exceeds threshold
    #[must_use = "builder methods must be chained or built"]
    pub fn threshold(mut self, duration: Duration) -> Self {
        self.threshold = Some(duration);
        self
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Complete the timer
    pub fn complete(self) -> Duration {
        let elapsed = self.elapsed();

        if let Some(threshold) = self.threshold
            && elapsed < threshold
        {
            return elapsed;
        }

        let us = elapsed.as_micros() as u64;
        match self.level {
            tracing::Level::ERROR => tracing::error!(name = %self.name, us, "Timer completed"),
            tracing::Level::WARN => tracing::warn!(name = %self.name, us, "Timer completed"),
            tracing::Level::INFO => tracing::info!(name = %self.name, us, "Timer completed"),
            tracing::Level::DEBUG => tracing::debug!(name = %self.name, us, "Timer completed"),
            tracing::Level::TRACE => tracing::trace!(name = %self.name, us, "Timer completed"),
        }

        elapsed
    }
}

/// RAII guard for automatic timing
#[derive(Debug)]
pub struct TimerGuard {
    timer: Option<Timer>,
}

impl TimerGuard {
    /// Create a new timer guard
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            timer: Some(Timer::new(name)),
        }
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.complete();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_suppresses_fast_timers() {
        let timer = Timer::new("fast").threshold(Duration::from_secs(3600));
        assert!(timer.complete() < Duration::from_secs(3600));
    }

    #[test]
    fn timed_macro_returns_body_value() {
        let value = crate::timed!("sum", (1..=10).sum::<u32>());
        assert_eq!(value, 55);
    }
}

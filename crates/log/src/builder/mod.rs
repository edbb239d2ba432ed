//! Logger builder implementation

#[macro_use]
mod format;

use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{Config, Format};
use crate::error::{LogError, LogResult};
use crate::writer;

type FmtLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync + 'static>;

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard that keeps the logger's root span entered
///
/// Dropping the guard exits the root span; the global subscriber itself
/// stays installed for the rest of the process.
#[derive(Debug)]
pub struct LoggerGuard {
    #[allow(dead_code)]
    root_span: Option<tracing::span::EnteredSpan>,
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// The configuration this builder will install
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build and install the logger as the global default subscriber
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - A global subscriber is already installed
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = EnvFilter::try_new(&self.config.level).map_err(|e| LogError::Filter {
            directive: self.config.level.clone(),
            reason: e.to_string(),
        })?;

        let fmt_layer = self.fmt_layer();

        Registry::default()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|_| LogError::AlreadyInitialized)?;

        let root_span = self.config.service.as_deref().map(|service| {
            tracing::info_span!("jitkit", service).entered()
        });

        Ok(LoggerGuard { root_span })
    }

    fn fmt_layer(&self) -> FmtLayer {
        let display = &self.config.display;
        let writer = writer::make_writer(self.config.writer);

        match self.config.format {
            Format::Pretty => boxed_fmt_layer!(fmt::layer().pretty().with_writer(writer), display),
            Format::Compact => {
                boxed_fmt_layer!(fmt::layer().compact().with_writer(writer), display)
            }
            Format::Json => boxed_fmt_layer!(
                fmt::layer()
                    .json()
                    .flatten_event(display.flatten)
                    .with_current_span(true)
                    .with_writer(writer),
                display
            ),
        }
    }
}

impl LoggerGuard {
    pub(crate) fn noop() -> Self {
        Self { root_span: None }
    }
}

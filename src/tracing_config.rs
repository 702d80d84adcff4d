//! Tracing configuration for structured logging
//!
//! The library only emits events and spans; the server binary installs the
//! subscriber through [`TracingConfig::init`].

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default)
    Console,
    /// Compact console output without colors for CI and containers
    Compact,
    /// JSON structured logging for log collectors
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    /// Output format
    pub format: TracingFormat,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-2+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set custom environment filter
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",  // Default: request lifecycle and model loading
            1 => "debug", // -v: pipeline stages and retries
            _ => "trace", // -vv+: everything, including warp and hyper
        }
    }

    /// Initialize the global tracing subscriber
    ///
    /// `log` records from dependencies are bridged into the subscriber.
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = match &self.env_filter {
            Some(env_filter) => EnvFilter::try_new(env_filter)?,
            None => EnvFilter::try_new(self.verbosity_to_filter())?,
        };

        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(fmt_layer).try_init()?;
            },
        }

        Ok(())
    }
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span covering one HTTP request
    pub fn request(request_id: &str, endpoint: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "request",
            request_id = %request_id,
            endpoint = %endpoint
        )
    }

    /// Create a span for model loading operations
    pub fn model_loading(model_name: &str) -> Span {
        tracing::span!(Level::INFO, "model_loading", model_name = %model_name)
    }

    /// Span for one removal attempt; `attempt` is 0 for the fallback
    pub fn inference_attempt(model_name: &str, attempt: usize) -> Span {
        tracing::span!(
            Level::DEBUG,
            "inference_attempt",
            model_name = %model_name,
            attempt = attempt
        )
    }

    /// Create a span for preprocessing operations
    pub fn preprocessing(original_size: (u32, u32), max_dimension: u32) -> Span {
        tracing::span!(
            Level::DEBUG,
            "preprocessing",
            original_width = %original_size.0,
            original_height = %original_size.1,
            max_dimension = %max_dimension
        )
    }

    /// Create a span for postprocessing operations
    pub fn postprocessing(operation: &str) -> Span {
        tracing::span!(Level::DEBUG, "postprocessing", operation = %operation)
    }
}

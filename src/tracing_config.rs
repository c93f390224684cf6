//! Tracing configuration module for structured logging and observability
//!
//! Applications configure subscribers; the library only emits events and
//! spans. `log` records from the lower-level modules reach the subscriber
//! through its `log` bridge.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors and emojis (default for CLI)
    Console,
    /// Compact console output for CI environments
    Compact,
    /// JSON structured logging
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
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    /// Create a new tracing configuration
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

    /// Set output format
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

    /// Set session ID for run correlation
    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",  // Default: informational messages and above
            1 => "debug", // -v: internal state and computations
            _ => "trace", // -vv+: extremely detailed traces
        }
    }

    /// Initialize the global tracing subscriber
    ///
    /// # Errors
    /// - Invalid filter directives
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = if let Some(env_filter) = &self.env_filter {
            EnvFilter::try_new(env_filter)?
        } else {
            EnvFilter::try_new(self.verbosity_to_filter())?
        };

        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_level(true)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },

            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_file(false)
                    .with_line_number(false)
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

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "🚀 White background session started");
        }

        Ok(())
    }
}

/// Initialize tracing with CLI-friendly defaults
///
/// `RUST_LOG` takes precedence over the verbosity flag when set.
///
/// # Errors
/// - Invalid filter directives
/// - A global subscriber is already installed
#[cfg(feature = "cli")]
pub fn init_cli_tracing(verbosity: u8, format: TracingFormat) -> anyhow::Result<()> {
    let session_id = uuid::Uuid::new_v4().to_string();

    let mut config = TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(session_id);

    if let Ok(filter) = std::env::var("RUST_LOG") {
        if !filter.is_empty() {
            config = config.with_env_filter(filter);
        }
    }

    config.init()
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span owned by a generator for its whole lifetime
    pub fn generator(model_name: &str, backend: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "white_bg",
            model_name = %model_name,
            backend = %backend
        )
    }

    /// Create a span for model loading operations
    pub fn model_loading(model_name: &str, provider: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "model_loading",
            model_name = %model_name,
            provider = %provider
        )
    }

    /// Create a span for processing one image
    pub fn file_processing(source: &str, mode: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "file_processing",
            source = %source,
            mode = %mode
        )
    }

    /// Create a span for batch processing operations
    pub fn batch_processing(file_count: usize) -> Span {
        tracing::span!(
            Level::INFO,
            "batch_processing",
            file_count = %file_count
        )
    }

    /// Create a span for segmentation
    pub fn segmentation(backend: &str, dimensions: (u32, u32)) -> Span {
        tracing::span!(
            Level::DEBUG,
            "segmentation",
            backend = %backend,
            width = %dimensions.0,
            height = %dimensions.1
        )
    }

    /// Create a span for download operations
    pub fn download(url: &str, destination: &std::path::Path) -> Span {
        tracing::span!(
            Level::INFO,
            "download",
            url = %url,
            destination = %destination.display()
        )
    }
}

/// Event helpers for common logging patterns
pub mod events {
    use tracing::{debug, error, info, warn};

    /// Log a user-facing progress update
    pub fn progress(message: &str, emoji: &str) {
        info!("{} {}", emoji, message);
    }

    /// Log an error with context
    pub fn error_with_context(error: &dyn std::error::Error, context: &str) {
        error!(
            error = %error,
            context = %context,
            "❌ Operation failed"
        );
    }

    /// Log a warning with recommendation
    pub fn warning_with_recommendation(message: &str, recommendation: &str) {
        warn!(
            recommendation = %recommendation,
            "⚠️  {}", message
        );
    }

    /// Log a stage duration
    pub fn performance_metric(operation: &str, duration_ms: u64) {
        debug!(
            operation = %operation,
            duration_ms = %duration_ms,
            "⏱️  Performance metric"
        );
    }
}

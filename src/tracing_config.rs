//! Tracing configuration for the command-line frontend
//!
//! The library only emits events; subscribers are installed here by the
//! binary, or through [`init_library_tracing`] by embedding applications that
//! want a minimal default.

use std::io::IsTerminal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output (default for CLI)
    Console,
    /// Compact console output without colors, for CI logs
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

impl TracingFormat {
    /// Format suited to where stderr points
    ///
    /// Terminals get colored console output; redirected output gets plain
    /// compact lines, or JSON when the `tracing-json` feature is enabled.
    #[must_use]
    pub fn for_stderr(is_terminal: bool) -> Self {
        if is_terminal {
            return Self::Console;
        }
        #[cfg(feature = "tracing-json")]
        {
            Self::Json
        }
        #[cfg(not(feature = "tracing-json"))]
        {
            Self::Compact
        }
    }
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
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
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-2+)
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set custom environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Set session ID for log correlation
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<()> {
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
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr);
                registry.with(fmt_layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, "Batch session started");
        }

        Ok(())
    }
}

/// Initialize tracing with CLI defaults and a fresh session id
///
/// # Errors
/// - Subscriber installation failures
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<String> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let format = TracingFormat::for_stderr(std::io::stderr().is_terminal());

    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(session_id.clone())
        .init()?;

    Ok(session_id)
}

/// Initialize tracing for library usage (minimal configuration)
///
/// Does nothing when a global subscriber is already set.
pub fn init_library_tracing() {
    if tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish(),
    )
    .is_ok()
    {
        tracing::debug!("Library tracing initialized");
    }
}

/// Span creation helpers for CLI operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span covering one CLI invocation
    pub fn session(session_id: &str, command: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "session",
            session_id = %session_id,
            command = %command
        )
    }

    /// Span covering a batch over a record table
    pub fn batch_processing(table: &std::path::Path, record_count: usize) -> Span {
        tracing::span!(
            Level::INFO,
            "batch_processing",
            table = %table.display(),
            record_count = %record_count
        )
    }
}

//! Tracing subscriber setup for binaries
//!
//! The library only emits events; the CLI (or any embedding application)
//! decides where they go.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output format for tracing events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default for CLI)
    Console,
    /// Compact output without ANSI colors, for CI logs
    Compact,
    /// One JSON object per event
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Destination for tracing events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// Output to stderr (default)
    Console,
    /// Output to a file
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
    /// Output to both console and a daily-rotated file
    #[cfg(feature = "tracing-files")]
    Both(std::path::PathBuf),
}

/// Keeps background log writers alive; flushes on drop
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Tracing configuration builder
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
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
            output: TracingOutput::Console,
            env_filter: None,
            session_id: None,
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

    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directive for the configured verbosity
    ///
    /// Dependencies stay at `warn` until `-vv`.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn,object_recolor=info",
            1 => "warn,object_recolor=debug",
            _ => "trace",
        }
    }

    fn filter(&self) -> anyhow::Result<EnvFilter> {
        let directive = self
            .env_filter
            .as_deref()
            .unwrap_or_else(|| self.verbosity_to_filter());
        Ok(EnvFilter::try_new(directive)?)
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// Invalid filter directive, or a subscriber is already installed
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        use tracing_subscriber::fmt;

        let registry = Registry::default().with(self.filter()?);
        #[allow(unused_mut)]
        let mut guard = TracingGuard::default();

        match (&self.format, &self.output) {
            (TracingFormat::Console, TracingOutput::Console) => {
                let layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(layer).try_init()?;
            },
            (TracingFormat::Compact, TracingOutput::Console) => {
                let layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(false)
                    .compact();
                registry.with(layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            (TracingFormat::Json, TracingOutput::Console) => {
                let layer = fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(layer).try_init()?;
            },
            #[cfg(feature = "tracing-files")]
            (_, TracingOutput::File(path)) => {
                let (writer, file_guard) = tracing_appender::non_blocking(
                    tracing_appender::rolling::never(log_dir(path), log_name(path, "object-recolor.log")),
                );
                guard._file = Some(file_guard);
                let layer = fmt::layer().with_ansi(false).with_writer(writer).compact();
                registry.with(layer).try_init()?;
            },
            #[cfg(feature = "tracing-files")]
            (_, TracingOutput::Both(path)) => {
                let (writer, file_guard) = tracing_appender::non_blocking(
                    tracing_appender::rolling::daily(log_dir(path), log_name(path, "object-recolor")),
                );
                guard._file = Some(file_guard);
                let console = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact();
                let file = fmt::layer().with_ansi(false).with_writer(writer).compact();
                registry.with(console).with(file).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, "🚀 Recolor session started");
        }
        Ok(guard)
    }
}

#[cfg(feature = "tracing-files")]
fn log_dir(path: &std::path::Path) -> &std::path::Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."))
}

#[cfg(feature = "tracing-files")]
fn log_name<'a>(path: &'a std::path::Path, fallback: &'a str) -> &'a std::ffi::OsStr {
    path.file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new(fallback))
}

/// Install the CLI subscriber, tagging the run with a fresh session id when none is set
///
/// # Errors
/// Invalid filter directive, or a subscriber is already installed
pub fn init_cli_tracing(config: TracingConfig) -> anyhow::Result<TracingGuard> {
    if config.session_id.is_some() {
        return config.init();
    }
    config
        .with_session_id(uuid::Uuid::new_v4().to_string())
        .init()
}

/// Span helpers for the CLI
pub mod spans {
    use tracing::{Level, Span};

    /// Span covering the whole CLI invocation
    pub fn session(session_id: &str, strategy: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "session",
            session_id = %session_id,
            strategy = %strategy
        )
    }

    /// Span for one input file
    pub fn edit(input: &std::path::Path, color: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "edit",
            input = %input.display(),
            color = %color
        )
    }
}

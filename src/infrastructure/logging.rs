//! Logging setup for proxykit
//!
//! Every layer of the crate emits `tracing` events (definition generation, gate
//! transitions, access violations). Nothing is printed until a subscriber is
//! installed; binaries and tests call one of the `init_*` functions here.

use crate::frontend::config::{LogFormatConfig, LoggingConfig};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::Registry,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

static LOGGER: OnceCell<()> = OnceCell::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line
    Pretty,
    /// One line per event
    Compact,
    /// Structured JSON
    Json,
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily rotated files
    File { directory: String, prefix: String },
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Emit span open/close events
    pub span_events: bool,
    /// Extra filter directives (e.g., "proxykit::proxy=trace")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Builds a config from the `[logging]` table of `.proxykit.toml`
    pub fn from_config(config: &LoggingConfig) -> Self {
        let format = match config.format {
            LogFormatConfig::Pretty => LogFormat::Pretty,
            LogFormatConfig::Compact => LogFormat::Compact,
            LogFormatConfig::Json => LogFormat::Json,
        };
        Self::default()
            .with_level(parse_level(&config.level).unwrap_or(Level::INFO))
            .with_format(format)
    }

    /// Reads `PROXYKIT_LOG_LEVEL`, `PROXYKIT_LOG_FORMAT` and `PROXYKIT_LOG_DIR`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(level) = std::env::var("PROXYKIT_LOG_LEVEL")
            .ok()
            .and_then(|value| parse_level(&value))
        {
            config.level = level;
        }

        config.format = match std::env::var("PROXYKIT_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => config.format,
        };

        if let Ok(directory) = std::env::var("PROXYKIT_LOG_DIR") {
            config.output = LogOutput::File {
                directory,
                prefix: "proxykit".to_string(),
            };
        }

        config
    }
}

fn parse_level(value: &str) -> Option<Level> {
    Level::from_str(value.trim()).ok()
}

/// Installs the global subscriber.
///
/// Only the first call has an effect; later calls return `None`. Keep the
/// returned guard alive until exit so buffered events get flushed.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    if LOGGER.get().is_some() {
        return None;
    }

    let filter = build_filter(&config);
    let (writer, guard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::File { directory, prefix } => {
            tracing_appender::non_blocking(rolling::daily(directory, prefix))
        }
    };

    let base = fmt::layer()
        .with_writer(writer)
        .with_span_events(span_events_config(config.span_events));
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Json => base.json().boxed(),
    };

    // Another subscriber may already be installed by the host application
    if tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .is_err()
    {
        return None;
    }

    LOGGER.set(()).ok();
    Some(guard)
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    match &config.filter {
        Some(filter_str) => filter_str
            .split(',')
            .filter(|directive| !directive.trim().is_empty())
            .fold(base_filter, |filter, directive| {
                filter.add_directive(directive.trim().parse().unwrap_or_else(|_| {
                    tracing::warn!("Invalid filter directive: {}", directive);
                    config.level.into()
                }))
            }),
        None => base_filter,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Debug-level pretty output on stderr
pub fn init_dev_logging() -> Option<WorkerGuard> {
    init_logging(LogConfig {
        level: Level::DEBUG,
        format: LogFormat::Pretty,
        output: LogOutput::Stderr,
        span_events: true,
        filter: Some("proxykit=debug".to_string()),
    })
}

/// JSON lines into daily files under `log_dir`
pub fn init_prod_logging(log_dir: impl AsRef<Path>) -> Option<WorkerGuard> {
    init_logging(LogConfig {
        level: Level::INFO,
        format: LogFormat::Json,
        output: LogOutput::File {
            directory: log_dir.as_ref().to_string_lossy().to_string(),
            prefix: "proxykit".to_string(),
        },
        span_events: false,
        filter: Some("proxykit=info,warn".to_string()),
    })
}

//! # Observability
//!
//! Centralized logging for liftlog binaries.
//!
//! Crates are **log producers** only: they use `tracing` macros and never
//! decide where output goes. The binary calls [`init_with_config`] once at
//! startup, which installs:
//!
//! - a JSONL file sink (`~/.liftlog/logs/liftlog.jsonl` unless overridden),
//! - an optional compact stderr layer for interactive use.
//!
//! Both layers honour `RUST_LOG`, falling back to the configured level.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "liftlog".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! ```

mod file_sink;
mod json_layer;

use std::path::PathBuf;

pub use file_sink::{CentralLogWriter, WriterFactory};
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSON line.
    pub service_name: String,

    /// Default filter (e.g. "debug", "info"). `RUST_LOG` wins when set.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.liftlog/logs/liftlog.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with default settings for `service_name`.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// Falls back to stderr-only output when the log file cannot be opened.
/// Calling this twice is harmless; the second call is ignored.
pub fn init_with_config(config: LogConfig) {
    file_sink::init_subscriber(&config);
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

pub use tracing::{debug, error, info, instrument, trace, warn};
pub use tracing::Level;

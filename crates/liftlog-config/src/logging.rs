//! Logging initialization.
//!
//! Thin wrapper over the observability crate: every liftlog process writes
//! structured JSONL to `<base_dir>/logs/liftlog.jsonl`.

use crate::Paths;
use observability::LogConfig;

/// Initialize the logging system.
///
/// * `level` - default filter when `RUST_LOG` is unset
/// * `paths` - resolves the log file location
/// * `also_stderr` - mirror log lines to stderr (`--verbose`)
pub fn init_logging(level: &str, paths: &Paths, also_stderr: bool) {
    observability::init_with_config(LogConfig {
        service_name: "liftlog".into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        also_stderr,
    });
}

//! File system paths for liftlog.

use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

/// Manages file system paths for the client.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for client state (~/.liftlog)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.liftlog`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".liftlog"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.liftlog).
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the config file path (~/.liftlog/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the local storage file (~/.liftlog/local-storage.json).
    ///
    /// Holds the session mirror; never read as a trust source.
    pub fn storage_file(&self) -> PathBuf {
        self.base_dir.join("local-storage.json")
    }

    /// Get the logs directory (~/.liftlog/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file (~/.liftlog/logs/liftlog.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("liftlog.jsonl")
    }

    /// Ensure all necessary directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

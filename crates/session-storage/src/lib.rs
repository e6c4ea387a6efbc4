//! Local key-value storage for the liftlog client.
//!
//! This crate provides:
//! - The [`SecureStorage`] backend trait
//! - [`MemoryStorage`] for tests and ephemeral runs
//! - [`FileStorage`], a JSON-object file persisted under the client base dir
//! - [`SessionMirror`], the single slot caching the serialized auth session

mod file;
mod keys;
mod memory;
mod mirror;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use mirror::SessionMirror;
pub use traits::SecureStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backing file holds something other than a JSON object of strings
    #[error("Corrupt storage file: {0}")]
    Corrupt(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

//! The session mirror slot.

use crate::{SecureStorage, StorageKeys, StorageResult};
use std::sync::Arc;
use tracing::debug;

/// Single global slot holding the serialized auth session.
///
/// Writes are last-write-wins. The contents are a convenience cache for the
/// identity provider and must never be treated as proof of authentication.
#[derive(Clone)]
pub struct SessionMirror {
    storage: Arc<dyn SecureStorage>,
}

impl SessionMirror {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Overwrite the slot with `raw`.
    pub fn persist(&self, raw: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::AUTH_SESSION, raw)?;
        debug!(bytes = raw.len(), "Session mirrored to local storage");
        Ok(())
    }

    /// Read the slot.
    pub fn load(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::AUTH_SESSION)
    }

    /// Empty the slot. Returns whether anything was removed.
    pub fn clear(&self) -> StorageResult<bool> {
        let removed = self.storage.delete(StorageKeys::AUTH_SESSION)?;
        if removed {
            debug!("Session removed from local storage");
        }
        Ok(removed)
    }

    /// Whether the slot currently holds a value.
    pub fn is_present(&self) -> StorageResult<bool> {
        self.storage.has(StorageKeys::AUTH_SESSION)
    }
}

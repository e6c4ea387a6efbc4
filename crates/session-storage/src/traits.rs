//! Backend trait.

use crate::StorageResult;

/// String key-value backend for client-local state.
///
/// Implementations serialize their own access; callers share them as
/// `Arc<dyn SecureStorage>`.
pub trait SecureStorage: Send + Sync {
    /// Insert or overwrite `key`.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Remove `key`. `Ok(false)` when it was not there.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

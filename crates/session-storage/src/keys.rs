//! Storage key constants.

/// Storage keys used by the client
pub struct StorageKeys;

impl StorageKeys {
    /// Serialized auth session mirrored for the identity provider.
    pub const AUTH_SESSION: &'static str = "liftlog-auth-token";
}

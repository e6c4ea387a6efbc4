//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Invalid email or password
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Signup attempted for an email that already has an account
    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    /// Password sign-in for an account whose email is not confirmed yet
    #[error("Email not confirmed")]
    EmailNotConfirmed,

    /// Form input rejected before reaching the provider
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Token refresh error
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Refresh retries exhausted
    #[error("Token refresh failed after {0} attempts")]
    RefreshExhausted(u32),

    /// No session to act on
    #[error("Not logged in")]
    NotLoggedIn,

    /// Session was invalidated server-side (revoked, logged out elsewhere, etc.)
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    /// Provider failed on its side (5xx)
    #[error("Server error: HTTP {status}: {message}")]
    Server { status: u16, message: String },

    /// Provider answered with something other than the documented shape
    #[error("Unexpected provider response: {0}")]
    UnexpectedResponse(String),

    /// The reconciler task is no longer running
    #[error("Session reconciler stopped")]
    ReconcilerStopped,

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] session_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Network unavailable (transient error, can retry)
    #[error("Network unavailable")]
    NetworkUnavailable,
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::NetworkUnavailable => true,
            AuthError::Timeout => true,
            AuthError::Server { status, .. } => *status >= 500,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }

    /// Message suitable for showing to the person at the login/signup form.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials(_) => "Invalid email or password.".to_string(),
            AuthError::UserAlreadyExists(_) => {
                "An account with this email already exists.".to_string()
            }
            AuthError::EmailNotConfirmed => {
                "Please confirm your email address before signing in.".to_string()
            }
            AuthError::InvalidInput(reason) => reason.clone(),
            AuthError::SessionInvalid(_) => {
                "Your session could not be verified. Please sign in again.".to_string()
            }
            e if e.is_transient() => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

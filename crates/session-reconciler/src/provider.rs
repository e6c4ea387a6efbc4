//! Identity provider seam.
//!
//! The reconciler only talks to the hosted auth backend through
//! [`IdentityProvider`]. Sessions and events coming out of a provider are
//! claims; the only authoritative answer is [`IdentityProvider::get_current_user`].

use crate::AuthResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::warn;

const EVENT_BUS_CAPACITY: usize = 64;

/// A user as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Credential bundle issued by the provider. Untrusted until validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Unix seconds at which `access_token` stops being accepted.
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// The user this session claims to belong to.
    pub user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Serialized form written to the session mirror.
    pub fn to_raw(&self) -> AuthResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the session mirror's contents.
    pub fn from_raw(raw: &str) -> AuthResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Whether the access token is expired at `now` (unix seconds).
    /// Sessions without an expiry never expire locally.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Kind of event emitted on the provider's auth stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEventKind {
    /// Delivered once per subscription with whatever session the provider holds.
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

impl fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionEventKind::InitialSession => "INITIAL_SESSION",
            SessionEventKind::SignedIn => "SIGNED_IN",
            SessionEventKind::SignedOut => "SIGNED_OUT",
            SessionEventKind::TokenRefreshed => "TOKEN_REFRESHED",
        };
        f.write_str(name)
    }
}

/// One event on the provider's auth stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session: Option<Session>,
}

impl SessionEvent {
    pub fn new(kind: SessionEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }

    pub fn initial(session: Option<Session>) -> Self {
        Self::new(SessionEventKind::InitialSession, session)
    }

    pub fn signed_in(session: Session) -> Self {
        Self::new(SessionEventKind::SignedIn, Some(session))
    }

    pub fn signed_out() -> Self {
        Self::new(SessionEventKind::SignedOut, None)
    }

    pub fn token_refreshed(session: Session) -> Self {
        Self::new(SessionEventKind::TokenRefreshed, Some(session))
    }
}

/// Email/password pair submitted by the login and signup views.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Result of sign-in or sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub user: Option<AuthUser>,
    /// Absent when signup still awaits email confirmation.
    pub session: Option<Session>,
}

/// Live view of a provider's auth stream.
///
/// Yields the `InitialSession` event first, then every later event.
/// Dropping the subscription releases it.
pub struct SessionSubscription {
    initial: Option<SessionEvent>,
    receiver: broadcast::Receiver<SessionEvent>,
}

/// One item read from a [`SessionSubscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Event(SessionEvent),
    /// The subscriber fell behind and this many events were dropped. Whatever
    /// they said is lost; the provider's current session is the only recovery.
    Lagged(u64),
}

impl SessionSubscription {
    pub fn new(initial: SessionEvent, receiver: broadcast::Receiver<SessionEvent>) -> Self {
        Self {
            initial: Some(initial),
            receiver,
        }
    }

    /// Next event or lag notice, or `None` once the provider is gone.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        if let Some(initial) = self.initial.take() {
            return Some(SessionUpdate::Event(initial));
        }

        match self.receiver.recv().await {
            Ok(event) => Some(SessionUpdate::Event(event)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped = skipped, "Session subscription lagged, events dropped");
                Some(SessionUpdate::Lagged(skipped))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Next event, skipping over lag notices.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        loop {
            match self.next_update().await? {
                SessionUpdate::Event(event) => return Some(event),
                SessionUpdate::Lagged(_) => continue,
            }
        }
    }
}

/// Fan-out of auth events to every subscription of one provider.
#[derive(Clone)]
pub struct SessionEventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for SessionEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    /// Publish to current subscribers. Events with no subscriber are dropped.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe, reading the initial session only after the receiver exists
    /// so no event between the two can be missed.
    pub fn subscribe(&self, current: impl FnOnce() -> Option<Session>) -> SessionSubscription {
        let receiver = self.sender.subscribe();
        SessionSubscription::new(SessionEvent::initial(current()), receiver)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// The hosted identity backend as seen by the client.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authoritative check of the current session against the server.
    /// `Ok(None)` means there is no valid user.
    async fn get_current_user(&self) -> AuthResult<Option<AuthUser>>;

    /// The session the provider currently holds, without validation.
    async fn get_session_snapshot(&self) -> AuthResult<Option<Session>>;

    /// Register for auth events.
    fn subscribe(&self) -> SessionSubscription;

    /// Invalidate the current session server-side and locally.
    async fn sign_out(&self) -> AuthResult<()>;

    async fn sign_in_with_password(&self, credentials: &Credentials) -> AuthResult<AuthResponse>;

    async fn sign_up(&self, credentials: &Credentials) -> AuthResult<AuthResponse>;
}

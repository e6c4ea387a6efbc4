//! Test harness for reconciler scenarios.
//!
//! Provides:
//! - ScriptedProvider: an in-memory IdentityProvider whose validation answers
//!   (and their latency) are queued up front
//! - TestHarness: wires a ScriptedProvider and a MemoryStorage mirror into a
//!   reconciler

use crate::provider::{
    AuthResponse, AuthUser, Credentials, IdentityProvider, Session, SessionEvent, SessionEventBus,
    SessionSubscription,
};
use crate::{
    AuthError, AuthResult, EventOrdering, ReconciledIdentity, ReconcilerHandle, SessionReconciler,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use session_storage::{MemoryStorage, SecureStorage, SessionMirror, StorageKeys};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

/// What `get_current_user` answers.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Valid session belonging to this user id.
    User(String),
    /// Server answered without a user.
    NoUser,
    /// Validation round-trip failed.
    Fail,
}

/// Build a session claiming `user_id`.
pub fn session(token: &str, user_id: &str) -> Session {
    Session {
        access_token: token.to_string(),
        refresh_token: format!("refresh-{}", token),
        token_type: "bearer".to_string(),
        expires_at: None,
        user: AuthUser {
            id: user_id.to_string(),
            email: Some(format!("{}@example.com", user_id)),
        },
    }
}

/// Identity provider driven entirely by the test.
pub struct ScriptedProvider {
    bus: SessionEventBus,
    session: Mutex<Option<Session>>,
    verdicts: Mutex<VecDeque<(Duration, Verdict)>>,
    validations: AtomicUsize,
    sign_outs: AtomicUsize,
    fail_sign_out: AtomicBool,
    sign_out_delay: Mutex<Duration>,
}

impl ScriptedProvider {
    pub fn new(session: Option<Session>) -> Self {
        Self {
            bus: SessionEventBus::new(),
            session: Mutex::new(session),
            verdicts: Mutex::new(VecDeque::new()),
            validations: AtomicUsize::new(0),
            sign_outs: AtomicUsize::new(0),
            fail_sign_out: AtomicBool::new(false),
            sign_out_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Queue the answer for the next validation.
    ///
    /// Without a queued answer a validation succeeds immediately for the user
    /// the current session claims, or answers `NoUser` with no session.
    pub fn push_verdict(&self, delay: Duration, verdict: Verdict) {
        self.verdicts.lock().push_back((delay, verdict));
    }

    /// Make `sign_out` return an error (after clearing locally).
    pub fn fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, AtomicOrdering::SeqCst);
    }

    /// Make every `sign_out` take `delay` before it reaches the server.
    pub fn delay_sign_out(&self, delay: Duration) {
        *self.sign_out_delay.lock() = delay;
    }

    /// Forget the held session without announcing anything.
    pub fn clear_session(&self) {
        *self.session.lock() = None;
    }

    /// Hold `session` and announce it as `SignedIn`.
    pub fn sign_in(&self, session: Session) {
        *self.session.lock() = Some(session.clone());
        self.bus.emit(SessionEvent::signed_in(session));
    }

    /// Hold `session` and announce it as `TokenRefreshed`.
    pub fn refresh(&self, session: Session) {
        *self.session.lock() = Some(session.clone());
        self.bus.emit(SessionEvent::token_refreshed(session));
    }

    /// Emit an arbitrary event without touching the held session.
    pub fn emit(&self, event: SessionEvent) {
        self.bus.emit(event);
    }

    pub fn validations(&self) -> usize {
        self.validations.load(AtomicOrdering::SeqCst)
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(AtomicOrdering::SeqCst)
    }

    pub fn subscribers(&self) -> usize {
        self.bus.subscriber_count()
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn get_current_user(&self) -> AuthResult<Option<AuthUser>> {
        self.validations.fetch_add(1, AtomicOrdering::SeqCst);

        let scripted = self.verdicts.lock().pop_front();
        let (delay, verdict) = scripted.unwrap_or_else(|| {
            let verdict = match self.session.lock().as_ref() {
                Some(session) => Verdict::User(session.user.id.clone()),
                None => Verdict::NoUser,
            };
            (Duration::ZERO, verdict)
        });

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match verdict {
            Verdict::User(id) => Ok(Some(AuthUser { id, email: None })),
            Verdict::NoUser => Ok(None),
            Verdict::Fail => Err(AuthError::NetworkUnavailable),
        }
    }

    async fn get_session_snapshot(&self) -> AuthResult<Option<Session>> {
        Ok(self.session.lock().clone())
    }

    fn subscribe(&self) -> SessionSubscription {
        self.bus.subscribe(|| self.session.lock().clone())
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let delay = *self.sign_out_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.sign_outs.fetch_add(1, AtomicOrdering::SeqCst);
        *self.session.lock() = None;
        self.bus.emit(SessionEvent::signed_out());

        if self.fail_sign_out.load(AtomicOrdering::SeqCst) {
            return Err(AuthError::NetworkUnavailable);
        }
        Ok(())
    }

    async fn sign_in_with_password(&self, credentials: &Credentials) -> AuthResult<AuthResponse> {
        let session = session("scripted", &credentials.email);
        self.sign_in(session.clone());
        Ok(AuthResponse {
            user: Some(session.user.clone()),
            session: Some(session),
        })
    }

    async fn sign_up(&self, credentials: &Credentials) -> AuthResult<AuthResponse> {
        self.sign_in_with_password(credentials).await
    }
}

/// Provider, storage, and mirror for one scenario.
pub struct TestHarness {
    pub provider: Arc<ScriptedProvider>,
    pub storage: Arc<MemoryStorage>,
    pub mirror: SessionMirror,
}

impl TestHarness {
    /// Provider holding no session.
    pub fn new() -> Self {
        Self::with_session(None)
    }

    /// Provider holding `session` before the reconciler subscribes.
    pub fn with_session(session: Option<Session>) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        Self {
            provider: Arc::new(ScriptedProvider::new(session)),
            mirror: SessionMirror::new(storage.clone()),
            storage,
        }
    }

    pub fn spawn(&self, ordering: EventOrdering) -> ReconcilerHandle {
        self.reconciler(ordering).spawn()
    }

    pub fn reconciler(&self, ordering: EventOrdering) -> SessionReconciler {
        SessionReconciler::new(self.provider.clone(), self.mirror.clone()).ordering(ordering)
    }

    /// Session currently held in the mirror slot.
    pub fn stored_session(&self) -> Option<Session> {
        self.storage
            .get(StorageKeys::AUTH_SESSION)
            .unwrap()
            .map(|raw| Session::from_raw(&raw).unwrap())
    }
}

/// Let spawned work (validations, defensive sign-outs) run to completion.
///
/// Tests run with paused time, so this only advances the mock clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

/// Wait until the provider has been asked to validate `count` times.
pub async fn wait_for_validations(provider: &ScriptedProvider, count: usize) {
    for _ in 0..1000 {
        if provider.validations() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!(
        "expected {} validations, saw {}",
        count,
        provider.validations()
    );
}

/// Wait until the reconciled identity satisfies `predicate`.
pub async fn wait_for_identity(
    handle: &ReconcilerHandle,
    predicate: impl FnMut(&ReconciledIdentity) -> bool,
) -> ReconciledIdentity {
    let mut identity = handle.subscribe();
    let reached = tokio::time::timeout(Duration::from_secs(5), identity.wait_for(predicate))
        .await
        .expect("timed out waiting for identity")
        .expect("reconciler stopped");
    reached.clone()
}

pub fn signed_in_as(identity: &ReconciledIdentity, user_id: &str) -> bool {
    identity.initialized && identity.authenticated && identity.user_id.as_deref() == Some(user_id)
}

pub fn signed_out(identity: &ReconciledIdentity) -> bool {
    identity.initialized && !identity.authenticated && identity.user_id.is_none()
}

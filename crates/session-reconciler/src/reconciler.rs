//! The session reconciler task.
//!
//! A single tokio task owns the [`IdentityState`]. It is fed by two inputs:
//!
//! - the provider's [`SessionSubscription`], established exactly once,
//! - an `mpsc` inbox carrying validation outcomes, logout requests and shutdown.
//!
//! Every session-bearing event is re-validated with
//! [`IdentityProvider::get_current_user`] before it can authenticate anyone.
//! With [`EventOrdering::LastCompletedWins`] validations run as separate tasks
//! and report back through the inbox, so outcomes are applied in completion
//! order. With [`EventOrdering::Sequential`] each validation is awaited before
//! the next event is taken.
//!
//! A logout supersedes every validation started before it: their outcomes are
//! discarded when they arrive. Defensive sign-outs are tracked so shutdown can
//! give them a bounded chance to reach the server.
//!
//! Readers observe the result through a `watch` channel on [`ReconcilerHandle`].

use crate::identity::{IdentityState, ReconciledIdentity, SideEffect, Transition};
use crate::provider::{
    AuthUser, IdentityProvider, Session, SessionEventKind, SessionSubscription, SessionUpdate,
};
use crate::{AuthError, AuthResult};
use liftlog_config::EventOrdering;
use session_storage::SessionMirror;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const INBOX_CAPACITY: usize = 64;

/// How long shutdown waits for pending defensive sign-outs.
const SIGN_OUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Callback invoked on the reconciler task after every identity change.
pub type IdentityCallback = Box<dyn Fn(&ReconciledIdentity) + Send + Sync>;

enum Command {
    Validated {
        validation_id: u64,
        kind: SessionEventKind,
        session: Session,
        outcome: AuthResult<Option<AuthUser>>,
    },
    Logout {
        done: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Builder for the reconciler task.
pub struct SessionReconciler {
    provider: Arc<dyn IdentityProvider>,
    mirror: SessionMirror,
    ordering: EventOrdering,
    on_change: Option<IdentityCallback>,
}

impl SessionReconciler {
    pub fn new(provider: Arc<dyn IdentityProvider>, mirror: SessionMirror) -> Self {
        Self {
            provider,
            mirror,
            ordering: EventOrdering::default(),
            on_change: None,
        }
    }

    /// Choose how overlapping validations are ordered.
    pub fn ordering(mut self, ordering: EventOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Register a callback fired after each identity change.
    pub fn on_change(mut self, callback: IdentityCallback) -> Self {
        self.on_change = Some(callback);
        self
    }

    /// Subscribe to the provider and start the task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> ReconcilerHandle {
        let (command_tx, command_rx) = mpsc::channel(INBOX_CAPACITY);
        let (identity_tx, identity_rx) = watch::channel(ReconciledIdentity::uninitialized());

        let subscription = self.provider.subscribe();
        let task = ReconcilerTask {
            provider: self.provider,
            mirror: self.mirror,
            ordering: self.ordering,
            on_change: self.on_change,
            state: IdentityState::new(),
            identity_tx,
            inbox: command_tx.downgrade(),
            next_validation_id: 0,
            superseded_before: 0,
            in_flight: 0,
            sign_outs: JoinSet::new(),
        };

        info!(ordering = ?task.ordering, "Session reconciler started");
        tokio::spawn(task.run(subscription, command_rx));

        ReconcilerHandle {
            commands: command_tx,
            identity: identity_rx,
        }
    }
}

/// Cloneable access to a running reconciler.
#[derive(Clone)]
pub struct ReconcilerHandle {
    commands: mpsc::Sender<Command>,
    identity: watch::Receiver<ReconciledIdentity>,
}

impl ReconcilerHandle {
    /// Current reconciled identity.
    pub fn snapshot(&self) -> ReconciledIdentity {
        self.identity.borrow().clone()
    }

    /// Change-notification channel for views.
    pub fn subscribe(&self) -> watch::Receiver<ReconciledIdentity> {
        self.identity.clone()
    }

    /// Wait until the first provider event has been processed.
    ///
    /// There is no built-in timeout; a provider that never delivers its
    /// initial event keeps this pending.
    pub async fn wait_until_initialized(&self) -> AuthResult<ReconciledIdentity> {
        let mut identity = self.identity.clone();
        let ready = identity
            .wait_for(|identity| identity.initialized)
            .await
            .map_err(|_| AuthError::ReconcilerStopped)?;
        Ok(ready.clone())
    }

    /// Sign out at the provider, then force the local identity to
    /// unauthenticated whatever the provider answered. Never fails.
    pub async fn logout(&self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Logout { done }).await.is_err() {
            warn!("Logout requested after the session reconciler stopped");
            return;
        }
        let _ = finished.await;
    }

    /// Stop the task and release the provider subscription.
    ///
    /// Pending defensive sign-outs get a bounded wait before this returns.
    /// Validations still in flight complete into a closed inbox and are dropped.
    pub async fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).await.is_ok() {
            self.commands.closed().await;
        }
    }

    /// Whether the reconciler task is still running.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

struct ReconcilerTask {
    provider: Arc<dyn IdentityProvider>,
    mirror: SessionMirror,
    ordering: EventOrdering,
    on_change: Option<IdentityCallback>,
    state: IdentityState,
    identity_tx: watch::Sender<ReconciledIdentity>,
    // Weak so the task stops once every handle is dropped.
    inbox: mpsc::WeakSender<Command>,
    next_validation_id: u64,
    // Outcomes of validations with a lower id arrive after a logout and are ignored.
    superseded_before: u64,
    in_flight: usize,
    sign_outs: JoinSet<()>,
}

impl ReconcilerTask {
    async fn run(mut self, mut subscription: SessionSubscription, mut commands: mpsc::Receiver<Command>) {
        let mut events_open = true;

        loop {
            tokio::select! {
                update = subscription.next_update(), if events_open => match update {
                    Some(SessionUpdate::Event(event)) => {
                        debug!(event = %event.kind, has_session = event.session.is_some(), "Auth event received");
                        self.on_event(event.kind, event.session).await;
                    }
                    Some(SessionUpdate::Lagged(skipped)) => self.resync(skipped).await,
                    None => {
                        warn!("Identity provider closed its event stream");
                        events_open = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(Command::Validated { validation_id, kind, session, outcome }) => {
                        self.in_flight = self.in_flight.saturating_sub(1);
                        if validation_id < self.superseded_before {
                            debug!(validation_id, event = %kind, "Validation started before logout, ignored");
                            continue;
                        }
                        self.on_validated(validation_id, kind, session, outcome);
                    }
                    Some(Command::Logout { done }) => {
                        self.logout().await;
                        let _ = done.send(());
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(_) = self.sign_outs.join_next(), if !self.sign_outs.is_empty() => {}
            }
        }

        drop(subscription);
        self.drain_sign_outs().await;
        info!(
            in_flight = self.in_flight,
            "Session reconciler stopped, subscription released"
        );
    }

    async fn drain_sign_outs(&mut self) {
        if self.sign_outs.is_empty() {
            return;
        }

        let pending = self.sign_outs.len();
        let drained = tokio::time::timeout(SIGN_OUT_DRAIN_TIMEOUT, async {
            while self.sign_outs.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(pending, "Defensive sign-out still pending at shutdown, abandoned");
            self.sign_outs.abort_all();
        }
    }

    /// Recover from dropped events by re-reading the provider's session.
    async fn resync(&mut self, skipped: u64) {
        match self.provider.get_session_snapshot().await {
            Ok(Some(session)) => {
                info!(skipped, "Re-validating provider session after missed events");
                self.validate(SessionEventKind::InitialSession, session).await;
            }
            Ok(None) => {
                info!(skipped, "Provider holds no session after missed events");
                self.apply(Transition::SignedOut);
            }
            Err(e) => {
                warn!(skipped, error = %e, "Could not read provider session after missed events");
                self.apply(Transition::Rejected);
            }
        }
    }

    async fn on_event(&mut self, kind: SessionEventKind, session: Option<Session>) {
        match (kind, session) {
            (SessionEventKind::SignedOut, _) => self.apply(Transition::SignedOut),
            (_, Some(session)) => self.validate(kind, session).await,
            (_, None) => self.apply(Transition::NoSession),
        }
    }

    async fn validate(&mut self, kind: SessionEventKind, session: Session) {
        let validation_id = self.next_validation_id;
        self.next_validation_id += 1;

        match self.ordering {
            EventOrdering::Sequential => {
                let outcome = self.provider.get_current_user().await;
                self.on_validated(validation_id, kind, session, outcome);
            }
            EventOrdering::LastCompletedWins => {
                let Some(inbox) = self.inbox.upgrade() else {
                    return;
                };
                self.in_flight += 1;
                let provider = self.provider.clone();
                tokio::spawn(async move {
                    let outcome = provider.get_current_user().await;
                    let completed = Command::Validated {
                        validation_id,
                        kind,
                        session,
                        outcome,
                    };
                    if inbox.send(completed).await.is_err() {
                        debug!(validation_id, "Validation finished after reconciler shutdown, dropped");
                    }
                });
            }
        }
    }

    fn on_validated(
        &mut self,
        validation_id: u64,
        kind: SessionEventKind,
        session: Session,
        outcome: AuthResult<Option<AuthUser>>,
    ) {
        let transition = match outcome {
            Ok(Some(user)) => {
                if user.id != session.user.id {
                    warn!(
                        claimed_user_id = %session.user.id,
                        verified_user_id = %user.id,
                        "Session claimed a different user than the provider verified"
                    );
                }
                debug!(validation_id, event = %kind, user_id = %user.id, "Session verified");
                Transition::Verified {
                    user_id: user.id,
                    session,
                }
            }
            Ok(None) => {
                warn!(validation_id, event = %kind, "Provider returned no user, rejecting session");
                Transition::Rejected
            }
            Err(e) => {
                warn!(validation_id, event = %kind, error = %e, "Session validation failed, rejecting session");
                Transition::Rejected
            }
        };

        self.apply(transition);
    }

    async fn logout(&mut self) {
        match self.provider.sign_out().await {
            Ok(()) => debug!("Provider sign-out succeeded"),
            Err(e) => warn!(error = %e, "Provider sign-out failed, logging out locally anyway"),
        }
        self.superseded_before = self.next_validation_id;
        self.apply(Transition::LoggedOut);
    }

    fn apply(&mut self, transition: Transition) {
        for effect in self.state.apply(transition) {
            self.run_side_effect(effect);
        }
        self.publish();
    }

    fn run_side_effect(&mut self, effect: SideEffect) {
        match effect {
            SideEffect::PersistSession(session) => {
                if let Err(e) = session.to_raw().and_then(|raw| Ok(self.mirror.persist(&raw)?)) {
                    warn!(error = %e, "Failed to mirror session to local storage");
                }
            }
            SideEffect::ClearSession => {
                if let Err(e) = self.mirror.clear() {
                    warn!(error = %e, "Failed to remove mirrored session");
                }
            }
            SideEffect::DefensiveSignOut => {
                let provider = self.provider.clone();
                self.sign_outs.spawn(async move {
                    match provider.sign_out().await {
                        Ok(()) => debug!("Defensive sign-out completed"),
                        Err(e) => warn!(error = %e, "Defensive sign-out failed"),
                    }
                });
            }
        }
    }

    fn publish(&self) {
        let identity = self.state.identity();
        let changed = self.identity_tx.send_if_modified(|current| {
            if *current == identity {
                return false;
            }
            *current = identity.clone();
            true
        });

        if !changed {
            return;
        }

        info!(
            authenticated = identity.authenticated,
            user_id = identity.user_id.as_deref().unwrap_or("-"),
            initialized = identity.initialized,
            "Reconciled identity changed"
        );
        if let Some(callback) = &self.on_change {
            callback(&identity);
        }
    }
}

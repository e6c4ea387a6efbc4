//! Reconciled identity state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//!                 ┌─────────────────┐
//!                 │  Uninitialized  │ (initial, never re-entered)
//!                 └────────┬────────┘
//!        Verified          │          Rejected / SignedOut / LoggedOut / NoSession
//!          ┌───────────────┴───────────────┐
//!          ▼                               ▼
//! ┌─────────────────┐   Rejected      ┌─────────────────┐
//! │  Authenticated  │ ──SignedOut───► │ Unauthenticated │
//! │    (user_id)    │ ◄──Verified──── │                 │
//! └─────────────────┘   LoggedOut     └─────────────────┘
//! ```
//!
//! `NoSession` marks the machine initialized without touching an
//! already-decided state.
//!
//! [`IdentityState::apply`] is pure: it returns the side effects the caller
//! must run instead of running them.

use crate::provider::Session;
use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub identity_machine(Uninitialized)

    Uninitialized => {
        Verified => Authenticated,
        Rejected => Unauthenticated,
        SignedOut => Unauthenticated,
        LoggedOut => Unauthenticated,
        NoSession => Unauthenticated
    },
    Authenticated => {
        Verified => Authenticated,
        Rejected => Unauthenticated,
        SignedOut => Unauthenticated,
        LoggedOut => Unauthenticated,
        NoSession => Authenticated
    },
    Unauthenticated => {
        Verified => Authenticated,
        Rejected => Unauthenticated,
        SignedOut => Unauthenticated,
        LoggedOut => Unauthenticated,
        NoSession => Unauthenticated
    }
}

pub use identity_machine::Input as IdentityMachineInput;
pub use identity_machine::State as IdentityMachineState;
pub use identity_machine::StateMachine as IdentityMachine;

/// The locally trusted view of who is signed in.
///
/// `authenticated` implies `user_id.is_some()`, and `initialized` never goes
/// back to false once set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledIdentity {
    pub authenticated: bool,
    pub user_id: Option<String>,
    pub initialized: bool,
}

impl ReconciledIdentity {
    /// State before any provider event has been processed.
    pub fn uninitialized() -> Self {
        Self::default()
    }
}

/// Outcome fed into the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `get_current_user` returned this user for `session`.
    Verified { user_id: String, session: Session },
    /// Validation returned an error or no user.
    Rejected,
    /// Provider reported a sign-out.
    SignedOut,
    /// Explicit local logout finished (whatever the server said).
    LoggedOut,
    /// An event expected a session and carried none.
    NoSession,
}

impl Transition {
    fn input(&self) -> IdentityMachineInput {
        match self {
            Transition::Verified { .. } => IdentityMachineInput::Verified,
            Transition::Rejected => IdentityMachineInput::Rejected,
            Transition::SignedOut => IdentityMachineInput::SignedOut,
            Transition::LoggedOut => IdentityMachineInput::LoggedOut,
            Transition::NoSession => IdentityMachineInput::NoSession,
        }
    }
}

/// Work the owner of an [`IdentityState`] must carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Mirror the session into local storage.
    PersistSession(Session),
    /// Remove the mirrored session.
    ClearSession,
    /// Fire-and-forget sign-out so the server drops the rejected session too.
    DefensiveSignOut,
}

/// Machine plus the user it vouches for.
pub struct IdentityState {
    machine: IdentityMachine,
    user_id: Option<String>,
}

impl Default for IdentityState {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityState {
    pub fn new() -> Self {
        Self {
            machine: IdentityMachine::new(),
            user_id: None,
        }
    }

    /// Current machine state.
    pub fn state(&self) -> &IdentityMachineState {
        self.machine.state()
    }

    /// Derived public view.
    pub fn identity(&self) -> ReconciledIdentity {
        let state = self.machine.state();
        let authenticated = *state == IdentityMachineState::Authenticated;
        ReconciledIdentity {
            authenticated,
            user_id: if authenticated {
                self.user_id.clone()
            } else {
                None
            },
            initialized: *state != IdentityMachineState::Uninitialized,
        }
    }

    /// Apply `transition` and return the side effects it requires.
    pub fn apply(&mut self, transition: Transition) -> Vec<SideEffect> {
        let input = transition.input();
        if self.machine.consume(&input).is_err() {
            // Every input is accepted in every state; keep the old state if that ever changes.
            tracing::error!(input = ?input, state = ?self.machine.state(), "Identity transition rejected");
            return Vec::new();
        }

        match transition {
            Transition::Verified { user_id, session } => {
                self.user_id = Some(user_id);
                vec![SideEffect::PersistSession(session)]
            }
            Transition::Rejected => {
                self.user_id = None;
                vec![SideEffect::ClearSession, SideEffect::DefensiveSignOut]
            }
            Transition::SignedOut | Transition::LoggedOut => {
                self.user_id = None;
                vec![SideEffect::ClearSession]
            }
            Transition::NoSession => Vec::new(),
        }
    }
}

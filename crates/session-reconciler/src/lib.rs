//! Session reconciliation for the liftlog client.
//!
//! This crate provides:
//! - The [`IdentityProvider`] seam and its GoTrue implementation
//! - A rust-fsm identity machine ([`IdentityState`])
//! - The [`SessionReconciler`] task that turns untrusted provider events into
//!   a validated [`ReconciledIdentity`]
//! - View guards ([`protected_view`], [`public_only_view`])

mod error;
mod guard;
mod identity;
mod provider;
mod reconciler;
mod supabase;

#[cfg(test)]
mod tests;

pub use error::{AuthError, AuthResult};
pub use guard::{protected_view, public_only_view, GuardDecision, GuardRoutes};
pub use identity::{
    IdentityMachine, IdentityMachineInput, IdentityMachineState, IdentityState,
    ReconciledIdentity, SideEffect, Transition,
};
pub use liftlog_config::EventOrdering;
pub use provider::{
    AuthResponse, AuthUser, Credentials, IdentityProvider, Session, SessionEvent,
    SessionEventBus, SessionEventKind, SessionSubscription, SessionUpdate,
};
pub use reconciler::{IdentityCallback, ReconcilerHandle, SessionReconciler};
pub use supabase::{needs_refresh, RefreshConfig, SupabaseIdentityProvider};

//! Reconciler scenario tests against a scripted identity provider.
//!
//! - `harness.rs`    - ScriptedProvider fake and TestHarness wiring
//! - `lifecycle.rs`  - initialization, change notification, teardown
//! - `validation.rs` - re-validation of SignedIn / TokenRefreshed / InitialSession
//! - `logout.rs`     - explicit logout and provider sign-out events
//! - `ordering.rs`   - overlapping validations under each EventOrdering

pub(crate) mod harness;
mod validation;

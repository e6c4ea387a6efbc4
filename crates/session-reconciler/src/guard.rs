//! View guards derived from the reconciled identity.
//!
//! Guards are pure functions. Performing the redirect is up to the caller.

use crate::identity::ReconciledIdentity;
use liftlog_config::Config;

/// Where the guards send people.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardRoutes {
    /// Login entry point for unauthenticated visitors of protected views.
    pub login: String,
    /// Authenticated landing area for visitors of public-only views.
    pub home: String,
}

impl Default for GuardRoutes {
    fn default() -> Self {
        Self {
            login: liftlog_config::DEFAULT_LOGIN_ROUTE.to_string(),
            home: liftlog_config::DEFAULT_HOME_ROUTE.to_string(),
        }
    }
}

impl GuardRoutes {
    pub fn from_config(config: &Config) -> Self {
        Self {
            login: config.login_route.clone(),
            home: config.home_route.clone(),
        }
    }
}

/// What a view should do for the current identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Identity not known yet: render nothing and do not redirect.
    Suspend,
    /// Navigate to this route instead of rendering.
    Redirect(String),
    /// Render the view. Protected views always receive the user id.
    Render { user_id: Option<String> },
}

/// Guard for views that require a signed-in user.
pub fn protected_view(identity: &ReconciledIdentity, routes: &GuardRoutes) -> GuardDecision {
    if !identity.initialized {
        return GuardDecision::Suspend;
    }

    match (&identity.user_id, identity.authenticated) {
        (Some(user_id), true) => GuardDecision::Render {
            user_id: Some(user_id.clone()),
        },
        _ => GuardDecision::Redirect(routes.login.clone()),
    }
}

/// Guard for views only meant for signed-out visitors (login, signup).
pub fn public_only_view(identity: &ReconciledIdentity, routes: &GuardRoutes) -> GuardDecision {
    if !identity.initialized {
        return GuardDecision::Suspend;
    }

    if identity.authenticated {
        GuardDecision::Redirect(routes.home.clone())
    } else {
        GuardDecision::Render { user_id: None }
    }
}

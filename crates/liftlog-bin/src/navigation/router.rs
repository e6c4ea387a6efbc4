//! Route classification and guard-driven redirects.

use session_reconciler::{
    protected_view, public_only_view, GuardDecision, GuardRoutes, ReconciledIdentity,
};
use std::future::Future;
use tokio::sync::watch;
use tracing::{debug, info};

/// Routes only signed-out visitors see, besides the configured login route.
pub const PUBLIC_ONLY_ROUTES: &[&str] = &["/signup"];

/// Which guard a route sits behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    PublicOnly,
    Protected,
}

/// Classify `route`. Anything that is not a login/signup view is protected.
pub fn route_access(route: &str, routes: &GuardRoutes) -> RouteAccess {
    let path = route.split(['?', '#']).next().unwrap_or(route);
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    if path == routes.login || PUBLIC_ONLY_ROUTES.contains(&path) {
        RouteAccess::PublicOnly
    } else {
        RouteAccess::Protected
    }
}

/// Evaluate the guard for `route`.
pub fn decide(route: &str, identity: &ReconciledIdentity, routes: &GuardRoutes) -> GuardDecision {
    match route_access(route, routes) {
        RouteAccess::PublicOnly => public_only_view(identity, routes),
        RouteAccess::Protected => protected_view(identity, routes),
    }
}

/// Performs navigation on behalf of the guards.
pub trait Navigator: Send {
    fn navigate(&mut self, route: &str);
}

/// Prints each navigation to stdout.
pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&mut self, route: &str) {
        println!("  -> {}", route);
    }
}

/// Tracks the current route and follows guard redirects.
pub struct Router<N> {
    current: String,
    routes: GuardRoutes,
    navigator: N,
}

impl<N: Navigator> Router<N> {
    pub fn new(start: impl Into<String>, routes: GuardRoutes, navigator: N) -> Self {
        Self {
            current: start.into(),
            routes,
            navigator,
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Re-run the guard for the current route against `identity`, following
    /// at most one redirect per guard class.
    pub fn on_identity(&mut self, identity: &ReconciledIdentity) -> GuardDecision {
        let mut decision = decide(&self.current, identity, &self.routes);

        for _ in 0..2 {
            let GuardDecision::Redirect(target) = &decision else {
                break;
            };
            if *target == self.current {
                break;
            }
            info!(from = %self.current, to = %target, "Guard redirect");
            self.current = target.clone();
            self.navigator.navigate(target);
            decision = decide(&self.current, identity, &self.routes);
        }

        decision
    }
}

/// Apply every identity change to `router` until `stop` resolves or the
/// reconciler goes away. `on_decision` sees the decision after each change.
pub async fn follow<N: Navigator>(
    router: &mut Router<N>,
    mut identity: watch::Receiver<ReconciledIdentity>,
    stop: impl Future<Output = ()>,
    mut on_decision: impl FnMut(&ReconciledIdentity, &GuardDecision),
) {
    tokio::pin!(stop);

    loop {
        let current = identity.borrow_and_update().clone();
        let decision = router.on_identity(&current);
        on_decision(&current, &decision);

        tokio::select! {
            changed = identity.changed() => {
                if changed.is_err() {
                    debug!("Reconciler stopped, no more redirects");
                    return;
                }
            }
            _ = &mut stop => return,
        }
    }
}

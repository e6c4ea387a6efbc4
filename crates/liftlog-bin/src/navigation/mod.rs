//! Guarded navigation commands.

mod router;

use router::{follow, ConsoleNavigator, Router};

use crate::app::AppContext;
use session_reconciler::GuardDecision;
use std::time::Duration;
use tracing::warn;

/// Resolve `route` once the identity is known and print where it ends up.
pub async fn open(ctx: &AppContext, route: &str, timeout: Duration) -> anyhow::Result<()> {
    let identity = match tokio::time::timeout(timeout, ctx.reconciler.wait_until_initialized()).await
    {
        Ok(identity) => identity?,
        Err(_) => {
            warn!(route = %route, "Identity not initialized in time, view stays suspended");
            println!("{}: waiting for session (timed out)", route);
            return Ok(());
        }
    };

    let mut router = Router::new(route, ctx.routes.clone(), ConsoleNavigator);
    let decision = router.on_identity(&identity);
    print_decision(router.current(), &decision);
    Ok(())
}

/// Follow identity changes from `start` until Ctrl-C.
pub async fn watch(ctx: &AppContext, start: String) -> anyhow::Result<()> {
    println!("Watching {} (Ctrl-C to stop)", start);
    let mut router = Router::new(start, ctx.routes.clone(), ConsoleNavigator);
    let stop = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let mut last = None;
    follow(&mut router, ctx.reconciler.subscribe(), stop, |identity, decision| {
        if last.as_ref() == Some(identity) {
            return;
        }
        last = Some(identity.clone());
        match (identity.initialized, identity.user_id.as_deref()) {
            (false, _) => println!("identity: pending"),
            (true, Some(user_id)) => println!("identity: signed in as {}", user_id),
            (true, None) => println!("identity: signed out"),
        }
        if let GuardDecision::Render { .. } = decision {
            println!("  rendering");
        }
    })
    .await;

    println!("Stopped at {}", router.current());
    Ok(())
}

fn print_decision(route: &str, decision: &GuardDecision) {
    println!("{}", describe_decision(route, decision));
}

/// One-line summary of where `route` ended up.
///
/// A `Redirect` only survives [`Router::on_identity`] when it pointed back at
/// the current route or chained past the follow limit.
fn describe_decision(route: &str, decision: &GuardDecision) -> String {
    match decision {
        GuardDecision::Suspend => format!("{}: waiting for session", route),
        GuardDecision::Redirect(target) => format!("{}: redirect to {} (not followed)", route, target),
        GuardDecision::Render {
            user_id: Some(user_id),
        } => format!("{}: render for {}", route, user_id),
        GuardDecision::Render { user_id: None } => format!("{}: render", route),
    }
}

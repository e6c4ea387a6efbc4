//! Logout command.

use crate::app::AppContext;
use session_reconciler::{protected_view, GuardDecision};

/// Sign out. Local state is cleared even if the provider cannot be reached.
pub async fn logout(ctx: &AppContext) -> anyhow::Result<()> {
    ctx.reconciler.logout().await;
    println!("Signed out");

    if let GuardDecision::Redirect(route) = protected_view(&ctx.reconciler.snapshot(), &ctx.routes)
    {
        println!("  -> {}", route);
    }
    Ok(())
}

//! Status command.

use crate::app::AppContext;
use std::time::Duration;

/// Print the reconciled identity once the first provider event is processed.
pub async fn status(ctx: &AppContext, timeout: Duration, json: bool) -> anyhow::Result<()> {
    let identity = match tokio::time::timeout(timeout, ctx.reconciler.wait_until_initialized()).await
    {
        Ok(identity) => identity?,
        Err(_) => anyhow::bail!(
            "Session status unknown: identity provider did not answer within {}s",
            timeout.as_secs()
        ),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&identity)?);
        return Ok(());
    }

    match identity.user_id.as_deref() {
        Some(user_id) if identity.authenticated => {
            println!("Signed in");
            println!("  User:     {}", user_id);
        }
        _ => println!("Signed out"),
    }
    println!("  Ordering: {:?}", ctx.config.event_ordering);
    println!("  Storage:  {}", ctx.paths.storage_file().display());

    Ok(())
}

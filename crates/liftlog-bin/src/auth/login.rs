//! Login and signup submission.

use super::form::{AuthForm, FormMode};
use crate::app::AppContext;
use session_reconciler::{
    public_only_view, AuthError, AuthResult, GuardDecision, GuardRoutes, IdentityProvider,
    ReconcilerHandle, SessionEventKind, SessionSubscription,
};
use std::time::Duration;
use tracing::{info, warn};

/// What happened to a submitted form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The public-only guard bounced the form; someone is already signed in.
    AlreadySignedIn { user_id: String, redirect: String },
    /// Provider accepted the credentials and the reconciler confirmed the user.
    SignedIn { user_id: String, redirect: String },
    /// Signup accepted, but no session until the email is confirmed.
    AwaitingConfirmation,
}

/// Submit the login or signup form and report the outcome.
pub async fn submit(
    ctx: &AppContext,
    form: AuthForm,
    mode: FormMode,
    timeout: Duration,
) -> anyhow::Result<()> {
    let outcome = submit_form(
        ctx.provider.as_ref(),
        &ctx.reconciler,
        &ctx.routes,
        &form,
        mode,
        timeout,
    )
    .await;

    match outcome {
        Ok(SubmitOutcome::AlreadySignedIn { user_id, redirect }) => {
            println!("Already signed in as {}", user_id);
            println!("  -> {}", redirect);
        }
        Ok(SubmitOutcome::SignedIn { user_id, redirect }) => {
            match mode {
                FormMode::Login => println!("Signed in as {}", user_id),
                FormMode::Signup => println!("Account created, signed in as {}", user_id),
            }
            println!("  -> {}", redirect);
        }
        Ok(SubmitOutcome::AwaitingConfirmation) => {
            println!("Account created. Check your email to confirm it, then log in.");
        }
        Err(e) => {
            warn!(mode = ?mode, error = %e, "Auth form submission failed");
            anyhow::bail!("{}", e.user_message());
        }
    }

    Ok(())
}

/// Run the form against the provider, then wait for the reconciler to vouch
/// for the new session.
pub async fn submit_form(
    provider: &dyn IdentityProvider,
    reconciler: &ReconcilerHandle,
    routes: &GuardRoutes,
    form: &AuthForm,
    mode: FormMode,
    timeout: Duration,
) -> AuthResult<SubmitOutcome> {
    let current = tokio::time::timeout(timeout, reconciler.wait_until_initialized())
        .await
        .map_err(|_| AuthError::Timeout)??;
    if let GuardDecision::Redirect(redirect) = public_only_view(&current, routes) {
        return Ok(SubmitOutcome::AlreadySignedIn {
            user_id: current.user_id.unwrap_or_default(),
            redirect,
        });
    }

    let credentials = form.validate(mode)?;

    // Subscribe before submitting so a rejection's SignedOut is not missed.
    let mut events = provider.subscribe();
    let response = match mode {
        FormMode::Login => provider.sign_in_with_password(&credentials).await?,
        FormMode::Signup => provider.sign_up(&credentials).await?,
    };

    if response.session.is_none() {
        info!(mode = ?mode, "Signup pending email confirmation");
        return Ok(SubmitOutcome::AwaitingConfirmation);
    }

    let user_id = tokio::time::timeout(timeout, confirmed_user(reconciler, &mut events))
        .await
        .map_err(|_| AuthError::Timeout)??;

    Ok(SubmitOutcome::SignedIn {
        user_id,
        redirect: routes.home.clone(),
    })
}

async fn confirmed_user(
    reconciler: &ReconcilerHandle,
    events: &mut SessionSubscription,
) -> AuthResult<String> {
    let mut identity = reconciler.subscribe();

    let verified = async {
        let ready = identity
            .wait_for(|identity| identity.authenticated)
            .await
            .map_err(|_| AuthError::ReconcilerStopped)?;
        Ok::<_, AuthError>(ready.user_id.clone().unwrap_or_default())
    };

    let rejected = async {
        while let Some(event) = events.next().await {
            if event.kind == SessionEventKind::SignedOut {
                return;
            }
        }
        std::future::pending::<()>().await
    };

    tokio::select! {
        user_id = verified => user_id,
        _ = rejected => Err(AuthError::SessionInvalid(
            "new session was rejected on validation".to_string(),
        )),
    }
}

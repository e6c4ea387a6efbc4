//! Composition root: storage, provider, and reconciler for one CLI run.

use liftlog_config::{Config, Paths};
use session_reconciler::{
    GuardRoutes, IdentityProvider, ReconcilerHandle, Session, SessionReconciler,
    SupabaseIdentityProvider,
};
use session_storage::{FileStorage, SecureStorage, SessionMirror};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything a command needs, owned for the lifetime of the process.
pub struct AppContext {
    pub config: Config,
    pub paths: Paths,
    pub routes: GuardRoutes,
    pub provider: Arc<dyn IdentityProvider>,
    pub reconciler: ReconcilerHandle,
    auto_refresh: JoinHandle<()>,
}

impl AppContext {
    /// Restore the mirrored session into the provider, then start the reconciler.
    pub async fn start(config: Config, paths: Paths) -> anyhow::Result<Self> {
        let storage: Arc<dyn SecureStorage> = Arc::new(FileStorage::new(paths.storage_file()));
        let mirror = SessionMirror::new(storage);

        let provider = Arc::new(SupabaseIdentityProvider::new(
            &config.supabase_url,
            &config.supabase_publishable_key,
        )?);
        restore_from_mirror(&provider, &mirror).await;

        let auto_refresh =
            provider.spawn_auto_refresh(Duration::from_secs(config.refresh_margin_secs));

        let reconciler = SessionReconciler::new(provider.clone(), mirror)
            .ordering(config.event_ordering)
            .spawn();

        info!(
            base_dir = %paths.base_dir().display(),
            supabase_url = %config.supabase_url,
            "Liftlog client started"
        );

        Ok(Self {
            routes: GuardRoutes::from_config(&config),
            config,
            paths,
            provider,
            reconciler,
            auto_refresh,
        })
    }

    /// Stop background work and release the provider subscription.
    pub async fn shutdown(self) {
        self.auto_refresh.abort();
        self.reconciler.shutdown().await;
        debug!("Liftlog client stopped");
    }
}

/// Seed the provider from the session mirror. The mirror is a cache, so any
/// problem with it just means starting signed out.
async fn restore_from_mirror(provider: &SupabaseIdentityProvider, mirror: &SessionMirror) {
    let raw = match mirror.load() {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("No mirrored session");
            return;
        }
        Err(e) => {
            warn!(error = %e, "Could not read session mirror");
            return;
        }
    };

    match Session::from_raw(&raw) {
        Ok(session) => provider.restore_session(session).await,
        Err(e) => {
            warn!(error = %e, "Discarding unreadable mirrored session");
            if let Err(e) = mirror.clear() {
                warn!(error = %e, "Failed to remove unreadable mirrored session");
            }
        }
    }
}

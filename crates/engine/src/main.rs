//! `deskd` — the Deskline synchronization daemon.
//!
//! Resolves a tenant (slug, magic link, or remembered profile), starts
//! the engine against it, and logs notifications until shut down. With
//! no tenant at all it runs the seeded demo session.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use deskline_engine::config::EngineConfig;
use deskline_engine::engine::{DEMO_ADMIN_EMAIL, DEMO_ADMIN_PASSWORD};
use deskline_engine::{
    parse_magic_link, NotificationRouter, SessionBinder, SyncEngine, TenantPersistence,
    TenantProfile, TenantRegistry, TenantState,
};
use deskline_identity::{IdentityProvider, MemoryIdentity};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("deskline=info,deskd=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env();
    let engine = Arc::new(SyncEngine::new());
    let identity: Arc<dyn IdentityProvider> = Arc::new(MemoryIdentity::new());

    let binder = SessionBinder::new(Arc::clone(&engine), Arc::clone(&identity));
    Arc::clone(&binder).run();

    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::unbounded_channel();
    NotificationRouter::new().run(engine.events(), notify_tx);
    tokio::spawn(async move {
        while let Some(notification) = notify_rx.recv().await {
            tracing::info!(
                kind = notification.kind.name(),
                entity = %notification.entity_id,
                "{}",
                notification.message
            );
        }
    });

    let persistence = TenantPersistence::new(config.tenant_file());
    let state = match resolve_tenant(&config, &persistence)? {
        Some(profile) => {
            tracing::info!(slug = %profile.slug, endpoint = %profile.endpoint, "Connecting to tenant");
            match engine.start(profile.clone()).await {
                Ok(()) => TenantState::Ready(profile),
                Err(error) => {
                    tracing::error!(%error, "Tenant store unreachable");
                    TenantState::Unreachable(profile)
                }
            }
        }
        None => TenantState::None,
    };

    match state {
        TenantState::Ready(profile) => {
            if let Err(error) = persistence.remember(&profile) {
                tracing::warn!(%error, "Cannot remember tenant choice");
            }
        }
        TenantState::Unreachable(profile) => {
            // The profile stays remembered so the next run retries it.
            anyhow::bail!("cannot reach tenant store at {}", profile.endpoint);
        }
        TenantState::None => {
            tracing::warn!("No tenant configured; running the demo session");
            engine.enable_demo_mode().await;
            if let Err(error) = identity
                .create_identity(DEMO_ADMIN_EMAIL, DEMO_ADMIN_PASSWORD)
                .await
            {
                tracing::warn!(%error, "Cannot register demo identity");
            }
        }
    }

    shutdown_signal().await;
    tracing::info!("Shutting down");
    engine.stop().await;
    Ok(())
}

/// Pick the tenant profile for this run: forced demo beats everything,
/// then a magic link, then a registry slug, then the remembered choice.
fn resolve_tenant(
    config: &EngineConfig,
    persistence: &TenantPersistence,
) -> anyhow::Result<Option<TenantProfile>> {
    if config.force_demo {
        return Ok(None);
    }
    if let Some(token) = &config.magic_link {
        let profile = parse_magic_link(token).context("invalid magic link")?;
        return Ok(Some(profile));
    }
    if let Some(slug) = &config.tenant_slug {
        let registry = TenantRegistry::load(&config.registry_path)
            .with_context(|| format!("cannot load registry {}", config.registry_path.display()))?;
        let profile = registry
            .lookup(slug)
            .with_context(|| format!("tenant '{slug}' is not in the registry"))?;
        return Ok(Some(profile));
    }
    Ok(persistence.recall())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

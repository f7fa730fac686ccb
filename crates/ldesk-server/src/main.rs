mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use ldesk_db::{PgStore, Store};
use ldesk_provider::{HttpProvider, TemplateSuggester};
use ldesk_reviews::{BulkCoordinator, LifecycleEngine, PaginationEngine};
use ldesk_sync::{SyncOrchestrator, SyncSettings};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(ldesk_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::debug!(?config, "configuration loaded");

    let pool_config = ldesk_db::PoolConfig::from_app_config(&config);
    let pool = ldesk_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = ldesk_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
    let provider = Arc::new(HttpProvider::new(
        &config.provider_base_url,
        config.provider_access_token.clone(),
        config.provider_timeout_secs,
        config.completeness_weights,
    )?);

    let lifecycle = Arc::new(LifecycleEngine::new(
        Arc::clone(&store),
        provider.clone(),
        Arc::new(TemplateSuggester),
        config.reply_max_chars,
        Duration::from_secs(config.provider_timeout_secs),
    ));
    let sync = SyncOrchestrator::new(
        Arc::clone(&lifecycle),
        provider.clone(),
        provider,
        SyncSettings::from_app_config(&config),
    );

    let mut scheduler = scheduler::build_scheduler(sync.clone(), &config.sync_cron).await?;

    let auth = AuthState::from_keys(
        &config.api_keys,
        matches!(config.env, ldesk_core::Environment::Development),
    )?;
    let state = AppState {
        pages: PaginationEngine::new(Arc::clone(&store), config.page_size),
        bulk: Arc::new(BulkCoordinator::new(
            Arc::clone(&lifecycle),
            config.bulk_max_concurrent,
        )),
        sync: sync.clone(),
        lifecycle,
        store,
        pool: Some(pool),
    };
    let app = build_app(state, auth, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sync.shutdown();
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = ?e, "scheduler did not shut down cleanly");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}

//! The review and sync engines wired over one store and provider.

use std::sync::Arc;
use std::time::Duration;

use ldesk_core::AppConfig;
use ldesk_db::{PgStore, Store};
use ldesk_provider::{DirectoryClient, HttpProvider, ReplySubmitter, ReviewSource, TemplateSuggester};
use ldesk_reviews::{LifecycleEngine, PaginationEngine};
use ldesk_sync::{SyncOrchestrator, SyncSettings};
use sqlx::PgPool;

pub(crate) struct Services {
    pub lifecycle: Arc<LifecycleEngine>,
    pub pages: PaginationEngine,
    pub sync: SyncOrchestrator,
}

impl Services {
    pub(crate) fn new<P>(store: Arc<dyn Store>, provider: Arc<P>, config: &AppConfig) -> Self
    where
        P: DirectoryClient + ReviewSource + ReplySubmitter + 'static,
    {
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
            SyncSettings::from_app_config(config),
        );
        Self {
            pages: PaginationEngine::new(store, config.page_size),
            lifecycle,
            sync,
        }
    }

    /// Postgres store plus the HTTP provider from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider client cannot be built.
    pub(crate) fn connect(pool: PgPool, config: &AppConfig) -> anyhow::Result<Self> {
        let provider = Arc::new(HttpProvider::new(
            &config.provider_base_url,
            config.provider_access_token.clone(),
            config.provider_timeout_secs,
            config.completeness_weights,
        )?);
        Ok(Self::new(Arc::new(PgStore::new(pool)), provider, config))
    }
}

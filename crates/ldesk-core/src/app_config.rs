use std::net::SocketAddr;

use crate::completeness::CompletenessWeights;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub provider_base_url: String,
    pub provider_access_token: Option<String>,
    pub provider_timeout_secs: u64,
    pub sync_max_retries: u32,
    pub sync_backoff_base_ms: u64,
    pub sync_backoff_max_ms: u64,
    pub sync_max_concurrent: usize,
    pub sync_cron: String,
    pub bulk_max_concurrent: usize,
    pub page_size: usize,
    pub reply_max_chars: usize,
    pub completeness_weights: CompletenessWeights,
    /// Bearer tokens accepted by the HTTP API.
    pub api_keys: Vec<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("provider_base_url", &self.provider_base_url)
            .field(
                "provider_access_token",
                &self.provider_access_token.as_ref().map(|_| "[redacted]"),
            )
            .field("provider_timeout_secs", &self.provider_timeout_secs)
            .field("sync_max_retries", &self.sync_max_retries)
            .field("sync_backoff_base_ms", &self.sync_backoff_base_ms)
            .field("sync_backoff_max_ms", &self.sync_backoff_max_ms)
            .field("sync_max_concurrent", &self.sync_max_concurrent)
            .field("sync_cron", &self.sync_cron)
            .field("bulk_max_concurrent", &self.bulk_max_concurrent)
            .field("page_size", &self.page_size)
            .field("reply_max_chars", &self.reply_max_chars)
            .field("completeness_weights", &self.completeness_weights)
            .field("api_keys", &format_args!("[{} redacted]", self.api_keys.len()))
            .finish()
    }
}

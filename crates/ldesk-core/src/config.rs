use crate::app_config::{AppConfig, Environment};
use crate::completeness::CompletenessWeights;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Parses a numeric env var, falling back to `default` when unset.
fn parse_num<T, F>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    match lookup(var) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("LDESK_ENV", "development"))?;

    let bind_raw = or_default("LDESK_BIND_ADDR", "0.0.0.0:3000");
    let bind_addr = bind_raw
        .parse::<SocketAddr>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: "LDESK_BIND_ADDR".to_string(),
            reason: e.to_string(),
        })?;
    let log_level = or_default("LDESK_LOG_LEVEL", "info");

    let db_max_connections = parse_num(&lookup, "LDESK_DB_MAX_CONNECTIONS", 10u32)?;
    let db_min_connections = parse_num(&lookup, "LDESK_DB_MIN_CONNECTIONS", 1u32)?;
    let db_acquire_timeout_secs = parse_num(&lookup, "LDESK_DB_ACQUIRE_TIMEOUT_SECS", 10u64)?;

    let provider_base_url = or_default(
        "LDESK_PROVIDER_BASE_URL",
        "https://mybusiness.googleapis.com/v4/",
    );
    let provider_access_token = lookup("LDESK_PROVIDER_ACCESS_TOKEN")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let provider_timeout_secs = parse_num(&lookup, "LDESK_PROVIDER_TIMEOUT_SECS", 30u64)?;

    let sync_max_retries = parse_num(&lookup, "LDESK_SYNC_MAX_RETRIES", 3u32)?;
    let sync_backoff_base_ms = parse_num(&lookup, "LDESK_SYNC_BACKOFF_BASE_MS", 500u64)?;
    let sync_backoff_max_ms = parse_num(&lookup, "LDESK_SYNC_BACKOFF_MAX_MS", 60_000u64)?;
    let sync_max_concurrent = positive(
        "LDESK_SYNC_MAX_CONCURRENT",
        parse_num(&lookup, "LDESK_SYNC_MAX_CONCURRENT", 4usize)?,
    )?;
    let sync_cron = or_default("LDESK_SYNC_CRON", "0 0 */6 * * *");
    let bulk_max_concurrent = positive(
        "LDESK_BULK_MAX_CONCURRENT",
        parse_num(&lookup, "LDESK_BULK_MAX_CONCURRENT", 5usize)?,
    )?;
    let page_size = positive(
        "LDESK_PAGE_SIZE",
        parse_num(&lookup, "LDESK_PAGE_SIZE", 25usize)?,
    )?;
    let reply_max_chars = positive(
        "LDESK_REPLY_MAX_CHARS",
        parse_num(&lookup, "LDESK_REPLY_MAX_CHARS", 4096usize)?,
    )?;

    let completeness_weights = build_weights(&lookup)?;
    let api_keys = lookup("LDESK_API_KEYS")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default();

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        provider_base_url,
        provider_access_token,
        provider_timeout_secs,
        sync_max_retries,
        sync_backoff_base_ms,
        sync_backoff_max_ms,
        sync_max_concurrent,
        sync_cron,
        bulk_max_concurrent,
        page_size,
        reply_max_chars,
        completeness_weights,
        api_keys,
    })
}

fn build_weights<F>(lookup: &F) -> Result<CompletenessWeights, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let d = CompletenessWeights::default();
    let weights = CompletenessWeights {
        name: parse_num(lookup, "LDESK_WEIGHT_NAME", d.name)?,
        description: parse_num(lookup, "LDESK_WEIGHT_DESCRIPTION", d.description)?,
        regular_hours: parse_num(lookup, "LDESK_WEIGHT_REGULAR_HOURS", d.regular_hours)?,
        service_item: parse_num(lookup, "LDESK_WEIGHT_SERVICE_ITEM", d.service_item)?,
        service_item_cap: parse_num(lookup, "LDESK_WEIGHT_SERVICE_ITEM_CAP", d.service_item_cap)?,
        coordinates: parse_num(lookup, "LDESK_WEIGHT_COORDINATES", d.coordinates)?,
        category: parse_num(lookup, "LDESK_WEIGHT_CATEGORY", d.category)?,
        phone: parse_num(lookup, "LDESK_WEIGHT_PHONE", d.phone)?,
        website: parse_num(lookup, "LDESK_WEIGHT_WEBSITE", d.website)?,
        address: parse_num(lookup, "LDESK_WEIGHT_ADDRESS", d.address)?,
        verified: parse_num(lookup, "LDESK_WEIGHT_VERIFIED", d.verified)?,
    };
    weights
        .validate()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: "LDESK_WEIGHT_*".to_string(),
            reason: e.to_string(),
        })?;
    Ok(weights)
}

fn positive(var: &str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for anything other than
/// `development`, `test` or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "LDESK_ENV".to_string(),
            reason: format!("expected development, test or production, got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

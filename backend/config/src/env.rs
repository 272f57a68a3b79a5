//! Environment overrides for config values.
//!
//! Recognised variables: `LMC_API_HOST`, `LMC_LOG_LEVEL`, `LMC_WORKERS`,
//! `LMC_MAX_TRIES`. Unparseable numbers are ignored with a warning.

use std::collections::HashMap;
use std::str::FromStr;

use tracing::warn;

use crate::schema::{ApiConfig, DeliveryConfig, LmcConfig, LoggingConfig};

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: LmcConfig) -> LmcConfig {
    apply_env_overrides_with(config, &std::env::vars().collect())
}

/// Apply overrides from a provided map (useful for testing).
pub fn apply_env_overrides_with(mut config: LmcConfig, env: &HashMap<String, String>) -> LmcConfig {
    if let Some(host) = non_empty(env, "LMC_API_HOST") {
        config.api.get_or_insert_with(ApiConfig::default).host = Some(host.to_string());
    }
    if let Some(level) = non_empty(env, "LMC_LOG_LEVEL") {
        config.logging.get_or_insert_with(LoggingConfig::default).level = Some(level.to_string());
    }
    if let Some(workers) = parsed::<usize>(env, "LMC_WORKERS") {
        config.delivery.get_or_insert_with(DeliveryConfig::default).workers = Some(workers);
    }
    if let Some(tries) = parsed::<u32>(env, "LMC_MAX_TRIES") {
        config.delivery.get_or_insert_with(DeliveryConfig::default).max_tries = Some(tries);
    }
    config
}

fn non_empty<'a>(env: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(env: &HashMap<String, String>, key: &str) -> Option<T> {
    let raw = non_empty(env, key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = key, value = raw, "Ignoring unparseable env override");
            None
        }
    }
}

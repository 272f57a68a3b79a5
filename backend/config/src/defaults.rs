//! Config defaults: applies sensible default values to parsed config.

use crate::schema::{
    ApiConfig, DeliveryConfig, FilesConfig, LmcConfig, LoggingConfig, MonitorConfig,
};

pub const DEFAULT_API_HOST: &str = "http://localhost:8080/api/";
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_AUTH_TOKEN_FILENAME: &str = "auth.token";
pub const DEFAULT_CREDENTIALS_FILENAME: &str = "credentials";
pub const DEFAULT_JOBS_DB_FILENAME: &str = "jobs.db";
pub const DEFAULT_LOG_DIR: &str = "logs";

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Concurrent delivery workers.
pub const DEFAULT_WORKERS: usize = 2;

/// Attempts per job before the pool gives up.
pub const DEFAULT_MAX_TRIES: u32 = 3;

pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// First wait between reachability probes.
pub const DEFAULT_PROBE_INITIAL_SECS: u64 = 15;

/// Cap on the doubling probe backoff.
pub const DEFAULT_PROBE_MAX_SECS: u64 = 900;

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: LmcConfig) -> LmcConfig {
    let config = apply_api_defaults(config);
    let config = apply_file_defaults(config);
    let config = apply_logging_defaults(config);
    let config = apply_delivery_defaults(config);
    apply_monitor_defaults(config)
}

fn apply_api_defaults(mut config: LmcConfig) -> LmcConfig {
    let api = config.api.get_or_insert_with(ApiConfig::default);
    if api.host.is_none() {
        api.host = Some(DEFAULT_API_HOST.to_string());
    }
    if api.timeout_secs.is_none() {
        api.timeout_secs = Some(DEFAULT_API_TIMEOUT_SECS);
    }
    config
}

fn apply_file_defaults(mut config: LmcConfig) -> LmcConfig {
    let files = config.files.get_or_insert_with(FilesConfig::default);
    files
        .auth_token
        .get_or_insert_with(|| DEFAULT_AUTH_TOKEN_FILENAME.to_string());
    files
        .credentials
        .get_or_insert_with(|| DEFAULT_CREDENTIALS_FILENAME.to_string());
    files
        .jobs_db
        .get_or_insert_with(|| DEFAULT_JOBS_DB_FILENAME.to_string());
    files.log_dir.get_or_insert_with(|| DEFAULT_LOG_DIR.to_string());
    config
}

fn apply_logging_defaults(mut config: LmcConfig) -> LmcConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    if logging.level.is_none() {
        logging.level = Some(DEFAULT_LOG_LEVEL.to_string());
    }
    config
}

/// Ensure worker count and retry limits are set.
fn apply_delivery_defaults(mut config: LmcConfig) -> LmcConfig {
    let delivery = config.delivery.get_or_insert_with(DeliveryConfig::default);
    delivery.workers.get_or_insert(DEFAULT_WORKERS);
    delivery.max_tries.get_or_insert(DEFAULT_MAX_TRIES);
    delivery
        .retry_base_delay_ms
        .get_or_insert(DEFAULT_RETRY_BASE_DELAY_MS);
    delivery.channel_capacity.get_or_insert(DEFAULT_CHANNEL_CAPACITY);
    config
}

fn apply_monitor_defaults(mut config: LmcConfig) -> LmcConfig {
    let monitor = config.monitor.get_or_insert_with(MonitorConfig::default);
    monitor.probe_initial_secs.get_or_insert(DEFAULT_PROBE_INITIAL_SECS);
    monitor.probe_max_secs.get_or_insert(DEFAULT_PROBE_MAX_SECS);
    config
}

//! Links manager client configuration schema.
//!
//! Every section is optional in the YAML file; `apply_all_defaults` fills the
//! gaps and the accessor methods fall back to the same defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::defaults::*;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LmcConfig {
    /// Remote links service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiConfig>,

    /// File names inside the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<FilesConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    /// Worker pool and retry settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryConfig>,

    /// Connection monitor backoff
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// Base URL, with trailing slash (e.g. `http://localhost:8080/api/`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs_db: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_base_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_initial_secs: Option<u64>,
    /// Upper bound for the doubling backoff; 0 disables the cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_max_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

impl LmcConfig {
    pub fn api_host(&self) -> String {
        self.api
            .as_ref()
            .and_then(|a| a.host.clone())
            .unwrap_or_else(|| DEFAULT_API_HOST.to_string())
    }

    pub fn api_timeout(&self) -> Duration {
        let secs = self
            .api
            .as_ref()
            .and_then(|a| a.timeout_secs)
            .unwrap_or(DEFAULT_API_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    pub fn auth_token_filename(&self) -> String {
        self.files
            .as_ref()
            .and_then(|f| f.auth_token.clone())
            .unwrap_or_else(|| DEFAULT_AUTH_TOKEN_FILENAME.to_string())
    }

    pub fn credentials_filename(&self) -> String {
        self.files
            .as_ref()
            .and_then(|f| f.credentials.clone())
            .unwrap_or_else(|| DEFAULT_CREDENTIALS_FILENAME.to_string())
    }

    pub fn jobs_db_filename(&self) -> String {
        self.files
            .as_ref()
            .and_then(|f| f.jobs_db.clone())
            .unwrap_or_else(|| DEFAULT_JOBS_DB_FILENAME.to_string())
    }

    pub fn log_dirname(&self) -> String {
        self.files
            .as_ref()
            .and_then(|f| f.log_dir.clone())
            .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())
    }

    pub fn log_level(&self) -> String {
        self.logging
            .as_ref()
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }

    pub fn delivery_workers(&self) -> usize {
        self.delivery
            .as_ref()
            .and_then(|d| d.workers)
            .unwrap_or(DEFAULT_WORKERS)
    }

    pub fn max_tries(&self) -> u32 {
        self.delivery
            .as_ref()
            .and_then(|d| d.max_tries)
            .unwrap_or(DEFAULT_MAX_TRIES)
    }

    pub fn retry_base_delay_ms(&self) -> u64 {
        self.delivery
            .as_ref()
            .and_then(|d| d.retry_base_delay_ms)
            .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS)
    }

    pub fn channel_capacity(&self) -> usize {
        self.delivery
            .as_ref()
            .and_then(|d| d.channel_capacity)
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn probe_initial(&self) -> Duration {
        let secs = self
            .monitor
            .as_ref()
            .and_then(|m| m.probe_initial_secs)
            .unwrap_or(DEFAULT_PROBE_INITIAL_SECS);
        Duration::from_secs(secs)
    }

    /// `None` means the backoff keeps doubling without a cap.
    pub fn probe_max(&self) -> Option<Duration> {
        let secs = self
            .monitor
            .as_ref()
            .and_then(|m| m.probe_max_secs)
            .unwrap_or(DEFAULT_PROBE_MAX_SECS);
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = "api:\n  host: http://links.example.com/api/\ndelivery:\n  workers: 4\n";
        let config: LmcConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.api_host(), "http://links.example.com/api/");
        assert_eq!(config.delivery_workers(), 4);
        assert_eq!(config.max_tries(), DEFAULT_MAX_TRIES);
    }

    #[test]
    fn test_camel_case_keys() {
        let yaml = "monitor:\n  probeInitialSecs: 5\n  probeMaxSecs: 0\n";
        let config: LmcConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.probe_initial(), Duration::from_secs(5));
        assert_eq!(config.probe_max(), None);
    }

    #[test]
    fn test_default_probe_is_capped() {
        let config = LmcConfig::default();
        assert_eq!(config.probe_initial(), Duration::from_secs(15));
        assert_eq!(config.probe_max(), Some(Duration::from_secs(DEFAULT_PROBE_MAX_SECS)));
    }
}

//! Config file loading and config-directory path resolution.

use crate::schema::LmcConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Resolve the client config directory.
/// Priority: `LMC_CONFIG_DIR` env > `~/.lmc/` > `./.lmc`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LMC_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".lmc");
    }
    PathBuf::from(".lmc")
}

/// Resolve the full path to the main config file.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Load and parse the config from disk.
///
/// Returns `Ok(Default::default())` if the file doesn't exist (first run).
pub async fn load_config(path: &Path) -> Result<LmcConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(LmcConfig::default());
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: LmcConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Absolute locations of every file the client keeps in its config directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub dir: PathBuf,
    pub auth_token: PathBuf,
    pub credentials: PathBuf,
    pub jobs_db: PathBuf,
    pub log_dir: PathBuf,
}

impl ConfigPaths {
    pub fn new(dir: impl Into<PathBuf>, config: &LmcConfig) -> Self {
        let dir = dir.into();
        Self {
            auth_token: dir.join(config.auth_token_filename()),
            credentials: dir.join(config.credentials_filename()),
            jobs_db: dir.join(config.jobs_db_filename()),
            log_dir: dir.join(config.log_dirname()),
            dir,
        }
    }
}

//! `lmc-config`: links manager client configuration.
//!
//! Provides:
//! - Typed config schema (remote API, local files, delivery, connection probing)
//! - YAML loading (a missing file means defaults)
//! - `LMC_*` environment overrides
//! - Default value application
//! - Validation with user-friendly messages

pub mod defaults;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{apply_env_overrides, apply_env_overrides_with};
pub use io::{config_dir, config_file_path, load_config, ConfigPaths};
pub use schema::LmcConfig;
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Result};
use std::path::Path;

/// Load, apply env overrides and defaults, and validate the config in `dir`.
///
/// This is the main entry point for loading a config at runtime. It runs
/// before logging is set up, so validation errors come back in the `Err` and
/// warnings are returned for [`log_warnings`].
pub async fn load_and_prepare(dir: &Path) -> Result<(LmcConfig, Vec<ConfigValidationError>)> {
    let config = load_config(&config_file_path(dir)).await?;
    let config = apply_env_overrides(config);
    let config = apply_all_defaults(config);
    let warnings = check(&config)?;
    Ok((config, warnings))
}

/// Validate `config`, failing on any error. Returns the warnings.
pub fn check(config: &LmcConfig) -> Result<Vec<ConfigValidationError>> {
    let report = validate(config);
    if !report.is_valid() {
        let errors: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
        bail!("{}", errors.join("; "));
    }
    Ok(report.warnings)
}

pub fn log_warnings(warnings: &[ConfigValidationError]) {
    for warning in warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
}

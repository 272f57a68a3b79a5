//! Config validation: checks with user-friendly error messages.

use crate::schema::LmcConfig;
use thiserror::Error;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &LmcConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_api(config, &mut report);
    validate_delivery(config, &mut report);
    validate_monitor(config, &mut report);
    report
}

fn validate_api(config: &LmcConfig, report: &mut ValidationReport) {
    let host = config.api_host();
    if host.trim().is_empty() {
        report.error("api.host", "API host cannot be empty");
        return;
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        report.error("api.host", format!("API host must be an http(s) URL, got '{host}'"));
    }
    if !host.ends_with('/') {
        report.warn("api.host", "API host has no trailing '/'; endpoint paths are appended directly");
    }
    if config.api_timeout().is_zero() {
        report.error("api.timeoutSecs", "Request timeout must be greater than zero");
    }
}

fn validate_delivery(config: &LmcConfig, report: &mut ValidationReport) {
    if config.delivery_workers() == 0 {
        report.error("delivery.workers", "At least one delivery worker is required");
    }
    if config.max_tries() == 0 {
        report.error("delivery.maxTries", "maxTries must be at least 1");
    }
    if config.channel_capacity() == 0 {
        report.error("delivery.channelCapacity", "Channel capacity must be greater than zero");
    }
}

fn validate_monitor(config: &LmcConfig, report: &mut ValidationReport) {
    let initial = config.probe_initial();
    if initial.is_zero() {
        report.error("monitor.probeInitialSecs", "Initial probe interval must be greater than zero");
    }
    match config.probe_max() {
        Some(max) if max < initial => report.error(
            "monitor.probeMaxSecs",
            "Probe backoff cap is below the initial interval",
        ),
        None => report.warn(
            "monitor.probeMaxSecs",
            "Probe backoff is uncapped; waits between probes grow without bound",
        ),
        _ => {}
    }
}

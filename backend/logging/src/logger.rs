//! Structured Logger
//!
//! Wraps `tracing` to provide JSON-formatted file output (daily rotated NDJSON)
//! and environment-based level control.

use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// File name prefix of the rolling log, e.g. `lmc.log.2026-10-19`.
pub const LOG_FILE_PREFIX: &str = "lmc.log";

/// Initialize the global structured logger.
///
/// The file layer is always on. The console layer writes to stderr and is only
/// enabled when `console` is set, so log lines never interleave with the
/// interactive prompt by default.
pub fn init_logger<P: AsRef<Path>>(log_dir: P, level: &str, console: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);

    let file_layer = fmt::layer()
        .json()
        .with_writer(file_appender)
        .with_ansi(false);

    let console_layer = console.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(true)
            .boxed()
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();
}

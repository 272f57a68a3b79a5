//! Structured logging for the links manager client.
//!
//! Sets up `tracing` output (NDJSON file plus optional console), scrubs tokens and
//! passwords from log text, and records job lifecycle events.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{EventLogger, JobEvent, JobEventEntry};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;

//! Job Event Logger
//!
//! Job lifecycle events (journaled, dispatched, delivered, failed, replayed)
//! written through `tracing` under the `lmc_jobs` target.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use lmc_core::{ConnectionState, FailureKind};

use crate::redact::redact_sensitive_data;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Journaled,
    Dispatched,
    Held { state: String },
    Delivered,
    Failed { kind: String, error: String },
    Replayed,
    Skipped { reason: String },
}

impl JobEvent {
    pub fn held(state: ConnectionState) -> Self {
        JobEvent::Held { state: state.to_string() }
    }

    pub fn failed(kind: FailureKind, error: &str) -> Self {
        JobEvent::Failed {
            kind: kind.to_string(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobEventEntry {
    pub job_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: JobEvent,
}

pub struct EventLogger;

impl EventLogger {
    /// Log one job lifecycle event. Error text is redacted before it is recorded.
    pub fn log_event(job_id: &str, mut event: JobEvent) {
        let is_failure = matches!(event, JobEvent::Failed { .. } | JobEvent::Skipped { .. });
        match &mut event {
            JobEvent::Failed { error, .. } => *error = redact_sensitive_data(error),
            JobEvent::Skipped { reason } => *reason = redact_sensitive_data(reason),
            _ => {}
        }

        let entry = JobEventEntry {
            job_id: job_id.into(),
            timestamp: Utc::now(),
            event,
        };

        if is_failure {
            warn!(target: "lmc_jobs", event = ?entry, "Job event");
        } else {
            info!(target: "lmc_jobs", event = ?entry, "Job event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let entry = JobEventEntry {
            job_id: "j1".into(),
            timestamp: Utc::now(),
            event: JobEvent::failed(FailureKind::Connectivity, "server error: status 503"),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event"]["type"], "failed");
        assert_eq!(json["event"]["kind"], "connectivity");
    }

    #[test]
    fn test_held_carries_state() {
        let json = serde_json::to_value(JobEvent::held(ConnectionState::Degraded)).unwrap();
        assert_eq!(json["state"], "degraded");
    }
}

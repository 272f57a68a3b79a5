use crate::error::{FailureKind, LmcError};

/// Terminal outcome of one delivery, as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure { kind: FailureKind, message: String },
}

/// Result reported for a job previously handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub job_id: String,
    pub outcome: Outcome,
}

impl JobResult {
    pub fn success(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            outcome: Outcome::Success,
        }
    }

    pub fn failure(job_id: impl Into<String>, error: &LmcError) -> Self {
        Self {
            job_id: job_id.into(),
            outcome: Outcome::Failure {
                kind: error.failure_kind(),
                message: error.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success)
    }

    pub fn is_connectivity_failure(&self) -> bool {
        matches!(
            self.outcome,
            Outcome::Failure { kind: FailureKind::Connectivity, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_result_carries_kind() {
        let result = JobResult::failure("j1", &LmcError::Server { status: 502 });
        assert!(!result.is_success());
        assert!(result.is_connectivity_failure());

        let result = JobResult::failure("j2", &LmcError::InvalidJob("no url".into()));
        assert!(!result.is_connectivity_failure());
    }
}

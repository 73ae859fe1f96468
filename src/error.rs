// ABOUTME: Error taxonomy for job submission, polling and pipelines
// ABOUTME: Variants are matched by the orchestrator to short-circuit stage chains

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// No HTTP response was obtained.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status or a body that could not be decoded.
    #[error("Protocol error: {message}")]
    Protocol { status: Option<u16>, message: String },

    /// The job reached a terminal failure, aborted or blocked state.
    #[error("Job {job_id} {state}: {message}")]
    JobFailed {
        job_id: String,
        state: String,
        message: String,
    },

    /// Content-level problems reported by a job that otherwise completed.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job {job_id} abandoned after waiting {waited:?}")]
    Abandoned { job_id: String, waited: Duration },

    #[error("Polling of job {0} was cancelled")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Local I/O error: {0}")]
    Io(String),
}

impl JobError {
    pub fn protocol(status: Option<u16>, message: impl Into<String>) -> Self {
        JobError::Protocol {
            status,
            message: message.into(),
        }
    }

    /// Short machine-friendly label used in stage records and logs.
    pub fn category(&self) -> &'static str {
        match self {
            JobError::Transport(_) => "transport",
            JobError::Protocol { .. } => "protocol",
            JobError::JobFailed { .. } => "job-failed",
            JobError::Validation(_) => "validation",
            JobError::Abandoned { .. } => "abandoned",
            JobError::Cancelled(_) => "cancelled",
            JobError::Config(_) => "config",
            JobError::Io(_) => "io",
        }
    }
}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        JobError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, JobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_job_context() {
        let err = JobError::JobFailed {
            job_id: "42".to_string(),
            state: "failed".to_string(),
            message: "site not found".to_string(),
        };
        assert_eq!(err.to_string(), "Job 42 failed: site not found");
        assert_eq!(err.category(), "job-failed");
    }

    #[test]
    fn test_protocol_constructor() {
        let err = JobError::protocol(Some(404), "Not Found");
        assert_eq!(err.to_string(), "Protocol error: Not Found");
        assert!(matches!(err, JobError::Protocol { status: Some(404), .. }));
    }
}

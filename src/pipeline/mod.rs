// ABOUTME: Orchestrates fixed sequences of dependent job lifecycles
// ABOUTME: A stage runs only after the previous one succeeded; results are typed, not exit-code side effects

pub mod connector;
pub mod export;
pub mod import;
pub mod jobs;
pub mod permissions;
pub mod translation;

use serde::Serialize;
use std::future::Future;
use tracing::{info, warn};

use crate::error::{JobError, Result};
use crate::remote::{Job, JobClient, Operation, Submission, ValidationReport};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Success,
    /// Soft failure: some work done or nothing needed doing.
    PartialFailure,
    Failure,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Failure => 1,
            Outcome::PartialFailure => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Succeeded,
    Failed(JobError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
}

#[derive(Debug, Clone)]
pub struct PipelineReport<T> {
    pub pipeline: &'static str,
    pub outcome: Outcome,
    pub detail: Option<String>,
    pub stages: Vec<StageRecord>,
    pub value: Option<T>,
    pub error: Option<JobError>,
}

impl<T> PipelineReport<T> {
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Values carried from earlier stages to later ones within one compound operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineContext {
    pub uploaded_file_id: Option<String>,
    pub source_job_id: Option<String>,
    pub connector_job_id: Option<String>,
    pub job_name: Option<String>,
    pub result_folder_id: Option<String>,
    /// Validation attached to a job that did not succeed.
    pub rejected_validation: Option<ValidationReport>,
}

impl PipelineContext {
    pub fn named(job_name: impl Into<String>) -> Self {
        Self {
            job_name: Some(job_name.into()),
            ..Self::default()
        }
    }
}

/// Records each stage of one pipeline run.
///
/// Stages are futures, so a stage after a failed one is never constructed when
/// the caller propagates with `?`.
pub struct StageRunner {
    pipeline: &'static str,
    stages: Vec<StageRecord>,
}

impl StageRunner {
    pub fn new(pipeline: &'static str) -> Self {
        Self {
            pipeline,
            stages: Vec::new(),
        }
    }

    pub async fn stage<T, F>(&mut self, name: &str, stage: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        info!(pipeline = self.pipeline, stage = name, "Stage started");
        let result = stage.await;
        let status = match &result {
            Ok(_) => StageStatus::Succeeded,
            Err(err) => {
                warn!(pipeline = self.pipeline, stage = name, error = %err, "Stage failed");
                StageStatus::Failed(err.clone())
            }
        };
        self.stages.push(StageRecord {
            name: name.to_string(),
            status,
        });
        result
    }

    pub fn finish<T>(self, result: Result<T>) -> PipelineReport<T> {
        match result {
            Ok(value) => self.finish_with(value, Outcome::Success, None),
            Err(err) => self.fail(err),
        }
    }

    pub fn finish_with<T>(
        self,
        value: T,
        outcome: Outcome,
        detail: Option<String>,
    ) -> PipelineReport<T> {
        PipelineReport {
            pipeline: self.pipeline,
            outcome,
            detail,
            stages: self.stages,
            value: Some(value),
            error: None,
        }
    }

    pub fn fail<T>(self, err: JobError) -> PipelineReport<T> {
        PipelineReport {
            pipeline: self.pipeline,
            outcome: Outcome::Failure,
            detail: Some(err.to_string()),
            stages: self.stages,
            value: None,
            error: Some(err),
        }
    }
}

/// Polls a submitted job and turns any non-success terminal into an error.
pub(crate) async fn poll_to_success<T: Transport>(
    client: &JobClient<T>,
    job: &mut Job,
) -> Result<Job> {
    let terminal = client.poll_until_complete(job).await?;
    terminal.into_result(job.clone())
}

/// Submits an operation that must hand back a job handle, then polls it to success.
pub(crate) async fn submit_and_wait<T: Transport>(
    client: &JobClient<T>,
    operation: &Operation,
) -> Result<Job> {
    match client.submit_job(operation).await? {
        Submission::Accepted(mut job) => poll_to_success(client, &mut job).await,
        Submission::Completed(_) => Err(JobError::protocol(
            Some(200),
            format!("{} returned no job handle", operation.kind()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn chain(runner: &mut StageRunner, c_calls: &AtomicUsize) -> Result<u32> {
        let a = runner.stage("a", async { Ok(1u32) }).await?;
        let b = runner
            .stage("b", async {
                Err::<u32, _>(JobError::protocol(Some(500), "stage b exploded"))
            })
            .await?;
        let c = runner
            .stage("c", async {
                c_calls.fetch_add(1, Ordering::SeqCst);
                Ok(3u32)
            })
            .await?;
        Ok(a + b + c)
    }

    #[tokio::test]
    async fn test_failed_stage_short_circuits_chain() {
        let c_calls = AtomicUsize::new(0);
        let mut runner = StageRunner::new("abc");
        let result = chain(&mut runner, &c_calls).await;
        let report = runner.finish(result);

        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.outcome, Outcome::Failure);
        assert_eq!(report.stage_names(), vec!["a", "b"]);
        assert_eq!(
            report.error,
            Some(JobError::protocol(Some(500), "stage b exploded"))
        );
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_all_stages_succeed() {
        let mut runner = StageRunner::new("ok");
        let a = runner.stage("a", async { Ok(2u32) }).await;
        let report = runner.finish(a);
        assert!(report.is_success());
        assert_eq!(report.value, Some(2));
        assert_eq!(report.stages[0].status, StageStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_submit_and_wait_requires_job_handle() {
        use crate::config::PollingConfig;
        use crate::session::Session;
        use crate::transport::testing::ScriptedTransport;
        use serde_json::json;
        use std::sync::Arc;

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, json!({ "id": "T9" }));
        let session = Session::new("https://h", "Bearer t").unwrap();
        let client = JobClient::new(transport.clone(), session, PollingConfig::default());
        let op = Operation::CreateTemplate {
            site_id: "S1".to_string(),
            name: "Spring".to_string(),
            include_unpublished_assets: false,
        };

        let err = submit_and_wait(&client, &op).await.unwrap_err();
        assert!(matches!(err, JobError::Protocol { status: Some(200), .. }));
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Outcome::Success.exit_code(), 0);
        assert_eq!(Outcome::PartialFailure.exit_code(), 2);
        assert_eq!(Outcome::Failure.exit_code(), 1);
    }
}

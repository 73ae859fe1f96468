// ABOUTME: Site and repository import against an uploaded archive
// ABOUTME: Failures carry rendered validation detail; success reports the final state apart from progress

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{JobError, Result};
use crate::remote::{
    extract_validation, reports, JobClient, Operation, Submission, ValidationReport,
};
use crate::transport::Transport;

use super::{Outcome, PipelineContext, PipelineReport, StageRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPolicy {
    /// Report validation problems but keep the import's own verdict.
    #[default]
    Report,
    /// Treat any validation error on a successful import as a failure.
    FailOnErrors,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub job_id: String,
    pub progress: String,
    /// Final import state such as `allCompleted`, distinct from `progress`.
    pub state: Option<String>,
    pub validation: ValidationReport,
    pub report_urls: Vec<String>,
}

/// `allCompleted` (or no state at all) is full success; any other state is partial.
fn outcome_for_state(state: Option<&str>) -> Outcome {
    match state {
        None => Outcome::Success,
        Some(s)
            if s.eq_ignore_ascii_case("allCompleted") || s.eq_ignore_ascii_case("completed") =>
        {
            Outcome::Success
        }
        Some(_) => Outcome::PartialFailure,
    }
}

pub async fn import<T: Transport>(
    client: &JobClient<T>,
    operation: &Operation,
    policy: ValidationPolicy,
    ctx: &mut PipelineContext,
) -> PipelineReport<ImportSummary> {
    let mut runner = StageRunner::new("import");
    match import_stages(client, operation, policy, ctx, &mut runner).await {
        Ok(summary) => {
            let outcome = outcome_for_state(summary.state.as_deref());
            let detail = summary
                .state
                .as_ref()
                .map(|state| format!("import finished with state {}", state));
            runner.finish_with(summary, outcome, detail)
        }
        Err(err) => {
            let mut report = runner.fail(err);
            if let Some(validation) = &ctx.rejected_validation {
                let mut lines = vec![report.detail.take().unwrap_or_default()];
                lines.extend(validation.render_lines());
                report.detail = Some(lines.join("\n"));
            }
            report
        }
    }
}

async fn import_stages<T: Transport>(
    client: &JobClient<T>,
    operation: &Operation,
    policy: ValidationPolicy,
    ctx: &mut PipelineContext,
    runner: &mut StageRunner,
) -> Result<ImportSummary> {
    let submission = runner.stage("submit import", client.submit_job(operation)).await?;
    let mut job = match submission {
        Submission::Accepted(job) => job,
        Submission::Completed(_) => {
            return Err(JobError::protocol(
                Some(200),
                "import endpoint returned no job handle",
            ))
        }
    };
    ctx.source_job_id = Some(job.id().to_string());
    ctx.rejected_validation = None;

    let rejected = &mut ctx.rejected_validation;
    let job = runner
        .stage("poll import", async {
            let terminal = client.poll_until_complete(&mut job).await?;
            if !terminal.is_success() {
                let validation = extract_validation(&job.payload);
                for line in validation.render_lines() {
                    warn!(job_id = %job.id(), "{}", line);
                }
                if !validation.is_empty() {
                    *rejected = Some(validation);
                }
            }
            terminal.into_result(job.clone())
        })
        .await?;

    let validation = extract_validation(&job.payload);
    if validation.has_problems() {
        for line in validation.render_lines() {
            info!(job_id = %job.id(), "{}", line);
        }
    }
    if policy == ValidationPolicy::FailOnErrors && validation.error_count() > 0 {
        let err = JobError::Validation(format!(
            "import {} reported {} validation error(s)",
            job.id(),
            validation.error_count()
        ));
        runner.stage("validation policy", async { Err::<(), _>(err) }).await?;
    }

    info!(job_id = %job.id(), state = ?job.state, "Import finished");
    Ok(ImportSummary {
        job_id: job.id().to_string(),
        progress: job.progress.to_string(),
        state: job.state.clone(),
        report_urls: reports::job_reports(&job),
        validation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollingConfig;
    use crate::remote::ArchiveRef;
    use crate::session::Session;
    use crate::transport::testing::ScriptedTransport;
    use crate::transport::HttpResponse;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn client(transport: &Arc<ScriptedTransport>) -> JobClient<ScriptedTransport> {
        let session = Session::new("https://h", "Bearer t").unwrap();
        JobClient::new(transport.clone(), session, PollingConfig::default())
    }

    fn op() -> Operation {
        Operation::ImportRepository {
            archive: ArchiveRef {
                file_id: "D1".to_string(),
            },
            repository_id: "R1".to_string(),
            policy: "createOrUpdate".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_import_polls_at_import_cadence() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push(HttpResponse::new(202).with_header("Location", "https://h/imports/9"))
            .push_json(200, json!({ "progress": "processing" }))
            .push_json(
                200,
                json!({ "progress": "succeeded", "completed": true, "state": "allCompleted" }),
            );

        let started = tokio::time::Instant::now();
        let mut ctx = PipelineContext::default();
        let report = import(&client(&transport), &op(), ValidationPolicy::Report, &mut ctx).await;

        assert_eq!(started.elapsed(), Duration::from_millis(10000));
        assert!(report.is_success());
        let summary = report.value.unwrap();
        assert_eq!(summary.state.as_deref(), Some("allCompleted"));
        assert_eq!(summary.progress, "succeeded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_state_is_partial_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push(HttpResponse::new(202).with_header("Location", "https://h/imports/9"))
            .push_json(
                200,
                json!({ "progress": "succeeded", "completed": true, "state": "someCompleted" }),
            );

        let mut ctx = PipelineContext::default();
        let report = import(&client(&transport), &op(), ValidationPolicy::Report, &mut ctx).await;
        assert_eq!(report.outcome, Outcome::PartialFailure);
        assert_eq!(report.exit_code(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_import_surfaces_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push(HttpResponse::new(202).with_header("Location", "https://h/imports/9"))
            .push_json(
                200,
                json!({
                    "progress": "failed",
                    "message": "archive is invalid",
                    "validationResults": { "items": [{
                        "entityType": "type", "entityName": "Article",
                        "messages": [{ "level": "error", "text": "field clash" }]
                    }] }
                }),
            );

        let mut ctx = PipelineContext::default();
        let report = import(&client(&transport), &op(), ValidationPolicy::Report, &mut ctx).await;
        assert_eq!(report.outcome, Outcome::Failure);
        assert_eq!(ctx.source_job_id.as_deref(), Some("9"));
        assert!(matches!(
            report.error,
            Some(JobError::JobFailed { ref message, .. }) if message == "archive is invalid"
        ));

        let validation = ctx.rejected_validation.as_ref().unwrap();
        assert_eq!(validation.error_count(), 1);
        let detail = report.detail.unwrap();
        assert!(detail.contains("archive is invalid"));
        assert!(detail.contains("type Article [error] field clash"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_import_clears_rejected_validation() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push(HttpResponse::new(202).with_header("Location", "https://h/imports/9"))
            .push_json(200, json!({ "progress": "succeeded", "completed": true }));

        let mut ctx = PipelineContext {
            rejected_validation: Some(ValidationReport {
                summary: Some(Vec::new()),
                results: None,
            }),
            ..PipelineContext::default()
        };
        let report = import(&client(&transport), &op(), ValidationPolicy::Report, &mut ctx).await;
        assert!(report.is_success());
        assert_eq!(ctx.rejected_validation, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_policy_can_fail_successful_import() {
        let transport = Arc::new(ScriptedTransport::new());
        let finished = json!({
            "progress": "succeeded",
            "completed": true,
            "validationSummary": { "messagesByEntityTypes": [{ "entityType": "item", "error": 1 }] }
        });
        transport
            .push(HttpResponse::new(202).with_header("Location", "https://h/imports/9"))
            .push_json(200, finished.clone());

        let mut ctx = PipelineContext::default();
        let report =
            import(&client(&transport), &op(), ValidationPolicy::FailOnErrors, &mut ctx).await;
        assert_eq!(report.outcome, Outcome::Failure);
        assert!(matches!(report.error, Some(JobError::Validation(_))));

        transport
            .push(HttpResponse::new(202).with_header("Location", "https://h/imports/10"))
            .push_json(200, finished);
        let report = import(&client(&transport), &op(), ValidationPolicy::Report, &mut ctx).await;
        assert!(report.is_success());
        assert_eq!(report.value.unwrap().validation.error_count(), 1);
    }
}

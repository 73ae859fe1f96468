// ABOUTME: Site and repository export: submit, poll to success, then resolve reports and result folder
// ABOUTME: Downloading the exported content is left to the caller

use serde::Serialize;
use serde_json::Value;

use crate::error::{JobError, Result};
use crate::remote::{reports, JobClient, Operation, Submission};
use crate::transport::Transport;

use super::{poll_to_success, PipelineContext, PipelineReport, StageRunner};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub job_id: String,
    pub name: Option<String>,
    pub result_folder_id: Option<String>,
    pub report_urls: Vec<String>,
}

/// Folder the export service wrote to, from `target.docs.folderId` or `downloadLink`.
fn result_folder(payload: &Value) -> Option<String> {
    let target = payload.get("job").unwrap_or(payload);
    target
        .pointer("/target/docs/folderId")
        .or_else(|| target.pointer("/downloadLink/folderId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub async fn export<T: Transport>(
    client: &JobClient<T>,
    operation: &Operation,
    ctx: &mut PipelineContext,
) -> PipelineReport<ExportSummary> {
    let mut runner = StageRunner::new("export");
    let result = export_stages(client, operation, ctx, &mut runner).await;
    runner.finish(result)
}

async fn export_stages<T: Transport>(
    client: &JobClient<T>,
    operation: &Operation,
    ctx: &mut PipelineContext,
    runner: &mut StageRunner,
) -> Result<ExportSummary> {
    let submission = runner.stage("submit export", client.submit_job(operation)).await?;
    let mut job = match submission {
        Submission::Accepted(job) => job,
        Submission::Completed(_) => {
            return Err(JobError::protocol(
                Some(200),
                "export endpoint returned no job handle",
            ))
        }
    };
    ctx.source_job_id = Some(job.id().to_string());

    let job = runner.stage("poll export", poll_to_success(client, &mut job)).await?;

    let summary = runner
        .stage("resolve reports", async {
            Ok(ExportSummary {
                job_id: job.id().to_string(),
                name: job.payload.get("name").and_then(Value::as_str).map(str::to_string),
                result_folder_id: result_folder(&job.payload),
                report_urls: reports::job_reports(&job),
            })
        })
        .await?;
    ctx.result_folder_id = summary.result_folder_id.clone();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollingConfig;
    use crate::pipeline::Outcome;
    use crate::session::Session;
    use crate::transport::testing::ScriptedTransport;
    use crate::transport::HttpResponse;
    use serde_json::json;
    use std::sync::Arc;

    fn client(transport: &Arc<ScriptedTransport>) -> JobClient<ScriptedTransport> {
        let session = Session::new("https://h", "Bearer t").unwrap();
        JobClient::new(transport.clone(), session, PollingConfig::default())
    }

    fn op() -> Operation {
        Operation::ExportSite {
            site_id: "S1".to_string(),
            folder_id: "F1".to_string(),
            name: "nightly".to_string(),
            policies: "siteAndAssets".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_resolves_reports_and_folder() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push(HttpResponse::new(202).with_header("Location", "https://h/exports/42"))
            .push_json(200, json!({ "progress": "processing", "completedPercentage": 10 }))
            .push_json(
                200,
                json!({
                    "name": "nightly",
                    "progress": "succeeded",
                    "completed": true,
                    "target": { "provider": "docs", "docs": { "folderId": "F1" } },
                    "reports": { "items": [{ "id": "r1" }] }
                }),
            );

        let mut ctx = PipelineContext::default();
        let report = export(&client(&transport), &op(), &mut ctx).await;

        assert!(report.is_success());
        assert_eq!(
            report.stage_names(),
            vec!["submit export", "poll export", "resolve reports"]
        );
        let summary = report.value.unwrap();
        assert_eq!(
            summary.report_urls,
            vec!["https://h/exports/42/reports/r1/package".to_string()]
        );
        assert_eq!(summary.result_folder_id.as_deref(), Some("F1"));
        assert_eq!(ctx.source_job_id.as_deref(), Some("42"));
        assert_eq!(ctx.result_folder_id.as_deref(), Some("F1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_export_skips_report_stage() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push(HttpResponse::new(202).with_header("Location", "https://h/exports/43"))
            .push_json(
                200,
                json!({ "progress": "aborted", "error": { "title": "Aborted by user" } }),
            );

        let mut ctx = PipelineContext::default();
        let report = export(&client(&transport), &op(), &mut ctx).await;

        assert_eq!(report.outcome, Outcome::Failure);
        assert_eq!(report.stage_names(), vec!["submit export", "poll export"]);
        assert!(matches!(
            report.error,
            Some(JobError::JobFailed { ref message, .. }) if message == "Aborted by user"
        ));
    }
}

// ABOUTME: Translation jobs through the legacy integration service
// ABOUTME: Export, then optionally validate or import the exported package in a second job cycle

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::{JobError, Result};
use crate::remote::decode::columnar_envelope;
use crate::remote::integration::{self, VALIDATION_RESULT_SERVICE};
use crate::remote::{extract_validation, Job, JobClient, Operation, ValidationReport};
use crate::transport::{HttpRequest, Transport};

use super::{submit_and_wait, PipelineContext, PipelineReport, StageRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Stop after the export job.
    None,
    /// Validate the exported package and fetch the structured results.
    ValidateOnly,
    Import,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationSummary {
    pub job_name: String,
    pub export_job_id: String,
    pub file_id: Option<String>,
    pub follow_up_job_id: Option<String>,
    pub validation: Option<ValidationReport>,
}

/// Package file produced by an export job, taken from its columnar status row.
fn exported_file_id(job: &Job) -> Option<String> {
    let from_columns = columnar_envelope(&job.payload).and_then(|row| {
        ["fFileGUID", "FileGUID", "fileId"]
            .iter()
            .find_map(|key| row.get(*key).and_then(Value::as_str).map(str::to_string))
    });
    from_columns.or_else(|| {
        integration::local_data(&job.payload)
            .and_then(|ld| ld.get("fFileGUID"))
            .and_then(Value::as_str)
            .map(str::to_string)
    })
    .filter(|id| !id.is_empty())
}

async fn fetch_validation<T: Transport>(
    client: &JobClient<T>,
    job_id: &str,
) -> Result<ValidationReport> {
    let url = integration::service_url(
        client.session(),
        VALIDATION_RESULT_SERVICE,
        &[("JobID", job_id)],
    )?;
    let payload = client
        .send_authorized(HttpRequest::get(url))
        .await?
        .error_for_status()?
        .json()?;
    integration::check_status(&payload)?;

    let source = integration::local_data(&payload)
        .and_then(|ld| ld.get("ValidationResult"))
        .and_then(Value::as_str)
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .unwrap_or(payload);
    Ok(extract_validation(&source))
}

pub async fn translation_job<T: Transport>(
    client: &JobClient<T>,
    export: &Operation,
    follow_up: FollowUp,
    ctx: &mut PipelineContext,
) -> PipelineReport<TranslationSummary> {
    let mut runner = StageRunner::new("translation-job");
    let result = translation_stages(client, export, follow_up, ctx, &mut runner).await;
    runner.finish(result)
}

async fn translation_stages<T: Transport>(
    client: &JobClient<T>,
    export: &Operation,
    follow_up: FollowUp,
    ctx: &mut PipelineContext,
    runner: &mut StageRunner,
) -> Result<TranslationSummary> {
    let Operation::TranslationExport { job_name, .. } = export else {
        return Err(JobError::Config(format!(
            "{} is not a translation export",
            export.kind()
        )));
    };
    ctx.job_name = Some(job_name.clone());

    let exported = runner.stage("export translation job", submit_and_wait(client, export)).await?;
    ctx.source_job_id = Some(exported.id().to_string());
    ctx.uploaded_file_id = exported_file_id(&exported);

    let mut summary = TranslationSummary {
        job_name: job_name.clone(),
        export_job_id: exported.id().to_string(),
        file_id: ctx.uploaded_file_id.clone(),
        follow_up_job_id: None,
        validation: None,
    };
    if follow_up == FollowUp::None {
        return Ok(summary);
    }

    let file_id = ctx.uploaded_file_id.clone().ok_or_else(|| {
        JobError::protocol(None, format!("export job {} reported no package file", exported.id()))
    })?;

    match follow_up {
        FollowUp::ValidateOnly => {
            let validate = Operation::TranslationValidate {
                job_name: job_name.clone(),
                file_id,
            };
            let job = runner
                .stage("validate translation job", submit_and_wait(client, &validate))
                .await?;
            let validation = runner
                .stage("fetch validation results", fetch_validation(client, job.id()))
                .await?;
            for line in validation.render_lines() {
                info!(job_name = %job_name, "{}", line);
            }
            summary.follow_up_job_id = Some(job.id().to_string());
            summary.validation = Some(validation);
        }
        FollowUp::Import => {
            let import = Operation::TranslationImport {
                job_name: job_name.clone(),
                file_id,
            };
            let job = runner
                .stage("import translation job", submit_and_wait(client, &import))
                .await?;
            summary.follow_up_job_id = Some(job.id().to_string());
        }
        FollowUp::None => {}
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollingConfig;
    use crate::pipeline::Outcome;
    use crate::session::Session;
    use crate::transport::testing::ScriptedTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn client(transport: &Arc<ScriptedTransport>) -> JobClient<ScriptedTransport> {
        let session = Session::new("https://h", "Bearer t").unwrap().with_csrf_token("tok");
        JobClient::new(transport.clone(), session, PollingConfig::default())
    }

    fn export_op() -> Operation {
        Operation::TranslationExport {
            site_id: "S1".to_string(),
            job_name: "fr-job".to_string(),
            target_languages: vec!["fr-FR".to_string(), "de-DE".to_string()],
        }
    }

    fn job_row(status: &str, file: &str) -> Value {
        json!({
            "LocalData": { "StatusCode": "0" },
            "ResultSets": { "JobInfo": {
                "fields": [
                    { "name": "JobStatus" },
                    { "name": "JobPercentage" },
                    { "name": "fFileGUID" }
                ],
                "rows": [[status, "100", file]]
            } }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_then_validate() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_json(200, json!({ "LocalData": { "StatusCode": "0", "JobID": "E1" } }))
            .push_json(200, job_row("COMPLETE", "FILE-1"))
            .push_json(200, json!({ "LocalData": { "StatusCode": "0", "JobID": "V1" } }))
            .push_json(200, job_row("COMPLETE", ""))
            .push_json(
                200,
                json!({
                    "LocalData": {
                        "StatusCode": "0",
                        "ValidationResult": concat!(
                            "{\"validationSummary\":{\"messagesByEntityTypes\":",
                            "[{\"entityType\":\"page\",\"warning\":2}]}}"
                        )
                    }
                }),
            );

        let mut ctx = PipelineContext::default();
        let report = translation_job(
            &client(&transport),
            &export_op(),
            FollowUp::ValidateOnly,
            &mut ctx,
        )
        .await;

        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(
            report.stage_names(),
            vec!["export translation job", "validate translation job", "fetch validation results"]
        );
        let summary = report.value.unwrap();
        assert_eq!(summary.file_id.as_deref(), Some("FILE-1"));
        assert_eq!(summary.follow_up_job_id.as_deref(), Some("V1"));
        let counts = summary.validation.unwrap().summary.unwrap();
        assert_eq!(counts[0].warning, 2);

        let validate_request = &transport.requests()[2];
        match &validate_request.body {
            crate::transport::Body::Json(body) => {
                assert_eq!(body["LocalData"]["fFileGUID"], "FILE-1");
                assert_eq!(body["LocalData"]["IdcService"], "SCS_VALIDATE_SITE_TRANS");
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_export_never_imports() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_json(200, json!({ "LocalData": { "StatusCode": "0", "JobID": "E1" } }))
            .push_json(
                200,
                json!({ "LocalData": {
                    "StatusCode": "-32",
                    "StatusMessage": "site has no translatable content"
                } }),
            );

        let mut ctx = PipelineContext::default();
        let report =
            translation_job(&client(&transport), &export_op(), FollowUp::Import, &mut ctx).await;

        assert_eq!(report.outcome, Outcome::Failure);
        assert_eq!(report.stage_names(), vec!["export translation job"]);
        assert_eq!(transport.request_count(), 2);
        assert!(matches!(
            report.error,
            Some(JobError::JobFailed { ref message, .. })
                if message == "site has no translatable content"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_then_import() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_json(200, json!({ "LocalData": { "StatusCode": "0", "JobID": "E1" } }))
            .push_json(200, job_row("COMPLETE", "FILE-1"))
            .push_json(200, json!({ "LocalData": { "StatusCode": "0", "JobID": "I1" } }))
            .push_json(200, job_row("COMPLETE", ""));

        let mut ctx = PipelineContext::default();
        let report =
            translation_job(&client(&transport), &export_op(), FollowUp::Import, &mut ctx).await;
        assert!(report.is_success());
        assert_eq!(report.value.unwrap().follow_up_job_id.as_deref(), Some("I1"));
        assert_eq!(ctx.job_name.as_deref(), Some("fr-job"));
    }
}

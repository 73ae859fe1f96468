// ABOUTME: Single-job operations: archive, template, site creation, copy and publish
// ABOUTME: Taxonomy publish reports a soft failure when every channel is already published

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::info;

use crate::remote::{reports, JobClient, JobKind, JobRun, Operation};
use crate::transport::Transport;

use super::{Outcome, PipelineReport, StageRunner};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub kind: String,
    pub job_id: Option<String>,
    pub progress: Option<String>,
    pub percentage: Option<u8>,
    pub pending_approval: bool,
    pub report_urls: Vec<String>,
    /// Body of a synchronous response, or the final status payload.
    pub result: Value,
}

impl JobSummary {
    pub fn from_run(kind: JobKind, run: JobRun) -> Self {
        match run {
            JobRun::Immediate(body) => Self {
                kind: kind.label(),
                job_id: body.get("id").and_then(Value::as_str).map(str::to_string),
                progress: Some("succeeded".to_string()),
                percentage: None,
                pending_approval: false,
                report_urls: Vec::new(),
                result: body,
            },
            JobRun::Finished(job) | JobRun::PendingApproval(job) => Self {
                kind: kind.label(),
                job_id: Some(job.id().to_string()),
                progress: Some(job.progress.to_string()),
                percentage: job.completed_percentage,
                pending_approval: job.is_approval_gated(),
                report_urls: reports::job_reports(&job),
                result: job.payload,
            },
        }
    }
}

/// Submit, poll and summarise one operation.
pub async fn run_single<T: Transport>(
    client: &JobClient<T>,
    operation: &Operation,
) -> PipelineReport<JobSummary> {
    let kind = operation.kind();
    let mut runner = StageRunner::new("single-job");
    let run = runner.stage(&kind.label(), client.run_job(operation)).await;

    match run {
        Ok(run) => {
            let summary = JobSummary::from_run(kind, run);
            let detail = summary
                .pending_approval
                .then(|| format!("{} request is pending approval", kind));
            runner.finish_with(summary, Outcome::Success, detail)
        }
        Err(err) => runner.fail(err),
    }
}

/// Channels a taxonomy is already published to.
fn published_channels(taxonomy: &Value) -> BTreeSet<String> {
    let entries = match taxonomy.get("publishedChannels") {
        Some(Value::Array(items)) => items.clone(),
        Some(other) => other
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        None => Vec::new(),
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(id) => Some(id.clone()),
            other => other.get("id").and_then(Value::as_str).map(str::to_string),
        })
        .collect()
}

pub async fn publish_taxonomy<T: Transport>(
    client: &JobClient<T>,
    taxonomy_id: &str,
    channels: &[String],
) -> PipelineReport<JobSummary> {
    let mut runner = StageRunner::new("publish-taxonomy");
    let path = format!(
        "/content/management/api/v1.1/taxonomies/{}?fields=publishedChannels",
        taxonomy_id
    );
    let taxonomy = match runner.stage("get taxonomy", client.get_json(&path)).await {
        Ok(value) => value,
        Err(err) => return runner.fail(err),
    };

    let already = published_channels(&taxonomy);
    let pending: Vec<String> = channels
        .iter()
        .filter(|c| !already.contains(*c))
        .cloned()
        .collect();

    if pending.is_empty() {
        info!(taxonomy_id, "Taxonomy already published to every requested channel");
        let summary = JobSummary {
            kind: JobKind::Publish(crate::remote::PublishTarget::Taxonomy).label(),
            job_id: None,
            progress: None,
            percentage: None,
            pending_approval: false,
            report_urls: Vec::new(),
            result: taxonomy,
        };
        return runner.finish_with(
            summary,
            Outcome::PartialFailure,
            Some(format!(
                "taxonomy {} is already published to channel(s) {}",
                taxonomy_id,
                channels.join(", ")
            )),
        );
    }

    let operation = Operation::PublishTaxonomy {
        taxonomy_id: taxonomy_id.to_string(),
        channels: pending,
    };
    let kind = operation.kind();
    let run = runner.stage("publish", client.run_job(&operation)).await;
    let report = runner.finish(run);
    PipelineReport {
        value: report.value.map(|run| JobSummary::from_run(kind, run)),
        pipeline: report.pipeline,
        outcome: report.outcome,
        detail: report.detail,
        stages: report.stages,
        error: report.error,
    }
}

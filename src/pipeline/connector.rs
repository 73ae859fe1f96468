// ABOUTME: Translation connector round trip: create and send now, poll and ingest on a later run
// ABOUTME: The local job record's status decides whether a step still needs doing

use futures::future::join_all;
use serde::Serialize;

use crate::config::PollingConfig;
use crate::connector::{
    ConnectorClient, ConnectorJob, ConnectorJobRecord, ConnectorStatus, ConnectorWait,
    RecordStatus, RecordStore,
};
use crate::error::{JobError, Result};
use crate::remote::{JobClient, Operation};
use crate::transport::Transport;

use super::{submit_and_wait, Outcome, PipelineContext, PipelineReport, StageRunner};

/// Receives the translated package once the connector has finished.
pub trait TranslationSink {
    /// Imports the package locally. Returns the id of an uploaded copy when the
    /// content service should ingest it as well.
    fn deliver(&mut self, record: &ConnectorJobRecord, payload: &[u8]) -> Result<Option<String>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IngestStatus {
    /// Connector still working; carries the display status.
    Pending(String),
    Ingested {
        bytes: usize,
        ingest_job_id: Option<String>,
    },
}

pub async fn send_to_connector<T: Transport>(
    connector: &ConnectorClient<T>,
    store: &RecordStore,
    job_name: &str,
    payload: Vec<u8>,
    ctx: &mut PipelineContext,
) -> PipelineReport<ConnectorJobRecord> {
    let mut runner = StageRunner::new("connector-send");
    ctx.job_name = Some(job_name.to_string());

    match store.load(job_name) {
        Ok(Some(existing)) if existing.status != RecordStatus::Failed => {
            let detail = format!(
                "job {} was already sent to connector job {} ({})",
                job_name, existing.connector_job_id, existing.status
            );
            return runner.finish_with(existing, Outcome::PartialFailure, Some(detail));
        }
        Ok(_) => {}
        Err(err) => return runner.fail(err),
    }

    let result = async {
        let created = runner.stage("create connector job", connector.create_job(job_name)).await?;
        ctx.connector_job_id = Some(created.id.clone());

        runner
            .stage("send file", connector.send_file(&created.id, payload))
            .await?;

        let record = ConnectorJobRecord {
            job_name: job_name.to_string(),
            connector: connector.connection().name.clone(),
            connector_job_id: created.id.clone(),
            project_id: created.project_id.clone(),
            status: RecordStatus::Sent,
        };
        runner
            .stage("save job record", async { store.save(&record) })
            .await?;
        Ok(record)
    }
    .await;
    runner.finish(result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestOptions {
    /// Keep polling the connector until it finishes instead of checking once.
    pub wait: bool,
}

pub async fn ingest_from_connector<T: Transport, S: TranslationSink>(
    connector: &ConnectorClient<T>,
    client: &JobClient<T>,
    store: &RecordStore,
    job_name: &str,
    sink: &mut S,
    options: IngestOptions,
) -> PipelineReport<IngestStatus> {
    let mut runner = StageRunner::new("connector-ingest");

    let mut record = match runner
        .stage("load job record", async {
            store.load(job_name)?.ok_or_else(|| {
                JobError::Config(format!("no connector job recorded for {}", job_name))
            })
        })
        .await
    {
        Ok(record) => record,
        Err(err) => return runner.fail(err),
    };

    match record.status {
        RecordStatus::Ingested => {
            let detail = format!("job {} was already ingested", job_name);
            return runner.finish_with(
                IngestStatus::Ingested {
                    bytes: 0,
                    ingest_job_id: None,
                },
                Outcome::PartialFailure,
                Some(detail),
            );
        }
        // Only a fresh send can recover a failed connector job.
        RecordStatus::Failed => {
            return runner.fail(JobError::JobFailed {
                job_id: record.connector_job_id.clone(),
                state: RecordStatus::Failed.to_string(),
                message: format!("connector job for {} failed; send it again", job_name),
            });
        }
        RecordStatus::Sent | RecordStatus::Translated => {}
    }

    let result =
        ingest_stages(connector, client, store, &mut record, sink, options, &mut runner).await;
    match result {
        Ok(IngestStatus::Pending(status)) => {
            let detail = format!("connector job {} is {}", record.connector_job_id, status);
            runner.finish_with(IngestStatus::Pending(status), Outcome::Success, Some(detail))
        }
        other => runner.finish(other),
    }
}

async fn ingest_stages<T: Transport, S: TranslationSink>(
    connector: &ConnectorClient<T>,
    client: &JobClient<T>,
    store: &RecordStore,
    record: &mut ConnectorJobRecord,
    sink: &mut S,
    options: IngestOptions,
    runner: &mut StageRunner,
) -> Result<IngestStatus> {
    let id = record.connector_job_id.clone();

    if record.status == RecordStatus::Sent {
        runner.stage("refresh connector job", connector.refresh(&id)).await?;

        let job = runner
            .stage("check connector job", connector_job_state(connector, client, &id, options))
            .await?;
        match job.status {
            ConnectorStatus::Translated => {}
            ConnectorStatus::Failed => {
                store.update_status(record, RecordStatus::Failed)?;
                return Err(JobError::JobFailed {
                    job_id: id,
                    state: job.status.to_string(),
                    message: job
                        .error_message
                        .unwrap_or_else(|| "connector reported the job as failed".to_string()),
                });
            }
            ConnectorStatus::Working(_) => return Ok(IngestStatus::Pending(job.display_status())),
        }
    }

    let payload = runner
        .stage("download translation", connector.get_translation(&id))
        .await?;
    store.update_status(record, RecordStatus::Translated)?;

    let uploaded = runner
        .stage("import translation", async { sink.deliver(record, &payload) })
        .await?;

    let mut ingest_job_id = None;
    if let Some(file_id) = uploaded {
        let operation = Operation::TranslationIngest {
            job_name: record.job_name.clone(),
            file_id,
        };
        let job = runner
            .stage("ingest translation job", submit_and_wait(client, &operation))
            .await?;
        ingest_job_id = Some(job.id().to_string());
    }

    store.update_status(record, RecordStatus::Ingested)?;
    Ok(IngestStatus::Ingested {
        bytes: payload.len(),
        ingest_job_id,
    })
}

async fn connector_job_state<T: Transport>(
    connector: &ConnectorClient<T>,
    client: &JobClient<T>,
    id: &str,
    options: IngestOptions,
) -> Result<ConnectorJob> {
    if !options.wait {
        return connector.get_job(id).await;
    }
    let polling: &PollingConfig = client.polling();
    match connector.wait_for_job(id, polling, client.cancellation()).await? {
        ConnectorWait::Done(job) => Ok(job),
        ConnectorWait::Abandoned(_) => Err(JobError::Abandoned {
            job_id: id.to_string(),
            waited: polling.max_wait().unwrap_or_default(),
        }),
        ConnectorWait::Cancelled => Err(JobError::Cancelled(id.to_string())),
    }
}

/// Fetches every record's connector job concurrently. One failed lookup does
/// not affect the others.
pub async fn connector_status<T: Transport>(
    connector: &ConnectorClient<T>,
    records: &[ConnectorJobRecord],
) -> Vec<(ConnectorJobRecord, Result<ConnectorJob>)> {
    let lookups = records
        .iter()
        .filter(|r| r.connector == connector.connection().name)
        .map(|record| async move {
            let job = connector.get_job(&record.connector_job_id).await;
            (record.clone(), job)
        });
    join_all(lookups).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::ConnectorConnection;
    use crate::session::Session;
    use crate::transport::testing::ScriptedTransport;
    use crate::transport::HttpResponse;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct RecordingSink {
        delivered: Vec<Vec<u8>>,
        upload_as: Option<String>,
    }

    impl TranslationSink for RecordingSink {
        fn deliver(
            &mut self,
            _record: &ConnectorJobRecord,
            payload: &[u8],
        ) -> Result<Option<String>> {
            self.delivered.push(payload.to_vec());
            Ok(self.upload_as.clone())
        }
    }

    fn job_response(id: &str, status: &str) -> HttpResponse {
        HttpResponse::new(200).with_json(&json!({ "properties": { "id": id, "status": status } }))
    }

    fn connection() -> ConnectorConnection {
        ConnectorConnection {
            name: "mock".to_string(),
            url: "https://connector.example.com".to_string(),
            user: "u".to_string(),
            password: "p".to_string(),
            fields: BTreeMap::new(),
        }
    }

    fn clients(
        transport: &Arc<ScriptedTransport>,
    ) -> (ConnectorClient<ScriptedTransport>, JobClient<ScriptedTransport>) {
        let session = Session::new("https://h", "Bearer t").unwrap();
        (
            ConnectorClient::new(transport.clone(), connection()),
            JobClient::new(transport.clone(), session, PollingConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_send_persists_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_json(200, json!({ "properties": { "id": "cj-1", "projectId": "p-1" } }))
            .push_json(200, json!({ "properties": { "id": "cj-1", "status": "SENDING" } }));
        let (connector, _) = clients(&transport);

        let mut ctx = PipelineContext::default();
        let report =
            send_to_connector(&connector, &store, "fr-job", b"zip".to_vec(), &mut ctx).await;

        assert!(report.is_success());
        assert_eq!(ctx.connector_job_id.as_deref(), Some("cj-1"));
        let saved = store.load("fr-job").unwrap().unwrap();
        assert_eq!(saved.status, RecordStatus::Sent);
        assert_eq!(saved.project_id.as_deref(), Some("p-1"));

        // A second send resumes from the record instead of resubmitting.
        let report =
            send_to_connector(&connector, &store, "fr-job", b"zip".to_vec(), &mut ctx).await;
        assert_eq!(report.outcome, Outcome::PartialFailure);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_ingest_pending_leaves_record_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        store
            .save(&ConnectorJobRecord {
                job_name: "fr-job".to_string(),
                connector: "mock".to_string(),
                connector_job_id: "cj-1".to_string(),
                project_id: None,
                status: RecordStatus::Sent,
            })
            .unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_json(200, json!({ "properties": { "id": "cj-1", "status": "INPROGRESS" } }))
            .push_json(
                200,
                json!({ "properties": { "id": "cj-1", "status": "INPROGRESS", "progress": 40 } }),
            );
        let (connector, client) = clients(&transport);
        let mut sink = RecordingSink { delivered: Vec::new(), upload_as: None };

        let report = ingest_from_connector(
            &connector,
            &client,
            &store,
            "fr-job",
            &mut sink,
            IngestOptions::default(),
        )
        .await;

        assert!(report.is_success());
        assert_eq!(report.value, Some(IngestStatus::Pending("INPROGRESS (40%)".to_string())));
        assert!(sink.delivered.is_empty());
        assert_eq!(store.load("fr-job").unwrap().unwrap().status, RecordStatus::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_translated_and_submits_ingest_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        store
            .save(&ConnectorJobRecord {
                job_name: "fr-job".to_string(),
                connector: "mock".to_string(),
                connector_job_id: "cj-1".to_string(),
                project_id: None,
                status: RecordStatus::Sent,
            })
            .unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_json(200, json!({ "properties": { "id": "cj-1", "status": "INPROGRESS" } }))
            .push_json(200, json!({ "properties": { "id": "cj-1", "status": "TRANSLATED" } }))
            .push(HttpResponse::new(200).with_body(b"translated-zip".to_vec()))
            .push_json(200, json!({ "LocalData": { "StatusCode": "0", "JobID": "IG1" } }))
            .push_json(
                200,
                json!({ "LocalData": { "StatusCode": "0" }, "ResultSets": { "JobInfo": {
                    "fields": ["JobStatus"], "rows": [["COMPLETE"]]
                } } }),
            );
        let (connector, client) = clients(&transport);
        let mut sink = RecordingSink {
            delivered: Vec::new(),
            upload_as: Some("FILE-9".to_string()),
        };

        let report = ingest_from_connector(
            &connector,
            &client,
            &store,
            "fr-job",
            &mut sink,
            IngestOptions::default(),
        )
        .await;

        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(
            report.value,
            Some(IngestStatus::Ingested {
                bytes: 14,
                ingest_job_id: Some("IG1".to_string())
            })
        );
        assert_eq!(sink.delivered, vec![b"translated-zip".to_vec()]);
        assert_eq!(store.load("fr-job").unwrap().unwrap().status, RecordStatus::Ingested);
    }

    #[tokio::test]
    async fn test_ingest_failed_connector_job_marks_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        store
            .save(&ConnectorJobRecord {
                job_name: "fr-job".to_string(),
                connector: "mock".to_string(),
                connector_job_id: "cj-1".to_string(),
                project_id: None,
                status: RecordStatus::Sent,
            })
            .unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_json(200, json!({ "properties": { "id": "cj-1", "status": "FAILED" } }))
            .push_json(
                200,
                json!({ "properties": {
                    "id": "cj-1",
                    "status": "FAILED",
                    "errorMessage": "vendor rejected file"
                } }),
            );
        let (connector, client) = clients(&transport);
        let mut sink = RecordingSink { delivered: Vec::new(), upload_as: None };

        let report = ingest_from_connector(
            &connector,
            &client,
            &store,
            "fr-job",
            &mut sink,
            IngestOptions::default(),
        )
        .await;

        assert_eq!(report.outcome, Outcome::Failure);
        assert!(matches!(
            report.error,
            Some(JobError::JobFailed { ref message, .. }) if message == "vendor rejected file"
        ));
        assert_eq!(store.load("fr-job").unwrap().unwrap().status, RecordStatus::Failed);
    }

    #[tokio::test]
    async fn test_ingest_refuses_failed_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        store
            .save(&ConnectorJobRecord {
                job_name: "fr-job".to_string(),
                connector: "mock".to_string(),
                connector_job_id: "cj-1".to_string(),
                project_id: None,
                status: RecordStatus::Failed,
            })
            .unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(HttpResponse::new(200).with_body(b"garbage".to_vec()));
        let (connector, client) = clients(&transport);
        let mut sink = RecordingSink {
            delivered: Vec::new(),
            upload_as: None,
        };

        let report = ingest_from_connector(
            &connector,
            &client,
            &store,
            "fr-job",
            &mut sink,
            IngestOptions::default(),
        )
        .await;

        assert_eq!(report.outcome, Outcome::Failure);
        assert_eq!(report.stage_names(), vec!["load job record"]);
        assert!(matches!(
            report.error,
            Some(JobError::JobFailed { ref state, .. }) if state == "FAILED"
        ));
        assert_eq!(transport.request_count(), 0);
        assert!(sink.delivered.is_empty());
        assert_eq!(store.load("fr-job").unwrap().unwrap().status, RecordStatus::Failed);
    }

    #[tokio::test]
    async fn test_status_listing_is_independent_per_job() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .route("/v1/job/cj-1", Ok(job_response("cj-1", "TRANSLATED")))
            .route("/v1/job/cj-2", Ok(HttpResponse::new(500)))
            .route("/v1/job/cj-3", Ok(job_response("cj-3", "INPROGRESS")));
        let (connector, _) = clients(&transport);

        let records: Vec<ConnectorJobRecord> = ["cj-1", "cj-2", "cj-3"]
            .iter()
            .map(|id| ConnectorJobRecord {
                job_name: format!("job-{}", id),
                connector: "mock".to_string(),
                connector_job_id: id.to_string(),
                project_id: None,
                status: RecordStatus::Sent,
            })
            .collect();

        let statuses = connector_status(&connector, &records).await;
        assert_eq!(statuses.len(), 3);
        assert!(statuses[0].1.is_ok());
        assert!(statuses[1].1.is_err());
        assert_eq!(statuses[2].1.as_ref().unwrap().status.as_str(), "INPROGRESS");
    }
}

// ABOUTME: HTTP client for user-registered translation connectors
// ABOUTME: Authenticates with basic auth plus connector-supplied header fields, not the session

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PollingConfig;
use crate::error::{JobError, Result};
use crate::transport::{HttpRequest, HttpResponse, Transport};

use super::models::{ConnectorConnection, ConnectorJob};

pub struct ConnectorClient<T: Transport> {
    transport: Arc<T>,
    connection: ConnectorConnection,
}

/// How waiting on a connector job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorWait {
    Done(ConnectorJob),
    Abandoned(ConnectorJob),
    Cancelled,
}

impl<T: Transport> ConnectorClient<T> {
    pub fn new(transport: Arc<T>, connection: ConnectorConnection) -> Self {
        Self {
            transport,
            connection,
        }
    }

    pub fn connection(&self) -> &ConnectorConnection {
        &self.connection
    }

    fn job_url(&self, suffix: &str) -> String {
        format!("{}/v1/job{}", self.connection.url.trim_end_matches('/'), suffix)
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        let credentials = STANDARD.encode(format!(
            "{}:{}",
            self.connection.user, self.connection.password
        ));
        request
            .header("Authorization", format!("Basic {}", credentials))
            .headers(
                self.connection
                    .fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone())),
            )
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.transport.send(self.authorize(request)).await?;
        // Connectors signal success with exactly 200.
        if response.status != 200 {
            return Err(response.protocol_error());
        }
        Ok(response)
    }

    async fn send_for_job(&self, request: HttpRequest) -> Result<ConnectorJob> {
        let body = self.send(request).await?.json()?;
        parse_properties(&body)
    }

    pub async fn create_job(&self, name: &str) -> Result<ConnectorJob> {
        let request = HttpRequest::post(self.job_url(""))
            .header("Content-Type", "application/json")
            .json(json!({ "name": name }));
        let job = self.send_for_job(request).await?;
        info!(
            connector = %self.connection.name,
            connector_job_id = %job.id,
            "Connector job created"
        );
        Ok(job)
    }

    pub async fn send_file(&self, job_id: &str, payload: Vec<u8>) -> Result<ConnectorJob> {
        let size = payload.len();
        let request =
            HttpRequest::post(self.job_url(&format!("/{}/translate", job_id))).bytes(payload);
        let job = self.send_for_job(request).await?;
        info!(connector_job_id = %job_id, bytes = size, "Sent job payload to connector");
        Ok(job)
    }

    pub async fn refresh(&self, job_id: &str) -> Result<ConnectorJob> {
        let request = HttpRequest::post(self.job_url(&format!("/{}/refresh", job_id)));
        self.send_for_job(request).await
    }

    pub async fn get_job(&self, job_id: &str) -> Result<ConnectorJob> {
        let request = HttpRequest::get(self.job_url(&format!("/{}", job_id)))
            .header("Accept", "application/json");
        self.send_for_job(request).await
    }

    pub async fn get_translation(&self, job_id: &str) -> Result<Vec<u8>> {
        let request = HttpRequest::get(self.job_url(&format!("/{}/translation", job_id)))
            .header("Accept", "application/octet-stream");
        let response = self.send(request).await?;
        info!(connector_job_id = %job_id, bytes = response.body.len(), "Downloaded translation");
        Ok(response.body)
    }

    /// Polls the connector until it reports `TRANSLATED` or `FAILED`.
    pub async fn wait_for_job(
        &self,
        job_id: &str,
        polling: &PollingConfig,
        cancel: &CancellationToken,
    ) -> Result<ConnectorWait> {
        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Ok(ConnectorWait::Cancelled);
            }

            let job = self.get_job(job_id).await?;
            debug!(
                connector_job_id = %job_id,
                status = %job.status,
                progress = ?job.progress,
                "Polled connector job"
            );
            if job.status.is_terminal() {
                return Ok(ConnectorWait::Done(job));
            }
            if let Some(limit) = polling.max_wait() {
                if started.elapsed() >= limit {
                    return Ok(ConnectorWait::Abandoned(job));
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(ConnectorWait::Cancelled),
                _ = tokio::time::sleep(polling.interval()) => {}
            }
        }
    }
}

fn parse_properties(body: &Value) -> Result<ConnectorJob> {
    let properties = body
        .get("properties")
        .ok_or_else(|| JobError::protocol(Some(200), "connector response has no properties"))?;
    serde_json::from_value(properties.clone()).map_err(|e| {
        JobError::protocol(Some(200), format!("unexpected connector job properties: {}", e))
    })
}

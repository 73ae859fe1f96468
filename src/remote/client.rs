// ABOUTME: Client for submitting content service jobs and polling them to a terminal state
// ABOUTME: Polling is a cancellable sleep loop bounded by a configurable maximum wait

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollingConfig;
use crate::error::{JobError, Result};
use crate::session::Session;
use crate::transport::{HttpRequest, HttpResponse, Transport};

use super::decode::decode_status_as;
use super::integration;
use super::kind::Endpoint;
use super::models::{Job, Operation, Progress, Submission};

pub type JobObserver = Arc<dyn Fn(&Job) + Send + Sync>;

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Succeeded,
    Failed,
    Aborted,
    /// Blocked on a job that is not approval-gated; a failure signal.
    Blocked,
    /// Approval-gated creation waiting on a governance decision.
    PendingApproval,
    /// The configured maximum wait elapsed; the remote job may still be running.
    Abandoned { waited: Duration },
    Cancelled,
}

impl Terminal {
    /// Terminal outcome implied by the job's current progress, if it has one.
    pub fn from_progress(job: &Job) -> Option<Self> {
        match job.progress {
            Progress::Succeeded => Some(Terminal::Succeeded),
            Progress::Failed => Some(Terminal::Failed),
            Progress::Aborted => Some(Terminal::Aborted),
            Progress::Blocked if job.is_approval_gated() => Some(Terminal::PendingApproval),
            Progress::Blocked => Some(Terminal::Blocked),
            Progress::Submitted | Progress::InProgress => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Terminal::Succeeded | Terminal::PendingApproval)
    }

    /// Converts a non-success terminal into the error the orchestrator short-circuits on.
    pub fn into_result(self, job: Job) -> Result<Job> {
        match self {
            Terminal::Succeeded | Terminal::PendingApproval => Ok(job),
            Terminal::Abandoned { waited } => Err(JobError::Abandoned {
                job_id: job.id().to_string(),
                waited,
            }),
            Terminal::Cancelled => Err(JobError::Cancelled(job.id().to_string())),
            Terminal::Failed | Terminal::Aborted | Terminal::Blocked => Err(JobError::JobFailed {
                job_id: job.id().to_string(),
                state: job.progress.to_string(),
                message: job
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("{} job did not succeed", job.kind())),
            }),
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Terminal::Succeeded => write!(f, "succeeded"),
            Terminal::Failed => write!(f, "failed"),
            Terminal::Aborted => write!(f, "aborted"),
            Terminal::Blocked => write!(f, "blocked"),
            Terminal::PendingApproval => write!(f, "pending approval"),
            Terminal::Abandoned { waited } => write!(f, "abandoned after {:?}", waited),
            Terminal::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of submitting and, when needed, polling one operation.
#[derive(Debug, Clone)]
pub enum JobRun {
    /// Inline result from a synchronous endpoint.
    Immediate(Value),
    Finished(Job),
    PendingApproval(Job),
}

pub struct JobClient<T: Transport> {
    transport: Arc<T>,
    session: Session,
    polling: PollingConfig,
    cancel: CancellationToken,
    observer: Option<JobObserver>,
}

impl<T: Transport> JobClient<T> {
    pub fn new(transport: Arc<T>, session: Session, polling: PollingConfig) -> Self {
        Self {
            transport,
            session,
            polling,
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Called with the job after every poll tick.
    pub fn with_observer(mut self, observer: JobObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn polling(&self) -> &PollingConfig {
        &self.polling
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Sends a request with the session's authorization headers attached.
    pub async fn send_authorized(&self, request: HttpRequest) -> Result<HttpResponse> {
        let request = request.headers(self.session.auth_headers());
        self.transport.send(request).await
    }

    /// GET a service path and decode the JSON body.
    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self
            .send_authorized(HttpRequest::get(self.session.url(path)))
            .await?
            .error_for_status()?;
        response.json()
    }

    pub async fn submit_job(&self, operation: &Operation) -> Result<Submission> {
        let kind = operation.kind();
        match kind.spec().endpoint {
            Endpoint::Rest(template) => {
                let path = match operation.path_id() {
                    Some(id) => template.replace("{id}", id),
                    None => template,
                };
                let request = HttpRequest::post(self.session.url(&path))
                    .header("Content-Type", "application/json")
                    .header("X-Requested-With", "XMLHttpRequest")
                    .json(operation.body());

                let response = self.send_authorized(request).await?.error_for_status()?;
                let submission = self.classify_rest_response(operation, response)?;
                if let Submission::Accepted(job) = &submission {
                    info!(job_id = %job.id(), kind = %kind, "Job submitted");
                }
                Ok(submission)
            }
            Endpoint::Integration(service) => {
                let request = integration::service_request(
                    &self.session,
                    service,
                    operation.integration_params(),
                )?;
                let payload = self.transport.send(request).await?.error_for_status()?.json()?;
                integration::check_status(&payload)?;

                let job_id = integration::job_id(&payload).ok_or_else(|| {
                    JobError::protocol(None, format!("{} response carried no JobID", service))
                })?;
                let status_url = integration::status_url(&self.session, &job_id)?;
                info!(job_id = %job_id, kind = %kind, service, "Integration job submitted");
                Ok(Submission::Accepted(Job::new(job_id, kind, status_url)))
            }
        }
    }

    fn classify_rest_response(
        &self,
        operation: &Operation,
        response: HttpResponse,
    ) -> Result<Submission> {
        let kind = operation.kind();
        match response.header("Location") {
            Some(location) => {
                let status_location = self.session.url(location);
                let body = response.json_or_null();
                let job_id = ["id", "jobId"]
                    .iter()
                    .find_map(|key| body.get(*key).and_then(Value::as_str))
                    .map(str::to_string)
                    .unwrap_or_else(|| last_segment(&status_location));
                Ok(Submission::Accepted(Job::new(job_id, kind, status_location)))
            }
            None if response.status == 202 => Err(JobError::protocol(
                Some(202),
                format!("{} submission was accepted without a Location header", kind),
            )),
            None => Ok(Submission::Completed(response.json_or_null())),
        }
    }

    pub async fn get_job_status(&self, job: &Job) -> Result<Value> {
        let mut url = job.status_location().to_string();
        if let Some(fields) = job.kind().spec().status_fields {
            if !job.is_approval_gated() {
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str("fields=");
                url.push_str(fields);
            }
        }

        let response = self
            .send_authorized(HttpRequest::get(url))
            .await?
            .error_for_status()?;
        response.json()
    }

    /// Fetches one status payload, decodes it in the kind's vocabulary and
    /// applies it to the job.
    pub async fn refresh_status(&self, job: &mut Job) -> Result<Progress> {
        let payload = self.get_job_status(job).await?;
        let snapshot = decode_status_as(job.kind().spec().vocabulary, &payload);
        Ok(job.observe(snapshot, payload))
    }

    /// Polls until the job reaches a terminal state, the wait ceiling passes, or
    /// the client's cancellation token fires. Transport and protocol errors end
    /// the loop immediately.
    pub async fn poll_until_complete(&self, job: &mut Job) -> Result<Terminal> {
        let interval = job.kind().poll_interval(&self.polling);
        let max_wait = self.polling.max_wait();
        let started = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                info!(job_id = %job.id(), "Polling cancelled");
                return Ok(Terminal::Cancelled);
            }

            let progress = self.refresh_status(job).await?;
            debug!(
                job_id = %job.id(),
                progress = %progress,
                percentage = ?job.completed_percentage,
                "Polled job status"
            );
            if let Some(observer) = &self.observer {
                observer(job);
            }

            if let Some(terminal) = Terminal::from_progress(job) {
                match &terminal {
                    Terminal::Succeeded | Terminal::PendingApproval => info!(
                        job_id = %job.id(),
                        kind = %job.kind(),
                        outcome = %terminal,
                        "Job finished"
                    ),
                    _ => warn!(
                        job_id = %job.id(),
                        kind = %job.kind(),
                        outcome = %terminal,
                        message = job.message.as_deref().unwrap_or(""),
                        "Job did not succeed"
                    ),
                }
                return Ok(terminal);
            }

            if let Some(limit) = max_wait {
                let waited = started.elapsed();
                if waited >= limit {
                    warn!(job_id = %job.id(), ?waited, "Giving up on job");
                    return Ok(Terminal::Abandoned { waited });
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(job_id = %job.id(), "Polling cancelled");
                    return Ok(Terminal::Cancelled);
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Submits an operation and follows it to a successful terminal state.
    pub async fn run_job(&self, operation: &Operation) -> Result<JobRun> {
        match self.submit_job(operation).await? {
            Submission::Completed(body) => Ok(JobRun::Immediate(body)),
            Submission::Accepted(mut job) => {
                let terminal = self.poll_until_complete(&mut job).await?;
                let pending = terminal == Terminal::PendingApproval;
                let job = terminal.into_result(job)?;
                Ok(if pending {
                    JobRun::PendingApproval(job)
                } else {
                    JobRun::Finished(job)
                })
            }
        }
    }
}

fn last_segment(url: &str) -> String {
    super::reports::status_url_stem(url)
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

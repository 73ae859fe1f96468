// ABOUTME: Member grants on a site, template, theme or component, issued concurrently
// ABOUTME: One grant failing never cancels the others; the report lists every grant's result

use futures::future::join_all;
use reqwest::Method;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{JobError, Result};
use crate::remote::{JobClient, Resource};
use crate::transport::{HttpRequest, Transport};

use super::{Outcome, PipelineReport, StageRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Contributor,
    Downloader,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Contributor => "contributor",
            Role::Downloader => "downloader",
            Role::Viewer => "viewer",
        }
    }
}

impl FromStr for Role {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "manager" => Ok(Role::Manager),
            "contributor" => Ok(Role::Contributor),
            "downloader" => Ok(Role::Downloader),
            "viewer" => Ok(Role::Viewer),
            other => Err(JobError::Validation(format!(
                "unknown role {}, expected manager, contributor, downloader or viewer",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Member {
    User(String),
    Group(String),
}

impl Member {
    pub fn id(&self) -> &str {
        match self {
            Member::User(id) | Member::Group(id) => id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Member::User(_) => "user",
            Member::Group(_) => "group",
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantAction {
    /// New member.
    Add,
    /// Change the role of an existing member.
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub member: Member,
    pub role: Role,
    pub action: GrantAction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrantResult {
    pub grant: Grant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GrantResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrantSummary {
    pub resource: Resource,
    pub id: String,
    pub results: Vec<GrantResult>,
}

impl GrantSummary {
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.succeeded()).count()
    }
}

fn grant_request<T: Transport>(
    client: &JobClient<T>,
    resource: Resource,
    id: &str,
    grant: &Grant,
) -> HttpRequest {
    let members = format!(
        "/sites/management/api/v1/{}/{}/members",
        resource.plural(),
        id
    );
    let request = match grant.action {
        GrantAction::Add => HttpRequest::post(client.session().url(&members)).json(json!({
            "id": grant.member.id(),
            "type": grant.member.kind(),
            "role": grant.role.as_str(),
        })),
        GrantAction::Update => HttpRequest::new(
            Method::PATCH,
            client
                .session()
                .url(&format!("{}/{}", members, grant.member.id())),
        )
        .json(json!({ "role": grant.role.as_str() })),
    };
    request
        .header("Content-Type", "application/json")
        .header("X-Requested-With", "XMLHttpRequest")
}

async fn apply_grant<T: Transport>(
    client: &JobClient<T>,
    resource: Resource,
    id: &str,
    grant: &Grant,
) -> Result<()> {
    client
        .send_authorized(grant_request(client, resource, id, grant))
        .await?
        .error_for_status()?;
    info!(
        member = %grant.member,
        role = grant.role.as_str(),
        "Granted {} {}",
        resource.singular(),
        id
    );
    Ok(())
}

pub async fn grant_members<T: Transport>(
    client: &JobClient<T>,
    resource: Resource,
    id: &str,
    grants: &[Grant],
) -> PipelineReport<GrantSummary> {
    let mut runner = StageRunner::new("grant");

    let results = runner
        .stage("grant members", async {
            let outcomes = join_all(
                grants
                    .iter()
                    .map(|grant| apply_grant(client, resource, id, grant)),
            )
            .await;
            let results: Vec<GrantResult> = grants
                .iter()
                .zip(outcomes)
                .map(|(grant, outcome)| {
                    if let Err(err) = &outcome {
                        warn!(member = %grant.member, error = %err, "Grant failed");
                    }
                    GrantResult {
                        grant: grant.clone(),
                        error: outcome.err().map(|e| e.to_string()),
                    }
                })
                .collect();
            Ok(results)
        })
        .await;

    let results = match results {
        Ok(results) => results,
        Err(err) => return runner.fail(err),
    };

    let summary = GrantSummary {
        resource,
        id: id.to_string(),
        results,
    };
    let failed = summary.failed();
    let total = summary.results.len();
    let outcome = match failed {
        0 => Outcome::Success,
        n if n == total => Outcome::Failure,
        _ => Outcome::PartialFailure,
    };
    let detail = (failed > 0).then(|| format!("{} of {} grant(s) failed", failed, total));

    let mut report = runner.finish_with(summary, outcome, detail.clone());
    if outcome == Outcome::Failure {
        report.error = detail.map(JobError::Validation);
    }
    report
}

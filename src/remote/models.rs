// ABOUTME: Job lifecycle state and the operation payloads sent to the content service
// ABOUTME: Payloads are serialized to JSON; Job is mutated in place by each poll

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use super::kind::{JobKind, PublishTarget, Resource};

/// Canonical job state, normalized from every source vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Progress {
    Submitted,
    InProgress,
    Blocked,
    Succeeded,
    Failed,
    Aborted,
}

impl Progress {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Progress::Blocked | Progress::Succeeded | Progress::Failed | Progress::Aborted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Progress::Submitted => "submitted",
            Progress::InProgress => "in-progress",
            Progress::Blocked => "blocked",
            Progress::Succeeded => "succeeded",
            Progress::Failed => "failed",
            Progress::Aborted => "aborted",
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded status payload, before it is applied to a [`Job`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub progress: Option<Progress>,
    pub completed: Option<bool>,
    pub percentage: Option<u8>,
    pub state: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Job {
    id: String,
    kind: JobKind,
    status_location: String,
    approval_gated: bool,
    pub progress: Progress,
    pub completed_percentage: Option<u8>,
    /// Final summary such as `allCompleted`, kept apart from `progress`.
    pub state: Option<String>,
    pub message: Option<String>,
    /// Most recent raw status payload, used for report and validation extraction.
    pub payload: Value,
}

impl Job {
    pub fn new(id: impl Into<String>, kind: JobKind, status_location: impl Into<String>) -> Self {
        let status_location = status_location.into();
        let approval_gated = is_approval_location(&status_location);
        Self {
            id: id.into(),
            kind,
            status_location,
            approval_gated,
            progress: Progress::Submitted,
            completed_percentage: None,
            state: None,
            message: None,
            payload: Value::Null,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn status_location(&self) -> &str {
        &self.status_location
    }

    /// True when the handle points at a governance approval request rather than a job.
    pub fn is_approval_gated(&self) -> bool {
        self.approval_gated
    }

    /// Applies one decoded poll response. A terminal job ignores further updates.
    pub fn observe(&mut self, snapshot: StatusSnapshot, payload: Value) -> Progress {
        if self.progress.is_terminal() {
            tracing::debug!(
                job_id = %self.id,
                progress = %self.progress,
                "Ignoring update for terminal job"
            );
            return self.progress;
        }

        self.payload = payload;
        if let Some(pct) = snapshot.percentage {
            if let Some(previous) = self.completed_percentage {
                if pct < previous {
                    tracing::debug!(
                        job_id = %self.id,
                        previous,
                        current = pct,
                        "Completed percentage went backwards"
                    );
                }
            }
            self.completed_percentage = Some(pct);
        }
        if snapshot.state.is_some() {
            self.state = snapshot.state;
        }
        if snapshot.message.is_some() {
            self.message = snapshot.message;
        }

        self.progress = match snapshot.progress {
            None => {
                if self.message.is_none() {
                    self.message = Some("status response carried no progress field".to_string());
                }
                Progress::Failed
            }
            Some(Progress::Succeeded) if snapshot.completed.unwrap_or(true) => Progress::Succeeded,
            Some(Progress::Succeeded) => Progress::InProgress,
            Some(Progress::Submitted) if self.approval_gated => Progress::Blocked,
            Some(progress) => progress,
        };
        self.progress
    }
}

/// Governance-gated creations hand back a request resource instead of a job.
pub fn is_approval_location(location: &str) -> bool {
    location.contains("/requests/")
}

/// Result of one submission call.
#[derive(Debug, Clone)]
pub enum Submission {
    /// HTTP 200 without a status handle: the operation finished inline.
    Completed(Value),
    Accepted(Job),
}

/// Location of an archive that an import reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRef {
    pub file_id: String,
}

/// Every operation the submitter knows how to send. Identifiers are already resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    ExportSite {
        site_id: String,
        folder_id: String,
        name: String,
        policies: String,
    },
    ExportRepository {
        repository_id: String,
        folder_id: String,
        name: String,
    },
    ImportSite {
        archive: ArchiveRef,
        site_id: Option<String>,
        new_site_name: Option<String>,
        repository_id: Option<String>,
        policy: String,
    },
    ImportRepository {
        archive: ArchiveRef,
        repository_id: String,
        policy: String,
    },
    CreateArchive {
        folder_id: String,
        name: String,
        job_ids: Vec<String>,
    },
    CreateTemplate {
        site_id: String,
        name: String,
        include_unpublished_assets: bool,
    },
    CreateSite {
        name: String,
        template_id: String,
        repository_id: Option<String>,
        localization_policy_id: Option<String>,
        default_language: Option<String>,
        description: Option<String>,
    },
    Copy {
        resource: Resource,
        id: String,
        name: String,
        description: Option<String>,
    },
    PublishSite {
        site_id: String,
        only_updated: bool,
    },
    PublishTaxonomy {
        taxonomy_id: String,
        channels: Vec<String>,
    },
    TranslationExport {
        site_id: String,
        job_name: String,
        target_languages: Vec<String>,
    },
    TranslationValidate {
        job_name: String,
        file_id: String,
    },
    TranslationImport {
        job_name: String,
        file_id: String,
    },
    TranslationIngest {
        job_name: String,
        file_id: String,
    },
}

impl Operation {
    pub fn kind(&self) -> JobKind {
        match self {
            Operation::ExportSite { .. } => JobKind::ExportSite,
            Operation::ExportRepository { .. } => JobKind::ExportRepository,
            Operation::ImportSite { .. } => JobKind::ImportSite,
            Operation::ImportRepository { .. } => JobKind::ImportRepository,
            Operation::CreateArchive { .. } => JobKind::CreateArchive,
            Operation::CreateTemplate { .. } => JobKind::CreateTemplate,
            Operation::CreateSite { .. } => JobKind::CreateSite,
            Operation::Copy { resource, .. } => JobKind::Copy(*resource),
            Operation::PublishSite { .. } => JobKind::Publish(PublishTarget::Site),
            Operation::PublishTaxonomy { .. } => JobKind::Publish(PublishTarget::Taxonomy),
            Operation::TranslationExport { .. } => JobKind::TranslationExport,
            Operation::TranslationValidate { .. } => JobKind::TranslationValidate,
            Operation::TranslationImport { .. } => JobKind::TranslationImport,
            Operation::TranslationIngest { .. } => JobKind::TranslationIngest,
        }
    }

    /// Identifier substituted for `{id}` in REST endpoint templates.
    pub fn path_id(&self) -> Option<&str> {
        match self {
            Operation::Copy { id, .. } => Some(id),
            Operation::PublishSite { site_id, .. } => Some(site_id),
            Operation::PublishTaxonomy { taxonomy_id, .. } => Some(taxonomy_id),
            _ => None,
        }
    }

    /// JSON body for REST submissions.
    pub fn body(&self) -> Value {
        match self {
            Operation::ExportSite {
                site_id,
                folder_id,
                name,
                policies,
            } => export_body(
                name,
                folder_id,
                json!({ "type": "site", "site": { "id": site_id } }),
                Some(policies),
            ),
            Operation::ExportRepository {
                repository_id,
                folder_id,
                name,
            } => export_body(
                name,
                folder_id,
                json!({ "type": "repository", "repository": { "id": repository_id } }),
                None,
            ),
            Operation::ImportSite {
                archive,
                site_id,
                new_site_name,
                repository_id,
                policy,
            } => {
                let mut apply = Map::new();
                apply.insert("policies".to_string(), json!(policy));
                if let Some(name) = new_site_name {
                    apply.insert("site".to_string(), json!({ "name": name }));
                }
                if let Some(repo) = repository_id {
                    apply.insert("repository".to_string(), json!({ "id": repo }));
                }
                let select = match site_id {
                    Some(id) => json!({ "type": "site", "site": { "id": id } }),
                    None => json!({ "type": "site" }),
                };
                import_body(archive, select, Value::Object(apply))
            }
            Operation::ImportRepository {
                archive,
                repository_id,
                policy,
            } => import_body(
                archive,
                json!({ "type": "repository", "repository": { "id": repository_id } }),
                json!({ "policies": policy }),
            ),
            Operation::CreateArchive {
                folder_id,
                name,
                job_ids,
            } => json!({
                "name": name,
                "target": { "provider": "docs", "docs": { "folderId": folder_id } },
                "sources": job_ids
                    .iter()
                    .map(|id| json!({ "job": { "id": id } }))
                    .collect::<Vec<_>>(),
            }),
            Operation::CreateTemplate {
                site_id,
                name,
                include_unpublished_assets,
            } => json!({
                "name": name,
                "siteName": site_id,
                "includeUnpublishedAssets": include_unpublished_assets,
            }),
            Operation::CreateSite {
                name,
                template_id,
                repository_id,
                localization_policy_id,
                default_language,
                description,
            } => {
                let mut body = Map::new();
                body.insert("name".to_string(), json!(name));
                body.insert("template".to_string(), json!({ "id": template_id }));
                if let Some(repo) = repository_id {
                    body.insert("repository".to_string(), json!({ "id": repo }));
                }
                if let Some(policy) = localization_policy_id {
                    body.insert("localizationPolicy".to_string(), json!({ "id": policy }));
                }
                if let Some(lang) = default_language {
                    body.insert("defaultLanguage".to_string(), json!(lang));
                }
                if let Some(desc) = description {
                    body.insert("description".to_string(), json!(desc));
                }
                Value::Object(body)
            }
            Operation::Copy {
                name, description, ..
            } => match description {
                Some(desc) => json!({ "name": name, "description": desc }),
                None => json!({ "name": name }),
            },
            Operation::PublishSite { only_updated, .. } => {
                json!({ "onlyUpdatedItems": only_updated })
            }
            Operation::PublishTaxonomy { channels, .. } => json!({
                "channels": channels.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>(),
            }),
            Operation::TranslationExport { .. }
            | Operation::TranslationValidate { .. }
            | Operation::TranslationImport { .. }
            | Operation::TranslationIngest { .. } => Value::Object(self.integration_params()),
        }
    }

    /// `LocalData` parameters for integration-service submissions.
    pub fn integration_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        match self {
            Operation::TranslationExport {
                site_id,
                job_name,
                target_languages,
            } => {
                params.insert("siteId".to_string(), json!(site_id));
                params.insert("jobName".to_string(), json!(job_name));
                params.insert("targetLanguages".to_string(), json!(target_languages.join(",")));
            }
            Operation::TranslationValidate { job_name, file_id }
            | Operation::TranslationImport { job_name, file_id }
            | Operation::TranslationIngest { job_name, file_id } => {
                params.insert("jobName".to_string(), json!(job_name));
                params.insert("fFileGUID".to_string(), json!(file_id));
            }
            _ => {}
        }
        params
    }
}

fn export_body(name: &str, folder_id: &str, select: Value, policies: Option<&String>) -> Value {
    let mut source = Map::new();
    source.insert("select".to_string(), select);
    if let Some(policies) = policies {
        source.insert("apply".to_string(), json!({ "policies": policies }));
    }
    json!({
        "name": name,
        "target": { "provider": "docs", "docs": { "folderId": folder_id } },
        "sources": [Value::Object(source)],
    })
}

fn import_body(archive: &ArchiveRef, select: Value, apply: Value) -> Value {
    json!({
        "source": { "provider": "docs", "docs": { "fileId": archive.file_id } },
        "targets": [{ "select": select, "apply": apply }],
    })
}

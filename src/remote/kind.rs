// ABOUTME: Closed set of job kinds and the table mapping each to endpoint, vocabulary and cadence
// ABOUTME: Replaces string dispatch on resource names with exhaustive matches

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::PollingConfig;

/// Resource families that the sites management API can copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Sites,
    Templates,
    Themes,
    Components,
}

impl Resource {
    pub fn plural(&self) -> &'static str {
        match self {
            Resource::Sites => "sites",
            Resource::Templates => "templates",
            Resource::Themes => "themes",
            Resource::Components => "components",
        }
    }

    pub fn singular(&self) -> &'static str {
        match self {
            Resource::Sites => "site",
            Resource::Templates => "template",
            Resource::Themes => "theme",
            Resource::Components => "component",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishTarget {
    Site,
    Taxonomy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    ExportSite,
    ExportRepository,
    ImportSite,
    ImportRepository,
    CreateArchive,
    CreateTemplate,
    CreateSite,
    Copy(Resource),
    Publish(PublishTarget),
    TranslationExport,
    TranslationValidate,
    TranslationImport,
    TranslationIngest,
}

/// Where a kind is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// REST path; `{id}` is replaced with the operation's target identifier.
    Rest(String),
    /// Legacy integration service, addressed by `IdcService` name.
    Integration(&'static str),
}

/// Shape the status payload is expected to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    /// Direct `progress` / `state` / `completed` fields.
    Progress,
    /// `LocalData` plus a columnar `fields`/`rows` result set.
    Columnar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Default,
    Import,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindSpec {
    pub endpoint: Endpoint,
    pub vocabulary: Vocabulary,
    pub cadence: Cadence,
    /// Projection passed as `?fields=` when polling.
    pub status_fields: Option<&'static str>,
}

const EXPORTS_PATH: &str = "/system/export/api/v1/exports";
const IMPORTS_PATH: &str = "/system/export/api/v1/imports";
const ARCHIVES_PATH: &str = "/system/export/api/v1/archives";
const SITES_MANAGEMENT: &str = "/sites/management/api/v1";
const TAXONOMIES_PATH: &str = "/content/management/api/v1.1/taxonomies";

const EXPORT_STATUS_FIELDS: &str =
    "id,name,progress,state,completed,completedPercentage,message,error,reports,target";
const IMPORT_STATUS_FIELDS: &str = concat!(
    "id,name,progress,state,completed,completedPercentage,message,error,reports,",
    "validationSummary,validationResults"
);

impl JobKind {
    pub fn spec(&self) -> KindSpec {
        let rest = |path: String, cadence, fields| KindSpec {
            endpoint: Endpoint::Rest(path),
            vocabulary: Vocabulary::Progress,
            cadence,
            status_fields: fields,
        };
        let integration = |service| KindSpec {
            endpoint: Endpoint::Integration(service),
            vocabulary: Vocabulary::Columnar,
            cadence: Cadence::Default,
            status_fields: None,
        };

        match self {
            JobKind::ExportSite | JobKind::ExportRepository => {
                rest(EXPORTS_PATH.to_string(), Cadence::Default, Some(EXPORT_STATUS_FIELDS))
            }
            JobKind::ImportSite | JobKind::ImportRepository => {
                rest(IMPORTS_PATH.to_string(), Cadence::Import, Some(IMPORT_STATUS_FIELDS))
            }
            JobKind::CreateArchive => {
                rest(ARCHIVES_PATH.to_string(), Cadence::Default, Some(EXPORT_STATUS_FIELDS))
            }
            JobKind::CreateTemplate => {
                rest(format!("{}/templates", SITES_MANAGEMENT), Cadence::Default, None)
            }
            JobKind::CreateSite => {
                rest(format!("{}/sites", SITES_MANAGEMENT), Cadence::Default, None)
            }
            JobKind::Copy(resource) => rest(
                format!("{}/{}/{{id}}/copy", SITES_MANAGEMENT, resource.plural()),
                Cadence::Default,
                None,
            ),
            JobKind::Publish(PublishTarget::Site) => {
                rest(format!("{}/sites/{{id}}/publish", SITES_MANAGEMENT), Cadence::Default, None)
            }
            JobKind::Publish(PublishTarget::Taxonomy) => {
                rest(format!("{}/{{id}}/publish", TAXONOMIES_PATH), Cadence::Default, None)
            }
            JobKind::TranslationExport => integration("SCS_EXPORT_SITE_TRANS"),
            JobKind::TranslationValidate => integration("SCS_VALIDATE_SITE_TRANS"),
            JobKind::TranslationImport => integration("SCS_IMPORT_SITE_TRANS"),
            JobKind::TranslationIngest => integration("SCS_INGEST_SITE_TRANS"),
        }
    }

    pub fn all() -> Vec<JobKind> {
        let mut kinds = vec![
            JobKind::ExportSite,
            JobKind::ExportRepository,
            JobKind::ImportSite,
            JobKind::ImportRepository,
            JobKind::CreateArchive,
            JobKind::CreateTemplate,
            JobKind::CreateSite,
        ];
        kinds.extend(
            [Resource::Sites, Resource::Templates, Resource::Themes, Resource::Components]
                .into_iter()
                .map(JobKind::Copy),
        );
        kinds.extend([
            JobKind::Publish(PublishTarget::Site),
            JobKind::Publish(PublishTarget::Taxonomy),
            JobKind::TranslationExport,
            JobKind::TranslationValidate,
            JobKind::TranslationImport,
            JobKind::TranslationIngest,
        ]);
        kinds
    }

    pub fn poll_interval(&self, polling: &PollingConfig) -> Duration {
        match self.spec().cadence {
            Cadence::Default => polling.interval(),
            Cadence::Import => polling.import_interval(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            JobKind::ExportSite => "export-site".to_string(),
            JobKind::ExportRepository => "export-repository".to_string(),
            JobKind::ImportSite => "import-site".to_string(),
            JobKind::ImportRepository => "import-repository".to_string(),
            JobKind::CreateArchive => "create-archive".to_string(),
            JobKind::CreateTemplate => "create-template".to_string(),
            JobKind::CreateSite => "create-site".to_string(),
            JobKind::Copy(resource) => format!("copy-{}", resource.singular()),
            JobKind::Publish(PublishTarget::Site) => "publish-site".to_string(),
            JobKind::Publish(PublishTarget::Taxonomy) => "publish-taxonomy".to_string(),
            JobKind::TranslationExport => "translation-export".to_string(),
            JobKind::TranslationValidate => "translation-validate".to_string(),
            JobKind::TranslationImport => "translation-import".to_string(),
            JobKind::TranslationIngest => "translation-ingest".to_string(),
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = crate::error::JobError;

    /// Parses a label such as `copy-theme` back into its kind.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::all()
            .into_iter()
            .find(|kind| kind.label() == s)
            .ok_or_else(|| crate::error::JobError::Config(format!("unknown job kind {}", s)))
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_endpoint_per_resource() {
        assert_eq!(
            JobKind::Copy(Resource::Themes).spec().endpoint,
            Endpoint::Rest("/sites/management/api/v1/themes/{id}/copy".to_string())
        );
        assert_eq!(JobKind::Copy(Resource::Components).label(), "copy-component");
    }

    #[test]
    fn test_import_kinds_use_import_cadence() {
        let polling = PollingConfig::default();
        assert_eq!(
            JobKind::ImportSite.poll_interval(&polling),
            Duration::from_millis(10000)
        );
        assert_eq!(
            JobKind::ExportSite.poll_interval(&polling),
            Duration::from_millis(5000)
        );
        assert_eq!(
            JobKind::Publish(PublishTarget::Site).poll_interval(&polling),
            Duration::from_millis(5000)
        );
    }

    #[test]
    fn test_translation_kinds_are_columnar() {
        for kind in [
            JobKind::TranslationExport,
            JobKind::TranslationValidate,
            JobKind::TranslationImport,
            JobKind::TranslationIngest,
        ] {
            let spec = kind.spec();
            assert_eq!(spec.vocabulary, Vocabulary::Columnar);
            assert!(matches!(spec.endpoint, Endpoint::Integration(_)));
        }
    }

    #[test]
    fn test_label_parses_back() {
        for kind in JobKind::all() {
            assert_eq!(kind.label().parse::<JobKind>().unwrap(), kind);
        }
        assert!("copy-channel".parse::<JobKind>().is_err());
    }
}

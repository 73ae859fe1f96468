// ABOUTME: Translation connector connection record and job state in the connector's own vocabulary
// ABOUTME: Connector status is never mapped onto the canonical Progress enum

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Registered connector, loaded from the local connection store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorConnection {
    pub name: String,
    pub url: String,
    pub user: String,
    pub password: String,
    /// Connector-specific values sent as request headers.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectorStatus {
    Translated,
    Failed,
    /// Any other marker the connector reports while work is ongoing.
    Working(String),
}

impl ConnectorStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectorStatus::Translated | ConnectorStatus::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConnectorStatus::Translated => "TRANSLATED",
            ConnectorStatus::Failed => "FAILED",
            ConnectorStatus::Working(marker) => marker,
        }
    }
}

impl From<String> for ConnectorStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "TRANSLATED" => ConnectorStatus::Translated,
            "FAILED" => ConnectorStatus::Failed,
            _ => ConnectorStatus::Working(value),
        }
    }
}

impl From<ConnectorStatus> for String {
    fn from(status: ConnectorStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `properties` object returned by every connector job endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorJob {
    pub id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "unknown_status")]
    pub status: ConnectorStatus,
    #[serde(default, deserialize_with = "lenient_percentage")]
    pub progress: Option<u8>,
    #[serde(default)]
    pub error_message: Option<String>,
}

fn unknown_status() -> ConnectorStatus {
    ConnectorStatus::Working("UNKNOWN".to_string())
}

fn lenient_percentage<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(raw.map(|v| v.clamp(0.0, 100.0).round() as u8))
}

impl ConnectorJob {
    /// Status text shown to users, e.g. `INPROGRESS (40%)`.
    pub fn display_status(&self) -> String {
        match (&self.status, self.progress) {
            (ConnectorStatus::Working(_), Some(pct)) => format!("{} ({}%)", self.status, pct),
            _ => self.status.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_vocabulary() {
        assert_eq!(ConnectorStatus::from("TRANSLATED".to_string()), ConnectorStatus::Translated);
        assert_eq!(ConnectorStatus::from("FAILED".to_string()), ConnectorStatus::Failed);
        let working = ConnectorStatus::from("SENDING".to_string());
        assert!(!working.is_terminal());
        assert_eq!(working.as_str(), "SENDING");
    }

    #[test]
    fn test_job_properties_decode() {
        let job: ConnectorJob = serde_json::from_value(json!({
            "id": "cj-1",
            "projectId": "p-9",
            "status": "INPROGRESS",
            "progress": "40"
        }))
        .unwrap();
        assert_eq!(job.project_id.as_deref(), Some("p-9"));
        assert_eq!(job.progress, Some(40));
        assert_eq!(job.display_status(), "INPROGRESS (40%)");
    }

    #[test]
    fn test_job_without_status() {
        let job: ConnectorJob = serde_json::from_value(json!({ "id": "cj-2" })).unwrap();
        assert_eq!(job.status.as_str(), "UNKNOWN");
        assert_eq!(job.progress, None);
    }
}

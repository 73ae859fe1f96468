// ABOUTME: Local record linking a translation job to its connector job, persisted as JSON
// ABOUTME: The explicit status field lets a later invocation resume without resubmitting

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{JobError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Sent,
    Translated,
    Ingested,
    Failed,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            RecordStatus::Sent => "SENT",
            RecordStatus::Translated => "TRANSLATED",
            RecordStatus::Ingested => "INGESTED",
            RecordStatus::Failed => "FAILED",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorJobRecord {
    pub job_name: String,
    pub connector: String,
    pub connector_job_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub status: RecordStatus,
}

/// File stem for a job name. ASCII letters, digits and `-` pass through; every
/// other byte becomes `_XX`, so distinct names never share a file.
pub fn file_stem(job_name: &str) -> String {
    let mut stem = String::with_capacity(job_name.len());
    for byte in job_name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{:02X}", byte));
        }
    }
    stem
}

pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, job_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(job_name)))
    }

    pub fn save(&self, record: &ConnectorJobRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| JobError::Io(format!("failed to encode job record: {}", e)))?;
        std::fs::write(self.path_for(&record.job_name), content)?;
        Ok(())
    }

    pub fn load(&self, job_name: &str) -> Result<Option<ConnectorJobRecord>> {
        let path = self.path_for(job_name);
        if !path.exists() {
            return Ok(None);
        }
        read_record(&path).map(Some)
    }

    /// Every stored record, sorted by job name.
    pub fn list(&self) -> Result<Vec<ConnectorJobRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                records.push(read_record(&path)?);
            }
        }
        records.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        Ok(records)
    }

    pub fn update_status(
        &self,
        record: &mut ConnectorJobRecord,
        status: RecordStatus,
    ) -> Result<()> {
        record.status = status;
        self.save(record)
    }
}

fn read_record(path: &Path) -> Result<ConnectorJobRecord> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| JobError::Io(format!("invalid job record {}: {}", path.display(), e)))
}

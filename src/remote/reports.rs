// ABOUTME: Aggregates report download URLs, validation diagnostics and failure messages
// ABOUTME: Summary counts and per-entity results are extracted independently and never merged

use serde::Serialize;
use serde_json::Value;

use super::models::Job;

/// Error/warning/info counts for one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub entity_type: String,
    pub error: u64,
    pub warning: u64,
    pub info: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationMessage {
    pub level: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityValidation {
    pub entity_type: String,
    pub entity_name: String,
    pub messages: Vec<ValidationMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// From `validationSummary.messagesByEntityTypes`.
    pub summary: Option<Vec<EntityCounts>>,
    /// From `validationResults.items`.
    pub results: Option<Vec<EntityValidation>>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.results.is_none()
    }

    pub fn error_count(&self) -> u64 {
        let from_summary: u64 = self
            .summary
            .iter()
            .flatten()
            .map(|counts| counts.error)
            .sum();
        let from_results = self
            .results
            .iter()
            .flatten()
            .flat_map(|entity| entity.messages.iter())
            .filter(|m| m.level.eq_ignore_ascii_case("error"))
            .count() as u64;
        from_summary.max(from_results)
    }

    pub fn has_problems(&self) -> bool {
        let summary_problems = self
            .summary
            .iter()
            .flatten()
            .any(|c| c.error > 0 || c.warning > 0);
        let result_problems = self
            .results
            .iter()
            .flatten()
            .any(|e| !e.messages.is_empty());
        summary_problems || result_problems
    }

    /// One line per entity type, then one line per message.
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for counts in self.summary.iter().flatten() {
            lines.push(format!(
                "{}: {} error(s), {} warning(s), {} info",
                counts.entity_type, counts.error, counts.warning, counts.info
            ));
        }
        for entity in self.results.iter().flatten() {
            for message in &entity.messages {
                lines.push(format!(
                    "{} {} [{}] {}",
                    entity.entity_type, entity.entity_name, message.level, message.text
                ));
            }
        }
        lines
    }
}

/// Status URL with query string and trailing slash removed.
pub fn status_url_stem(status_url: &str) -> &str {
    let without_query = status_url.split('?').next().unwrap_or(status_url);
    without_query.trim_end_matches('/')
}

/// Download URL for every report attached to a status payload.
///
/// Accepts `reports.items[]` or a bare `reports[]` array; empty when absent.
pub fn extract_reports(stem: &str, payload: &Value) -> Vec<String> {
    let target = job_target(payload);
    let items = match target.get("reports") {
        Some(Value::Array(items)) => items,
        Some(reports) => match reports.get("items").and_then(Value::as_array) {
            Some(items) => items,
            None => return Vec::new(),
        },
        None => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(id) => Some(id.clone()),
            other => other.get("id").and_then(Value::as_str).map(str::to_string),
        })
        .map(|id| format!("{}/reports/{}/package", status_url_stem(stem), id))
        .collect()
}

pub fn job_reports(job: &Job) -> Vec<String> {
    extract_reports(job.status_location(), &job.payload)
}

pub fn extract_validation(payload: &Value) -> ValidationReport {
    let target = job_target(payload);
    ValidationReport {
        summary: target
            .get("validationSummary")
            .and_then(|s| s.get("messagesByEntityTypes"))
            .map(summary_counts),
        results: target
            .get("validationResults")
            .and_then(|r| r.get("items"))
            .and_then(Value::as_array)
            .map(|items| items.iter().map(entity_validation).collect()),
    }
}

/// Failure text preference: `message`, `error.detail`, `error.title`, `LocalData.StatusMessage`.
pub fn failure_message(payload: &Value) -> Option<String> {
    let candidates = [
        payload.get("message"),
        payload.get("error").and_then(|e| e.get("detail")),
        payload.get("error").and_then(|e| e.get("title")),
        payload
            .get("LocalData")
            .and_then(|ld| ld.get("StatusMessage")),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn job_target(payload: &Value) -> &Value {
    match payload.get("job") {
        Some(job @ Value::Object(_)) => job,
        _ => payload,
    }
}

fn summary_counts(by_type: &Value) -> Vec<EntityCounts> {
    match by_type {
        Value::Array(entries) => entries
            .iter()
            .map(|entry| {
                let entity_type = entry
                    .get("entityType")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                counts_for(entity_type, entry)
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(entity_type, entry)| counts_for(entity_type, entry))
            .collect(),
        _ => Vec::new(),
    }
}

fn counts_for(entity_type: &str, entry: &Value) -> EntityCounts {
    let source = entry.get("counts").unwrap_or(entry);
    let count = |level: &str| source.get(level).and_then(Value::as_u64).unwrap_or(0);
    EntityCounts {
        entity_type: entity_type.to_string(),
        error: count("error"),
        warning: count("warning"),
        info: count("info"),
    }
}

fn entity_validation(item: &Value) -> EntityValidation {
    let text_of = |v: &Value, keys: &[&str]| {
        keys.iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string()
    };

    let messages = item
        .get("messages")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .map(|m| ValidationMessage {
                    level: text_of(m, &["level", "severity"]),
                    text: text_of(m, &["text", "message"]),
                })
                .collect()
        })
        .unwrap_or_default();

    EntityValidation {
        entity_type: text_of(item, &["entityType"]),
        entity_name: text_of(item, &["entityName", "name"]),
        messages,
    }
}

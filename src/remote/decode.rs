// ABOUTME: Normalizes heterogeneous status payloads into one canonical snapshot
// ABOUTME: Handles direct progress/state fields, a nested job envelope, and columnar result sets

use serde_json::{Map, Value};

use super::integration;
use super::kind::Vocabulary;
use super::models::{Progress, StatusSnapshot};
use super::reports;

/// Fields that may carry the job state, tried in this order.
const PROGRESS_KEYS: [&str; 4] = ["progress", "JobStatus", "state", "status"];
const PERCENTAGE_KEYS: [&str; 3] = ["completedPercentage", "JobPercentage", "percentage"];

/// Maps one source token (`succeeded`, `COMPLETE`, `inProgress`, ...) onto the canonical enum.
///
/// Any non-empty token that is not recognised counts as in-progress.
pub fn progress_from_token(token: &str) -> Option<Progress> {
    let normalized: String = token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    let progress = match normalized.as_str() {
        "" => return None,
        "succeeded" | "success" | "successful" | "complete" | "completed" | "done"
        | "allcompleted" | "somecompleted" | "approved" => Progress::Succeeded,
        "failed" | "failure" | "error" | "errored" | "rejected" | "nonecompleted" => {
            Progress::Failed
        }
        "aborted" | "abort" | "cancelled" | "canceled" => Progress::Aborted,
        "blocked" => Progress::Blocked,
        "submitted" | "pending" | "new" | "queued" | "created" | "accepted" | "notstarted" => {
            Progress::Submitted
        }
        _ => Progress::InProgress,
    };
    Some(progress)
}

/// Builds a name→value map from parallel field descriptors and rows.
///
/// Only row 0 is read; the status protocol never returns more than one row for
/// a job, and extra rows are ignored. Fields past the end of row 0 map to `Null`.
/// Field descriptors may be bare strings or objects with a `name`.
pub fn decode_columnar(fields: &[Value], rows: &[Value]) -> Map<String, Value> {
    let first_row = rows.first().and_then(Value::as_array);
    fields
        .iter()
        .enumerate()
        .filter_map(|(idx, field)| {
            let name = match field {
                Value::String(s) => s.as_str(),
                Value::Object(obj) => obj.get("name").and_then(Value::as_str)?,
                _ => return None,
            };
            let value = first_row
                .and_then(|row| row.get(idx))
                .cloned()
                .unwrap_or(Value::Null);
            Some((name.to_string(), value))
        })
        .collect()
}

/// Finds a columnar envelope and flattens it.
///
/// Looks at a top-level `fields`/`rows` pair first, then at `ResultSets`,
/// preferring the `JobInfo` set when several are present.
pub fn columnar_envelope(payload: &Value) -> Option<Map<String, Value>> {
    let as_pair = |set: &Value| -> Option<Map<String, Value>> {
        let fields = set.get("fields")?.as_array()?;
        let rows = set.get("rows")?.as_array()?;
        Some(decode_columnar(fields, rows))
    };

    if let Some(map) = as_pair(payload) {
        return Some(map);
    }

    let sets = payload.get("ResultSets")?.as_object()?;
    if let Some(map) = sets.get("JobInfo").and_then(as_pair) {
        return Some(map);
    }
    sets.values().find_map(as_pair)
}

/// Decodes any observed status payload shape into a snapshot.
///
/// Integration envelopes (`LocalData` or a columnar table) are tried first,
/// then direct fields and the nested `job` envelope.
pub fn decode_status(payload: &Value) -> StatusSnapshot {
    decode_integration(payload).unwrap_or_else(|| decode_rest(payload))
}

/// Decodes a payload in the vocabulary its job kind is known to speak.
pub fn decode_status_as(vocabulary: Vocabulary, payload: &Value) -> StatusSnapshot {
    match vocabulary {
        Vocabulary::Progress => decode_rest(payload),
        Vocabulary::Columnar => decode_status(payload),
    }
}

fn decode_integration(payload: &Value) -> Option<StatusSnapshot> {
    let local = integration::local_data(payload);
    if let Some(code) = local.and_then(|ld| integration::status_code(ld)) {
        if code != "0" {
            return Some(StatusSnapshot {
                progress: Some(Progress::Failed),
                message: reports::failure_message(payload),
                ..StatusSnapshot::default()
            });
        }
    }

    let columns = columnar_envelope(payload)?;
    let mut snapshot = decode_direct(&Value::Object(columns));
    if snapshot.message.is_none() {
        snapshot.message = reports::failure_message(payload);
    }
    Some(snapshot)
}

fn decode_rest(payload: &Value) -> StatusSnapshot {
    let target = match payload.get("job") {
        Some(job @ Value::Object(_)) if !has_progress_key(payload) => job,
        _ => payload,
    };
    decode_direct(target)
}

/// Shortcut for callers that only care about the canonical state.
pub fn decode_progress(payload: &Value) -> Option<Progress> {
    decode_status(payload).progress
}

fn has_progress_key(value: &Value) -> bool {
    PROGRESS_KEYS.iter().any(|key| value.get(key).is_some())
}

fn decode_direct(target: &Value) -> StatusSnapshot {
    let progress = PROGRESS_KEYS
        .iter()
        .find_map(|key| target.get(key).and_then(Value::as_str))
        .and_then(progress_from_token);

    let percentage = PERCENTAGE_KEYS
        .iter()
        .find_map(|key| target.get(key).and_then(as_percentage));

    StatusSnapshot {
        progress,
        completed: target.get("completed").and_then(as_flag),
        percentage,
        state: target.get("state").and_then(Value::as_str).map(str::to_string),
        message: reports::failure_message(target),
    }
}

/// Accepts numbers or numeric strings, clamped to 0..=100.
fn as_percentage(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Some(raw.clamp(0.0, 100.0).round() as u8)
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

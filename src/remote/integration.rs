// ABOUTME: Envelope helpers for the legacy integration service (IdcService requests)
// ABOUTME: Success is LocalData.StatusCode == "0"; the job handle is LocalData.JobID

use reqwest::Url;
use serde_json::{json, Map, Value};

use crate::error::{JobError, Result};
use crate::session::Session;
use crate::transport::HttpRequest;

use super::decode;

pub const INTEGRATION_PATH: &str = "/documents/integration";
pub const JOB_STATUS_SERVICE: &str = "SCS_GET_BACKGROUND_SERVICE_JOB_STATUS";
pub const VALIDATION_RESULT_SERVICE: &str = "SCS_GET_TRANSLATION_VALIDATION_RESULT";

pub fn local_data(payload: &Value) -> Option<&Value> {
    payload.get("LocalData")
}

/// `StatusCode` as text; the service sends it as either a string or a number.
pub fn status_code(local: &Value) -> Option<String> {
    match local.get("StatusCode")? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn service_url(session: &Session, service: &str, params: &[(&str, &str)]) -> Result<String> {
    let mut query: Vec<(&str, &str)> = vec![("IdcService", service), ("IsJson", "1")];
    query.extend_from_slice(params);
    Url::parse_with_params(&session.url(INTEGRATION_PATH), &query)
        .map(|url| url.to_string())
        .map_err(|e| JobError::Config(format!("invalid integration service URL: {}", e)))
}

pub fn status_url(session: &Session, job_id: &str) -> Result<String> {
    service_url(session, JOB_STATUS_SERVICE, &[("JobID", job_id)])
}

/// POST request carrying the service parameters inside `LocalData`.
pub fn service_request(
    session: &Session,
    service: &str,
    params: Map<String, Value>,
) -> Result<HttpRequest> {
    let mut local = params;
    local.insert("IdcService".to_string(), json!(service));
    if let Some(token) = session.csrf_token() {
        local.insert("idcToken".to_string(), json!(token));
    }

    Ok(HttpRequest::post(service_url(session, service, &[])?)
        .headers(session.auth_headers())
        .header("X-Requested-With", "XMLHttpRequest")
        .json(json!({ "LocalData": local })))
}

/// Rejects payloads whose `StatusCode` is non-zero.
pub fn check_status(payload: &Value) -> Result<()> {
    let Some(local) = local_data(payload) else {
        return Err(JobError::protocol(
            None,
            "integration service response has no LocalData",
        ));
    };
    match status_code(local) {
        Some(code) if code == "0" => Ok(()),
        Some(code) => {
            let message = local
                .get("StatusMessage")
                .and_then(Value::as_str)
                .unwrap_or("integration service request failed");
            Err(JobError::protocol(None, format!("{} (StatusCode {})", message, code)))
        }
        None => Err(JobError::protocol(
            None,
            "integration service response has no StatusCode",
        )),
    }
}

/// Job handle from `LocalData.JobID`, falling back to the columnar `JobID`.
pub fn job_id(payload: &Value) -> Option<String> {
    let from_local = local_data(payload)
        .and_then(|ld| ld.get("JobID"))
        .and_then(Value::as_str)
        .map(str::to_string);

    from_local.or_else(|| {
        decode::columnar_envelope(payload)?
            .get("JobID")
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("https://h.example.com", "Bearer t")
            .unwrap()
            .with_csrf_token("csrf-1")
    }

    #[test]
    fn test_status_url_encodes_query() {
        let url = status_url(&session(), "J 1").unwrap();
        assert!(url.starts_with("https://h.example.com/documents/integration?"));
        assert!(url.contains("IdcService=SCS_GET_BACKGROUND_SERVICE_JOB_STATUS"));
        assert!(url.contains("JobID=J+1"));
    }

    #[test]
    fn test_service_request_carries_token() {
        let mut params = Map::new();
        params.insert("jobName".to_string(), json!("fr-job"));
        let request = service_request(&session(), "SCS_EXPORT_SITE_TRANS", params).unwrap();
        match &request.body {
            crate::transport::Body::Json(body) => {
                assert_eq!(body["LocalData"]["IdcService"], "SCS_EXPORT_SITE_TRANS");
                assert_eq!(body["LocalData"]["idcToken"], "csrf-1");
                assert_eq!(body["LocalData"]["jobName"], "fr-job");
            }
            other => panic!("unexpected body {:?}", other),
        }
        assert_eq!(request.header_value("X-Requested-With"), Some("XMLHttpRequest"));
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(&json!({ "LocalData": { "StatusCode": "0" } })).is_ok());
        assert!(check_status(&json!({ "LocalData": { "StatusCode": 0 } })).is_ok());
        let err = check_status(&json!({
            "LocalData": { "StatusCode": "-1", "StatusMessage": "no such site" }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("no such site"));
    }

    #[test]
    fn test_job_id_sources() {
        assert_eq!(
            job_id(&json!({ "LocalData": { "JobID": "J1" } })).as_deref(),
            Some("J1")
        );
        assert_eq!(
            job_id(&json!({
                "LocalData": {},
                "ResultSets": { "JobInfo": { "fields": ["JobID"], "rows": [["J2"]] } }
            }))
            .as_deref(),
            Some("J2")
        );
    }
}

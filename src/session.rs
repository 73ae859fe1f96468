// ABOUTME: Explicit session value threaded through every authenticated call
// ABOUTME: Fetched once per command by the login layer and never refreshed mid-pipeline

use crate::error::{JobError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    base_url: String,
    authorization: String,
    csrf_token: Option<String>,
}

impl Session {
    pub fn new(base_url: impl Into<String>, authorization: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(JobError::Config("server base URL is not set".to_string()));
        }
        let authorization = authorization.into();
        if authorization.trim().is_empty() {
            return Err(JobError::Config(
                "no Authorization value available for the session".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            authorization,
            csrf_token: None,
        })
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn authorization(&self) -> &str {
        &self.authorization
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    /// Absolute URLs (e.g. a `Location` header) pass through unchanged.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn auth_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Authorization".to_string(), self.authorization.clone())];
        if let Some(token) = &self.csrf_token {
            headers.push(("X-CSRF-TOKEN".to_string(), token.clone()));
        }
        headers
    }
}

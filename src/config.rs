// ABOUTME: TOML configuration for the target service, polling cadence and connector records
// ABOUTME: Every field has a default so an absent or partial file is valid

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const AUTHORIZATION_ENV: &str = "CONTENT_JOBS_AUTHORIZATION";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub polling: PollingConfig,
    pub http: HttpConfig,
    pub connector: ConnectorConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub authorization: Option<String>,
    pub csrf_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub import_interval_ms: u64,
    /// Zero disables the ceiling.
    pub max_wait_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            import_interval_ms: 10000,
            max_wait_secs: 3600,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn import_interval(&self) -> Duration {
        Duration::from_millis(self.import_interval_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        (self.max_wait_secs > 0).then(|| Duration::from_secs(self.max_wait_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub records_dir: PathBuf,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            records_dir: PathBuf::from(".content-jobs/connector"),
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse configuration")
    }

    /// Loads the file when present, falling back to defaults, then applies the
    /// authorization override from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                Self::from_toml(&content)?
            }
            _ => Self::default(),
        };

        if let Ok(value) = std::env::var(AUTHORIZATION_ENV) {
            if !value.trim().is_empty() {
                config.server.authorization = Some(value);
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.polling.interval(), Duration::from_millis(5000));
        assert_eq!(config.polling.import_interval(), Duration::from_millis(10000));
        assert_eq!(config.polling.max_wait(), Some(Duration::from_secs(3600)));
        assert_eq!(config.http.timeout_secs, 30);
    }

    #[test]
    fn test_partial_file_and_unbounded_wait() {
        let config = Config::from_toml(
            r#"
            [server]
            base_url = "https://content.example.com"
            csrf_token = "abc"

            [polling]
            interval_ms = 250
            max_wait_secs = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.server.base_url, "https://content.example.com");
        assert_eq!(config.server.csrf_token.as_deref(), Some("abc"));
        assert_eq!(config.polling.interval(), Duration::from_millis(250));
        assert_eq!(config.polling.import_interval_ms, 10000);
        assert_eq!(config.polling.max_wait(), None);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/content-jobs.toml"))).unwrap();
        assert_eq!(config.polling.interval_ms, 5000);
    }
}

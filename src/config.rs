//! Settings: where the API server is and how to talk to it
//!
//! Loaded from `~/.config/cascade/config.toml` (or `--config`); a missing
//! file means defaults. Command-line flags override the file.

use anyhow::{Context, Result};
use declarative::{ExecuteOptions, RetryConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::paths;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// API server base URL
    pub server: String,
    /// Bearer token; takes precedence over `token_file`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// File holding the bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<String>,
    /// Namespace for namespaced resources that do not name one
    pub namespace: String,
    /// Skip TLS certificate verification
    pub insecure: bool,
    /// Parallel submissions within one dependency rank
    pub jobs: usize,
    /// Per-call timeout in seconds, 0 disables it
    pub call_timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: "https://127.0.0.1:6443".to_string(),
            token: None,
            token_file: None,
            namespace: "default".to_string(),
            insecure: false,
            jobs: 1,
            call_timeout_secs: 30,
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

/// Flag values that override the settings file
#[derive(Debug, Default)]
pub struct Overrides {
    pub server: Option<String>,
    pub token: Option<String>,
    pub namespace: Option<String>,
}

impl Settings {
    /// Load settings from `path`, or from the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => paths::config_file()?,
        };

        if !path.exists() {
            log::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read settings file: {}", path.display()))?;
        let settings: Self =
            toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply command-line overrides
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(server) = overrides.server {
            self.server = server;
        }
        if let Some(token) = overrides.token {
            self.token = Some(token);
        }
        if let Some(namespace) = overrides.namespace {
            self.namespace = namespace;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            anyhow::bail!("namespace cannot be empty");
        }
        if self.jobs == 0 {
            anyhow::bail!("jobs must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.backoff_factor < 1.0 {
            anyhow::bail!("retry.backoff_factor must be >= 1.0");
        }
        Ok(())
    }

    /// Bearer token from `token`, else from `token_file`
    pub fn resolve_token(&self) -> Result<Option<String>> {
        if let Some(token) = &self.token {
            return Ok(Some(token.clone()));
        }
        let Some(file) = &self.token_file else {
            return Ok(None);
        };
        let path = paths::expand(file);
        let token = fs::read_to_string(&path)
            .with_context(|| format!("Could not read token file: {}", path.display()))?;
        Ok(Some(token.trim().to_string()))
    }

    /// Token for display: first four characters, rest masked
    pub fn masked_token(&self) -> Option<String> {
        self.token.as_ref().map(|token| {
            let visible: String = token.chars().take(4).collect();
            format!("{visible}{}", "*".repeat(token.chars().count().saturating_sub(4).min(12)))
        })
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            backoff_factor: self.retry.backoff_factor,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_secs > 0).then(|| Duration::from_secs(self.call_timeout_secs))
    }

    /// Submission options; `jobs` overrides the configured value
    pub fn execute_options(&self, jobs: Option<usize>) -> ExecuteOptions {
        ExecuteOptions {
            jobs: jobs.unwrap_or(self.jobs).max(1),
            retry: self.retry_config(),
            call_timeout: self.call_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_parse_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
server = "https://10.0.0.1:6443"
namespace = "storage"
jobs = 4
call_timeout_secs = 0

[retry]
max_attempts = 3
base_delay_ms = 100
"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.server, "https://10.0.0.1:6443");
        assert_eq!(settings.namespace, "storage");
        assert_eq!(settings.call_timeout(), None);

        let opts = settings.execute_options(None);
        assert_eq!(opts.jobs, 4);
        assert_eq!(opts.retry.max_attempts, 3);
        assert_eq!(opts.retry.base_delay, Duration::from_millis(100));
        assert!((opts.retry.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(settings.execute_options(Some(1)).jobs, 1);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "sever = \"typo\"\n").unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "jobs = 0\n").unwrap();
        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("jobs"));
    }

    #[test]
    fn test_overrides_win() {
        let mut settings = Settings::default();
        settings.apply(Overrides {
            server: Some("http://localhost:8001".to_string()),
            token: None,
            namespace: Some("nfs".to_string()),
        });
        assert_eq!(settings.server, "http://localhost:8001");
        assert_eq!(settings.namespace, "nfs");
        assert_eq!(settings.token, None);
    }

    #[test]
    fn test_token_file_and_mask() {
        let dir = TempDir::new().unwrap();
        let token_path = dir.path().join("token");
        fs::write(&token_path, "abcdefghij\n").unwrap();

        let mut settings = Settings {
            token_file: Some(token_path.display().to_string()),
            ..Settings::default()
        };
        assert_eq!(settings.resolve_token().unwrap().as_deref(), Some("abcdefghij"));
        assert_eq!(settings.masked_token(), None);

        settings.token = Some("abcdefghij".to_string());
        assert_eq!(settings.masked_token().as_deref(), Some("abcd******"));
    }
}

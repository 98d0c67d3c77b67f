//! Importer settings.
//!
//! Settings come from an optional JSON file, then environment variables
//! (a `.env` file is honoured):
//!
//! | Key | Environment | Default |
//! |-----|-------------|---------|
//! | `base_url` | `KORDIAM_BASE_URL` | - |
//! | `client_id` | `KORDIAM_CLIENT_ID` | - |
//! | `client_secret` | `KORDIAM_CLIENT_SECRET` | - |
//! | `token_endpoint` | `KORDIAM_TOKEN_ENDPOINT` | `/api/token` |
//! | `elements_endpoint` | `KORDIAM_ELEMENTS_ENDPOINT` | `/api/v1_0_1/elements/` |
//! | `timeout_secs` | `KORDIAM_TIMEOUT_SECS` | 30 |
//! | `refresh_margin_secs` | `KORDIAM_REFRESH_MARGIN_SECS` | 300 |
//!
//! Connection settings are only checked when a run needs the network.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::auth::DEFAULT_REFRESH_MARGIN_SECS;
use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_TOKEN_ENDPOINT: &str = "/api/token";
pub const DEFAULT_ELEMENTS_ENDPOINT: &str = "/api/v1_0_1/elements/";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Raw importer settings as loaded.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImporterConfig {
    pub base_url: Option<String>,
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    pub token_endpoint: String,
    pub elements_endpoint: String,
    #[serde(alias = "timeout")]
    pub timeout_secs: u64,
    pub refresh_margin_secs: i64,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            client_id: None,
            client_secret: None,
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            elements_endpoint: DEFAULT_ELEMENTS_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
        }
    }
}

impl fmt::Debug for ImporterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImporterConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("token_endpoint", &self.token_endpoint)
            .field("elements_endpoint", &self.elements_endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .field("refresh_margin_secs", &self.refresh_margin_secs)
            .finish()
    }
}

impl ImporterConfig {
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read `path` if it exists, otherwise start from defaults.
    pub fn from_file_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// File settings overridden by the process environment.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file_or_default(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override settings from `lookup` (the environment, or a map in tests).
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("KORDIAM_BASE_URL") {
            self.base_url = Some(v);
        }
        if let Some(v) = get("KORDIAM_CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Some(v) = get("KORDIAM_CLIENT_SECRET") {
            self.client_secret = Some(v);
        }
        if let Some(v) = get("KORDIAM_TOKEN_ENDPOINT") {
            self.token_endpoint = v;
        }
        if let Some(v) = get("KORDIAM_ELEMENTS_ENDPOINT") {
            self.elements_endpoint = v;
        }
        if let Some(v) = get("KORDIAM_TIMEOUT_SECS") {
            self.timeout_secs = v.trim().parse().map_err(|_| ConfigError::InvalidSetting {
                name: "timeout_secs",
                message: format!("'{}' is not a number of seconds", v),
            })?;
        }
        if let Some(v) = get("KORDIAM_REFRESH_MARGIN_SECS") {
            self.refresh_margin_secs = v.trim().parse().map_err(|_| ConfigError::InvalidSetting {
                name: "refresh_margin_secs",
                message: format!("'{}' is not a number of seconds", v),
            })?;
        }
        Ok(())
    }

    /// Validated connection settings for a networked run.
    pub fn connection(&self) -> ConfigResult<Connection> {
        fn required(value: &Option<String>, name: &'static str) -> ConfigResult<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(ConfigError::MissingSetting(name))
        }

        let base_url = required(&self.base_url, "base_url")?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidSetting {
                name: "base_url",
                message: format!("'{}' is not an http(s) URL", base_url),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "timeout_secs",
                message: "must be at least 1".to_string(),
            });
        }
        if self.refresh_margin_secs < 0 {
            return Err(ConfigError::InvalidSetting {
                name: "refresh_margin_secs",
                message: "must not be negative".to_string(),
            });
        }

        Ok(Connection {
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: required(&self.client_id, "client_id")?,
            client_secret: required(&self.client_secret, "client_secret")?,
            token_endpoint: self.token_endpoint.clone(),
            elements_endpoint: self.elements_endpoint.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            refresh_margin_secs: self.refresh_margin_secs,
        })
    }
}

/// Complete, validated connection settings.
#[derive(Clone)]
pub struct Connection {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: String,
    pub elements_endpoint: String,
    pub timeout: Duration,
    pub refresh_margin_secs: i64,
}

impl Connection {
    /// Connection with default endpoints and timeouts.
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            elements_endpoint: DEFAULT_ELEMENTS_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn join(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    pub fn token_url(&self) -> String {
        self.join(&self.token_endpoint)
    }

    pub fn elements_url(&self) -> String {
        self.join(&self.elements_endpoint)
    }

    /// URL of one element (`.../elements/{id}/`).
    pub fn element_url(&self, id: &str) -> String {
        format!("{}/{}/", self.elements_url().trim_end_matches('/'), id)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

//! read configuration from a file, the environment, or explicit values

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::errors::Error;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REFRESH_PATH: &str = "/auth/token/refresh/";
pub const DEFAULT_LOGIN_PATH: &str = "/auth/login/";
pub const DEFAULT_AUTH_PATHS: &[&str] = &["/auth/login/", "/auth/register/", "/auth/social/"];

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub base_url: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub refresh_path: Option<String>,
    #[serde(default)]
    pub login_path: Option<String>,
    /// Path prefixes that never carry a bearer token and never trigger a refresh.
    #[serde(default)]
    pub auth_paths: Option<Vec<String>>,
}

impl Config {
    pub fn from_values(base_url: impl Into<String>, timeout_secs: Option<u64>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs,
            refresh_path: None,
            login_path: None,
            auth_paths: None,
        }
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file '{}': {e}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// # ENV Vars
    /// * `API_BASE_URL` - Base URL every request path is joined onto (required)
    /// * `API_TIMEOUT_SECS` - Overall request timeout in seconds
    pub fn from_env() -> Result<Self, Error> {
        let base_url = std::env::var("API_BASE_URL")
            .map_err(|_| Error::Config("Missing API_BASE_URL env var".to_string()))?;
        let timeout_secs = match std::env::var("API_TIMEOUT_SECS") {
            Ok(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!("Invalid API_TIMEOUT_SECS '{raw}': {e}"))
            })?),
            Err(_) => None,
        };
        Ok(Self::from_values(base_url, timeout_secs))
    }

    pub fn with_auth_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auth_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = Some(path.into());
        self
    }

    /// Parses the base URL, rejecting empty or non-http(s) values.
    pub fn base_url(&self) -> Result<Url, Error> {
        let raw = self.base_url.trim();
        if raw.is_empty() {
            return Err(Error::Config("Base URL is not configured".into()));
        }
        let normalized = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        let url = Url::parse(&normalized)
            .map_err(|e| Error::Config(format!("Invalid base URL '{raw}': {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::Config(format!(
                "Unsupported base URL scheme '{other}' in '{raw}'"
            ))),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn refresh_path(&self) -> &str {
        self.refresh_path.as_deref().unwrap_or(DEFAULT_REFRESH_PATH)
    }

    pub fn login_path(&self) -> &str {
        self.login_path.as_deref().unwrap_or(DEFAULT_LOGIN_PATH)
    }

    pub fn auth_paths(&self) -> Vec<String> {
        match &self.auth_paths {
            Some(paths) => paths.clone(),
            None => DEFAULT_AUTH_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

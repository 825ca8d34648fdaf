#![forbid(unsafe_code)]

//! API client configuration.
//!
//! Values come from [`ApiConfig::default`] and may be overridden from the
//! environment with [`ApiConfig::from_env`]:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `BASEAPP_API_URL` | `base_url` |
//! | `BASEAPP_WORKER_NAME` | `worker_name` |

use std::fmt;

use url::Url;

/// Default API root.
pub const DEFAULT_API_URL: &str = "https://api.baseapp.tsl.io/v1/";

/// Default thread name for page fetch workers.
pub const DEFAULT_WORKER_NAME: &str = "baseapp-page-fetch";

pub const ENV_API_URL: &str = "BASEAPP_API_URL";
pub const ENV_WORKER_NAME: &str = "BASEAPP_WORKER_NAME";

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidBaseUrl { value: String, reason: url::ParseError },
    /// The base URL cannot carry a path (e.g. `mailto:`).
    NotABase(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl { value, reason } => {
                write!(f, "invalid api base url '{value}': {reason}")
            }
            Self::NotABase(value) => write!(f, "api base url '{value}' cannot be a base"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidBaseUrl { reason, .. } => Some(reason),
            Self::NotABase(_) => None,
        }
    }
}

/// Configuration shared by fetchers and paginators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// API root; always ends with `/` so endpoint paths join beneath it.
    pub base_url: Url,
    /// Thread name given to fetch workers.
    pub worker_name: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_API_URL).expect("default api url is valid"),
            worker_name: DEFAULT_WORKER_NAME.to_string(),
        }
    }
}

impl ApiConfig {
    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(ENV_API_URL) {
            config = config.with_base_url(&value)?;
        }
        if let Ok(value) = std::env::var(ENV_WORKER_NAME) {
            if !value.trim().is_empty() {
                config = config.with_worker_name(value.trim());
            }
        }
        Ok(config)
    }

    /// Set the API root. A trailing `/` is added when missing.
    pub fn with_base_url(mut self, value: &str) -> Result<Self, ConfigError> {
        self.base_url = normalize_base_url(value)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }
}

fn normalize_base_url(value: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(value.trim()).map_err(|reason| ConfigError::InvalidBaseUrl {
        value: value.to_string(),
        reason,
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::NotABase(value.to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_v1() {
        let config = ApiConfig::default();
        assert_eq!(config.base_url.as_str(), DEFAULT_API_URL);
        assert_eq!(config.worker_name, DEFAULT_WORKER_NAME);
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let config = ApiConfig::default()
            .with_base_url("https://api.baseapp.tsl.io/v2")
            .unwrap();
        assert_eq!(config.base_url.as_str(), "https://api.baseapp.tsl.io/v2/");
        assert_eq!(
            config.base_url.join("users").unwrap().as_str(),
            "https://api.baseapp.tsl.io/v2/users"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = ApiConfig::default().with_base_url("not a url").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
        assert!(err.to_string().contains("not a url"));
    }

    #[test]
    fn non_base_url_is_rejected() {
        let err = ApiConfig::default()
            .with_base_url("mailto:dev@example.com")
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotABase(_)));
    }

    #[test]
    fn worker_name_builder() {
        let config = ApiConfig::default().with_worker_name("users-fetch");
        assert_eq!(config.worker_name, "users-fetch");
    }
}

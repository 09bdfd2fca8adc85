//! Application configuration.
//!
//! A single JSON file supplies the curated list id, seed credentials,
//! and sync tuning. Loaded once at startup and passed by value; nothing
//! reads configuration from globals.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Smallest page size the list endpoint accepts.
pub const MIN_PAGE_SIZE: u32 = 10;

/// Largest page size the list endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 100;

fn default_max_results() -> u32 {
    50
}

fn default_scopes() -> String {
    "tweet.read users.read list.read offline.access".to_string()
}

/// Configuration for the timeline client.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Id of the curated list to mirror.
    pub list_id: String,
    /// Seed access token (may be blank when OAuth login is configured).
    #[serde(default)]
    pub access_token: String,
    /// Seed refresh token.
    #[serde(default)]
    pub refresh_token: String,
    /// OAuth client id.
    #[serde(default)]
    pub client_id: String,
    /// Loopback redirect URI for the OAuth flow.
    #[serde(default)]
    pub auth_redirect_uri: String,
    /// Space-separated authorization scopes.
    #[serde(default = "default_scopes")]
    pub auth_scopes: String,
    /// Base URL of the API, with or without trailing slash.
    pub api_base_url: String,
    /// Page size for delta fetches (clamped to 10..=100).
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Skip all network access; only retention runs.
    #[serde(default)]
    pub offline_mode: bool,
}

impl AppConfig {
    /// Loads and validates the configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the file is missing or unreadable,
    /// or when a required field is blank.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("invalid config file: {e}")))?;
        config.validated()
    }

    /// Applies validation and normalization to an already-parsed config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `list_id` or `api_base_url` is
    /// blank.
    pub fn validated(mut self) -> Result<Self> {
        if self.list_id.trim().is_empty() {
            return Err(Error::Config("list_id is required".into()));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(Error::Config("api_base_url is required".into()));
        }
        if !self.api_base_url.ends_with('/') {
            self.api_base_url.push('/');
        }
        self.max_results = self.max_results.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        Ok(self)
    }

    /// Whether the OAuth login flow can be started from this config.
    #[must_use]
    pub fn can_start_login(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.auth_redirect_uri.trim().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn minimal() -> AppConfig {
        serde_json::from_str(
            r#"{"list_id":"42","api_base_url":"https://api.x.com"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_and_normalization() {
        let config = minimal().validated().unwrap();
        assert_eq!(config.api_base_url, "https://api.x.com/");
        assert_eq!(config.max_results, 50);
        assert!(!config.offline_mode);
        assert!(config.auth_scopes.contains("offline.access"));
        assert!(!config.can_start_login());
    }

    #[test]
    fn test_max_results_is_clamped() {
        let mut config = minimal();
        config.max_results = 3;
        assert_eq!(config.validated().unwrap().max_results, 10);

        let mut config = minimal();
        config.max_results = 500;
        assert_eq!(config.validated().unwrap().max_results, 100);
    }

    #[test]
    fn test_required_fields() {
        let mut config = minimal();
        config.list_id = "  ".into();
        assert!(matches!(config.validated(), Err(Error::Config(_))));

        let mut config = minimal();
        config.api_base_url = String::new();
        assert!(matches!(config.validated(), Err(Error::Config(_))));
    }

    #[test]
    fn test_can_start_login_needs_client_and_redirect() {
        let mut config = minimal();
        config.client_id = "client".into();
        assert!(!config.can_start_login());
        config.auth_redirect_uri = "http://127.0.0.1:8976/callback".into();
        assert!(config.can_start_login());
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let result = AppConfig::load(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

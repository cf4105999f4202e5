//! Core synchronization library
//!
//! This crate provides the pieces shared by the sync engine and the daemon:
//! the dataset types pushed to the remote API, the submit error taxonomy,
//! the `RemoteSubmitter` contract and its reqwest-backed implementation.

pub mod api;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use api::{
    ApiClient, ApiClientBuilder, ApiError, AuthManager, Dataset, Record, RemoteSubmitter,
    SubmitError, SubmitErrorKind, TokenSet,
};

/// Connection settings for the remote API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Scheme and host of the API, e.g. `https://capounet.example`
    pub domain: String,
    pub client_id: u64,
    pub client_secret: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            domain: "http://localhost:8000".to_string(),
            client_id: 2,
            client_secret: String::new(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 { 30 }
fn default_connect_timeout_secs() -> u64 { 10 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_config_default() {
        let config = ApiConfig::default();
        assert_eq!(config.domain, "http://localhost:8000");
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_api_config_timeouts_default_when_missing() {
        let config: ApiConfig = serde_json::from_str(
            r#"{"domain": "https://api.test", "client_id": 7, "client_secret": "s3cret"}"#,
        )
        .unwrap();
        assert_eq!(config.client_id, 7);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.connect_timeout_secs, 10);
    }
}

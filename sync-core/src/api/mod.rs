//! Remote API module
//!
//! Wraps the REST API the CSV data is pushed to: OAuth2 password-grant
//! authentication, bearer-authenticated submissions and the error taxonomy
//! the sync engine reports on.

pub mod auth;
pub mod client;
pub mod error;
pub mod submit;
pub mod types;

// Re-export main types for convenience
pub use auth::{AuthManager, AuthState};
pub use client::{ApiClient, ApiClientBuilder};
pub use error::{ApiError, Result, SubmitError, SubmitErrorKind};
pub use submit::RemoteSubmitter;
pub use types::*;

/// Path prefix of every resource endpoint
pub const API_PATH: &str = "/api";

/// Path of the OAuth2 token endpoint
pub const TOKEN_PATH: &str = "/oauth/token";

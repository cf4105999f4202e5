use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One CSV data row, keyed by header name
pub type Record = BTreeMap<String, String>;

/// Rows of one CSV file, in file order
pub type Dataset = Vec<Record>;

/// Body of a submission request
#[derive(Debug, Clone, Serialize)]
pub struct SubmitPayload<'a> {
    pub data: &'a [Record],
}

/// Tokens returned by the OAuth2 token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// OAuth2 password grant form
#[derive(Debug, Clone, Serialize)]
pub struct PasswordGrant<'a> {
    pub grant_type: &'static str,
    pub client_id: u64,
    pub client_secret: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub scope: &'static str,
}

impl<'a> PasswordGrant<'a> {
    pub fn new(
        client_id: u64,
        client_secret: &'a str,
        username: &'a str,
        password: &'a str,
    ) -> Self {
        Self {
            grant_type: "password",
            client_id,
            client_secret,
            username,
            password,
            scope: "*",
        }
    }
}

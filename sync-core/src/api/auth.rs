use super::client::{check_response, endpoint_url};
use super::error::{ApiError, Result, SubmitError};
use super::types::{PasswordGrant, TokenSet};
use super::TOKEN_PATH;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub tokens: Option<TokenSet>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at,
            None => false,
        }
    }

    pub fn set_tokens(&mut self, tokens: TokenSet) {
        self.expires_at = tokens
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| Utc::now() + Duration::seconds(secs));
        self.tokens = Some(tokens);
    }

    pub fn clear(&mut self) {
        self.tokens = None;
        self.expires_at = None;
    }
}

/// Holds the bearer token used by submissions and obtains it through the
/// OAuth2 password grant.
#[derive(Clone)]
pub struct AuthManager {
    client: reqwest::Client,
    domain: String,
    client_id: u64,
    client_secret: String,
    state: Arc<RwLock<AuthState>>,
}

impl AuthManager {
    pub fn new(
        client: reqwest::Client,
        domain: impl Into<String>,
        client_id: u64,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            domain: domain.into(),
            client_id,
            client_secret: client_secret.into(),
            state: Arc::new(RwLock::new(AuthState::new())),
        }
    }

    /// Exchange user credentials for an access/refresh token pair
    pub async fn password_grant(&self, username: &str, password: &str) -> Result<TokenSet> {
        debug!("Requesting access token for user: {}", username);

        let url = endpoint_url(&self.domain, TOKEN_PATH)?;
        let form = PasswordGrant::new(self.client_id, &self.client_secret, username, password);

        let response = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(SubmitError::from)?;
        let response = check_response(response).await?;

        let tokens: TokenSet = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidTokenResponse(e.to_string()))?;

        if tokens.access_token.is_empty() {
            warn!("Token endpoint returned an empty access token");
            return Err(ApiError::InvalidTokenResponse("empty access_token".to_string()));
        }

        self.state.write().await.set_tokens(tokens.clone());

        debug!("Access token obtained");
        Ok(tokens)
    }

    /// Install tokens restored from a previous session
    pub async fn set_tokens(&self, tokens: TokenSet) {
        self.state.write().await.set_tokens(tokens);
    }

    pub async fn access_token(&self) -> Option<String> {
        let state = self.state.read().await;
        state.tokens.as_ref().map(|tokens| tokens.access_token.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        let state = self.state.read().await;
        state.is_authenticated() && !state.is_expired()
    }

    pub async fn logout(&self) {
        debug!("Clearing tokens");
        self.state.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(expires_in: Option<u64>) -> TokenSet {
        TokenSet {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_in,
            token_type: Some("Bearer".to_string()),
        }
    }

    #[test]
    fn test_state_expiry() {
        let mut state = AuthState::new();
        assert!(!state.is_authenticated());

        state.set_tokens(tokens(Some(3600)));
        assert!(state.is_authenticated());
        assert!(!state.is_expired());

        state.set_tokens(tokens(Some(0)));
        assert!(state.is_expired());

        state.set_tokens(tokens(None));
        assert!(!state.is_expired());

        state.clear();
        assert!(!state.is_authenticated());
    }

    #[tokio::test]
    async fn test_restored_tokens_are_used() {
        let manager =
            AuthManager::new(reqwest::Client::new(), "http://localhost:8000", 2, "secret");
        assert!(manager.access_token().await.is_none());

        manager.set_tokens(tokens(Some(3600))).await;
        assert_eq!(manager.access_token().await.as_deref(), Some("access"));
        assert!(manager.is_authenticated().await);

        manager.logout().await;
        assert!(!manager.is_authenticated().await);
    }
}

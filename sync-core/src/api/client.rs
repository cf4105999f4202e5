use super::{auth::AuthManager, error::*, submit::RemoteSubmitter, types::*, API_PATH};
use crate::ApiConfig;
use async_trait::async_trait;
use reqwest::ClientBuilder;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Longest server response body kept in an error detail
const MAX_DETAIL_LEN: usize = 200;

/// HTTP client for the resource endpoints of the remote API
pub struct ApiClient {
    /// Token holder shared with the login flow
    pub auth: AuthManager,

    http_client: reqwest::Client,

    /// Scheme and host of the API
    domain: String,
}

impl ApiClient {
    /// Create a new client with default timeouts
    pub fn new(domain: impl Into<String>) -> Result<Self> {
        ApiClientBuilder::new(domain)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
    }

    /// Create a client from the connection settings
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        ApiClientBuilder::new(config.domain.clone())
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .credentials(config.client_id, config.client_secret.clone())
            .build()
    }

    /// Create a new client around an existing HTTP client
    pub fn with_client(
        domain: impl Into<String>,
        http_client: reqwest::Client,
        client_id: u64,
        client_secret: impl Into<String>,
    ) -> Self {
        let domain = domain.into();
        let auth = AuthManager::new(http_client.clone(), domain.clone(), client_id, client_secret);

        Self {
            auth,
            http_client,
            domain,
        }
    }

    /// Full URL of an API resource
    pub fn resource_url(&self, resource_path: &str) -> std::result::Result<Url, SubmitError> {
        endpoint_url(&self.domain, &format!("{}{}", API_PATH, resource_path))
    }
}

#[async_trait]
impl RemoteSubmitter for ApiClient {
    async fn submit(
        &self,
        dataset: &[Record],
        resource_path: &str,
    ) -> std::result::Result<(), SubmitError> {
        let url = self.resource_url(resource_path)?;

        let token = self.auth.access_token().await.ok_or_else(|| {
            SubmitError::new(SubmitErrorKind::Unauthorized, "no access token, log in first")
        })?;

        debug!(url = %url, rows = dataset.len(), "Submitting dataset");

        let response = self
            .http_client
            .post(url)
            .bearer_auth(token)
            .json(&SubmitPayload { data: dataset })
            .send()
            .await?;

        check_response(response).await?;
        Ok(())
    }
}

/// Join the domain and an absolute path, rejecting domains without an HTTP scheme
pub(crate) fn endpoint_url(domain: &str, path: &str) -> std::result::Result<Url, SubmitError> {
    let raw = format!("{}{}", domain.trim_end_matches('/'), path);

    match Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        Ok(url) => Err(SubmitError::new(
            SubmitErrorKind::MissingScheme,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Err(SubmitError::new(SubmitErrorKind::MissingScheme, raw))
        }
        Err(e) => Err(SubmitError::new(SubmitErrorKind::InvalidUrl, e.to_string())),
    }
}

/// Turn a non-success response into its classified error
pub(crate) async fn check_response(
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, SubmitError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail: String = body.trim().chars().take(MAX_DETAIL_LEN).collect();
    Err(SubmitError::from_status(status.as_u16(), detail))
}

// Builder pattern for client configuration
pub struct ApiClientBuilder {
    domain: String,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    user_agent: Option<String>,
    client_id: u64,
    client_secret: String,
}

impl ApiClientBuilder {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            timeout: None,
            connect_timeout: None,
            user_agent: None,
            client_id: 0,
            client_secret: String::new(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// OAuth2 client credentials used by the password grant
    pub fn credentials(mut self, client_id: u64, client_secret: impl Into<String>) -> Self {
        self.client_id = client_id;
        self.client_secret = client_secret.into();
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let mut client_builder = ClientBuilder::new()
            .user_agent(concat!("csvsync/", env!("CARGO_PKG_VERSION")));

        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        if let Some(connect_timeout) = self.connect_timeout {
            client_builder = client_builder.connect_timeout(connect_timeout);
        }

        if let Some(user_agent) = self.user_agent {
            client_builder = client_builder.user_agent(user_agent);
        }

        let http_client = client_builder.build().map_err(SubmitError::from)?;

        Ok(ApiClient::with_client(
            self.domain,
            http_client,
            self.client_id,
            self.client_secret,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::post,
        Form, Json, Router,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn update(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let authorized = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(|value| value == "Bearer good-token")
            .unwrap_or(false);

        if !authorized {
            return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Unauthenticated."})));
        }

        let rows = body["data"].as_array().map(|rows| rows.len()).unwrap_or(0);
        (StatusCode::OK, Json(json!({"message": "ok", "rows": rows})))
    }

    async fn token(Form(form): Form<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
        let valid = form.get("grant_type").map(String::as_str) == Some("password")
            && form.get("scope").map(String::as_str) == Some("*")
            && form.get("client_id").map(String::as_str) == Some("2")
            && form.get("username").map(String::as_str) == Some("admin")
            && form.get("password").map(String::as_str) == Some("hunter2");

        if valid {
            (
                StatusCode::OK,
                Json(json!({
                    "token_type": "Bearer",
                    "expires_in": 3600,
                    "access_token": "good-token",
                    "refresh_token": "refresh-token"
                })),
            )
        } else {
            (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_credentials"})))
        }
    }

    async fn spawn_server() -> String {
        let app = Router::new()
            .route("/api/socios/update", post(update))
            .route("/api/broken", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/api/teapot", post(|| async { StatusCode::IM_A_TEAPOT }))
            .route("/oauth/token", post(token));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }

    fn rows() -> Dataset {
        let mut row = Record::new();
        row.insert("cedula".to_string(), "V123".to_string());
        row.insert("nombre".to_string(), "Juan".to_string());
        vec![row]
    }

    async fn authenticated_client(domain: &str) -> ApiClient {
        let client = ApiClientBuilder::new(domain)
            .credentials(2, "secret")
            .build()
            .unwrap();
        client.auth.password_grant("admin", "hunter2").await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_submit_success() {
        let domain = spawn_server().await;
        let client = authenticated_client(&domain).await;

        client.submit(&rows(), "/socios/update").await.unwrap();
    }

    #[tokio::test]
    async fn test_password_grant_rejected() {
        let domain = spawn_server().await;
        let client = ApiClientBuilder::new(&domain).credentials(2, "secret").build().unwrap();

        let err = client.auth.password_grant("admin", "wrong").await.unwrap_err();
        assert_eq!(err.kind(), Some(SubmitErrorKind::Unauthorized));
        assert!(!client.auth.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_submit_without_token_is_unauthorized() {
        let domain = spawn_server().await;
        let client = ApiClient::new(&domain).unwrap();

        let err = client.submit(&rows(), "/socios/update").await.unwrap_err();
        assert_eq!(err.kind, SubmitErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_rejected_token_is_unauthorized() {
        let domain = spawn_server().await;
        let client = ApiClient::new(&domain).unwrap();
        client
            .auth
            .set_tokens(TokenSet {
                access_token: "stale".to_string(),
                refresh_token: None,
                expires_in: None,
                token_type: None,
            })
            .await;

        let err = client.submit(&rows(), "/socios/update").await.unwrap_err();
        assert_eq!(err.kind, SubmitErrorKind::Unauthorized);
        assert_eq!(err.http_status, Some(401));
    }

    #[tokio::test]
    async fn test_status_codes_are_classified() {
        let domain = spawn_server().await;
        let client = authenticated_client(&domain).await;

        let err = client.submit(&rows(), "/does/not/exist").await.unwrap_err();
        assert_eq!(err.kind, SubmitErrorKind::InvalidUrl);

        let err = client.submit(&rows(), "/broken").await.unwrap_err();
        assert_eq!(err.kind, SubmitErrorKind::ServerError);

        let err = client.submit(&rows(), "/teapot").await.unwrap_err();
        assert_eq!(err.kind, SubmitErrorKind::OtherHttpError(418));
    }

    #[tokio::test]
    async fn test_domain_without_scheme() {
        let client = ApiClient::new("capounet.test").unwrap();
        let err = client.submit(&rows(), "/socios/update").await.unwrap_err();
        assert_eq!(err.kind, SubmitErrorKind::MissingScheme);

        let client = ApiClient::new("localhost:8000").unwrap();
        let err = client.submit(&rows(), "/socios/update").await.unwrap_err();
        assert_eq!(err.kind, SubmitErrorKind::MissingScheme);
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let client = ApiClientBuilder::new("http://127.0.0.1:1")
            .connect_timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        client
            .auth
            .set_tokens(TokenSet {
                access_token: "good-token".to_string(),
                refresh_token: None,
                expires_in: None,
                token_type: None,
            })
            .await;

        let err = client.submit(&rows(), "/socios/update").await.unwrap_err();
        assert_eq!(err.kind, SubmitErrorKind::ConnectionError);
    }

    #[test]
    fn test_resource_url() {
        let client = ApiClient::new("https://capounet.test/").unwrap();
        let url = client.resource_url("/prestamos/update").unwrap();
        assert_eq!(url.as_str(), "https://capounet.test/api/prestamos/update");
    }
}

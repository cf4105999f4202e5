//! Tokens obtained by `login`, stored in plain TOML

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use csvsync_core::TokenSet;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// API domain the tokens were issued by
    pub domain: String,
    pub username: String,
    pub obtained_at: DateTime<Utc>,
    pub tokens: TokenSet,
}

impl Session {
    pub fn new(domain: impl Into<String>, username: impl Into<String>, tokens: TokenSet) -> Self {
        Self {
            domain: domain.into(),
            username: username.into(),
            obtained_at: Utc::now(),
            tokens,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.tokens.expires_in?).ok()?;
        Some(self.obtained_at + Duration::seconds(secs))
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at().map_or(false, |at| Utc::now() >= at)
    }

    /// `None` when nobody has logged in yet
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let session = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse session file {}", path.display()))?;
                Ok(Some(session))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read session file {}", path.display()))
            }
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        restrict_permissions(path).await
    }

    /// Returns whether a session file was removed
    pub async fn delete<P: AsRef<Path>>(path: P) -> Result<bool> {
        match tokio::fs::remove_file(path.as_ref()).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tokens(expires_in: Option<u64>) -> TokenSet {
        TokenSet {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_in,
            token_type: Some("Bearer".to_string()),
        }
    }

    #[tokio::test]
    async fn test_save_load_delete() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.toml");

        assert_eq!(Session::load(&path).await.unwrap(), None);

        let session = Session::new(
            "https://capounet.example",
            "admin@capounet.example",
            tokens(Some(3600)),
        );
        session.save(&path).await.unwrap();

        let loaded = Session::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded.tokens, session.tokens);
        assert_eq!(loaded.domain, "https://capounet.example");

        assert!(Session::delete(&path).await.unwrap());
        assert!(!Session::delete(&path).await.unwrap());
    }

    #[test]
    fn test_expiry() {
        let mut session = Session::new("http://localhost:8000", "admin", tokens(Some(60)));
        assert!(!session.is_expired());

        session.obtained_at = Utc::now() - Duration::seconds(120);
        assert!(session.is_expired());

        let session = Session::new("http://localhost:8000", "admin", tokens(None));
        assert_eq!(session.expires_at(), None);
        assert!(!session.is_expired());
    }
}

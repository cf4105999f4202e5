use anyhow::{Context, Result};
use csvsync::{FieldRule, SyncTarget};
use csvsync_core::ApiConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::telemetry::LoggingConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub daemon: DaemonSettings,
    #[serde(default = "default_targets")]
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonSettings {
    /// Pause between two passes over the targets
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// How often a running daemon re-reads this file
    #[serde(default = "default_config_reload_interval", with = "humantime_serde")]
    pub config_reload_interval: Duration,
    /// Checksums and last sync dates
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Tokens obtained by `login`
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

/// Configuration half of a sync target; runtime state lives in the state file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub file_path: PathBuf,
    pub resource_path: String,
    #[serde(default)]
    pub schema: Vec<FieldRule>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            daemon: DaemonSettings::default(),
            targets: default_targets(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            config_reload_interval: default_config_reload_interval(),
            state_file: default_state_file(),
            session_file: default_session_file(),
        }
    }
}

impl From<&SyncTarget> for TargetConfig {
    fn from(target: &SyncTarget) -> Self {
        Self {
            name: target.name.clone(),
            enabled: target.enabled,
            file_path: target.file_path.clone(),
            resource_path: target.resource_path.clone(),
            schema: target.schema.clone(),
        }
    }
}

impl TargetConfig {
    pub fn to_target(&self) -> SyncTarget {
        SyncTarget::new(self.name.clone(), self.resource_path.clone())
            .with_file_path(self.file_path.clone())
            .with_schema(self.schema.clone())
            .with_enabled(self.enabled)
    }
}

impl DaemonConfig {
    /// `config.toml` under the user's configuration directory
    pub fn default_path() -> PathBuf {
        app_dir(dirs::config_dir()).join("config.toml")
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        let config: DaemonConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration {}", path.display()))?;
        Ok(config)
    }

    /// Load the file, falling back to defaults when it does not exist yet
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let domain = url::Url::parse(&self.api.domain)
            .with_context(|| format!("Invalid API domain: {}", self.api.domain))?;
        if !matches!(domain.scheme(), "http" | "https") {
            anyhow::bail!("API domain must start with http:// or https://: {}", self.api.domain);
        }

        if self.daemon.poll_interval.is_zero() {
            anyhow::bail!("Poll interval must be greater than zero");
        }
        if self.daemon.config_reload_interval.is_zero() {
            anyhow::bail!("Config reload interval must be greater than zero");
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if target.name.is_empty() {
                anyhow::bail!("Target name cannot be empty");
            }
            if !names.insert(target.name.as_str()) {
                anyhow::bail!("Duplicate target name: {}", target.name);
            }
            if !target.resource_path.starts_with('/') {
                anyhow::bail!(
                    "Resource path of '{}' must start with '/': {}",
                    target.name,
                    target.resource_path
                );
            }
            if target.schema.iter().any(|rule| rule.name.is_empty()) {
                anyhow::bail!("Schema of '{}' has a field without a name", target.name);
            }
        }

        Ok(())
    }

    /// Fresh targets with empty runtime state
    pub fn sync_targets(&self) -> Vec<SyncTarget> {
        self.targets.iter().map(TargetConfig::to_target).collect()
    }

    pub fn target_mut(&mut self, name: &str) -> Result<&mut TargetConfig> {
        self.targets
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| anyhow::anyhow!("Unknown target: {}", name))
    }
}

/// `<base>/csvsync`, or the working directory when the platform has no such base
pub fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join("csvsync")
}

fn default_targets() -> Vec<TargetConfig> {
    SyncTarget::defaults().iter().map(TargetConfig::from).collect()
}

fn default_enabled() -> bool { true }
fn default_poll_interval() -> Duration { csvsync::DEFAULT_POLL_INTERVAL }
fn default_config_reload_interval() -> Duration { Duration::from_secs(30) }

fn default_state_file() -> PathBuf {
    app_dir(dirs::data_dir()).join("state.toml")
}

fn default_session_file() -> PathBuf {
    app_dir(dirs::data_dir()).join("session.toml")
}

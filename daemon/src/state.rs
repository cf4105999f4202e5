//! Persistent runtime state: per-target checksum and last sync date

use anyhow::{Context, Result};
use async_trait::async_trait;
use csvsync::{StatePersister, SyncTarget};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub last_sync: String,
}

/// Contents of the state file, keyed by target name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default)]
    pub targets: BTreeMap<String, TargetState>,
}

impl StateFile {
    pub fn from_targets(targets: &[SyncTarget]) -> Self {
        let targets = targets
            .iter()
            .map(|t| {
                (
                    t.name.clone(),
                    TargetState {
                        checksum: t.checksum.clone(),
                        last_sync: t.last_sync.clone(),
                    },
                )
            })
            .collect();
        Self { targets }
    }

    /// Missing file means no state yet
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("Failed to parse state file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read state file {}", path.display()))
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
        Ok(())
    }

    /// Restore checksum and last sync of every target found in the file
    pub fn apply(&self, targets: &mut [SyncTarget]) {
        for target in targets.iter_mut() {
            if let Some(state) = self.targets.get(&target.name) {
                target.checksum = state.checksum.clone();
                target.last_sync = state.last_sync.clone();
            }
        }
    }

    /// Forget all state, forcing every target to be submitted again
    pub async fn reset<P: AsRef<Path>>(path: P) -> Result<()> {
        match tokio::fs::remove_file(path.as_ref()).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Writes the state file after every tick that changed something
#[derive(Debug, Clone)]
pub struct FileStatePersister {
    path: PathBuf,
}

impl FileStatePersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StatePersister for FileStatePersister {
    async fn persist(&self, targets: &[SyncTarget]) -> Result<()> {
        debug!(path = %self.path.display(), "Saving sync state");
        StateFile::from_targets(targets).save(&self.path).await
    }
}

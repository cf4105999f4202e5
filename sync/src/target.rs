//! Tracked files, their runtime state and the shared registry

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csvsync_core::SubmitErrorKind;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

/// Format of [`SyncTarget::last_sync`], local time
pub const LAST_SYNC_FORMAT: &str = "%d/%m/%Y %H:%M";

/// One column of a target's integrity contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

impl FieldRule {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

/// A tracked CSV file with its sync configuration and runtime state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
    /// Unique display name, also the notification dedup key
    pub name: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub file_path: PathBuf,

    /// Fingerprint of the last content that was submitted successfully
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,

    #[serde(default)]
    pub schema: Vec<FieldRule>,

    /// API path relative to the `/api` prefix
    pub resource_path: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_sync: String,
}

fn default_enabled() -> bool {
    true
}

impl SyncTarget {
    pub fn new(name: impl Into<String>, resource_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            file_path: PathBuf::new(),
            checksum: String::new(),
            schema: Vec::new(),
            resource_path: resource_path.into(),
            last_sync: String::new(),
        }
    }

    pub fn with_file_path(mut self, file_path: impl Into<PathBuf>) -> Self {
        self.file_path = file_path.into();
        self
    }

    pub fn with_schema(mut self, schema: Vec<FieldRule>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Membership and savings records
    pub fn socios() -> Self {
        Self::new("Socios y Ahorros", "/socios/update").with_schema(vec![
            FieldRule::required("cedula"),
            FieldRule::required("nombre"),
            FieldRule::optional("f_ingreso"),
            FieldRule::required("tot_aho_acum"),
            FieldRule::required("tot_ret_acum"),
            FieldRule::required("dispon_ahorro"),
        ])
    }

    /// Loan records
    pub fn prestamos() -> Self {
        let fields = [
            "cedula",
            "concedido",
            "amortizado",
            "saldo",
            "f_inicio",
            "f_fin",
            "descuento",
            "cod_pres",
            "nom_pres",
            "cuo_a_canc",
            "cuo_canc",
        ];
        Self::new("Prestamos", "/prestamos/update")
            .with_schema(fields.iter().map(|f| FieldRule::required(*f)).collect())
    }

    /// The two targets the agent ships with
    pub fn defaults() -> Vec<Self> {
        vec![Self::socios(), Self::prestamos()]
    }

    /// True when the path names a `.csv` file, ignoring case
    pub fn has_csv_extension(&self) -> bool {
        is_csv_path(&self.file_path)
    }

    /// Copy the configuration fields of `other`, keeping runtime state
    fn apply_settings(&mut self, other: &SyncTarget) {
        self.enabled = other.enabled;
        self.file_path = other.file_path.clone();
        self.schema = other.schema.clone();
        self.resource_path = other.resource_path.clone();
    }
}

/// File name ends in `.csv`, ignoring case. A bare `.csv` name counts.
pub fn is_csv_path(path: &Path) -> bool {
    path.file_name()
        .map(|name| {
            let name = name.as_encoded_bytes();
            name.len() >= 4 && name[name.len() - 4..].eq_ignore_ascii_case(b".csv")
        })
        .unwrap_or(false)
}

/// Classified outcome of evaluating one target in one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncCondition {
    AllOk,
    Disabled,
    FileNotFound,
    InvalidIntegrity,
    /// Submission failed; a different kind is a different condition
    RequestError(SubmitErrorKind),
}

impl SyncCondition {
    pub fn is_ok(&self) -> bool {
        matches!(self, SyncCondition::AllOk)
    }

    /// Panel message shown for this condition
    pub fn message(&self) -> &'static str {
        match self {
            SyncCondition::AllOk => "Everything is working correctly.",
            SyncCondition::Disabled => "Synchronisation is disabled. Enable it in the settings.",
            SyncCondition::FileNotFound => "File not found.",
            SyncCondition::InvalidIntegrity => "File integrity check failed.",
            SyncCondition::RequestError(_) => "Error sending data.",
        }
    }
}

impl fmt::Display for SyncCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncCondition::AllOk => write!(f, "ALL_OK"),
            SyncCondition::Disabled => write!(f, "DISABLED"),
            SyncCondition::FileNotFound => write!(f, "FILE_NOT_FOUND"),
            SyncCondition::InvalidIntegrity => write!(f, "INVALID_INTEGRITY"),
            SyncCondition::RequestError(kind) => write!(f, "REQUEST_ERROR ({})", kind),
        }
    }
}

/// Runtime fields written back by the engine after a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeState {
    pub name: String,
    pub checksum: String,
    pub last_sync: String,
}

impl From<&SyncTarget> for RuntimeState {
    fn from(target: &SyncTarget) -> Self {
        Self {
            name: target.name.clone(),
            checksum: target.checksum.clone(),
            last_sync: target.last_sync.clone(),
        }
    }
}

/// Targets shared between the engine and the owning process.
///
/// The foreground edits configuration fields, the engine snapshots the list
/// at the start of each tick and only writes back `checksum`/`last_sync`.
/// Targets are added or updated, never removed.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: Arc<RwLock<Vec<SyncTarget>>>,
}

impl TargetRegistry {
    pub fn new(targets: Vec<SyncTarget>) -> Self {
        Self {
            targets: Arc::new(RwLock::new(targets)),
        }
    }

    pub async fn snapshot(&self) -> Vec<SyncTarget> {
        self.targets.read().await.clone()
    }

    pub async fn get(&self, name: &str) -> Option<SyncTarget> {
        self.targets
            .read()
            .await
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.targets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.targets.read().await.is_empty()
    }

    /// Returns false when no target has that name
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        self.update(name, |t| t.enabled = enabled).await
    }

    pub async fn set_file_path(&self, name: &str, file_path: impl Into<PathBuf>) -> bool {
        let file_path = file_path.into();
        self.update(name, |t| t.file_path = file_path).await
    }

    pub async fn set_schema(&self, name: &str, schema: Vec<FieldRule>) -> bool {
        self.update(name, |t| t.schema = schema).await
    }

    pub async fn set_resource_path(&self, name: &str, resource_path: impl Into<String>) -> bool {
        let resource_path = resource_path.into();
        self.update(name, |t| t.resource_path = resource_path).await
    }

    /// Merge freshly loaded configuration.
    ///
    /// Known targets get their configuration fields replaced and keep their
    /// checksum and last sync. Unknown ones are appended as given.
    pub async fn apply_config(&self, configured: &[SyncTarget]) {
        let mut targets = self.targets.write().await;
        for incoming in configured {
            match targets.iter_mut().find(|t| t.name == incoming.name) {
                Some(existing) => existing.apply_settings(incoming),
                None => {
                    debug!(sync_target = %incoming.name, "Registering new target");
                    targets.push(incoming.clone());
                }
            }
        }
    }

    /// Write back the runtime fields produced by one tick
    pub async fn record_runtime(&self, states: &[RuntimeState]) {
        let mut targets = self.targets.write().await;
        for state in states {
            if let Some(target) = targets.iter_mut().find(|t| t.name == state.name) {
                target.checksum = state.checksum.clone();
                target.last_sync = state.last_sync.clone();
            }
        }
    }

    async fn update(&self, name: &str, apply: impl FnOnce(&mut SyncTarget)) -> bool {
        let mut targets = self.targets.write().await;
        match targets.iter_mut().find(|t| t.name == name) {
            Some(target) => {
                apply(target);
                true
            }
            None => false,
        }
    }
}

//! CSV Sync Engine Library
//!
//! Keeps local CSV exports in sync with a REST API:
//! - CRC32 change detection per tracked file
//! - CSV loading with a Windows-1252 fallback
//! - Required-field validation against a per-target schema
//! - Debounced status notifications over a channel
//! - A cooperative poll loop with start/stop/join

pub mod checksum;
pub mod engine;
pub mod error;
pub mod integrity;
pub mod loader;
pub mod persist;
pub mod status;
pub mod target;

// Re-export main types and functions
pub use checksum::{checksum_bytes, ChecksumService};
pub use engine::{EngineHandle, EngineOptions, SyncEngine, TickSummary, DEFAULT_POLL_INTERVAL};
pub use error::{Result, SyncError};
pub use integrity::{find_violation, validate, Violation};
pub use loader::CsvLoader;
pub use persist::{NoopPersister, StatePersister};
pub use status::{Health, Severity, StatusChannel, StatusEvent, StatusReporter};
pub use target::{
    FieldRule, RuntimeState, SyncCondition, SyncTarget, TargetRegistry, LAST_SYNC_FORMAT,
};

pub use csvsync_core::{Dataset, Record, RemoteSubmitter, SubmitError, SubmitErrorKind};

//! Write-back of runtime state after a tick

use async_trait::async_trait;

use crate::target::SyncTarget;

/// Stores checksums and last-sync timestamps so they survive a restart.
///
/// Called by the engine after a tick in which at least one target's runtime
/// state changed. Errors are logged by the engine and otherwise ignored.
#[async_trait]
pub trait StatePersister: Send + Sync {
    async fn persist(&self, targets: &[SyncTarget]) -> anyhow::Result<()>;
}

/// Persister for engines whose state lives only in memory
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPersister;

#[async_trait]
impl StatePersister for NoopPersister {
    async fn persist(&self, _targets: &[SyncTarget]) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: StatePersister + ?Sized> StatePersister for std::sync::Arc<T> {
    async fn persist(&self, targets: &[SyncTarget]) -> anyhow::Result<()> {
        (**self).persist(targets).await
    }
}

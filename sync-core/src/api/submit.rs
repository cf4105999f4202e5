use async_trait::async_trait;

use super::error::SubmitError;
use super::types::Record;

/// Pushes a validated dataset to a resource of the remote API.
///
/// Implementations use a bearer token obtained beforehand and never request
/// or refresh tokens themselves. A failed call is retried by the caller on
/// its next poll, so implementations should not retry internally.
#[async_trait]
pub trait RemoteSubmitter: Send + Sync {
    async fn submit(&self, dataset: &[Record], resource_path: &str) -> Result<(), SubmitError>;
}

#[async_trait]
impl<T: RemoteSubmitter + ?Sized> RemoteSubmitter for std::sync::Arc<T> {
    async fn submit(&self, dataset: &[Record], resource_path: &str) -> Result<(), SubmitError> {
        (**self).submit(dataset, resource_path).await
    }
}

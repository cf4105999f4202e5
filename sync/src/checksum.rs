//! Content fingerprints used for change detection

use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::error::{Result, SyncError};

/// Chunk size used when streaming a file through the hasher
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Streams files through CRC32.
///
/// The fingerprint is only used to notice that a file changed between two
/// polls; it is not an integrity guarantee.
#[derive(Debug, Clone)]
pub struct ChecksumService {
    buffer_size: usize,
}

impl Default for ChecksumService {
    fn default() -> Self {
        Self::new()
    }
}

impl ChecksumService {
    pub fn new() -> Self {
        Self {
            buffer_size: CHUNK_SIZE,
        }
    }

    /// Create a service reading with a custom chunk size
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Fingerprint of the file's bytes, e.g. `0x3610a686`
    pub async fn compute(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let mut file = fs::File::open(path).await.map_err(|e| {
            SyncError::file_access(path, format!("Failed to open file: {}", e))
        })?;

        let mut buffer = vec![0u8; self.buffer_size];
        let mut hasher = crc32fast::Hasher::new();

        loop {
            let bytes_read = file.read(&mut buffer).await.map_err(|e| {
                SyncError::file_access(path, format!("Failed to read file: {}", e))
            })?;

            if bytes_read == 0 {
                break;
            }

            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format_checksum(hasher.finalize()))
    }
}

/// Fingerprint of an in-memory buffer, in the same format as [`ChecksumService::compute`]
pub fn checksum_bytes(bytes: &[u8]) -> String {
    format_checksum(crc32fast::hash(bytes))
}

fn format_checksum(crc: u32) -> String {
    format!("{:#x}", crc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_known_value() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.csv");
        fs::write(&path, b"hello world").await.unwrap();

        let checksum = ChecksumService::new().compute(&path).await.unwrap();
        assert_eq!(checksum, "0xd4a1185");
        assert_eq!(checksum, checksum_bytes(b"hello world"));
    }

    #[tokio::test]
    async fn test_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.csv");
        fs::write(&path, b"").await.unwrap();

        let checksum = ChecksumService::new().compute(&path).await.unwrap();
        assert_eq!(checksum, "0x0");
    }

    #[tokio::test]
    async fn test_repeated_and_changed_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("socios.csv");
        fs::write(&path, b"cedula,nombre\nV123,Juan\n").await.unwrap();

        let service = ChecksumService::new();
        let first = service.compute(&path).await.unwrap();
        let second = service.compute(&path).await.unwrap();
        assert_eq!(first, second);

        fs::write(&path, b"cedula,nombre\nV124,Juan\n").await.unwrap();
        let changed = service.compute(&path).await.unwrap();
        assert_ne!(first, changed);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = ChecksumService::new()
            .compute(temp_dir.path().join("missing.csv"))
            .await;

        assert!(matches!(result, Err(SyncError::FileAccess { .. })));
    }

    proptest! {
        #[test]
        fn test_chunk_size_does_not_change_checksum(
            content in prop::collection::vec(any::<u8>(), 0..4096),
            chunk in 1usize..300,
        ) {
            let temp_dir = TempDir::new().unwrap();
            let path = temp_dir.path().join("data.csv");
            std::fs::write(&path, &content).unwrap();

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let chunked = runtime
                .block_on(ChecksumService::with_buffer_size(chunk).compute(&path))
                .unwrap();

            prop_assert_eq!(chunked, checksum_bytes(&content));
        }
    }
}

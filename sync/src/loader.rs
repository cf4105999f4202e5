//! CSV loading with an encoding fallback

use std::borrow::Cow;
use std::path::Path;

use csvsync_core::{Dataset, Record};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use tokio::fs;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Reads a header-row CSV file into one mapping per data row.
#[derive(Debug, Clone, Default)]
pub struct CsvLoader;

impl CsvLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load and parse the file at `path`
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Dataset> {
        let path = path.as_ref();
        let bytes = fs::read(path).await.map_err(|e| {
            SyncError::file_access(path, format!("Failed to read file: {}", e))
        })?;

        let (text, encoding) = decode(&bytes)
            .ok_or_else(|| SyncError::decode(path, "content is neither UTF-8 nor Windows-1252"))?;

        let rows = parse_rows(&text).map_err(|e| SyncError::decode(path, e.to_string()))?;

        debug!(
            path = %path.display(),
            encoding = encoding.name(),
            rows = rows.len(),
            "Loaded CSV"
        );

        Ok(rows)
    }
}

/// Decode as UTF-8, falling back to Windows-1252. A leading BOM is dropped.
///
/// Bytes that Windows-1252 leaves undefined (0x81, 0x8D, 0x8F, 0x90, 0x9D)
/// decode to C1 controls and make the fallback fail.
pub fn decode(bytes: &[u8]) -> Option<(Cow<'_, str>, &'static Encoding)> {
    let (text, had_errors) = UTF_8.decode_with_bom_removal(bytes);
    if !had_errors {
        return Some((text, UTF_8));
    }

    let (text, had_errors) = WINDOWS_1252.decode_with_bom_removal(bytes);
    if had_errors || text.chars().any(is_c1_control) {
        None
    } else {
        Some((text, WINDOWS_1252))
    }
}

fn is_c1_control(c: char) -> bool {
    ('\u{80}'..='\u{9f}').contains(&c)
}

/// Parse decoded CSV text. Rows shorter than the header leave the trailing
/// columns absent; cells beyond the header are dropped.
pub fn parse_rows(text: &str) -> std::result::Result<Dataset, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Record = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.to_string(), value.to_string()))
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

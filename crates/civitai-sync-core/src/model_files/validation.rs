//! Structural validation of safetensors files.
//!
//! Safetensors layout:
//! - 0-7: header size (u64, little-endian)
//! - 8..8+n: JSON header with tensor descriptors and an optional
//!   `__metadata__` object
//! - remainder: tensor data

use crate::config::{CompanionConfig, SyncConfig};
use crate::error::{Result, SyncError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Reserved header key holding free-form string metadata.
const METADATA_KEY: &str = "__metadata__";

/// Informational facts read from a safetensors header.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderMetadata {
    /// Contents of `__metadata__`, empty if absent.
    pub metadata: Map<String, Value>,
    pub file_size: u64,
    pub header_size: u64,
    /// Top-level header entries other than `__metadata__`.
    pub tensor_count: usize,
}

/// Check whether a path has a model file extension.
pub fn has_model_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            CompanionConfig::MODEL_EXTENSIONS
                .iter()
                .any(|ext| e.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Return true if the file looks like a well-formed safetensors file.
pub fn validate(path: impl AsRef<Path>) -> bool {
    match check_format(path.as_ref()) {
        Ok(()) => true,
        Err(e) => {
            debug!("{}", e);
            false
        }
    }
}

/// Validate a safetensors file, explaining the first check that fails.
pub fn check_format(path: &Path) -> Result<()> {
    read_header(path).map(|_| ())
}

/// Read the `__metadata__` header entry plus a few derived facts.
pub fn extract_header_metadata(path: impl AsRef<Path>) -> Result<HeaderMetadata> {
    let path = path.as_ref();
    let (header, header_size, file_size) = read_header(path)?;

    let tensor_count = header.keys().filter(|k| *k != METADATA_KEY).count();
    let metadata = match header.get(METADATA_KEY) {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    Ok(HeaderMetadata {
        metadata,
        file_size,
        header_size,
        tensor_count,
    })
}

/// Parse the JSON header, returning it with the header and file sizes.
fn read_header(path: &Path) -> Result<(Map<String, Value>, u64, u64)> {
    if !has_model_extension(path) {
        return Err(SyncError::invalid_format(path, "unexpected file extension"));
    }

    let mut file = File::open(path).map_err(|e| SyncError::io_with_path(e, path))?;
    let file_size = file
        .metadata()
        .map_err(|e| SyncError::io_with_path(e, path))?
        .len();

    if file_size == 0 {
        return Err(SyncError::invalid_format(path, "file is empty"));
    }
    if file_size < 8 {
        return Err(SyncError::invalid_format(path, "file too short for header length"));
    }

    let mut size_buf = [0u8; 8];
    file.read_exact(&mut size_buf)
        .map_err(|e| SyncError::io_with_path(e, path))?;
    let header_size = u64::from_le_bytes(size_buf);

    let remaining = file_size - 8;
    if header_size == 0 || header_size >= remaining {
        return Err(SyncError::invalid_format(
            path,
            format!(
                "header length {} does not fit in {} remaining bytes",
                header_size, remaining
            ),
        ));
    }
    if header_size > SyncConfig::MAX_HEADER_SIZE {
        return Err(SyncError::invalid_format(
            path,
            format!("header length {} is too large", header_size),
        ));
    }

    let mut header_buf = vec![0u8; header_size as usize];
    file.read_exact(&mut header_buf)
        .map_err(|e| SyncError::io_with_path(e, path))?;

    let header_str = std::str::from_utf8(&header_buf)
        .map_err(|e| SyncError::invalid_format(path, format!("header is not UTF-8: {}", e)))?;

    let header: Value = serde_json::from_str(header_str)
        .map_err(|e| SyncError::invalid_format(path, format!("header is not valid JSON: {}", e)))?;

    match header {
        Value::Object(map) => Ok((map, header_size, file_size)),
        _ => Err(SyncError::invalid_format(path, "header is not a JSON object")),
    }
}

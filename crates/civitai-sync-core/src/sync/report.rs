//! Read-only reports over a model directory.

use crate::error::Result;
use crate::metadata::load_record;
use crate::model_files::{discover_model_files, existing_preview, metadata_path};
use std::path::{Path, PathBuf};

/// Model files whose sidecar records that the service had no match.
pub fn list_not_found(root: &Path) -> Result<Vec<PathBuf>> {
    Ok(discover_model_files(root)?
        .into_iter()
        .filter(|file| {
            load_record(&metadata_path(&file.path))
                .map(|record| record.is_not_found())
                .unwrap_or(false)
        })
        .map(|file| file.path)
        .collect())
}

/// Model files without a valid preview image.
pub fn list_missing_previews(root: &Path) -> Result<Vec<PathBuf>> {
    Ok(discover_model_files(root)?
        .into_iter()
        .filter(|file| existing_preview(&file.path).is_none())
        .map(|file| file.path)
        .collect())
}

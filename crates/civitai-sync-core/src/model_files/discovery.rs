//! Recursive discovery of model files under a target directory.

use crate::error::{Result, SyncError};
use crate::model_files::validation::has_model_extension;
use crate::model_files::ModelFile;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Resolve and check the target directory.
///
/// This is the only fatal check of a run: a missing, non-directory or
/// unreadable root aborts before any file is touched.
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    let metadata = std::fs::metadata(root).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SyncError::FileNotFound(root.to_path_buf()),
        _ => SyncError::io_with_path(e, root),
    })?;
    if !metadata.is_dir() {
        return Err(SyncError::NotADirectory(root.to_path_buf()));
    }
    std::fs::read_dir(root).map_err(|e| SyncError::io_with_path(e, root))?;

    std::path::absolute(root).map_err(|e| SyncError::io_with_path(e, root))
}

/// Find all model files below `root`, sorted by path.
pub fn discover_model_files(root: &Path) -> Result<Vec<ModelFile>> {
    let root = resolve_root(root)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(&root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !has_model_extension(entry.path()) {
            continue;
        }

        match entry.metadata() {
            Ok(metadata) => files.push(ModelFile {
                path: entry.into_path(),
                size: metadata.len(),
                modified: metadata.modified().ok(),
            }),
            Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);

    info!(
        "Found {} safetensors file(s) in {}",
        files.len(),
        root.display()
    );
    debug!("Discovered: {:?}", files.iter().map(|f| &f.path).collect::<Vec<_>>());
    Ok(files)
}

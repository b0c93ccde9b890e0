//! Orphaned companion file cleanup.
//!
//! A companion is an orphan when no model file it could belong to is known or
//! present on disk. Only sidecars that look like ours (a JSON object with a
//! `hash` or legacy `sha256` key) are ever considered.

use crate::error::{Result, SyncError};
use crate::model_files::companion::owning_models;
use crate::model_files::{resolve_root, CompanionKind};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Counts of removed companion files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub metadata_removed: usize,
    pub previews_removed: usize,
}

impl ReconcileStats {
    pub fn total(&self) -> usize {
        self.metadata_removed + self.previews_removed
    }
}

/// Remove companion files under `root` whose model file is gone.
///
/// `known_model_paths` are the model files discovered in the same run; they
/// are matched ignoring extension case.
pub fn reconcile(root: &Path, known_model_paths: &HashSet<PathBuf>) -> Result<ReconcileStats> {
    let root = resolve_root(root)?;
    let known_stems: HashSet<PathBuf> = known_model_paths
        .iter()
        .map(|p| p.with_extension(""))
        .collect();

    let mut stats = ReconcileStats::default();
    for entry in WalkDir::new(&root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some((kind, candidates)) = owning_models(path) else {
            continue;
        };

        let owned = candidates
            .iter()
            .any(|model| known_stems.contains(&model.with_extension("")) || model.exists());
        if owned {
            continue;
        }

        if kind == CompanionKind::Metadata && !is_sidecar(path) {
            debug!("Leaving unrelated JSON file: {}", path.display());
            continue;
        }

        match std::fs::remove_file(path) {
            Ok(()) => {
                info!("Removed orphaned file: {}", path.display());
                match kind {
                    CompanionKind::Metadata => stats.metadata_removed += 1,
                    CompanionKind::Preview => stats.previews_removed += 1,
                }
            }
            Err(e) => warn!("{}", SyncError::io_with_path(e, path)),
        }
    }

    if stats.total() > 0 {
        info!(
            "Removed {} orphaned metadata and {} orphaned preview file(s)",
            stats.metadata_removed, stats.previews_removed
        );
    }
    Ok(stats)
}

/// True if the file is a JSON object written as a sidecar.
fn is_sidecar(path: &Path) -> bool {
    let Ok(content) = std::fs::read(path) else {
        return false;
    };
    match serde_json::from_slice::<Value>(&content) {
        Ok(Value::Object(map)) => map.contains_key("hash") || map.contains_key("sha256"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SIDECAR: &str = r#"{"hash": "abc", "last_checked": "2026-01-01T00:00:00Z"}"#;

    fn touch(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_removes_only_orphans() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let model = root.join("keep.safetensors");
        touch(&model, "x");
        touch(&root.join("keep.json"), SIDECAR);
        touch(&root.join("keep.preview.png"), "png");
        touch(&root.join("gone.json"), SIDECAR);
        touch(&root.join("sub/gone.preview.jpeg"), "jpg");

        let known: HashSet<PathBuf> = [model].into_iter().collect();
        let stats = reconcile(root, &known).unwrap();

        assert_eq!(
            stats,
            ReconcileStats {
                metadata_removed: 1,
                previews_removed: 1
            }
        );
        assert!(root.join("keep.json").exists());
        assert!(root.join("keep.preview.png").exists());
        assert!(!root.join("gone.json").exists());
        assert!(!root.join("sub/gone.preview.jpeg").exists());
    }

    #[test]
    fn test_unrelated_json_is_kept() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("config.json"), r#"{"name": "settings"}"#);
        touch(&dir.path().join("list.json"), r#"[1, 2, 3]"#);
        touch(&dir.path().join("broken.json"), "{");

        let stats = reconcile(dir.path(), &HashSet::new()).unwrap();

        assert_eq!(stats.total(), 0);
        assert!(dir.path().join("config.json").exists());
        assert!(dir.path().join("list.json").exists());
        assert!(dir.path().join("broken.json").exists());
    }

    #[test]
    fn test_legacy_sidecar_key_is_recognized() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("old.json"), r#"{"sha256": "abc"}"#);

        let stats = reconcile(dir.path(), &HashSet::new()).unwrap();

        assert_eq!(stats.metadata_removed, 1);
    }

    #[test]
    fn test_existing_model_outside_known_set_is_respected() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("broken.safetensors"), "not a model");
        touch(&dir.path().join("broken.json"), SIDECAR);

        let stats = reconcile(dir.path(), &HashSet::new()).unwrap();

        assert_eq!(stats.total(), 0);
        assert!(dir.path().join("broken.json").exists());
    }

    #[test]
    fn test_known_model_with_uppercase_extension() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("Loud.SAFETENSORS");
        touch(&model, "x");
        touch(&dir.path().join("Loud.json"), SIDECAR);

        let known: HashSet<PathBuf> = [model].into_iter().collect();
        let stats = reconcile(dir.path(), &known).unwrap();

        assert_eq!(stats.total(), 0);
        assert!(dir.path().join("Loud.json").exists());
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = reconcile(&dir.path().join("nope"), &HashSet::new()).unwrap_err();
        assert!(matches!(err, SyncError::FileNotFound(_)));
    }
}

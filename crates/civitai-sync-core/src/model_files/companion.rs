//! Companion file naming.
//!
//! A model at `dir/name.safetensors` (or `.safetensor`) owns:
//! - `dir/name.json` - metadata sidecar
//! - `dir/name.preview.png` - preview image (other image extensions are
//!   recognized but never written)

use crate::config::CompanionConfig;
use std::path::{Path, PathBuf};

/// Path of the metadata sidecar for a model file.
pub fn metadata_path(model_path: &Path) -> PathBuf {
    model_path.with_extension(CompanionConfig::METADATA_EXTENSION)
}

/// Path the preview image is downloaded to.
pub fn preview_path(model_path: &Path) -> PathBuf {
    preview_path_with(model_path, CompanionConfig::PREVIEW_EXTENSION)
}

fn preview_path_with(model_path: &Path, extension: &str) -> PathBuf {
    model_path.with_extension(format!(
        "{}.{}",
        CompanionConfig::PREVIEW_SUFFIX.trim_start_matches('.'),
        extension
    ))
}

/// All preview paths that would count as this model's preview.
pub fn preview_candidates(model_path: &Path) -> Vec<PathBuf> {
    CompanionConfig::PREVIEW_EXTENSIONS
        .iter()
        .map(|ext| preview_path_with(model_path, ext))
        .collect()
}

/// Return the first non-empty preview file for a model, if any.
pub fn existing_preview(model_path: &Path) -> Option<PathBuf> {
    preview_candidates(model_path).into_iter().find(|p| {
        std::fs::metadata(p)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    })
}

/// Kind of companion file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanionKind {
    Metadata,
    Preview,
}

/// Classify a path as a companion file and list the model paths it could
/// belong to. Returns `None` for anything that is not named like a companion.
pub fn owning_models(path: &Path) -> Option<(CompanionKind, Vec<PathBuf>)> {
    let file_name = path.file_name()?.to_str()?;
    let dir = path.parent().unwrap_or_else(|| Path::new(""));

    let candidates = |stem: &str| -> Vec<PathBuf> {
        CompanionConfig::MODEL_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{}", stem, ext)))
            .collect()
    };

    let lower = file_name.to_ascii_lowercase();
    for ext in CompanionConfig::PREVIEW_EXTENSIONS {
        let suffix = format!("{}.{}", CompanionConfig::PREVIEW_SUFFIX, ext);
        if lower.ends_with(&suffix) && file_name.len() > suffix.len() {
            let stem = &file_name[..file_name.len() - suffix.len()];
            return Some((CompanionKind::Preview, candidates(stem)));
        }
    }

    let json_suffix = format!(".{}", CompanionConfig::METADATA_EXTENSION);
    if lower.ends_with(&json_suffix) && file_name.len() > json_suffix.len() {
        let stem = &file_name[..file_name.len() - json_suffix.len()];
        return Some((CompanionKind::Metadata, candidates(stem)));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_companion_paths() {
        let model = Path::new("/models/lora/style.v2.safetensors");
        assert_eq!(metadata_path(model), Path::new("/models/lora/style.v2.json"));
        assert_eq!(
            preview_path(model),
            Path::new("/models/lora/style.v2.preview.png")
        );

        let singular = Path::new("/models/x.safetensor");
        assert_eq!(metadata_path(singular), Path::new("/models/x.json"));
    }

    #[test]
    fn test_owning_models_for_metadata() {
        let (kind, owners) = owning_models(Path::new("/m/style.v2.json")).unwrap();
        assert_eq!(kind, CompanionKind::Metadata);
        assert_eq!(
            owners,
            vec![
                PathBuf::from("/m/style.v2.safetensors"),
                PathBuf::from("/m/style.v2.safetensor")
            ]
        );
    }

    #[test]
    fn test_owning_models_for_preview() {
        let (kind, owners) = owning_models(Path::new("/m/style.preview.jpeg")).unwrap();
        assert_eq!(kind, CompanionKind::Preview);
        assert_eq!(owners[0], PathBuf::from("/m/style.safetensors"));

        // A preview must not be mistaken for a sidecar of "style.preview"
        let (kind, _) = owning_models(Path::new("/m/style.preview.png")).unwrap();
        assert_eq!(kind, CompanionKind::Preview);
    }

    #[test]
    fn test_non_companions_ignored() {
        assert!(owning_models(Path::new("/m/readme.txt")).is_none());
        assert!(owning_models(Path::new("/m/.json")).is_none());
        assert!(owning_models(Path::new("/m/model.safetensors")).is_none());
    }

    #[test]
    fn test_existing_preview_requires_non_empty_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let model = dir.path().join("m.safetensors");

        assert!(existing_preview(&model).is_none());

        std::fs::write(dir.path().join("m.preview.png"), b"").unwrap();
        assert!(existing_preview(&model).is_none());

        std::fs::write(dir.path().join("m.preview.webp"), b"RIFF").unwrap();
        assert_eq!(
            existing_preview(&model),
            Some(dir.path().join("m.preview.webp"))
        );
    }
}

//! Human-readable output for run summaries and reports.

use civitai_sync_core::{HeaderMetadata, SyncStats};
use serde_json::json;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Summary printed at the end of a sync run.
pub fn format_summary(stats: &SyncStats, elapsed: Duration) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{}",
        if stats.interrupted {
            "Sync interrupted"
        } else {
            "Sync complete"
        }
    );
    let _ = writeln!(out, "  Files found:       {}", stats.total_files);
    let _ = writeln!(out, "  Updated:           {}", stats.updated);
    let _ = writeln!(out, "  Up to date:        {}", stats.cached);
    let _ = writeln!(out, "  Not on Civitai:    {}", stats.not_found);
    let _ = writeln!(out, "  Failed:            {}", stats.failed);
    let _ = writeln!(out, "  Hashes computed:   {}", stats.hashes_computed);
    if stats.images_downloaded > 0 || stats.image_failures > 0 {
        let _ = writeln!(
            out,
            "  Images:            {} downloaded, {} failed",
            stats.images_downloaded, stats.image_failures
        );
    }
    if let Some(reconciled) = &stats.reconciled {
        let _ = writeln!(
            out,
            "  Orphans removed:   {} metadata, {} preview",
            reconciled.metadata_removed, reconciled.previews_removed
        );
    }
    if stats.interrupted {
        let _ = writeln!(
            out,
            "  Not processed:     {}",
            stats.total_files.saturating_sub(stats.processed())
        );
    }
    let _ = writeln!(out, "  Time:              {}", format_elapsed(elapsed));

    if !stats.failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failures:");
        for failure in &stats.failures {
            let _ = writeln!(
                out,
                "  {} ({}): {}",
                failure.path.display(),
                failure.kind,
                failure.message
            );
        }
    }
    out
}

/// A titled list of model paths, relative to `root` where possible.
pub fn format_path_list(title: &str, root: &Path, paths: &[PathBuf]) -> String {
    let mut out = String::new();
    if paths.is_empty() {
        let _ = writeln!(out, "{}: none", title);
        return out;
    }

    let _ = writeln!(out, "{} ({}):", title, paths.len());
    for path in paths {
        let shown = path.strip_prefix(root).unwrap_or(path);
        let _ = writeln!(out, "  {}", shown.display());
    }
    out
}

/// Pretty JSON for `--inspect`.
pub fn format_header(path: &Path, header: &HeaderMetadata) -> String {
    let value = json!({
        "file": path.display().to_string(),
        "file_size": header.file_size,
        "header_size": header.header_size,
        "tensor_count": header.tensor_count,
        "metadata": header.metadata,
    });
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civitai_sync_core::sync::FileFailure;
    use civitai_sync_core::{ErrorKind, ReconcileStats};
    use serde_json::Map;

    #[test]
    fn test_summary_lists_counts_and_failures() {
        let stats = SyncStats {
            total_files: 4,
            updated: 1,
            cached: 1,
            not_found: 1,
            failed: 1,
            failures: vec![FileFailure {
                path: PathBuf::from("/m/bad.safetensors"),
                kind: ErrorKind::InvalidFormat,
                message: "header too large".into(),
            }],
            reconciled: Some(ReconcileStats {
                metadata_removed: 2,
                previews_removed: 0,
            }),
            ..SyncStats::default()
        };

        let text = format_summary(&stats, Duration::from_secs(75));

        assert!(text.contains("Sync complete"));
        assert!(text.contains("Files found:       4"));
        assert!(text.contains("Orphans removed:   2 metadata, 0 preview"));
        assert!(text.contains("/m/bad.safetensors (invalid format): header too large"));
        assert!(text.contains("1m 15s"));
        assert!(!text.contains("Images:"));
    }

    #[test]
    fn test_interrupted_summary_counts_remaining() {
        let stats = SyncStats {
            total_files: 10,
            cached: 3,
            interrupted: true,
            ..SyncStats::default()
        };

        let text = format_summary(&stats, Duration::from_millis(1500));

        assert!(text.contains("Sync interrupted"));
        assert!(text.contains("Not processed:     7"));
        assert!(text.contains("1.5s"));
    }

    #[test]
    fn test_path_list_is_relative_to_root() {
        let root = Path::new("/models");
        let paths = vec![PathBuf::from("/models/sdxl/a.safetensors")];

        let text = format_path_list("Not found on Civitai", root, &paths);

        assert!(text.starts_with("Not found on Civitai (1):"));
        assert!(text.contains("  sdxl/a.safetensors"));
        assert_eq!(
            format_path_list("Missing previews", root, &[]),
            "Missing previews: none\n"
        );
    }

    #[test]
    fn test_header_output_is_json() {
        let mut metadata = Map::new();
        metadata.insert("ss_base_model_version".into(), "sdxl_base_v1-0".into());
        let header = HeaderMetadata {
            metadata,
            file_size: 1024,
            header_size: 96,
            tensor_count: 2,
        };

        let text = format_header(Path::new("/m/a.safetensors"), &header);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["tensor_count"], 2);
        assert_eq!(value["metadata"]["ss_base_model_version"], "sdxl_base_v1-0");
    }
}

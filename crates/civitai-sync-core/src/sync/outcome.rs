//! Per-file outcomes and run statistics.

use crate::error::ErrorKind;
use crate::sync::reconcile::ReconcileStats;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// What happened to a file's preview image during its sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageFetch {
    /// Image downloading was not enabled.
    NotRequested,
    /// A valid preview was already on disk.
    AlreadyPresent,
    /// The payload carries no image URLs.
    NoImages,
    Downloaded,
    /// The download failed; metadata is unaffected.
    Failed,
}

/// Result of synchronizing one model file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SyncOutcome {
    /// Metadata was still fresh; no lookup was made.
    Cached { image: ImageFetch },
    /// New or refreshed metadata was written.
    Updated { image: ImageFetch },
    /// The service has no match; a negative record was written.
    NotFound,
    Failed { kind: ErrorKind, message: String },
}

impl SyncOutcome {
    pub(crate) fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        SyncOutcome::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SyncOutcome::Failed { .. })
    }
}

/// A file that failed to sync.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

/// Aggregate results of a synchronization run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStats {
    /// Model files discovered under the root.
    pub total_files: usize,
    pub cached: usize,
    pub updated: usize,
    pub not_found: usize,
    pub failed: usize,
    /// Files that had to be hashed (digest cache misses).
    pub hashes_computed: usize,
    pub images_downloaded: usize,
    pub image_failures: usize,
    pub not_found_paths: Vec<PathBuf>,
    pub failures: Vec<FileFailure>,
    /// The run stopped early on cancellation.
    pub interrupted: bool,
    pub reconciled: Option<ReconcileStats>,
}

impl SyncStats {
    /// Fold one file's outcome into the totals.
    pub fn record(&mut self, path: &Path, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Cached { image } => {
                self.cached += 1;
                self.record_image(*image);
            }
            SyncOutcome::Updated { image } => {
                self.updated += 1;
                self.record_image(*image);
            }
            SyncOutcome::NotFound => {
                self.not_found += 1;
                self.not_found_paths.push(path.to_path_buf());
            }
            SyncOutcome::Failed { kind, message } => {
                self.failed += 1;
                self.failures.push(FileFailure {
                    path: path.to_path_buf(),
                    kind: *kind,
                    message: message.clone(),
                });
            }
        }
    }

    fn record_image(&mut self, image: ImageFetch) {
        match image {
            ImageFetch::Downloaded => self.images_downloaded += 1,
            ImageFetch::Failed => self.image_failures += 1,
            ImageFetch::NotRequested | ImageFetch::AlreadyPresent | ImageFetch::NoImages => {}
        }
    }

    /// Files that reached a terminal outcome.
    pub fn processed(&self) -> usize {
        self.cached + self.updated + self.not_found + self.failed
    }
}

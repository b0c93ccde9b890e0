//! Sequential synchronization of a model directory.
//!
//! Each file moves through validate, digest, policy check, then either a
//! skip or a lookup followed by persistence and an optional image fetch.
//! Files are processed one at a time; the client's rate gate depends on it.

use crate::cancel::CancellationToken;
use crate::config::SyncOptions;
use crate::error::{ErrorKind, Result, SyncError};
use crate::metadata::{load_legacy_digest, load_record, save_record, MetadataRecord};
use crate::model_files::{
    check_format, compute_digest_logged, discover_model_files, existing_preview, metadata_path,
    preview_path, resolve_root, Digest, ModelFile,
};
use crate::network::{list_image_urls, CivitaiClient, LookupResult};
use crate::staleness::needs_refresh;
use crate::sync::outcome::{ImageFetch, SyncOutcome, SyncStats};
use crate::sync::reconcile::reconcile;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Drives a synchronization run.
#[derive(Debug)]
pub struct Synchronizer {
    client: CivitaiClient,
    options: SyncOptions,
    cancel: CancellationToken,
}

impl Synchronizer {
    pub fn new(client: CivitaiClient, options: SyncOptions) -> Self {
        Self {
            client,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally controlled cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn client(&self) -> &CivitaiClient {
        &self.client
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Synchronize every model file under `root`.
    ///
    /// Only an inaccessible root is an error. Per-file failures are recorded
    /// in the returned stats, and cancellation returns the stats gathered so
    /// far with `interrupted` set.
    pub async fn run(&self, root: &Path) -> Result<SyncStats> {
        let root = resolve_root(root)?;
        let files = discover_model_files(&root)?;

        let mut stats = SyncStats {
            total_files: files.len(),
            ..SyncStats::default()
        };

        for (index, file) in files.iter().enumerate() {
            if let Err(e) = self.cancel.check() {
                warn!(
                    "{} after {} of {} file(s)",
                    e,
                    stats.processed(),
                    stats.total_files
                );
                stats.interrupted = true;
                break;
            }

            info!(
                "[{}/{}] Processing: {}",
                index + 1,
                files.len(),
                file.display_name()
            );
            let outcome = self.process_file(file, &mut stats).await;
            log_outcome(file, &outcome);
            stats.record(&file.path, &outcome);
        }

        if self.options.clean_orphans && !stats.interrupted {
            let known: HashSet<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
            match reconcile(&root, &known) {
                Ok(reconciled) => stats.reconciled = Some(reconciled),
                Err(e) => error!("Orphan cleanup failed: {}", e),
            }
        }

        info!(
            "Sync finished: {} updated, {} cached, {} not found, {} failed",
            stats.updated, stats.cached, stats.not_found, stats.failed
        );
        Ok(stats)
    }

    /// Synchronize a single model file.
    pub async fn sync_file(&self, file: &ModelFile) -> SyncOutcome {
        let mut scratch = SyncStats::default();
        self.process_file(file, &mut scratch).await
    }

    async fn process_file(&self, file: &ModelFile, stats: &mut SyncStats) -> SyncOutcome {
        if let Err(e) = check_format(&file.path) {
            return SyncOutcome::failed(ErrorKind::InvalidFormat, e.to_string());
        }

        let sidecar = metadata_path(&file.path);
        let existing = load_record(&sidecar);

        let stored = match existing.as_ref() {
            Some(record) => record
                .describes_unchanged(file)
                .then(|| record.digest.clone()),
            None => legacy_digest_hint(file, &sidecar),
        };

        let digest = match stored {
            Some(digest) => {
                debug!("Reusing stored digest for {}", file.display_name());
                digest
            }
            None => {
                debug!("Computing SHA256 for {}", file.display_name());
                stats.hashes_computed += 1;
                match compute_digest_logged(&file.path, self.options.chunk_size).await {
                    Ok(digest) => digest,
                    Err(e) => return hashing_failed(e),
                }
            }
        };

        if !needs_refresh(
            existing.as_ref(),
            &digest,
            self.options.max_age,
            self.options.force,
        ) {
            let image = match existing {
                Some(record) => self.backfill_preview(file, &sidecar, record).await,
                None => ImageFetch::NotRequested,
            };
            return SyncOutcome::Cached { image };
        }

        self.refresh(file, &sidecar, digest).await
    }

    /// Look up the digest and persist the result.
    async fn refresh(&self, file: &ModelFile, sidecar: &Path, digest: Digest) -> SyncOutcome {
        let payload = match self.client.lookup_by_digest(&digest).await {
            Ok(LookupResult::Found(payload)) => payload,
            Ok(LookupResult::NotFound) => {
                let mut record = MetadataRecord::not_found(digest, file, Utc::now());
                record.has_preview = existing_preview(&file.path).is_some();
                return match save_record(sidecar, &record) {
                    Ok(()) => SyncOutcome::NotFound,
                    Err(e) => SyncOutcome::failed(ErrorKind::PersistenceError, e.to_string()),
                };
            }
            Err(e) => return SyncOutcome::failed(e.kind(), e.to_string()),
        };

        let mut record = MetadataRecord::found(digest, payload, file, Utc::now());
        record.has_preview = existing_preview(&file.path).is_some();
        if let Err(e) = save_record(sidecar, &record) {
            return SyncOutcome::failed(ErrorKind::PersistenceError, e.to_string());
        }
        info!("Metadata saved: {}", sidecar.display());

        let image = self.fetch_preview_for(file, sidecar, &mut record).await;
        SyncOutcome::Updated { image }
    }

    /// Retry a missing preview for a fresh record using its stored payload.
    async fn backfill_preview(
        &self,
        file: &ModelFile,
        sidecar: &Path,
        mut record: MetadataRecord,
    ) -> ImageFetch {
        if record.is_not_found() {
            return ImageFetch::NotRequested;
        }
        self.fetch_preview_for(file, sidecar, &mut record).await
    }

    /// Download the primary image when requested and no valid preview exists,
    /// updating `has_preview` on the stored record.
    async fn fetch_preview_for(
        &self,
        file: &ModelFile,
        sidecar: &Path,
        record: &mut MetadataRecord,
    ) -> ImageFetch {
        if !self.options.download_images {
            return ImageFetch::NotRequested;
        }
        if existing_preview(&file.path).is_some() {
            return ImageFetch::AlreadyPresent;
        }

        let image = match record.remote_payload.as_ref() {
            Some(payload) => self.download_primary_image(file, payload).await,
            None => ImageFetch::NoImages,
        };

        let has_preview = image == ImageFetch::Downloaded;
        if record.has_preview != has_preview {
            record.has_preview = has_preview;
            if let Err(e) = save_record(sidecar, record) {
                warn!("Failed to update {}: {}", sidecar.display(), e);
            }
        }
        image
    }

    async fn download_primary_image(&self, file: &ModelFile, payload: &Value) -> ImageFetch {
        let Some(url) = list_image_urls(payload).into_iter().next() else {
            debug!("No images listed for {}", file.display_name());
            return ImageFetch::NoImages;
        };

        let destination = preview_path(&file.path);
        match self.client.download_image(&url, &destination).await {
            Ok(_) => ImageFetch::Downloaded,
            Err(e) => {
                warn!("Image download failed for {}: {}", file.display_name(), e);
                ImageFetch::Failed
            }
        }
    }
}

/// Digest from an older sidecar layout, trusted only when the sidecar was
/// written no earlier than the model file's last modification.
fn legacy_digest_hint(file: &ModelFile, sidecar: &Path) -> Option<Digest> {
    let modified = file.modified?;
    let written = std::fs::metadata(sidecar)
        .and_then(|m| m.modified())
        .ok()?;
    if modified > written {
        return None;
    }
    let digest = load_legacy_digest(sidecar)?;
    debug!("Using digest from legacy sidecar {}", sidecar.display());
    Some(digest)
}

/// The file passed validation, so a read error while hashing is still a
/// problem with the model file itself.
fn hashing_failed(error: SyncError) -> SyncOutcome {
    SyncOutcome::failed(ErrorKind::InvalidFormat, error.to_string())
}

fn log_outcome(file: &ModelFile, outcome: &SyncOutcome) {
    let name = file.display_name();
    match outcome {
        SyncOutcome::Cached { .. } => info!("Metadata is fresh, skipping: {}", name),
        SyncOutcome::Updated { .. } => info!("Updated: {}", name),
        SyncOutcome::NotFound => info!("Not found on Civitai: {}", name),
        SyncOutcome::Failed { kind, message } => warn!("Failed ({}): {}: {}", kind, name, message),
    }
}

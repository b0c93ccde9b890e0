//! Streaming SHA256 digest computation for model files.
//!
//! Files are read in fixed-size chunks, never loaded whole. Large files
//! report progress over an optional channel; progress never influences the
//! resulting digest.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::model_files::Digest;
use sha2::{Digest as _, Sha256};
use std::io::Read;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::debug;

const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Progress update during hashing.
#[derive(Debug, Clone)]
pub struct HashProgress {
    /// Bytes processed so far
    pub bytes_processed: u64,
    /// Total file size
    pub total_bytes: u64,
    /// Progress percentage (0.0-1.0)
    pub progress: f32,
}

/// Compute the SHA256 digest of a file.
///
/// # Arguments
///
/// * `path` - Path to the file to hash
/// * `chunk_size` - Bytes read per iteration (clamped to at least 1)
/// * `progress_tx` - Optional channel for progress; only used for files above
///   [`SyncConfig::HASH_PROGRESS_THRESHOLD`]
pub fn compute_digest(
    path: impl AsRef<Path>,
    chunk_size: usize,
    progress_tx: Option<&mpsc::Sender<HashProgress>>,
) -> Result<Digest> {
    hash_file(
        path.as_ref(),
        chunk_size,
        progress_tx,
        SyncConfig::HASH_PROGRESS_THRESHOLD,
    )
}

fn hash_file(
    path: &Path,
    chunk_size: usize,
    progress_tx: Option<&mpsc::Sender<HashProgress>>,
    progress_threshold: u64,
) -> Result<Digest> {
    let mut file = std::fs::File::open(path).map_err(|e| SyncError::io_with_path(e, path))?;

    let total_bytes = file
        .metadata()
        .map_err(|e| SyncError::io_with_path(e, path))?
        .len();
    let report = progress_tx.filter(|_| total_bytes > progress_threshold);

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut bytes_processed: u64 = 0;

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| SyncError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
        bytes_processed += bytes_read as u64;

        // Non-blocking, a full channel just drops the update
        if let Some(tx) = report {
            let _ = tx.try_send(HashProgress {
                bytes_processed,
                total_bytes,
                progress: bytes_processed as f32 / total_bytes as f32,
            });
        }
    }

    Digest::parse(&hex::encode(hasher.finalize()))
}

/// Compute a digest on the blocking pool, logging progress of large files at
/// debug level.
pub async fn compute_digest_logged(path: impl AsRef<Path>, chunk_size: usize) -> Result<Digest> {
    let (digest, _) = digest_with_progress_log(
        path.as_ref(),
        chunk_size,
        SyncConfig::HASH_PROGRESS_THRESHOLD,
    )
    .await?;
    Ok(digest)
}

/// Returns the digest and the number of progress lines logged.
async fn digest_with_progress_log(
    path: &Path,
    chunk_size: usize,
    progress_threshold: u64,
) -> Result<(Digest, u32)> {
    let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
    let owned = path.to_path_buf();
    let hashing = tokio::task::spawn_blocking(move || {
        hash_file(&owned, chunk_size, Some(&tx), progress_threshold)
    });

    // The sender drops with the hashing closure, which ends the log loop
    let (digest, logged) = tokio::join!(hashing, log_progress(path, rx));
    Ok((digest.map_err(join_failed)??, logged))
}

/// Log each new 10% step received on `rx`.
async fn log_progress(path: &Path, mut rx: mpsc::Receiver<HashProgress>) -> u32 {
    let mut last_step: Option<u32> = None;
    let mut logged = 0;
    while let Some(update) = rx.recv().await {
        let step = (update.progress * 10.0).floor() as u32;
        if last_step.is_some_and(|last| step <= last) {
            continue;
        }
        last_step = Some(step);
        logged += 1;
        debug!(
            "Hashing {}: {}% ({} of {} bytes)",
            path.display(),
            step * 10,
            update.bytes_processed,
            update.total_bytes
        );
    }
    logged
}

fn join_failed(err: tokio::task::JoinError) -> SyncError {
    SyncError::Other(format!("Hash computation task failed: {}", err))
}

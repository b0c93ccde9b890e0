//! civitai-sync core - hash-keyed metadata and preview synchronization for
//! safetensors model files.
//!
//! Every model file under a directory is identified by its SHA256 digest and
//! looked up on Civitai. Results are stored next to the model as `name.json`,
//! and optionally the primary image as `name.preview.png`. Fresh sidecars are
//! reused without contacting the service.
//!
//! # Example
//!
//! ```rust,ignore
//! use civitai_sync_core::{CivitaiClient, SyncOptions, Synchronizer};
//!
//! #[tokio::main]
//! async fn main() -> civitai_sync_core::Result<()> {
//!     let options = SyncOptions::new().with_download_images(true);
//!     let client = CivitaiClient::new(&options)?;
//!     let stats = Synchronizer::new(client, options)
//!         .run("/path/to/models".as_ref())
//!         .await?;
//!
//!     println!("{} updated, {} cached", stats.updated, stats.cached);
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod metadata;
pub mod model_files;
pub mod network;
pub mod staleness;
pub mod sync;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use config::{CompanionConfig, NetworkConfig, SyncConfig, SyncOptions};
pub use error::{ErrorKind, Result, SyncError};
pub use metadata::{load_legacy_digest, load_record, save_record, MetadataRecord};
pub use model_files::{
    compute_digest, compute_digest_logged, discover_model_files, extract_header_metadata,
    validate, Digest, HeaderMetadata, ModelFile,
};
pub use network::{CivitaiClient, LookupResult, ReqwestTransport, RetryConfig, Transport};
pub use staleness::needs_refresh;
pub use sync::{
    list_missing_previews, list_not_found, reconcile, ImageFetch, ReconcileStats, SyncOutcome,
    SyncStats, Synchronizer,
};

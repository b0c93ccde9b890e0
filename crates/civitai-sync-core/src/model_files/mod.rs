//! Local model files: discovery, validation, hashing and companion naming.
//!
//! # Module Organization
//!
//! - [`types`] - `ModelFile` and `Digest`
//! - [`validation`] - safetensors structure checks and header metadata
//! - [`hashing`] - streaming SHA256 digests
//! - [`discovery`] - recursive directory scan
//! - [`companion`] - sidecar and preview naming

pub mod companion;
pub mod discovery;
pub mod hashing;
pub mod types;
pub mod validation;

pub use companion::{existing_preview, metadata_path, preview_path, CompanionKind};
pub use discovery::{discover_model_files, resolve_root};
pub use hashing::{compute_digest, compute_digest_logged, HashProgress};
pub use types::{Digest, ModelFile};
pub use validation::{check_format, extract_header_metadata, validate, HeaderMetadata};

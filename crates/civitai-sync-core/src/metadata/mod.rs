//! Metadata persistence.
//!
//! - [`atomic`] - crash-safe JSON reads and writes
//! - [`record`] - the per-model sidecar record

mod atomic;
mod record;

pub use atomic::{atomic_read_json, atomic_write_json};
pub use record::{load_legacy_digest, load_record, save_record, MetadataRecord};

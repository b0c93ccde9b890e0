//! Synchronization engine.
//!
//! - [`orchestrator`] - the per-file pipeline and run loop
//! - [`outcome`] - per-file outcomes and aggregate stats
//! - [`reconcile`] - orphaned companion cleanup
//! - [`report`] - read-only directory reports

pub mod orchestrator;
pub mod outcome;
pub mod reconcile;
pub mod report;

pub use orchestrator::Synchronizer;
pub use outcome::{FileFailure, ImageFetch, SyncOutcome, SyncStats};
pub use reconcile::{reconcile, ReconcileStats};
pub use report::{list_missing_previews, list_not_found};

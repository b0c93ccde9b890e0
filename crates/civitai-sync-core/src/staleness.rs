//! Cache staleness policy.
//!
//! Decides whether a model's sidecar must be refreshed from the remote
//! service. The rules, first match wins:
//!
//! 1. `force` always refreshes
//! 2. no record refreshes
//! 3. a digest mismatch refreshes regardless of age
//! 4. a zero `max_age` refreshes
//! 5. a record older than `max_age` (strictly) refreshes
//! 6. anything else is fresh

use crate::metadata::MetadataRecord;
use crate::model_files::Digest;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Decide whether a refresh is needed, using the current time.
pub fn needs_refresh(
    record: Option<&MetadataRecord>,
    current_digest: &Digest,
    max_age: Duration,
    force: bool,
) -> bool {
    needs_refresh_at(record, current_digest, max_age, force, Utc::now())
}

/// Decide whether a refresh is needed as of `now`.
pub fn needs_refresh_at(
    record: Option<&MetadataRecord>,
    current_digest: &Digest,
    max_age: Duration,
    force: bool,
    now: DateTime<Utc>,
) -> bool {
    if force {
        return true;
    }
    let Some(record) = record else {
        return true;
    };
    if &record.digest != current_digest {
        return true;
    }
    if max_age.is_zero() {
        return true;
    }

    // A record from the future (clock skew) counts as just checked
    let elapsed = (now - record.last_checked).to_std().unwrap_or(Duration::ZERO);
    elapsed > max_age
}

//! Persisted sidecar record for one model file.

use crate::error::Result;
use crate::metadata::atomic::{atomic_read_json, atomic_write_json};
use crate::model_files::{Digest, ModelFile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::warn;

/// Digest keys used by sidecars from older tools, in lookup order.
const LEGACY_DIGEST_KEYS: [&str; 4] = ["sha256", "SHA256", "hash", "computed_hash"];

/// Companion metadata for a model file, stored as `name.json`.
///
/// A refresh always builds a new record; fields are never merged with a
/// previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Content digest of the model file when the record was written.
    #[serde(rename = "hash")]
    pub digest: Digest,
    /// Civitai model version id, absent when the lookup found nothing.
    #[serde(rename = "modelVersionId", default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<u64>,
    /// Raw lookup response, absent when the lookup found nothing.
    #[serde(rename = "civitai", default, skip_serializing_if = "Option::is_none")]
    pub remote_payload: Option<Value>,
    pub last_checked: DateTime<Utc>,
    #[serde(default)]
    pub has_preview: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_modified: Option<DateTime<Utc>>,
    /// Summary fields copied from the payload, kept verbatim on round-trip.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MetadataRecord {
    /// Record for a successful lookup.
    pub fn found(digest: Digest, payload: Value, file: &ModelFile, now: DateTime<Utc>) -> Self {
        let remote_id = payload.get("id").and_then(Value::as_u64);
        let extra = summarize_payload(&payload);

        Self {
            digest,
            remote_id,
            remote_payload: Some(payload),
            last_checked: now,
            has_preview: false,
            source_size: Some(file.size),
            source_modified: file.modified.map(DateTime::<Utc>::from),
            extra,
        }
    }

    /// Record for a lookup the service answered with "no match".
    pub fn not_found(digest: Digest, file: &ModelFile, now: DateTime<Utc>) -> Self {
        Self {
            digest,
            remote_id: None,
            remote_payload: None,
            last_checked: now,
            has_preview: false,
            source_size: Some(file.size),
            source_modified: file.modified.map(DateTime::<Utc>::from),
            extra: Map::new(),
        }
    }

    /// True if the service had no match for this digest.
    pub fn is_not_found(&self) -> bool {
        self.remote_payload.is_none()
    }

    /// True if the file's size and mtime are the ones recorded, meaning the
    /// stored digest can be reused without hashing.
    pub fn describes_unchanged(&self, file: &ModelFile) -> bool {
        let (Some(size), Some(recorded), Some(modified)) =
            (self.source_size, self.source_modified, file.modified)
        else {
            return false;
        };

        size == file.size
            && recorded.timestamp_millis() == DateTime::<Utc>::from(modified).timestamp_millis()
    }
}

/// Pull the commonly used fields out of a model version payload.
fn summarize_payload(payload: &Value) -> Map<String, Value> {
    let mut summary = Map::new();

    if let Some(model_id) = payload.get("modelId") {
        summary.insert("modelId".into(), model_id.clone());
    }
    if let Some(base_model) = payload.get("baseModel") {
        summary.insert("baseModel".into(), base_model.clone());
    }
    if let Some(words) = payload.get("trainedWords") {
        summary.insert("trainedWords".into(), words.clone());
    }

    if let Some(model) = payload.get("model").and_then(Value::as_object) {
        let mut info = Map::new();
        for key in ["name", "type", "nsfw", "poi"] {
            if let Some(value) = model.get(key) {
                info.insert(key.into(), value.clone());
            }
        }
        summary.insert("model".into(), Value::Object(info));
    }

    summary
}

/// Load a sidecar record.
///
/// Missing, unreadable and schema-invalid sidecars all yield `None`; the
/// caller treats that as "no cache" and refreshes.
pub fn load_record(path: &Path) -> Option<MetadataRecord> {
    match atomic_read_json::<MetadataRecord>(path) {
        Ok(record) => record,
        Err(e) => {
            warn!("Ignoring unusable metadata {}: {}", path.display(), e);
            None
        }
    }
}

/// Digest stored in an older sidecar layout (`sha256` plus `last_updated`).
///
/// Such sidecars carry no size or mtime, so the digest is only a hint for the
/// caller to validate.
pub fn load_legacy_digest(path: &Path) -> Option<Digest> {
    let value = atomic_read_json::<Value>(path).ok().flatten()?;
    LEGACY_DIGEST_KEYS
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find_map(|candidate| Digest::parse(candidate).ok())
}

/// Persist a sidecar record atomically.
pub fn save_record(path: &Path, record: &MetadataRecord) -> Result<()> {
    atomic_write_json(path, record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn digest() -> Digest {
        Digest::parse(&"ab".repeat(32)).unwrap()
    }

    fn model_file() -> ModelFile {
        ModelFile {
            path: PathBuf::from("/models/a.safetensors"),
            size: 1024,
            modified: Some(SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123)),
        }
    }

    fn payload() -> Value {
        json!({
            "id": 130072,
            "modelId": 4201,
            "baseModel": "SD 1.5",
            "trainedWords": ["analog style"],
            "model": {"name": "Realistic Vision", "type": "Checkpoint", "nsfw": false, "poi": false, "extra": 1},
            "images": [{"url": "https://image.civitai.com/a.jpeg"}]
        })
    }

    #[test]
    fn test_found_record_serializes_expected_keys() {
        let record = MetadataRecord::found(digest(), payload(), &model_file(), Utc::now());
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["hash"], json!("ab".repeat(32)));
        assert_eq!(value["modelVersionId"], json!(130072));
        assert_eq!(value["civitai"]["baseModel"], json!("SD 1.5"));
        assert_eq!(value["modelId"], json!(4201));
        assert_eq!(value["model"], json!({"name": "Realistic Vision", "type": "Checkpoint", "nsfw": false, "poi": false}));
        assert!(value.get("last_checked").is_some());
    }

    #[test]
    fn test_not_found_record_omits_payload() {
        let record = MetadataRecord::not_found(digest(), &model_file(), Utc::now());
        let value = serde_json::to_value(&record).unwrap();

        assert!(record.is_not_found());
        assert!(value.get("civitai").is_none());
        assert!(value.get("modelVersionId").is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.json");
        let record = MetadataRecord::found(digest(), payload(), &model_file(), Utc::now());

        save_record(&path, &record).unwrap();
        assert_eq!(load_record(&path), Some(record));
    }

    #[test]
    fn test_unusable_sidecars_load_as_none() {
        let dir = TempDir::new().unwrap();

        let missing = dir.path().join("missing.json");
        assert!(load_record(&missing).is_none());

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();
        assert!(load_record(&garbage).is_none());

        let legacy = dir.path().join("legacy.json");
        std::fs::write(&legacy, r#"{"sha256": "abc", "last_updated": "2024-01-01T00:00:00"}"#)
            .unwrap();
        assert!(load_record(&legacy).is_none());
    }

    #[test]
    fn test_describes_unchanged() {
        let file = model_file();
        let record = MetadataRecord::not_found(digest(), &file, Utc::now());
        assert!(record.describes_unchanged(&file));

        let grown = ModelFile { size: 2048, ..file.clone() };
        assert!(!record.describes_unchanged(&grown));

        let touched = ModelFile {
            modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_800_000_000)),
            ..file.clone()
        };
        assert!(!record.describes_unchanged(&touched));

        let no_mtime = ModelFile { modified: None, ..file };
        assert!(!record.describes_unchanged(&no_mtime));
    }

    #[test]
    fn test_legacy_digest_is_read_from_old_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.json");
        let upper = "AB".repeat(32);
        std::fs::write(
            &path,
            json!({"sha256": upper, "last_updated": "2024-01-01T12:30:00.123456"}).to_string(),
        )
        .unwrap();

        assert!(load_record(&path).is_none());
        assert_eq!(load_legacy_digest(&path), Some(digest()));

        let fallback = dir.path().join("fallback.json");
        std::fs::write(
            &fallback,
            json!({"sha256": "abc", "computed_hash": "ab".repeat(32)}).to_string(),
        )
        .unwrap();
        assert_eq!(load_legacy_digest(&fallback), Some(digest()));

        let notes = dir.path().join("notes.json");
        std::fs::write(&notes, r#"{"todo": []}"#).unwrap();
        assert!(load_legacy_digest(&notes).is_none());
        assert!(load_legacy_digest(&dir.path().join("missing.json")).is_none());
    }
}

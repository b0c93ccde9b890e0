//! Core value types for discovered model files.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

/// A model file found on disk during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFile {
    /// Absolute path to the file.
    pub path: PathBuf,
    /// Size in bytes at discovery time.
    pub size: u64,
    /// Modification time at discovery time, if the platform reports one.
    pub modified: Option<SystemTime>,
}

impl ModelFile {
    /// File name for log messages.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// SHA256 content digest as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Parse a digest, accepting surrounding whitespace and uppercase hex.
    pub fn parse(value: &str) -> Result<Self, SyncError> {
        let normalized = value.trim().to_ascii_lowercase();
        let valid = normalized.len() == 64 && normalized.bytes().all(|b| b.is_ascii_hexdigit());
        if valid {
            Ok(Self(normalized))
        } else {
            Err(SyncError::InvalidDigest(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log messages.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl TryFrom<String> for Digest {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Digest::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_digest_normalizes_case_and_whitespace() {
        let digest = Digest::parse(&format!("  {}\n", EMPTY_SHA256.to_uppercase())).unwrap();
        assert_eq!(digest.as_str(), EMPTY_SHA256);
        assert_eq!(digest.short(), "e3b0c442");
    }

    #[test]
    fn test_digest_rejects_bad_input() {
        assert!(Digest::parse("abc").is_err());
        assert!(Digest::parse(&"g".repeat(64)).is_err());
        assert!(Digest::parse(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_digest_serde_validates() {
        let json = format!("\"{}\"", EMPTY_SHA256);
        let digest: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(serde_json::to_string(&digest).unwrap(), json);

        assert!(serde_json::from_str::<Digest>("\"not-a-digest\"").is_err());
    }
}

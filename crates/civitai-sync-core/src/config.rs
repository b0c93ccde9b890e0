//! Centralized configuration for civitai-sync.
//!
//! Constants live on unit structs; [`SyncOptions`] carries the resolved
//! settings for one run into the client and orchestrator.

use crate::network::RetryConfig;
use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const CIVITAI_API_BASE: &'static str = "https://civitai.com/api/v1";
    pub const USER_AGENT: &'static str = "civitai-sync/1.5";
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
    pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(60);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
}

/// Hashing and cache policy configuration.
pub struct SyncConfig;

impl SyncConfig {
    /// Read size for digest computation (8MB, optimal for SSDs).
    pub const HASH_CHUNK_SIZE: usize = 8 * 1024 * 1024;
    /// Files above this size emit hashing progress.
    pub const HASH_PROGRESS_THRESHOLD: u64 = 100 * 1024 * 1024;
    /// Default age after which cached metadata is refreshed.
    pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);
    /// Upper bound on a safetensors JSON header.
    pub const MAX_HEADER_SIZE: u64 = 100_000_000;
}

/// Companion file naming.
pub struct CompanionConfig;

impl CompanionConfig {
    pub const MODEL_EXTENSIONS: &'static [&'static str] = &["safetensors", "safetensor"];
    pub const METADATA_EXTENSION: &'static str = "json";
    pub const PREVIEW_SUFFIX: &'static str = ".preview";
    /// Preview written by this tool.
    pub const PREVIEW_EXTENSION: &'static str = "png";
    /// Any of these counts as an existing preview.
    pub const PREVIEW_EXTENSIONS: &'static [&'static str] = &["png", "jpg", "jpeg", "webp", "gif"];
}

/// Settings for one synchronization run.
///
/// Everything is resolved by the caller; the engine never reads the
/// environment or config files itself.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Fetch a preview image for models that lack one.
    pub download_images: bool,
    /// Refresh every record regardless of age or digest.
    pub force: bool,
    /// Records older than this are refreshed. Zero means always refresh.
    pub max_age: Duration,
    /// Minimum spacing between the start of two remote requests.
    pub min_interval: Duration,
    /// Backoff for retryable failures.
    pub retry: RetryConfig,
    /// Civitai API key.
    pub api_key: Option<String>,
    /// Read size used when hashing.
    pub chunk_size: usize,
    /// Remove companion files whose model is gone after the run.
    pub clean_orphans: bool,
    /// Base URL of the Civitai API.
    pub api_base: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            download_images: false,
            force: false,
            max_age: SyncConfig::DEFAULT_MAX_AGE,
            min_interval: NetworkConfig::DEFAULT_MIN_INTERVAL,
            retry: RetryConfig::default(),
            api_key: None,
            chunk_size: SyncConfig::HASH_CHUNK_SIZE,
            clean_orphans: false,
            api_base: NetworkConfig::CIVITAI_API_BASE.to_string(),
        }
    }
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_download_images(mut self, download_images: bool) -> Self {
        self.download_images = download_images;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the API key. Blank keys are treated as absent.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_clean_orphans(mut self, clean_orphans: bool) -> Self {
        self.clean_orphans = clean_orphans;
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

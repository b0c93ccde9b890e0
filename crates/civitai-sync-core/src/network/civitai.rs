//! Civitai API client.
//!
//! Lookups are keyed by SHA256 digest:
//! `GET {api_base}/model-versions/by-hash/{digest}`. All requests pass
//! through one [`RateGate`], and retryable failures back off exponentially
//! before the next attempt.
//!
//! Status handling:
//! - 2xx: success
//! - 404 on a lookup: the service has no match (not an error, never retried)
//! - 408, 429, 5xx and transport failures: retried up to `max_retries`
//! - any other 4xx, or an unparseable lookup body: returned immediately

use crate::config::{NetworkConfig, SyncOptions};
use crate::model_files::Digest;
use crate::network::rate_limit::RateGate;
use crate::network::retry::{RetryConfig, RetryStats};
use crate::network::transport::{extract_domain, ReqwestTransport, Transport, TransportResponse};
use crate::{Result, SyncError};
use futures::StreamExt;
use serde_json::Value;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of a digest lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    /// The model version payload.
    Found(Value),
    /// The service has no model version with this digest.
    NotFound,
}

/// Rate-limited client for the Civitai API.
pub struct CivitaiClient {
    transport: Box<dyn Transport>,
    gate: RateGate,
    retry: RetryConfig,
    api_base: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for CivitaiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CivitaiClient")
            .field("api_base", &self.api_base)
            .field("retry", &self.retry)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

impl CivitaiClient {
    /// Create a client using the reqwest transport.
    pub fn new(options: &SyncOptions) -> Result<Self> {
        Ok(Self::with_transport(
            Box::new(ReqwestTransport::new()?),
            options,
        ))
    }

    /// Create a client over a custom transport.
    pub fn with_transport(transport: Box<dyn Transport>, options: &SyncOptions) -> Self {
        Self {
            transport,
            gate: RateGate::new(options.min_interval),
            retry: options.retry.clone(),
            api_base: options.api_base.clone(),
            api_key: options.api_key.clone(),
        }
    }

    /// Request and retry counters accumulated so far.
    pub async fn stats(&self) -> RetryStats {
        self.gate.stats().await
    }

    /// Look up a model version by file digest.
    pub async fn lookup_by_digest(&self, digest: &Digest) -> Result<LookupResult> {
        let url = format!("{}/model-versions/by-hash/{}", self.api_base, digest);
        debug!("Fetching metadata for hash: {}...", digest.short());

        let Some(body) = self
            .execute(&url, true, true, |response| response.bytes())
            .await?
        else {
            info!("No Civitai match for hash: {}...", digest.short());
            return Ok(LookupResult::NotFound);
        };

        match serde_json::from_slice::<Value>(&body) {
            Ok(payload @ Value::Object(_)) => Ok(LookupResult::Found(payload)),
            Ok(_) => Err(SyncError::MalformedResponse {
                url,
                message: "expected a JSON object".into(),
            }),
            Err(e) => Err(SyncError::MalformedResponse {
                url,
                message: e.to_string(),
            }),
        }
    }

    /// Image URLs in a model version payload, version images first.
    pub fn list_image_urls(payload: &Value) -> Vec<String> {
        list_image_urls(payload)
    }

    /// Stream an image to `destination` via a `.part` temp file.
    ///
    /// Returns the number of bytes written.
    pub async fn download_image(&self, url: &str, destination: &Path) -> Result<u64> {
        if url::Url::parse(url).is_err() {
            return Err(SyncError::MalformedResponse {
                url: url.to_string(),
                message: "invalid image URL".into(),
            });
        }

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SyncError::io_with_path(e, parent))?;
            }
        }

        let temp_path = PathBuf::from(format!(
            "{}{}",
            destination.display(),
            NetworkConfig::DOWNLOAD_TEMP_SUFFIX
        ));
        let temp: &Path = &temp_path;

        let result = self
            .execute(url, false, false, move |response| write_body(response, temp))
            .await;

        match result {
            Ok(Some(0)) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(SyncError::MalformedResponse {
                    url: url.to_string(),
                    message: "empty image body".into(),
                })
            }
            Ok(Some(bytes)) => {
                std::fs::rename(&temp_path, destination).map_err(|e| {
                    let _ = std::fs::remove_file(&temp_path);
                    SyncError::io_with_path(e, destination)
                })?;
                info!("Downloaded image: {}", destination.display());
                Ok(bytes)
            }
            Ok(None) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(SyncError::RemoteClient {
                    status: 404,
                    url: url.to_string(),
                })
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    /// Send a GET through the rate gate and consume the body, retrying
    /// transient failures of either step.
    ///
    /// The permit is held until `consume` finishes, so no other request
    /// starts while a body is still streaming. Returns `None` for a 404 when
    /// `not_found_ok` is set.
    async fn execute<T, F, Fut>(
        &self,
        url: &str,
        authenticate: bool,
        not_found_ok: bool,
        mut consume: F,
    ) -> Result<Option<T>>
    where
        F: FnMut(TransportResponse) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let bearer = if authenticate {
            self.api_key.as_deref()
        } else {
            None
        };

        let mut attempt: u32 = 0;
        loop {
            let mut permit = self.gate.acquire().await;

            let (error, retry_after) = match self.transport.get(url, bearer).await {
                Ok(response) => match classify_status(response.status, url, response.retry_after) {
                    StatusClass::Success => match consume(response).await {
                        Ok(value) => {
                            permit.reset_backoff();
                            return Ok(Some(value));
                        }
                        Err(error) => (error, None),
                    },
                    StatusClass::NotFound if not_found_ok => {
                        permit.reset_backoff();
                        return Ok(None);
                    }
                    StatusClass::NotFound => {
                        permit.reset_backoff();
                        return Err(SyncError::RemoteClient {
                            status: response.status,
                            url: url.to_string(),
                        });
                    }
                    StatusClass::Failed(error) => (error, response.retry_after),
                },
                Err(error) => (error, None),
            };

            if !error.is_retryable() {
                debug!("Error is not retryable: {}", error);
                permit.reset_backoff();
                return Err(error);
            }

            if attempt >= self.retry.max_retries {
                warn!(
                    "Giving up on {} after {} attempts: {}",
                    url,
                    attempt + 1,
                    error
                );
                permit.reset_backoff();
                return Err(SyncError::RetriesExhausted {
                    attempts: attempt + 1,
                    last_error: error.to_string(),
                });
            }

            let delay = permit.next_backoff(&self.retry, retry_after);
            warn!(
                "Attempt {}/{} failed: {}. Retrying in {:?}",
                attempt + 1,
                self.retry.max_retries + 1,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

enum StatusClass {
    Success,
    NotFound,
    Failed(SyncError),
}

fn classify_status(status: u16, url: &str, retry_after: Option<std::time::Duration>) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        404 => StatusClass::NotFound,
        408 => StatusClass::Failed(SyncError::Timeout(format!("GET {} returned 408", url))),
        429 => StatusClass::Failed(SyncError::RateLimited {
            service: extract_domain(url),
            retry_after_secs: retry_after.map(|d| d.as_secs()),
        }),
        500..=599 => StatusClass::Failed(SyncError::Server {
            status,
            url: url.to_string(),
        }),
        _ => StatusClass::Failed(SyncError::RemoteClient {
            status,
            url: url.to_string(),
        }),
    }
}

async fn write_body(response: TransportResponse, temp_path: &Path) -> Result<u64> {
    let mut file =
        std::fs::File::create(temp_path).map_err(|e| SyncError::io_with_path(e, temp_path))?;

    let mut written: u64 = 0;
    let mut body = response.body;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .map_err(|e| SyncError::io_with_path(e, temp_path))?;
        written += chunk.len() as u64;
    }

    file.flush().map_err(|e| SyncError::io_with_path(e, temp_path))?;
    Ok(written)
}

/// Image URLs in a model version payload.
///
/// Reads `images[*].url`, then `model.images[*].url`, skipping entries
/// without a string `url`.
pub fn list_image_urls(payload: &Value) -> Vec<String> {
    let collect = |images: Option<&Value>| -> Vec<String> {
        images
            .and_then(Value::as_array)
            .map(|images| {
                images
                    .iter()
                    .filter_map(|image| image.get("url").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    let mut urls = collect(payload.get("images"));
    urls.extend(collect(payload.get("model").and_then(|m| m.get("images"))));
    urls
}

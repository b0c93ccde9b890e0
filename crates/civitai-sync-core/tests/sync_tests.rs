//! Integration tests for a full synchronization run.
//!
//! The remote service is replaced by a scripted transport, so these tests
//! exercise discovery, hashing, the cache policy, persistence and cleanup
//! against a real temporary directory.

use async_trait::async_trait;
use civitai_sync_core::network::testing::ScriptedTransport;
use civitai_sync_core::network::TransportResponse;
use civitai_sync_core::{
    compute_digest, CancellationToken, CivitaiClient, ErrorKind, RetryConfig, SyncError,
    SyncOptions, SyncStats, Synchronizer, Transport,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Write a minimal safetensors file with one U8 tensor holding `payload`.
fn write_model(path: &Path, payload: &[u8]) {
    let header = format!(
        "{{\"__metadata__\":{{\"format\":\"pt\"}},\"weight\":{{\"dtype\":\"U8\",\"shape\":[{}],\"data_offsets\":[0,{}]}}}}",
        payload.len(),
        payload.len()
    );
    let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(payload);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
}

fn test_options() -> SyncOptions {
    SyncOptions::new()
        .with_min_interval(Duration::from_millis(500))
        .with_api_base("https://civitai.test/api/v1")
        .with_retry(
            RetryConfig::new()
                .with_max_retries(3)
                .with_base_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(8)),
        )
}

async fn run(transport: &ScriptedTransport, options: SyncOptions, root: &Path) -> SyncStats {
    let client = CivitaiClient::with_transport(Box::new(transport.clone()), &options);
    Synchronizer::new(client, options).run(root).await.unwrap()
}

/// Cancels the run as soon as a request is sent, as Ctrl-C would mid-file.
struct CancelOnRequest {
    inner: ScriptedTransport,
    cancel: CancellationToken,
}

#[async_trait]
impl Transport for CancelOnRequest {
    async fn get(
        &self,
        url: &str,
        bearer: Option<&str>,
    ) -> civitai_sync_core::Result<TransportResponse> {
        self.cancel.cancel();
        self.inner.get(url, bearer).await
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

fn version_payload(id: u64) -> Value {
    json!({
        "id": id,
        "modelId": 100 + id,
        "baseModel": "SDXL 1.0",
        "trainedWords": ["trigger"],
        "model": {"name": "Test Model", "type": "LORA", "nsfw": false, "poi": false},
        "images": [{"url": format!("https://image.civitai.test/{}.png", id)}]
    })
}

#[tokio::test(start_paused = true)]
async fn test_new_model_is_updated_with_preview() {
    let dir = TempDir::new().unwrap();
    let model = dir.path().join("style.safetensors");
    write_model(&model, b"weights-v1");
    let digest = compute_digest(&model, 4096, None).unwrap();

    let transport = ScriptedTransport::new();
    transport.push_json(200, version_payload(1));
    transport.push_body(200, "PNGBYTES");

    let stats = run(&transport, test_options().with_download_images(true), dir.path()).await;

    assert_eq!(stats.total_files, 1);
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.images_downloaded, 1);
    assert_eq!(stats.hashes_computed, 1);

    let sidecar = read_json(&dir.path().join("style.json"));
    assert_eq!(sidecar["hash"], digest.as_str());
    assert_eq!(sidecar["modelVersionId"], 1);
    assert_eq!(sidecar["modelId"], 101);
    assert_eq!(sidecar["model"]["name"], "Test Model");
    assert_eq!(sidecar["has_preview"], true);
    assert_eq!(
        std::fs::read(dir.path().join("style.preview.png")).unwrap(),
        b"PNGBYTES"
    );

    let requests = transport.requests();
    assert!(requests[0].url.ends_with(&format!("/model-versions/by-hash/{}", digest)));
    assert_eq!(requests[1].url, "https://image.civitai.test/1.png");
}

#[tokio::test(start_paused = true)]
async fn test_second_run_is_cached_without_network() {
    let dir = TempDir::new().unwrap();
    write_model(&dir.path().join("a.safetensors"), b"weights-a");

    let first = ScriptedTransport::new();
    first.push_json(200, version_payload(1));
    first.push_body(200, "PNG");
    run(&first, test_options().with_download_images(true), dir.path()).await;

    let second = ScriptedTransport::new();
    let stats = run(&second, test_options().with_download_images(true), dir.path()).await;

    assert_eq!(stats.cached, 1);
    assert_eq!(stats.updated, 0);
    assert_eq!(stats.hashes_computed, 0);
    assert_eq!(second.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_run_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write_model(&dir.path().join("found.safetensors"), b"weights-found");
    write_model(&dir.path().join("sub/unknown.safetensors"), b"weights-unknown");

    let transport = ScriptedTransport::new();
    transport.push_json(200, version_payload(2));
    transport.push_json(404, json!({"error": "Model not found"}));
    let first = run(&transport, test_options(), dir.path()).await;
    assert_eq!(first.updated, 1);
    assert_eq!(first.not_found, 1);

    let found_before = std::fs::read(dir.path().join("found.json")).unwrap();
    let unknown_before = std::fs::read(dir.path().join("sub/unknown.json")).unwrap();

    let second = run(&transport, test_options(), dir.path()).await;

    assert_eq!(second.cached, 2);
    assert_eq!(second.processed(), 2);
    assert_eq!(transport.call_count(), 2);
    assert_eq!(std::fs::read(dir.path().join("found.json")).unwrap(), found_before);
    assert_eq!(
        std::fs::read(dir.path().join("sub/unknown.json")).unwrap(),
        unknown_before
    );
}

#[tokio::test(start_paused = true)]
async fn test_changed_model_is_refreshed() {
    let dir = TempDir::new().unwrap();
    let model = dir.path().join("a.safetensors");
    write_model(&model, b"original");

    let transport = ScriptedTransport::new();
    transport.push_json(200, version_payload(1));
    run(&transport, test_options(), dir.path()).await;

    write_model(&model, b"retrained weights");
    let new_digest = compute_digest(&model, 4096, None).unwrap();
    transport.push_json(200, version_payload(2));

    let stats = run(&transport, test_options(), dir.path()).await;

    assert_eq!(stats.updated, 1);
    assert_eq!(stats.cached, 0);
    assert_eq!(transport.call_count(), 2);
    let sidecar = read_json(&dir.path().join("a.json"));
    assert_eq!(sidecar["hash"], new_digest.as_str());
    assert_eq!(sidecar["modelVersionId"], 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_with_growing_waits() {
    let dir = TempDir::new().unwrap();
    write_model(&dir.path().join("a.safetensors"), b"weights");

    let transport = ScriptedTransport::new();
    transport.push_status(502);
    transport.push_rate_limited(Duration::from_secs(2));
    transport.push_error(SyncError::Timeout("GET".into()));
    transport.push_json(200, version_payload(1));

    let options = test_options();
    let max_delay = options.retry.max_delay;
    let client = CivitaiClient::with_transport(Box::new(transport.clone()), &options);
    let sync = Synchronizer::new(client, options);
    let stats = sync.run(dir.path()).await.unwrap();

    assert_eq!(stats.updated, 1);
    assert_eq!(stats.failed, 0);

    let retry = sync.client().stats().await;
    assert_eq!(retry.retries, 3);
    assert_eq!(retry.requests, 4);
    assert!(retry.delays.windows(2).all(|w| w[0] < w[1]), "{:?}", retry.delays);
    assert!(retry.delays.iter().all(|d| *d <= max_delay));

    let times = transport.request_times();
    for (gap, delay) in times.windows(2).map(|w| w[1] - w[0]).zip(&retry.delays) {
        assert!(gap >= *delay);
    }
}

#[tokio::test(start_paused = true)]
async fn test_not_found_is_cached_until_max_age() {
    let dir = TempDir::new().unwrap();
    write_model(&dir.path().join("private.safetensors"), b"weights");

    let transport = ScriptedTransport::new();
    transport.push_json(404, json!({"error": "Model not found"}));
    let first = run(&transport, test_options(), dir.path()).await;

    assert_eq!(first.not_found, 1);
    assert!(first.not_found_paths[0].ends_with("private.safetensors"));
    let sidecar = read_json(&dir.path().join("private.json"));
    assert!(sidecar.get("civitai").is_none());
    assert!(sidecar.get("modelVersionId").is_none());
    assert!(sidecar["hash"].is_string());

    let second = ScriptedTransport::new();
    let stats = run(&second, test_options(), dir.path()).await;
    assert_eq!(stats.cached, 1);
    assert_eq!(second.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_max_age_and_force_always_refresh() {
    let dir = TempDir::new().unwrap();
    write_model(&dir.path().join("a.safetensors"), b"weights");

    let transport = ScriptedTransport::new();
    for id in 1..=3 {
        transport.push_json(200, version_payload(id));
    }

    run(&transport, test_options(), dir.path()).await;
    let zero = run(&transport, test_options().with_max_age(Duration::ZERO), dir.path()).await;
    let forced = run(&transport, test_options().with_force(true), dir.path()).await;

    assert_eq!(zero.updated, 1);
    assert_eq!(forced.updated, 1);
    assert_eq!(transport.call_count(), 3);
    assert_eq!(read_json(&dir.path().join("a.json"))["modelVersionId"], 3);
}

#[tokio::test(start_paused = true)]
async fn test_bad_file_does_not_stop_run() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a_broken.safetensors"), b"\x10\0\0\0\0\0\0\0{not json}.....").unwrap();
    write_model(&dir.path().join("b_good.safetensors"), b"weights");

    let transport = ScriptedTransport::new();
    transport.push_json(200, version_payload(1));

    let stats = run(&transport, test_options(), dir.path()).await;

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.failures[0].kind, ErrorKind::InvalidFormat);
    assert!(stats.failures[0].path.ends_with("a_broken.safetensors"));
    assert!(!dir.path().join("a_broken.json").exists());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_only_that_file() {
    let dir = TempDir::new().unwrap();
    write_model(&dir.path().join("a.safetensors"), b"weights-a");
    write_model(&dir.path().join("b.safetensors"), b"weights-b");

    let transport = ScriptedTransport::new();
    for _ in 0..4 {
        transport.push_status(503);
    }
    transport.push_json(200, version_payload(2));

    let stats = run(&transport, test_options(), dir.path()).await;

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.failures[0].kind, ErrorKind::NetworkError);
    assert_eq!(stats.updated, 1);
    assert!(!dir.path().join("a.json").exists());
    assert!(dir.path().join("b.json").exists());
}

#[tokio::test(start_paused = true)]
async fn test_unwritable_sidecar_fails_only_that_file() {
    let dir = TempDir::new().unwrap();
    write_model(&dir.path().join("a.safetensors"), b"weights-a");
    write_model(&dir.path().join("b.safetensors"), b"weights-b");
    std::fs::create_dir(dir.path().join("a.json")).unwrap();

    let transport = ScriptedTransport::new();
    transport.push_json(200, version_payload(1));
    transport.push_json(200, version_payload(2));

    let stats = run(&transport, test_options(), dir.path()).await;

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.failures[0].kind, ErrorKind::PersistenceError);
    assert!(stats.failures[0].path.ends_with("a.safetensors"));
    assert!(dir.path().join("a.json").is_dir());
    assert_eq!(read_json(&dir.path().join("b.json"))["modelVersionId"], 2);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_during_lookup_finishes_current_file() {
    let dir = TempDir::new().unwrap();
    write_model(&dir.path().join("a.safetensors"), b"weights-a");
    write_model(&dir.path().join("b.safetensors"), b"weights-b");

    let scripted = ScriptedTransport::new();
    scripted.push_json(200, version_payload(1));
    scripted.push_json(200, version_payload(2));
    let cancel = CancellationToken::new();
    let transport = CancelOnRequest {
        inner: scripted.clone(),
        cancel: cancel.clone(),
    };

    let options = test_options();
    let client = CivitaiClient::with_transport(Box::new(transport), &options);
    let stats = Synchronizer::new(client, options)
        .with_cancellation(cancel)
        .run(dir.path())
        .await
        .unwrap();

    assert!(stats.interrupted);
    assert_eq!(stats.total_files, 2);
    assert_eq!(stats.processed(), 1);
    assert_eq!(stats.updated, 1);
    assert_eq!(scripted.call_count(), 1);
    assert_eq!(read_json(&dir.path().join("a.json"))["modelVersionId"], 1);
    assert!(!dir.path().join("b.json").exists());
}

#[tokio::test(start_paused = true)]
async fn test_clean_orphans_after_run() {
    let dir = TempDir::new().unwrap();
    write_model(&dir.path().join("kept.safetensors"), b"weights");
    std::fs::write(dir.path().join("kept.preview.png"), b"png").unwrap();
    std::fs::write(dir.path().join("deleted.json"), r#"{"hash": "old"}"#).unwrap();
    std::fs::write(dir.path().join("deleted.preview.png"), b"png").unwrap();
    std::fs::write(dir.path().join("notes.json"), r#"{"todo": []}"#).unwrap();

    let transport = ScriptedTransport::new();
    transport.push_json(404, json!({}));

    let stats = run(&transport, test_options().with_clean_orphans(true), dir.path()).await;

    let reconciled = stats.reconciled.unwrap();
    assert_eq!(reconciled.metadata_removed, 1);
    assert_eq!(reconciled.previews_removed, 1);

    let mut remaining: Vec<PathBuf> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| PathBuf::from(e.unwrap().file_name()))
        .collect();
    remaining.sort();
    assert_eq!(
        remaining,
        vec![
            PathBuf::from("kept.json"),
            PathBuf::from("kept.preview.png"),
            PathBuf::from("kept.safetensors"),
            PathBuf::from("notes.json"),
        ]
    );
}

#[tokio::test]
async fn test_missing_root_is_fatal() {
    let dir = TempDir::new().unwrap();
    let transport = ScriptedTransport::new();
    let options = test_options();
    let client = CivitaiClient::with_transport(Box::new(transport), &options);

    let result = Synchronizer::new(client, options)
        .run(&dir.path().join("missing"))
        .await;

    assert!(matches!(result, Err(SyncError::FileNotFound(_))));
}

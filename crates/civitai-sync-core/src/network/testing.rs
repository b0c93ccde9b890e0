//! Scripted in-memory transport.
//!
//! Replies are queued in order and consumed one per request. A request with
//! nothing queued fails with a network error.

use crate::network::transport::{Transport, TransportResponse};
use crate::{Result, SyncError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

enum Reply {
    Body {
        status: u16,
        body: Vec<u8>,
        retry_after: Option<Duration>,
    },
    /// Headers arrive, then reading the body fails.
    BrokenBody { status: u16, error: SyncError },
    Error(SyncError),
}

/// A request seen by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub url: String,
    pub bearer: Option<String>,
    pub at: Instant,
}

#[derive(Default)]
struct Inner {
    replies: VecDeque<Reply>,
    requests: Vec<RecordedRequest>,
}

/// Transport that plays back queued replies.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, reply: Reply) {
        self.lock().replies.push_back(reply);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panicking test thread poisons the lock; the data is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a JSON reply.
    pub fn push_json(&self, status: u16, body: Value) {
        self.push(Reply::Body {
            status,
            body: body.to_string().into_bytes(),
            retry_after: None,
        });
    }

    /// Queue a raw body reply.
    pub fn push_body(&self, status: u16, body: impl AsRef<[u8]>) {
        self.push(Reply::Body {
            status,
            body: body.as_ref().to_vec(),
            retry_after: None,
        });
    }

    /// Queue an empty reply with a status.
    pub fn push_status(&self, status: u16) {
        self.push_body(status, b"");
    }

    /// Queue a 429 carrying `Retry-After`.
    pub fn push_rate_limited(&self, retry_after: Duration) {
        self.push(Reply::Body {
            status: 429,
            body: Vec::new(),
            retry_after: Some(retry_after),
        });
    }

    /// Queue a reply whose body stream fails with `error`.
    pub fn push_broken_body(&self, status: u16, error: SyncError) {
        self.push(Reply::BrokenBody { status, error });
    }

    /// Queue a transport-level failure.
    pub fn push_error(&self, error: SyncError) {
        self.push(Reply::Error(error));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn request_times(&self) -> Vec<Instant> {
        self.lock().requests.iter().map(|r| r.at).collect()
    }

    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, bearer: Option<&str>) -> Result<TransportResponse> {
        let reply = {
            let mut inner = self.lock();
            inner.requests.push(RecordedRequest {
                url: url.to_string(),
                bearer: bearer.map(str::to_string),
                at: Instant::now(),
            });
            inner.replies.pop_front()
        };

        match reply {
            Some(Reply::Body {
                status,
                body,
                retry_after,
            }) => {
                let response = TransportResponse::from_bytes(status, body);
                Ok(match retry_after {
                    Some(wait) => response.with_retry_after(wait),
                    None => response,
                })
            }
            Some(Reply::BrokenBody { status, error }) => Ok(TransportResponse {
                status,
                retry_after: None,
                body: stream::iter(vec![Ok(Bytes::from_static(b"{\"id\"")), Err(error)]).boxed(),
            }),
            Some(Reply::Error(error)) => Err(error),
            None => Err(SyncError::Network {
                message: format!("no scripted reply for GET {}", url),
                cause: None,
            }),
        }
    }
}

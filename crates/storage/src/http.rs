//! HTTP implementation of [`ArchiveStore`].
//!
//! `HttpArchiveStore` streams each artifact with
//! `PUT {base_url}/{folder}/{filename}` and expects `{ "url": <locator> }`
//! back.  Uploads are not retried: the body is a one-shot stream and a
//! failed export ends the session.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use pl_domain::config::StorageConfig;
use pl_domain::trace::TraceEvent;
use pl_domain::{Error, Result};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::archive::{ArchiveStore, ArtifactUpload};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Uploads artifacts to an HTTP blob store.
///
/// Created once and shared by every session; the underlying
/// `reqwest::Client` keeps a connection pool.
#[derive(Debug, Clone)]
pub struct HttpArchiveStore {
    http: Client,
    base_url: String,
    folder: String,
    api_key: Option<String>,
}

impl HttpArchiveStore {
    /// Build from config, reading the API key from `cfg.api_key_env`.
    pub fn new(cfg: &StorageConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::debug!(env = %cfg.api_key_env, "storage API key not set");
        }

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            folder: cfg.folder.trim_matches('/').to_owned(),
            api_key,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    // ── request helpers ──────────────────────────────────────────────

    fn decorate(&self, rb: RequestBuilder) -> RequestBuilder {
        let rb = rb
            .header("X-Client-Type", "pairlink")
            .header("X-Trace-Id", Uuid::new_v4().to_string());
        match &self.api_key {
            Some(key) => rb.bearer_auth(key),
            None => rb,
        }
    }

    /// Full URL for an artifact name.
    fn url(&self, filename: &str) -> String {
        if self.folder.is_empty() {
            format!("{}/{}", self.base_url, filename)
        } else {
            format!("{}/{}/{}", self.base_url, self.folder, filename)
        }
    }
}

#[async_trait]
impl ArchiveStore for HttpArchiveStore {
    async fn upload(&self, artifact: ArtifactUpload) -> Result<String> {
        let ArtifactUpload {
            filename,
            content_length,
            reader,
        } = artifact;
        let url = self.url(&filename);

        let start = Instant::now();
        let result = self
            .decorate(self.http.put(&url))
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_LENGTH, content_length)
            .body(Body::wrap_stream(ReaderStream::new(reader)))
            .send()
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                TraceEvent::ArchiveUpload {
                    filename,
                    status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                    duration_ms,
                }
                .emit();
                return Err(from_reqwest(e));
            }
        };

        let status = resp.status();
        TraceEvent::ArchiveUpload {
            filename: filename.clone(),
            status: status.as_u16(),
            duration_ms,
        }
        .emit();

        let body = resp.text().await.map_err(from_reqwest)?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Auth(format!("upload of {filename} rejected ({status}): {body}")));
        }
        if !status.is_success() {
            return Err(Error::Storage(format!("upload of {filename} returned {status}: {body}")));
        }

        let parsed: UploadResponse = serde_json::from_str(&body).map_err(|e| {
            Error::Storage(format!("failed to parse upload response: {e}: {body}"))
        })?;
        if parsed.url.is_empty() {
            return Err(Error::Storage(format!("upload of {filename} returned no locator")));
        }
        Ok(parsed.url)
    }
}

/// Convert a reqwest error, keeping timeouts distinguishable.
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use serde::Serialize;
use std::io::{Read, Write};
use std::time::Duration;
use tally_common::hash::{sign, HASH_HEADER};
use tally_common::types::Metrics;

/// Default deadline for one request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("compression failed: {0}")]
    Compress(#[from] std::io::Error),

    /// The server answered with a non-2xx status.
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Delivery channel used by the dispatcher. Compression and signing happen
/// inside the implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one metric, returning the response body.
    async fn send(&self, metric: &Metrics) -> Result<Vec<u8>, TransportError>;

    /// Sends a whole batch in one request, returning the response body.
    async fn send_batch(&self, metrics: &[Metrics]) -> Result<Vec<u8>, TransportError>;
}

fn gzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

fn gunzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(body).read_to_end(&mut out)?;
    Ok(out)
}

/// JSON-over-HTTP transport posting to `/update/` and `/updates/`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    key: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, key: Option<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            key,
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Vec<u8>, TransportError> {
        let json = serde_json::to_vec(body)?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .header(ACCEPT_ENCODING, "gzip");
        if let Some(key) = &self.key {
            request = request.header(HASH_HEADER, sign(&json, key));
        }

        let response = request.body(gzip(&json)?).send().await?;
        let status = response.status();
        let gzipped = response
            .headers()
            .get(CONTENT_ENCODING)
            .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"gzip"));
        let raw = response.bytes().await?;
        let body = if gzipped { gunzip(&raw)? } else { raw.to_vec() };

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }
        tracing::trace!(url = %url, status = status.as_u16(), "Request delivered");
        Ok(body)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, metric: &Metrics) -> Result<Vec<u8>, TransportError> {
        self.post("/update/", metric).await
    }

    async fn send_batch(&self, metrics: &[Metrics]) -> Result<Vec<u8>, TransportError> {
        self.post("/updates/", metrics).await
    }
}

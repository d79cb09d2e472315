use axum::body::{to_bytes, Body, Bytes};
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use std::time::{Duration, Instant};

pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Per-request id, stored in request extensions for downstream middleware.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl TraceId {
    /// 16 hex characters from 8 random bytes.
    pub fn generate() -> Self {
        let bytes: [u8; 8] = rand::random();
        Self(hex::encode(bytes))
    }
}

/// Longest body excerpt written to the log.
const BODY_EXCERPT_BYTES: usize = 256;

/// Upper bound on the request body buffered for logging.
const MAX_LOGGED_REQUEST: usize = 4 * 1024 * 1024;

/// Cuts `bytes` to at most `max` bytes on a char boundary.
fn excerpt(bytes: &[u8], max: usize) -> String {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return format!("<{} bytes binary>", bytes.len());
    };
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &text[..end], text.len())
}

fn human_elapsed(elapsed: Duration) -> String {
    let us = elapsed.as_micros();
    match us {
        0..=999 => format!("{us}µs"),
        1_000..=999_999 => format!("{:.1}ms", us as f64 / 1_000.0),
        _ => format!("{:.2}s", elapsed.as_secs_f64()),
    }
}

fn is_textual(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json") || ct.starts_with("text/"))
}

async fn buffer(body: Body, limit: usize) -> Bytes {
    to_bytes(body, limit).await.unwrap_or_default()
}

/// Logs one line per request and one per response, tagged with a fresh
/// trace id that is also returned in the `X-Trace-Id` header.
///
/// Request bodies are logged after decompression, so this layer must sit
/// inside `RequestDecompressionLayer`.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = TraceId::generate();
    req.extensions_mut().insert(trace_id.clone());

    let method = req.method().clone();
    let uri = req.uri().clone();

    let req = if method == Method::POST {
        let (parts, body) = req.into_parts();
        let bytes = buffer(body, MAX_LOGGED_REQUEST).await;
        tracing::info!(
            trace_id = %trace_id.0,
            method = %method,
            uri = %uri,
            body = %excerpt(&bytes, BODY_EXCERPT_BYTES),
            "--> request"
        );
        Request::from_parts(parts, Body::from(bytes))
    } else {
        tracing::info!(trace_id = %trace_id.0, method = %method, uri = %uri, "--> request");
        req
    };

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = human_elapsed(start.elapsed());

    let (mut parts, body) = response.into_parts();
    let bytes = buffer(body, usize::MAX).await;
    let status = parts.status.as_u16();
    let size = bytes.len();
    let body = if is_textual(&parts.headers) {
        excerpt(&bytes, BODY_EXCERPT_BYTES)
    } else {
        String::new()
    };

    if parts.status.is_server_error() {
        tracing::error!(trace_id = %trace_id.0, status, size, elapsed = %elapsed, body = %body, "<-- response");
    } else if parts.status.is_client_error() {
        tracing::warn!(trace_id = %trace_id.0, status, size, elapsed = %elapsed, body = %body, "<-- response");
    } else {
        tracing::info!(trace_id = %trace_id.0, status, size, elapsed = %elapsed, "<-- response");
    }

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        parts.headers.insert(TRACE_ID_HEADER, value);
    }
    Response::from_parts(parts, Body::from(bytes))
}

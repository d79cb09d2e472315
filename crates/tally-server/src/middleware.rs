use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tally_common::hash;

use crate::logging::TraceId;
use crate::state::AppState;

/// Largest request body the checksum layer will buffer.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Verifies the `HashSHA256` header of incoming requests and signs
/// outgoing response bodies.
///
/// Without a configured key the middleware passes everything through.
/// Requests that carry no header are accepted unverified; a header that
/// does not match the (decompressed) body is rejected with 400.
pub async fn checksum_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(key) = state.signing_key() else {
        return next.run(req).await;
    };

    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let received = req
        .headers()
        .get(hash::HASH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let req = match received {
        None => req,
        Some(received) => {
            let (parts, body) = req.into_parts();
            let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(trace_id = %trace_id, error = %e, "Request body unreadable");
                    return (StatusCode::BAD_REQUEST, "unreadable body").into_response();
                }
            };
            if !hash::verify(&bytes, key, &received) {
                tracing::warn!(trace_id = %trace_id, "Request rejected: HashSHA256 mismatch");
                return (StatusCode::BAD_REQUEST, "hash mismatch").into_response();
            }
            Request::from_parts(parts, Body::from(bytes))
        }
    };

    let response = next.run(req).await;
    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(trace_id = %trace_id, error = %e, "Response body unreadable");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    // `HashSHA256` is mixed-case, which `HeaderName::from_static` refuses.
    let name = HeaderName::from_bytes(hash::HASH_HEADER.as_bytes());
    let value = HeaderValue::from_str(&hash::sign(&bytes, key));
    if let (Ok(name), Ok(value)) = (name, value) {
        parts.headers.insert(name, value);
    }
    Response::from_parts(parts, Body::from(bytes))
}

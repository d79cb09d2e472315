use crate::state::AppState;
use crate::{api, logging};
use axum::middleware;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

/// Builds the HTTP router. From the outside in: response gzip, request
/// gunzip, request logging, checksum verification, handlers.
pub fn build_http_app(state: AppState) -> Router {
    api::routes()
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::checksum_middleware,
        ))
        .layer(middleware::from_fn(logging::request_logging))
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new())
        .with_state(state)
}

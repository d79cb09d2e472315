use crate::collector::CollectorError;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use tally_common::error::MetricError;
use tally_common::retry::RetryPolicy;
use tally_common::types::Metrics;
use tally_storage::StorageError;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const TEXT_HTML: &str = "text/html; charset=utf-8";

/// Failure of one request, rendered as a status code and a plain-text body.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Collector(#[from] CollectorError),

    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error("expected application/json, got '{0}'")]
    ContentType(String),

    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database unavailable: {0}")]
    Unavailable(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Metric(e) | ServerError::Collector(CollectorError::Metric(e)) => metric_status(e),
            ServerError::ContentType(_) | ServerError::Json(_) => StatusCode::BAD_REQUEST,
            ServerError::Collector(CollectorError::Storage(_)) | ServerError::Unavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn metric_status(e: &MetricError) -> StatusCode {
    match e {
        MetricError::ValueNotFound { .. } => StatusCode::NOT_FOUND,
        MetricError::WrongType(_) | MetricError::WrongValue(_) | MetricError::InvalidValueType { .. } => {
            StatusCode::BAD_REQUEST
        }
    }
}

impl From<StorageError> for ServerError {
    fn from(e: StorageError) -> Self {
        ServerError::Collector(CollectorError::Storage(e))
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], self.to_string()).into_response()
    }
}

type ApiResult<T> = Result<T, ServerError>;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_metrics))
        .route("/ping", get(ping))
        .route("/update/{kind}/{name}/{value}", post(update_from_path))
        .route("/update/", post(update_json))
        .route("/updates/", post(update_batch))
        .route("/value/{kind}/{name}", get(value_text))
        .route("/value/", post(value_json))
}

/// Decodes a JSON body after checking the declared content type.
fn json_body<T: DeserializeOwned>(headers: &HeaderMap, body: &[u8]) -> ApiResult<T> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("application/json") {
        return Err(ServerError::ContentType(content_type.to_string()));
    }
    Ok(serde_json::from_slice(body)?)
}

/// Names of every stored metric, as a JSON array served with an HTML content type.
async fn list_metrics(State(state): State<AppState>) -> ApiResult<Response> {
    let mut names: Vec<String> = state
        .collector
        .all()
        .await?
        .into_iter()
        .map(|r| r.name)
        .collect();
    names.sort();
    let body = serde_json::to_string(&names)?;
    Ok(([(header::CONTENT_TYPE, TEXT_HTML)], body).into_response())
}

async fn ping(State(state): State<AppState>) -> ApiResult<StatusCode> {
    let Some(db) = &state.db else {
        return Err(ServerError::Unavailable("no database configured".into()));
    };
    let mut policy = RetryPolicy::with_delays(state.ping_delays.to_vec());
    tally_storage::db::ping(db, &mut policy)
        .await
        .map_err(|e| ServerError::Unavailable(e.to_string()))?;
    Ok(StatusCode::OK)
}

async fn update_from_path(
    State(state): State<AppState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let mut metric = Metrics {
        id: name,
        kind,
        ..Default::default()
    };
    metric.set_value_from_str(&value)?;
    state.collector.save(&metric).await?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, TEXT_PLAIN)]).into_response())
}

/// Saves one metric and echoes the merged result.
async fn update_json(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<Metrics>> {
    let metric: Metrics = json_body(&headers, &body)?;
    state.collector.save(&metric).await?;
    let stored = state.collector.find(&metric.kind, &metric.id).await?;
    Ok(Json(stored.to_metrics()))
}

async fn update_batch(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Response> {
    let metrics: Vec<Metrics> = json_body(&headers, &body)?;
    state.collector.save_all(&metrics).await?;
    tracing::debug!(count = metrics.len(), "Batch saved");
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "application/json")]).into_response())
}

async fn value_text(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> ApiResult<Response> {
    let record = state.collector.find(&kind, &name).await?;
    Ok(([(header::CONTENT_TYPE, TEXT_PLAIN)], record.value_text()).into_response())
}

async fn value_json(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<Metrics>> {
    let query: Metrics = json_body(&headers, &body)?;
    let record = state.collector.find(&query.kind, &query.id).await?;
    Ok(Json(record.to_metrics()))
}

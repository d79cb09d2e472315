#![allow(dead_code)]

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tally_common::retry::RetryPolicy;
use tally_server::app;
use tally_server::collector::Collector;
use tally_server::config::ServerConfig;
use tally_server::state::AppState;
use tally_storage::{db, MemRepository, SnapshotStore, SqlRepository};
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

impl TestContext {
    pub fn snapshot_path(&self) -> PathBuf {
        self.temp_dir.path().join("metrics.json")
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response should be JSON")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// In-memory repository with a snapshot under a temp dir and no signing key.
pub fn build_test_context() -> TestContext {
    build_test_context_with(ServerConfig::default())
}

pub fn build_test_context_with(mut config: ServerConfig) -> TestContext {
    let temp_dir = tempfile::tempdir().expect("temp dir should be created");
    let snapshot = temp_dir.path().join("metrics.json");
    config.file_storage_path = snapshot.to_string_lossy().to_string();

    let repo = Arc::new(MemRepository::with_snapshot(SnapshotStore::new(snapshot)));
    let collector = Arc::new(Collector::new(repo).with_sync_backup(config.sync_backup()));
    let state = AppState::new(collector, None, config).with_ping_delays(vec![]);
    let app = app::build_http_app(state.clone());

    TestContext {
        temp_dir,
        state,
        app,
    }
}

/// SQLite-backed repository, so `/ping` has a database to probe.
pub async fn build_sql_test_context() -> TestContext {
    let temp_dir = tempfile::tempdir().expect("temp dir should be created");
    let dsn = format!(
        "sqlite://{}?mode=rwc",
        temp_dir.path().join("metrics.db").display()
    );
    let conn = db::connect(&dsn, &mut RetryPolicy::new(1, vec![]))
        .await
        .expect("sqlite should open");

    let config = ServerConfig {
        database_dsn: dsn,
        file_storage_path: String::new(),
        ..Default::default()
    };
    let collector = Arc::new(Collector::new(Arc::new(SqlRepository::new(conn.clone()))));
    let state = AppState::new(collector, Some(conn), config).with_ping_delays(vec![]);
    let app = app::build_http_app(state.clone());

    TestContext {
        temp_dir,
        state,
        app,
    }
}

pub async fn send(app: &axum::Router, req: Request<Body>) -> Reply {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    Reply {
        status,
        headers,
        body,
    }
}

pub async fn get(app: &axum::Router, uri: &str) -> Reply {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, req).await
}

pub async fn post_empty(app: &axum::Router, uri: &str) -> Reply {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, req).await
}

pub async fn post_json(app: &axum::Router, uri: &str, body: &Value) -> Reply {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    send(app, req).await
}

pub fn gzip(body: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).expect("gzip should write");
    encoder.finish().expect("gzip should finish")
}

pub fn gunzip(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(body)
        .read_to_end(&mut out)
        .expect("body should be gzip");
    out
}

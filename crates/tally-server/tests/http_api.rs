mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use serde_json::json;
use tally_common::hash;
use tally_server::config::ServerConfig;
use tally_storage::SnapshotStore;

#[tokio::test]
async fn path_updates_accumulate_counters_and_replace_gauges() {
    let ctx = build_test_context();

    for uri in [
        "/update/counter/PollCount/5",
        "/update/counter/PollCount/3",
        "/update/gauge/Alloc/100",
        "/update/gauge/Alloc/250.5",
    ] {
        assert_eq!(post_empty(&ctx.app, uri).await.status, StatusCode::OK, "{uri}");
    }

    let polls = get(&ctx.app, "/value/counter/PollCount").await;
    assert_eq!(polls.status, StatusCode::OK);
    assert_eq!(polls.text(), "8");
    assert_eq!(get(&ctx.app, "/value/gauge/Alloc").await.text(), "250.5");
}

#[tokio::test]
async fn path_errors_map_to_statuses() {
    let ctx = build_test_context();

    let cases = [
        ("/update/histogram/X/1", StatusCode::BAD_REQUEST),
        ("/update/gauge/Alloc/abc", StatusCode::BAD_REQUEST),
        ("/update/counter/PollCount/1.5", StatusCode::BAD_REQUEST),
        ("/update/gauge/Alloc/NaN", StatusCode::BAD_REQUEST),
        ("/update/gauge/Alloc/inf", StatusCode::BAD_REQUEST),
    ];
    for (uri, status) in cases {
        assert_eq!(post_empty(&ctx.app, uri).await.status, status, "{uri}");
    }

    assert_eq!(
        get(&ctx.app, "/value/counter/Nonexistent").await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        get(&ctx.app, "/value/summary/Alloc").await.status,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn json_update_echoes_merged_record() {
    let ctx = build_test_context();
    let body = json!({"id": "PollCount", "type": "counter", "delta": 2});

    post_json(&ctx.app, "/update/", &body).await;
    let reply = post_json(&ctx.app, "/update/", &body).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply
        .header("content-type")
        .is_some_and(|ct| ct.starts_with("application/json")));
    assert_eq!(reply.json(), json!({"id": "PollCount", "type": "counter", "delta": 4}));
}

#[tokio::test]
async fn json_endpoints_reject_wrong_content_type_and_bad_json() {
    let ctx = build_test_context();

    let req = Request::builder()
        .method("POST")
        .uri("/update/")
        .header("Content-Type", "text/plain")
        .body(Body::from(r#"{"id":"Alloc","type":"gauge","value":1}"#))
        .unwrap();
    assert_eq!(send(&ctx.app, req).await.status, StatusCode::BAD_REQUEST);

    let req = Request::builder()
        .method("POST")
        .uri("/value/")
        .header("Content-Type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    assert_eq!(send(&ctx.app, req).await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn value_in_wrong_field_is_rejected() {
    let ctx = build_test_context();
    let reply = post_json(
        &ctx.app,
        "/update/",
        &json!({"id": "PollCount", "type": "counter", "value": 1.5}),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        get(&ctx.app, "/value/counter/PollCount").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn batch_update_then_json_lookup() {
    let ctx = build_test_context();
    let batch = json!([
        {"id": "PollCount", "type": "counter", "delta": 1},
        {"id": "PollCount", "type": "counter", "delta": 4},
        {"id": "RandomValue", "type": "gauge", "value": 0.25},
    ]);

    assert_eq!(post_json(&ctx.app, "/updates/", &batch).await.status, StatusCode::OK);

    let polls = post_json(&ctx.app, "/value/", &json!({"id": "PollCount", "type": "counter"})).await;
    assert_eq!(polls.json()["delta"], 5);
    let random = post_json(&ctx.app, "/value/", &json!({"id": "RandomValue", "type": "gauge"})).await;
    assert_eq!(random.json()["value"], 0.25);

    let missing = post_json(&ctx.app, "/value/", &json!({"id": "Nope", "type": "gauge"})).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_batch_stores_nothing() {
    let ctx = build_test_context();
    let batch = json!([
        {"id": "Alloc", "type": "gauge", "value": 1.0},
        {"id": "Weird", "type": "histogram", "value": 1.0},
    ]);

    assert_eq!(
        post_json(&ctx.app, "/updates/", &batch).await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(get(&ctx.app, "/value/gauge/Alloc").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn index_lists_metric_names_as_html() {
    let ctx = build_test_context();
    post_empty(&ctx.app, "/update/gauge/Sys/1").await;
    post_empty(&ctx.app, "/update/counter/PollCount/1").await;
    post_empty(&ctx.app, "/update/gauge/Alloc/1").await;

    let reply = get(&ctx.app, "/").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply
        .header("content-type")
        .is_some_and(|ct| ct.starts_with("text/html")));
    assert_eq!(reply.json(), json!(["Alloc", "PollCount", "Sys"]));
}

#[tokio::test]
async fn responses_carry_a_trace_id() {
    let ctx = build_test_context();
    let reply = get(&ctx.app, "/value/gauge/Missing").await;
    let trace_id = reply.header("x-trace-id").expect("trace id header");
    assert_eq!(trace_id.len(), 16);
    assert!(trace_id.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn ping_without_database_fails() {
    let ctx = build_test_context();
    assert_eq!(
        get(&ctx.app, "/ping").await.status,
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test]
async fn ping_and_updates_with_sql_backend() {
    let ctx = build_sql_test_context().await;
    assert_eq!(get(&ctx.app, "/ping").await.status, StatusCode::OK);

    let batch = json!([
        {"id": "PollCount", "type": "counter", "delta": 2},
        {"id": "Alloc", "type": "gauge", "value": 3.5},
    ]);
    post_json(&ctx.app, "/updates/", &batch).await;
    post_json(&ctx.app, "/updates/", &batch).await;

    assert_eq!(get(&ctx.app, "/value/counter/PollCount").await.text(), "4");
    assert_eq!(get(&ctx.app, "/value/gauge/Alloc").await.text(), "3.5");
}

#[tokio::test]
async fn gzip_request_bodies_are_accepted() {
    let ctx = build_test_context();
    let body = json!([{"id": "Alloc", "type": "gauge", "value": 7.5}]).to_string();

    let req = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header("Content-Type", "application/json")
        .header("Content-Encoding", "gzip")
        .body(Body::from(gzip(body.as_bytes())))
        .unwrap();

    assert_eq!(send(&ctx.app, req).await.status, StatusCode::OK);
    assert_eq!(get(&ctx.app, "/value/gauge/Alloc").await.text(), "7.5");
}

#[tokio::test]
async fn responses_are_gzipped_when_accepted() {
    let ctx = build_test_context();
    let name = "AVeryLongGaugeNameSoTheBodyIsWorthCompressing";
    post_empty(&ctx.app, &format!("/update/gauge/{name}/1.5")).await;

    let req = Request::builder()
        .method("POST")
        .uri("/value/")
        .header("Content-Type", "application/json")
        .header("Accept-Encoding", "gzip")
        .body(Body::from(json!({"id": name, "type": "gauge"}).to_string()))
        .unwrap();
    let reply = send(&ctx.app, req).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.header("content-encoding"), Some("gzip"));
    let plain: serde_json::Value = serde_json::from_slice(&gunzip(&reply.body)).unwrap();
    assert_eq!(plain, json!({"id": name, "type": "gauge", "value": 1.5}));
}

fn signed_context() -> TestContext {
    build_test_context_with(ServerConfig {
        key: Some("secret".into()),
        ..Default::default()
    })
}

fn signed_request(body: &str, hash: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/update/")
        .header("Content-Type", "application/json");
    if let Some(hash) = hash {
        builder = builder.header(hash::HASH_HEADER, hash);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn matching_checksum_is_accepted_and_response_signed() {
    let ctx = signed_context();
    let body = r#"{"id":"Alloc","type":"gauge","value":2}"#;

    let reply = send(&ctx.app, signed_request(body, Some(hash::sign(body.as_bytes(), "secret")))).await;

    assert_eq!(reply.status, StatusCode::OK);
    let signature = reply
        .header(hash::HASH_HEADER)
        .expect("response should be signed");
    assert!(hash::verify(&reply.body, "secret", signature));
}

#[tokio::test]
async fn mismatched_checksum_is_rejected() {
    let ctx = signed_context();
    let body = r#"{"id":"Alloc","type":"gauge","value":2}"#;

    let reply = send(&ctx.app, signed_request(body, Some(hash::sign(body.as_bytes(), "wrong")))).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(get(&ctx.app, "/value/gauge/Alloc").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsigned_request_is_accepted_when_key_is_set() {
    let ctx = signed_context();
    let reply = send(&ctx.app, signed_request(r#"{"id":"Alloc","type":"gauge","value":2}"#, None)).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn checksum_covers_the_decompressed_body() {
    let ctx = signed_context();
    let body = r#"[{"id":"PollCount","type":"counter","delta":3}]"#;

    let req = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header("Content-Type", "application/json")
        .header("Content-Encoding", "gzip")
        .header("HashSHA256", hash::sign(body.as_bytes(), "secret"))
        .body(Body::from(gzip(body.as_bytes())))
        .unwrap();

    assert_eq!(send(&ctx.app, req).await.status, StatusCode::OK);
    assert_eq!(get(&ctx.app, "/value/counter/PollCount").await.text(), "3");
}

#[tokio::test]
async fn zero_store_interval_backs_up_every_write() {
    let ctx = build_test_context_with(ServerConfig {
        store_interval_secs: 0,
        ..Default::default()
    });

    post_empty(&ctx.app, "/update/counter/PollCount/2").await;
    post_json(
        &ctx.app,
        "/updates/",
        &json!([{"id": "Alloc", "type": "gauge", "value": 1.0}]),
    )
    .await;

    let records = SnapshotStore::new(ctx.snapshot_path()).read().unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn non_finite_gauge_never_reaches_the_snapshot() {
    let ctx = build_test_context_with(ServerConfig {
        store_interval_secs: 0,
        ..Default::default()
    });

    post_empty(&ctx.app, "/update/counter/PollCount/3").await;
    let reply = post_empty(&ctx.app, "/update/gauge/X/NaN").await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let records = SnapshotStore::new(ctx.snapshot_path()).read().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, "counter:PollCount");
}

#[tokio::test]
async fn scheduled_backup_mode_does_not_write_per_request() {
    let ctx = build_test_context();
    post_empty(&ctx.app, "/update/counter/PollCount/2").await;
    assert!(!ctx.snapshot_path().exists());

    ctx.state.collector.backup().await.unwrap();
    assert_eq!(SnapshotStore::new(ctx.snapshot_path()).read().unwrap().len(), 1);
}

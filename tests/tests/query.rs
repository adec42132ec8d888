//! The /query surface: read auth, allowlists, filters, and limits.

use axum::http::StatusCode;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::{json, Value};

const READ_KEY: &str = "sk_reader";

async fn seeded_context() -> TestContext {
    let ctx = TestContext::with_statics("", READ_KEY).await;
    let server = ctx.server();
    let ts = fixtures::now_ms();

    let mut events = Vec::new();
    for i in 0..5 {
        events.push(json!({
            "project": "p1",
            "event": "pageview",
            "user_id": format!("u{}", i % 2),
            "session_id": format!("s{}", i),
            "timestamp": ts - (i as i64) * 60_000,
            "properties": { "path": format!("/page{}", i), "plan": "free" }
        }));
    }
    events.push(json!({
        "project": "p1",
        "event": "signup",
        "user_id": "u9",
        "timestamp": ts,
        "properties": { "plan": "pro", "seats": 5 }
    }));
    let response = server.post("/track/batch").json(&fixtures::batch_body(None, events)).await;
    response.assert_status(StatusCode::OK);
    ctx
}

#[tokio::test]
async fn read_key_is_required_and_validated() {
    let ctx = seeded_context().await;
    let server = ctx.server();
    let body = json!({ "project": "p1" });

    let response = server.post("/query").json(&body).await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server.post("/query").add_header("X-API-Key", "sk_wrong").json(&body).await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server.post("/query").add_header("X-API-Key", READ_KEY).json(&body).await;
    response.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn key_query_parameter_also_authorizes() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let response = server
        .get("/events")
        .add_query_param("project", "p1")
        .add_query_param("key", READ_KEY)
        .await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["project"], json!("p1"));
    assert_eq!(body["events"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn missing_project_is_a_400() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let response = server.post("/query").add_header("X-API-Key", READ_KEY).json(&json!({})).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server.get("/events").add_query_param("key", READ_KEY).await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bogus_metric_lists_the_allowed_set() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let response = server
        .post("/query")
        .add_header("X-API-Key", READ_KEY)
        .json(&json!({ "project": "p1", "metrics": ["bogus"] }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    let msg = body["error"].as_str().unwrap();
    for name in ["event_count", "unique_users", "session_count", "bounce_rate", "avg_duration"] {
        assert!(msg.contains(name), "allowed metric {} not listed in {:?}", name, msg);
    }
}

#[tokio::test]
async fn bogus_group_by_and_operator_are_rejected() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let response = server
        .post("/query")
        .add_header("X-API-Key", READ_KEY)
        .json(&json!({ "project": "p1", "group_by": ["path"] }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/query")
        .add_header("X-API-Key", READ_KEY)
        .json(&json!({
            "project": "p1",
            "filters": [{ "field": "event", "op": "like", "value": "page%" }]
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("lte"));
}

#[tokio::test]
async fn malicious_property_keys_are_rejected() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let response = server
        .post("/query")
        .add_header("X-API-Key", READ_KEY)
        .json(&json!({
            "project": "p1",
            "filters": [{ "field": "properties.a') OR 1=1 --", "value": "x" }]
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn grouped_count_with_property_filter() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let response = server
        .post("/query")
        .add_header("X-API-Key", READ_KEY)
        .json(&json!({
            "project": "p1",
            "metrics": ["event_count", "unique_users"],
            "group_by": ["event"],
            "filters": [{ "field": "properties.plan", "op": "eq", "value": "free" }]
        }))
        .await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["count"], json!(1));
    let row = &body["rows"][0];
    assert_eq!(row["event"], json!("pageview"));
    assert_eq!(row["event_count"], json!(5));
    assert_eq!(row["unique_users"], json!(2));
}

#[tokio::test]
async fn limit_is_clamped_and_count_reflects_returned_rows() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let response = server
        .post("/query")
        .add_header("X-API-Key", READ_KEY)
        .json(&json!({
            "project": "p1",
            "group_by": ["session_id"],
            "limit": 5000
        }))
        .await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    let rows = body["rows"].as_array().unwrap();
    assert!(rows.len() <= 1000);
    assert_eq!(body["count"], json!(rows.len()));

    // Truncation: count follows the returned rows, not the full set.
    let response = server
        .post("/query")
        .add_header("X-API-Key", READ_KEY)
        .json(&json!({
            "project": "p1",
            "group_by": ["session_id"],
            "limit": 2
        }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["rows"].as_array().unwrap().len(), 2);
    assert_eq!(body["count"], json!(2));
}

#[tokio::test]
async fn session_metrics_read_from_session_rows() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let response = server
        .post("/query")
        .add_header("X-API-Key", READ_KEY)
        .json(&json!({
            "project": "p1",
            "metrics": ["session_count", "bounce_rate"],
            "filters": [{ "field": "event", "value": "pageview" }]
        }))
        .await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    let row = &body["rows"][0];
    assert_eq!(row["session_count"], json!(5));
    // Every seeded session holds exactly one event.
    assert_eq!(row["bounce_rate"], json!(100.0));
}

#[tokio::test]
async fn reads_account_usage() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    for _ in 0..3 {
        server
            .post("/query")
            .add_header("X-API-Key", READ_KEY)
            .json(&json!({ "project": "p1" }))
            .await
            .assert_status(StatusCode::OK);
    }

    let usage = ctx.usage_row("p1", &fixtures::today()).await.expect("usage row");
    assert_eq!(usage.get_i64("read_count"), Some(3));
}

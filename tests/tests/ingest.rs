//! Ingestion endpoint behavior: validation, auth modes, batch caps,
//! and daily rate limits.

use axum::http::StatusCode;
use beacon_core::{Project, Tier};
use integration_tests::{fixtures, setup::TestContext};
use serde_json::{json, Value};

#[tokio::test]
async fn open_mode_accepts_events_without_a_token() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server.post("/track").json(&fixtures::track_body("p1", "pageview")).await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["ok"], json!(true));

    assert_eq!(ctx.count("events").await, 1);
    let usage = ctx.usage_row("p1", &fixtures::today()).await.expect("usage row");
    assert_eq!(usage.get_i64("event_count"), Some(1));
}

#[tokio::test]
async fn missing_project_or_event_is_a_400() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    for body in [json!({ "event": "pageview" }), json!({ "project": "p1" }), json!({})] {
        let response = server.post("/track").json(&body).await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
    assert_eq!(ctx.count("events").await, 0);
}

#[tokio::test]
async fn malformed_json_is_a_400() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .post("/track")
        .content_type("application/json")
        .bytes(r#"{"project": "p1", "#.into())
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn configuring_a_token_closes_open_mode() {
    let ctx = TestContext::with_statics("pt_secret", "").await;
    let server = ctx.server();

    // Same request that succeeds in open mode now needs the token.
    let response = server.post("/track").json(&fixtures::track_body("p1", "pageview")).await;
    response.assert_status(StatusCode::FORBIDDEN);

    let mut body = fixtures::track_body("p1", "pageview");
    body["token"] = json!("pt_wrong");
    let response = server.post("/track").json(&body).await;
    response.assert_status(StatusCode::FORBIDDEN);

    body["token"] = json!("pt_secret");
    let response = server.post("/track").json(&body).await;
    response.assert_status(StatusCode::OK);
    assert_eq!(ctx.count("events").await, 1);
}

#[tokio::test]
async fn project_token_resolves_through_the_registry() {
    let ctx = TestContext::new().await;
    let project = ctx.seed_project("site").await;
    let server = ctx.server();

    let mut body = fixtures::track_body("site", "signup");
    body["token"] = json!(project.project_token);
    server.post("/track").json(&body).await.assert_status(StatusCode::OK);

    // Events land under the project id, not the client-supplied name.
    let row = ctx
        .storage
        .fetch_one(beacon_storage::Statement::new("SELECT project_id FROM events", vec![]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get_str("project_id"), Some(project.id.as_str()));
}

#[tokio::test]
async fn batch_returns_count_and_respects_the_cap() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let events = vec![
        fixtures::track_body("p1", "a"),
        fixtures::track_body("p1", "b"),
        fixtures::track_body("p1", "c"),
    ];
    let response = server.post("/track/batch").json(&fixtures::batch_body(None, events)).await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["count"], json!(3));
    assert_eq!(ctx.count("events").await, 3);
}

#[tokio::test]
async fn oversized_batch_is_rejected_before_any_work() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server.post("/track/batch").json(&fixtures::oversized_batch("p1")).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("101"));
    assert_eq!(ctx.count("events").await, 0);
}

#[tokio::test]
async fn empty_or_absent_batch_array_is_rejected() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    for body in [json!({ "events": [] }), json!({})] {
        let response = server.post("/track/batch").json(&body).await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn batch_events_are_validated_individually() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let events = vec![fixtures::track_body("p1", "ok"), json!({ "project": "p1" })];
    let response = server.post("/track/batch").json(&fixtures::batch_body(None, events)).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("events[1]"));
    assert_eq!(ctx.count("events").await, 0);
}

#[tokio::test]
async fn daily_event_limit_returns_429_with_the_limit() {
    let ctx = TestContext::new().await;
    let mut project = Project::new("site", "owner@example.com", Tier::Free);
    project.rate_limit_events = Some(2);
    ctx.seed_custom(&project).await;
    let server = ctx.server();

    let mut body = fixtures::track_body("site", "pageview");
    body["token"] = json!(project.project_token);

    server.post("/track").json(&body).await.assert_status(StatusCode::OK);
    server.post("/track").json(&body).await.assert_status(StatusCode::OK);

    let response = server.post("/track").json(&body).await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let error: Value = response.json();
    assert_eq!(error["limit"], json!(2));

    // The rejected event was never written.
    assert_eq!(ctx.count("events").await, 2);
}

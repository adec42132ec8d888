//! The /stats overview and /properties discovery.

use axum::http::StatusCode;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::{json, Value};

const READ_KEY: &str = "sk_reader";

async fn seeded_context() -> TestContext {
    let ctx = TestContext::with_statics("", READ_KEY).await;
    let server = ctx.server();
    let ts = fixtures::now_ms();

    // Two sessions: one two-page visit, one bounce.
    let events = vec![
        fixtures::session_event("p1", "s1", ts - 120_000, "/a"),
        fixtures::session_event("p1", "s1", ts - 60_000, "/b"),
        fixtures::session_event("p1", "s2", ts - 30_000, "/a"),
        json!({
            "project": "p1",
            "event": "signup",
            "user_id": "u1",
            "timestamp": ts,
            "properties": { "plan": "pro" }
        }),
    ];
    let response = server.post("/track/batch").json(&fixtures::batch_body(None, events)).await;
    response.assert_status(StatusCode::OK);
    ctx
}

#[tokio::test]
async fn stats_requires_a_read_key() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let response = server.get("/stats").add_query_param("project", "p1").await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server.get("/stats").add_query_param("project", "p1").add_query_param("key", "sk_bad").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn totals_match_the_raw_event_listing() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let stats: Value = server
        .get("/stats")
        .add_header("X-API-Key", READ_KEY)
        .add_query_param("project", "p1")
        .add_query_param("days", "7")
        .await
        .json();

    let events: Value = server
        .get("/events")
        .add_header("X-API-Key", READ_KEY)
        .add_query_param("project", "p1")
        .add_query_param("days", "7")
        .add_query_param("limit", "1000")
        .await
        .json();

    let listed = events["events"].as_array().unwrap().len() as i64;
    assert_eq!(stats["totals"]["total_events"].as_i64().unwrap(), listed);
    assert_eq!(stats["totals"]["total_events"], json!(4));
    assert_eq!(stats["totals"]["unique_users"], json!(1));
}

#[tokio::test]
async fn session_statistics_come_from_session_rows() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let stats: Value = server
        .get("/stats")
        .add_header("X-API-Key", READ_KEY)
        .add_query_param("project", "p1")
        .await
        .json();

    let sessions = &stats["sessions"];
    assert_eq!(sessions["total_sessions"], json!(2));
    // One bounce out of two sessions.
    assert_eq!(sessions["bounce_rate"], json!(50.0));
    // (60000 + 0) / 2
    assert_eq!(sessions["avg_duration"], json!(30000.0));
    // (2 + 1) / 2
    assert_eq!(sessions["pages_per_session"], json!(1.5));
    assert_eq!(sessions["sessions_per_user"], json!(2.0));
}

#[tokio::test]
async fn top_events_rank_by_count_with_unique_users() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let stats: Value = server
        .get("/stats")
        .add_header("X-API-Key", READ_KEY)
        .add_query_param("project", "p1")
        .await
        .json();

    let top = stats["top_events"].as_array().unwrap();
    assert_eq!(top[0]["event"], json!("pageview"));
    assert_eq!(top[0]["count"], json!(3));
    assert_eq!(top[0]["unique_users"], json!(1));
    assert_eq!(top[1]["event"], json!("signup"));
    assert_eq!(top[1]["count"], json!(1));
}

#[tokio::test]
async fn day_series_buckets_by_date() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let stats: Value = server
        .get("/stats")
        .add_header("X-API-Key", READ_KEY)
        .add_query_param("project", "p1")
        .await
        .json();

    assert_eq!(stats["granularity"], json!("day"));
    let series = stats["series"].as_array().unwrap();
    let total: i64 = series.iter().map(|p| p["events"].as_i64().unwrap()).sum();
    assert_eq!(total, 4);
    // Buckets are calendar dates.
    assert!(series[0]["bucket"].as_str().unwrap().len() == 10);
}

#[tokio::test]
async fn hour_series_scans_raw_timestamps() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let stats: Value = server
        .get("/stats")
        .add_header("X-API-Key", READ_KEY)
        .add_query_param("project", "p1")
        .add_query_param("groupBy", "hour")
        .await
        .json();

    assert_eq!(stats["granularity"], json!("hour"));
    let series = stats["series"].as_array().unwrap();
    let total: i64 = series.iter().map(|p| p["events"].as_i64().unwrap()).sum();
    assert_eq!(total, 4);
    // Hour buckets carry a time component.
    assert!(series[0]["bucket"].as_str().unwrap().contains("T"));
    assert!(series[0]["bucket"].as_str().unwrap().ends_with(":00:00Z"));
}

#[tokio::test]
async fn unknown_granularity_silently_defaults_to_day() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let response = server
        .get("/stats")
        .add_header("X-API-Key", READ_KEY)
        .add_query_param("project", "p1")
        .add_query_param("groupBy", "fortnight")
        .await;
    response.assert_status(StatusCode::OK);
    let stats: Value = response.json();
    assert_eq!(stats["granularity"], json!("day"));
}

#[tokio::test]
async fn properties_lists_event_names_and_keys() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let summary: Value = server
        .get("/properties")
        .add_header("X-API-Key", READ_KEY)
        .add_query_param("project", "p1")
        .await
        .json();

    let events = summary["events"].as_array().unwrap();
    assert_eq!(events, &vec![json!("pageview"), json!("signup")]);

    let keys: Vec<&str> =
        summary["property_keys"].as_array().unwrap().iter().map(|k| k.as_str().unwrap()).collect();
    assert!(keys.contains(&"path"));
    assert!(keys.contains(&"plan"));
}

#[tokio::test]
async fn events_listing_parses_property_blobs() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let body: Value = server
        .get("/events")
        .add_header("X-API-Key", READ_KEY)
        .add_query_param("project", "p1")
        .add_query_param("event", "signup")
        .await
        .json();

    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    // Properties come back as a structure, not a JSON string.
    assert_eq!(events[0]["properties"]["plan"], json!("pro"));
}

#[tokio::test]
async fn events_listing_filters_by_session() {
    let ctx = seeded_context().await;
    let server = ctx.server();

    let body: Value = server
        .get("/events")
        .add_header("X-API-Key", READ_KEY)
        .add_query_param("project", "p1")
        .add_query_param("session_id", "s1")
        .await
        .json();

    assert_eq!(body["events"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn health_needs_no_auth() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server.get("/health").await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], json!("ok"));
}

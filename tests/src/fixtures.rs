//! Request body builders.

use chrono::Utc;
use serde_json::{json, Value};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Minimal valid single-event body.
pub fn track_body(project: &str, event: &str) -> Value {
    json!({ "project": project, "event": event })
}

/// Event with session correlation fields.
pub fn session_event(project: &str, session_id: &str, ts: i64, page: &str) -> Value {
    json!({
        "project": project,
        "event": "pageview",
        "session_id": session_id,
        "user_id": "u1",
        "timestamp": ts,
        "properties": { "path": page }
    })
}

/// Batch body with an optional top-level token.
pub fn batch_body(token: Option<&str>, events: Vec<Value>) -> Value {
    match token {
        Some(token) => json!({ "token": token, "events": events }),
        None => json!({ "events": events }),
    }
}

/// A batch one past the cap, every member individually valid.
pub fn oversized_batch(project: &str) -> Value {
    let events: Vec<Value> = (0..101).map(|i| track_body(project, &format!("e{}", i))).collect();
    batch_body(None, events)
}

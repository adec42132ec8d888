//! Event types: inbound tracking requests and stored rows.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::{Error, Result};
use crate::limits::{MAX_BATCH_EVENTS, MAX_PAGE_LEN, MAX_PROPERTIES_BYTES};

/// Validates properties JSON size.
fn validate_properties_size(props: &serde_json::Value) -> std::result::Result<(), ValidationError> {
    if props.is_null() {
        return Ok(());
    }

    let size = serde_json::to_vec(props).map(|v| v.len()).unwrap_or(0);

    if size > MAX_PROPERTIES_BYTES {
        let mut err = ValidationError::new("properties_too_large");
        err.message = Some(
            format!(
                "properties {}KB exceeds {}KB limit",
                size / 1024,
                MAX_PROPERTIES_BYTES / 1024
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// A single tracking call as sent by a client.
///
/// `token` is the ingestion credential; for batch submissions the
/// batch-level token always wins over per-event tokens.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrackRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 128, message = "project is required"))]
    pub project: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "event is required"))]
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_properties_size"))]
    pub properties: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 128))]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 128))]
    pub session_id: Option<String>,
    /// Client-supplied epoch milliseconds; server receive time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl TrackRequest {
    /// Validate required fields and bounds, flattening validator output
    /// into a single message.
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(|e| Error::validation(flatten_errors(&e)))
    }

    /// Page value for session entry/exit correlation, taken from the
    /// event's `path` (or `url`) property if present.
    pub fn page(&self) -> Option<String> {
        let props = self.properties.as_ref()?;
        for key in ["path", "url"] {
            if let Some(s) = props.get(key).and_then(|v| v.as_str()) {
                if s.len() <= MAX_PAGE_LEN {
                    return Some(s.to_string());
                }
                return Some(s.chars().take(MAX_PAGE_LEN).collect());
            }
        }
        None
    }
}

/// A batch of tracking calls. At most [`MAX_BATCH_EVENTS`] per request;
/// an empty or absent array is rejected before any authorization or
/// storage work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub events: Vec<TrackRequest>,
}

impl BatchRequest {
    /// Validate the batch shape and every member event.
    pub fn check(&self) -> Result<()> {
        if self.events.is_empty() {
            return Err(Error::validation("events array is required and must not be empty"));
        }
        if self.events.len() > MAX_BATCH_EVENTS {
            return Err(Error::validation(format!(
                "batch has {} events, exceeds {} limit",
                self.events.len(),
                MAX_BATCH_EVENTS
            )));
        }
        for (i, event) in self.events.iter().enumerate() {
            event
                .check()
                .map_err(|e| Error::validation(format!("events[{}]: {}", i, e)))?;
        }
        Ok(())
    }

    /// Effective ingestion token: top-level always wins, else the first
    /// per-event token.
    pub fn effective_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .or_else(|| self.events.iter().find_map(|e| e.token.as_deref()))
    }
}

fn flatten_errors(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = Vec::new();
    for (field, errs) in errors.field_errors() {
        for err in errs {
            match &err.message {
                Some(msg) => parts.push(msg.to_string()),
                None => parts.push(format!("{}: {}", field, err.code)),
            }
        }
    }
    parts.sort();
    parts.join("; ")
}

/// An event row as persisted. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Time-sortable unique identifier (UUIDv7).
    pub id: String,
    pub project_id: String,
    pub event: String,
    /// Opaque JSON attribute bag, stored as text.
    pub properties: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// UTC calendar date of `timestamp`, denormalized for
    /// partition-friendly range scans.
    pub date: String,
}

impl StoredEvent {
    /// Build a persistable row from an inbound request.
    pub fn from_request(req: &TrackRequest, project_id: &str, received_at: i64) -> Result<Self> {
        let timestamp = req.timestamp.unwrap_or(received_at);
        let date = utc_date(timestamp)?;
        let properties = match &req.properties {
            Some(v) if !v.is_null() => Some(serde_json::to_string(v)?),
            _ => None,
        };
        Ok(Self {
            id: Uuid::now_v7().to_string(),
            project_id: project_id.to_string(),
            event: req.event.clone(),
            properties,
            user_id: req.user_id.clone(),
            session_id: req.session_id.clone(),
            timestamp,
            date,
        })
    }
}

/// A stored row plus the transient page value used for session
/// correlation (never persisted on the event itself).
#[derive(Debug, Clone)]
pub struct EventWrite {
    pub row: StoredEvent,
    pub page: Option<String>,
}

impl EventWrite {
    pub fn from_request(req: &TrackRequest, project_id: &str, received_at: i64) -> Result<Self> {
        Ok(Self {
            row: StoredEvent::from_request(req, project_id, received_at)?,
            page: req.page(),
        })
    }
}

/// UTC calendar date (`YYYY-MM-DD`) of an epoch-millisecond timestamp.
pub fn utc_date(timestamp_ms: i64) -> Result<String> {
    let dt = DateTime::from_timestamp_millis(timestamp_ms)
        .ok_or_else(|| Error::validation(format!("timestamp {} out of range", timestamp_ms)))?;
    Ok(dt.date_naive().format("%Y-%m-%d").to_string())
}

//! Session correlation: batch-level aggregation of per-session
//! contributions.
//!
//! A session row aggregates all events sharing a `session_id`. The
//! merge itself happens in a single atomic upsert statement; this
//! module pre-aggregates the events of one request so a batch issues
//! exactly one upsert per session regardless of how many events it
//! contributes.

use crate::event::EventWrite;

/// One request's contribution to a session row.
///
/// For a single event `start == end == timestamp` and `count == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDelta {
    pub session_id: String,
    pub project_id: String,
    /// First non-null user id among contributing events.
    pub user_id: Option<String>,
    pub start: i64,
    pub end: i64,
    /// Page of the earliest-timestamp contributing event.
    pub entry_page: Option<String>,
    /// Page of the latest-timestamp contributing event.
    pub exit_page: Option<String>,
    pub count: i64,
    /// UTC date of `start`.
    pub date: String,
}

impl SessionDelta {
    fn seed(session_id: &str, event: &EventWrite) -> Self {
        Self {
            session_id: session_id.to_string(),
            project_id: event.row.project_id.clone(),
            user_id: event.row.user_id.clone(),
            start: event.row.timestamp,
            end: event.row.timestamp,
            entry_page: event.page.clone(),
            exit_page: event.page.clone(),
            count: 1,
            date: event.row.date.clone(),
        }
    }

    fn absorb(&mut self, event: &EventWrite) {
        let ts = event.row.timestamp;
        // Strictly earlier wins entry, later-or-equal wins exit: the
        // same tie-breaking the SQL merge applies against existing rows.
        if ts < self.start {
            self.start = ts;
            self.entry_page = event.page.clone();
            self.date = event.row.date.clone();
        }
        if ts >= self.end {
            self.end = ts;
            self.exit_page = event.page.clone();
        }
        if self.user_id.is_none() {
            self.user_id = event.row.user_id.clone();
        }
        self.count += 1;
    }

    pub fn duration(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_bounce(&self) -> bool {
        self.count <= 1
    }
}

/// Aggregate a request's events into one delta per session, in first-seen
/// session order. Events without a `session_id` contribute nothing.
pub fn session_deltas(events: &[EventWrite]) -> Vec<SessionDelta> {
    let mut deltas: Vec<SessionDelta> = Vec::new();
    for event in events {
        let Some(session_id) = event.row.session_id.as_deref() else {
            continue;
        };
        match deltas.iter_mut().find(|d| d.session_id == session_id) {
            Some(delta) => delta.absorb(event),
            None => deltas.push(SessionDelta::seed(session_id, event)),
        }
    }
    deltas
}

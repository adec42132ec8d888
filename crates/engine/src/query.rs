//! Query engine: compiles a client-declared query shape into a safe,
//! bounded aggregate over the events table.
//!
//! Every dimension of the shape is allowlisted through an enum; a value
//! outside the allowlist is rejected with the permitted set enumerated,
//! never silently ignored. The one place user-controlled text reaches
//! query text is the validated property key inside a JSON path; the
//! operator and comparison value are always an enum fragment and a
//! bound parameter.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use beacon_core::limits::{DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT, PROPERTY_KEY_PATTERN, PROPERTY_SCAN_LIMIT};
use beacon_core::{Error, Result};
use beacon_storage::{SqlValue, Statement, StorageAdapter};

use crate::window::{today_utc, DateWindow, Period};

static PROPERTY_KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PROPERTY_KEY_PATTERN).expect("invalid property key pattern"));

/// Aggregate metrics a query may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    EventCount,
    UniqueUsers,
    SessionCount,
    BounceRate,
    AvgDuration,
}

impl Metric {
    const ALLOWED: &'static str =
        "event_count, unique_users, session_count, bounce_rate, avg_duration";

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "event_count" => Ok(Self::EventCount),
            "unique_users" => Ok(Self::UniqueUsers),
            "session_count" => Ok(Self::SessionCount),
            "bounce_rate" => Ok(Self::BounceRate),
            "avg_duration" => Ok(Self::AvgDuration),
            other => Err(Error::query(format!(
                "unknown metric '{}'; allowed metrics: {}",
                other,
                Self::ALLOWED
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventCount => "event_count",
            Self::UniqueUsers => "unique_users",
            Self::SessionCount => "session_count",
            Self::BounceRate => "bounce_rate",
            Self::AvgDuration => "avg_duration",
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            Self::EventCount => "COUNT(*)",
            Self::UniqueUsers => "COUNT(DISTINCT e.user_id)",
            Self::SessionCount => "COUNT(DISTINCT e.session_id)",
            Self::BounceRate => {
                "ROUND(100.0 * COUNT(DISTINCT CASE WHEN s.is_bounce = 1 THEN e.session_id END) \
                 / NULLIF(COUNT(DISTINCT e.session_id), 0), 2)"
            }
            Self::AvgDuration => "ROUND(AVG(s.duration), 2)",
        }
    }

    fn needs_sessions(&self) -> bool {
        matches!(self, Self::BounceRate | Self::AvgDuration)
    }
}

/// Grouping dimensions a query may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Event,
    Date,
    UserId,
    SessionId,
}

impl GroupBy {
    const ALLOWED: &'static str = "event, date, user_id, session_id";

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "event" => Ok(Self::Event),
            "date" => Ok(Self::Date),
            "user_id" => Ok(Self::UserId),
            "session_id" => Ok(Self::SessionId),
            other => Err(Error::query(format!(
                "unknown group_by '{}'; allowed values: {}",
                other,
                Self::ALLOWED
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Date => "date",
            Self::UserId => "user_id",
            Self::SessionId => "session_id",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::Event => "e.event",
            Self::Date => "e.date",
            Self::UserId => "e.user_id",
            Self::SessionId => "e.session_id",
        }
    }
}

/// Comparison operators for filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl FilterOp {
    const ALLOWED: &'static str = "eq, neq, gt, lt, gte, lte";

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "eq" => Ok(Self::Eq),
            "neq" => Ok(Self::Neq),
            "gt" => Ok(Self::Gt),
            "lt" => Ok(Self::Lt),
            "gte" => Ok(Self::Gte),
            "lte" => Ok(Self::Lte),
            other => Err(Error::query(format!(
                "unknown filter operator '{}'; allowed operators: {}",
                other,
                Self::ALLOWED
            ))),
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
        }
    }
}

/// Filterable fields: three event columns plus validated property keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterField {
    Event,
    UserId,
    Date,
    Property(String),
}

impl FilterField {
    const ALLOWED: &'static str = "event, user_id, date, properties.<key>";

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "event" => Ok(Self::Event),
            "user_id" => Ok(Self::UserId),
            "date" => Ok(Self::Date),
            other => {
                if let Some(key) = other.strip_prefix("properties.") {
                    if PROPERTY_KEY_REGEX.is_match(key) {
                        return Ok(Self::Property(key.to_string()));
                    }
                    return Err(Error::query(format!(
                        "invalid property key '{}'; keys must match {}",
                        key, PROPERTY_KEY_PATTERN
                    )));
                }
                Err(Error::query(format!(
                    "unknown filter field '{}'; allowed fields: {}",
                    other,
                    Self::ALLOWED
                )))
            }
        }
    }

    fn expr(&self) -> String {
        match self {
            Self::Event => "e.event".to_string(),
            Self::UserId => "e.user_id".to_string(),
            Self::Date => "e.date".to_string(),
            // The key has been validated against the identifier
            // pattern; it is the only client text entering query text.
            Self::Property(key) => format!("json_extract(e.properties, '$.{}')", key),
        }
    }
}

/// One filter clause as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    pub field: String,
    /// Defaults to `eq` when absent.
    #[serde(default)]
    pub op: Option<String>,
    pub value: serde_json::Value,
}

/// Client-declared query shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub metrics: Option<Vec<String>>,
    #[serde(default)]
    pub group_by: Option<Vec<String>>,
    #[serde(default)]
    pub filters: Option<Vec<FilterSpec>>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Query result. `count` is the number of rows actually returned
/// (post-limit), not the total number of matching groups.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub project: String,
    pub period: Period,
    pub metrics: Vec<&'static str>,
    pub group_by: Vec<&'static str>,
    pub rows: Vec<serde_json::Value>,
    pub count: usize,
}

/// Raw event listing parameters.
#[derive(Debug, Clone, Default)]
pub struct EventsQuery {
    pub event: Option<String>,
    pub session_id: Option<String>,
    /// Epoch milliseconds lower bound.
    pub since_ms: i64,
    pub limit: Option<i64>,
}

/// Event-name and property-key discovery result.
#[derive(Debug, Serialize)]
pub struct PropertySummary {
    pub events: Vec<String>,
    pub property_keys: Vec<String>,
}

/// Explicit `order_by` values that are honored; anything else falls
/// back to the default ordering.
const ORDERABLE: &[&str] = &["event_count", "unique_users", "date", "event"];

struct CompiledQuery {
    stmt: Statement,
    metrics: Vec<&'static str>,
    group_by: Vec<&'static str>,
    window: DateWindow,
}

/// The read path: allowlisted aggregates, raw listings, and the fixed
/// stats shape (see `stats.rs`).
pub struct QueryEngine {
    pub(crate) storage: Arc<dyn StorageAdapter>,
}

impl QueryEngine {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Run an allowlisted aggregate query.
    pub async fn query(&self, project_id: &str, req: &QueryRequest) -> Result<QueryResponse> {
        let compiled = compile(project_id, req, today_utc())?;
        let rows = self.storage.fetch_all(compiled.stmt).await?;
        let rows: Vec<serde_json::Value> = rows.iter().map(|r| r.to_json()).collect();
        Ok(QueryResponse {
            project: project_id.to_string(),
            period: Period::from(&compiled.window),
            metrics: compiled.metrics,
            group_by: compiled.group_by,
            count: rows.len(),
            rows,
        })
    }

    /// List raw events, newest first, with parsed property bags.
    pub async fn events(&self, project_id: &str, q: &EventsQuery) -> Result<Vec<serde_json::Value>> {
        let mut sql = String::from(
            "SELECT id, event, properties, user_id, session_id, timestamp, date \
             FROM events WHERE project_id = ? AND timestamp >= ?",
        );
        let mut params: Vec<SqlValue> = vec![project_id.into(), q.since_ms.into()];
        if let Some(event) = &q.event {
            sql.push_str(" AND event = ?");
            params.push(event.as_str().into());
        }
        if let Some(session_id) = &q.session_id {
            sql.push_str(" AND session_id = ?");
            params.push(session_id.as_str().into());
        }
        sql.push_str(" ORDER BY timestamp DESC LIMIT ?");
        params.push(clamp_limit(q.limit).into());

        let rows = self.storage.fetch_all(Statement::new(sql, params)).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let mut json = row.to_json();
                // Properties are stored as a JSON text blob; hand the
                // caller the parsed structure.
                if let Some(obj) = json.as_object_mut() {
                    let parsed = obj
                        .get("properties")
                        .and_then(|v| v.as_str())
                        .and_then(|s| serde_json::from_str(s).ok())
                        .unwrap_or(serde_json::Value::Null);
                    obj.insert("properties".to_string(), parsed);
                }
                json
            })
            .collect())
    }

    /// Discover event names and property keys seen inside a window.
    pub async fn properties(&self, project_id: &str, window: &DateWindow) -> Result<PropertySummary> {
        let names = self
            .storage
            .fetch_all(Statement::new(
                "SELECT DISTINCT event FROM events \
                 WHERE project_id = ? AND date >= ? AND date <= ? ORDER BY event",
                vec![project_id.into(), window.from_str().into(), window.to_str().into()],
            ))
            .await?;
        let events: Vec<String> = names
            .iter()
            .filter_map(|r| r.get_str("event").map(str::to_string))
            .collect();

        let blobs = self
            .storage
            .fetch_all(Statement::new(
                "SELECT properties FROM events \
                 WHERE project_id = ? AND date >= ? AND date <= ? AND properties IS NOT NULL \
                 ORDER BY timestamp DESC LIMIT ?",
                vec![
                    project_id.into(),
                    window.from_str().into(),
                    window.to_str().into(),
                    i64::from(PROPERTY_SCAN_LIMIT).into(),
                ],
            ))
            .await?;

        let mut keys: BTreeSet<String> = BTreeSet::new();
        for row in &blobs {
            let Some(blob) = row.get_str("properties") else { continue };
            if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(blob) {
                keys.extend(map.keys().cloned());
            }
        }

        Ok(PropertySummary { events, property_keys: keys.into_iter().collect() })
    }
}

/// Clamp a requested row limit into `[1, MAX_QUERY_LIMIT]`.
fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(i64::from(DEFAULT_QUERY_LIMIT))
        .clamp(1, i64::from(MAX_QUERY_LIMIT))
}

fn compile(project_id: &str, req: &QueryRequest, today: chrono::NaiveDate) -> Result<CompiledQuery> {
    let metrics: Vec<Metric> = match req.metrics.as_deref() {
        Some(list) if !list.is_empty() => {
            list.iter().map(|s| Metric::parse(s)).collect::<Result<_>>()?
        }
        _ => vec![Metric::EventCount],
    };

    let groups: Vec<GroupBy> = req
        .group_by
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .map(|s| GroupBy::parse(s))
        .collect::<Result<_>>()?;

    let mut filters: Vec<(FilterField, FilterOp, SqlValue)> = Vec::new();
    for spec in req.filters.as_deref().unwrap_or(&[]) {
        let field = FilterField::parse(&spec.field)?;
        let op = match spec.op.as_deref() {
            Some(s) => FilterOp::parse(s)?,
            None => FilterOp::Eq,
        };
        filters.push((field, op, SqlValue::from_json(&spec.value)));
    }

    let window = DateWindow::resolve(req.date_from.as_deref(), req.date_to.as_deref(), today)?;

    let mut select: Vec<String> = groups
        .iter()
        .map(|g| format!("{} AS {}", g.column(), g.as_str()))
        .collect();
    select.extend(metrics.iter().map(|m| format!("{} AS {}", m.sql(), m.as_str())));

    let mut sql = format!("SELECT {} FROM events e", select.join(", "));
    if metrics.iter().any(Metric::needs_sessions) {
        sql.push_str(" LEFT JOIN sessions s ON e.session_id = s.session_id");
    }

    sql.push_str(" WHERE e.project_id = ? AND e.date >= ? AND e.date <= ?");
    let mut params: Vec<SqlValue> =
        vec![project_id.into(), window.from_str().into(), window.to_str().into()];

    for (field, op, value) in filters {
        sql.push_str(&format!(" AND {} {} ?", field.expr(), op.sql()));
        params.push(value);
    }

    if !groups.is_empty() {
        let cols: Vec<&str> = groups.iter().map(|g| g.column()).collect();
        sql.push_str(&format!(" GROUP BY {}", cols.join(", ")));
    }

    // Explicit order_by is honored only when allowlisted and part of
    // the selected shape; otherwise default to date when grouping by
    // date, else the primary requested metric.
    let selected: Vec<&'static str> = groups
        .iter()
        .map(GroupBy::as_str)
        .chain(metrics.iter().map(Metric::as_str))
        .collect();
    let order_col = match req.order_by.as_deref() {
        Some(o) if ORDERABLE.iter().any(|c| *c == o) && selected.iter().any(|s| *s == o) => o,
        _ if groups.contains(&GroupBy::Date) => "date",
        _ => metrics[0].as_str(),
    };
    let direction = if req.order.as_deref() == Some("asc") { "ASC" } else { "DESC" };
    sql.push_str(&format!(" ORDER BY {} {}", order_col, direction));

    sql.push_str(" LIMIT ?");
    params.push(clamp_limit(req.limit).into());

    Ok(CompiledQuery {
        stmt: Statement::new(sql, params),
        metrics: metrics.iter().map(Metric::as_str).collect(),
        group_by: groups.iter().map(GroupBy::as_str).collect(),
        window,
    })
}

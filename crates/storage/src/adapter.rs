//! The storage seam: parameterized statements in, typed rows out.

use std::sync::Arc;

use async_trait::async_trait;
use beacon_core::Result;

/// A positional SQL parameter or result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Bind a JSON literal as a parameter. Strings, numbers, and bools
    /// map to their SQL counterparts; anything else binds as NULL.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::Text(s.clone()),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else {
                    Self::Real(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::Bool(b) => Self::Integer(i64::from(*b)),
            _ => Self::Null,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null | Self::Blob(_) => serde_json::Value::Null,
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(s) => serde_json::Value::from(s.clone()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// One SQL statement with positional parameters.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self { sql: sql.into(), params }
    }
}

/// A fetched row. Column names are shared across the rows of one result
/// set.
#[derive(Debug, Clone)]
pub struct SqlRow {
    columns: Arc<Vec<String>>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Real(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Numeric accessor; integers widen to f64 (SQLite aggregates may
    /// come back as either affinity).
    pub fn get_f64(&self, column: &str) -> Option<f64> {
        match self.get(column)? {
            SqlValue::Real(f) => Some(*f),
            SqlValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        match self.get(column)? {
            SqlValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Project the row as a JSON object in column order.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.columns.len());
        for (name, value) in self.columns.iter().zip(&self.values) {
            map.insert(name.clone(), value.to_json());
        }
        serde_json::Value::Object(map)
    }
}

/// Backing-store interface: one mutation, a transactional batch of
/// mutations, or a read. No business logic may depend on which
/// implementation is active.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Run one mutation, returning the affected row count.
    async fn execute(&self, stmt: Statement) -> Result<u64>;

    /// Run a batch of mutations as a single transaction.
    async fn execute_batch(&self, stmts: Vec<Statement>) -> Result<()>;

    /// Fetch all rows for a query.
    async fn fetch_all(&self, stmt: Statement) -> Result<Vec<SqlRow>>;

    /// Fetch the first row for a query, if any.
    async fn fetch_one(&self, stmt: Statement) -> Result<Option<SqlRow>>;
}

//! Embedded SQLite adapter.
//!
//! Wraps a synchronous rusqlite connection behind a mutex and
//! `spawn_blocking`, so the async pipeline never blocks an executor
//! thread on storage I/O. Transactions come from the connection's
//! native transaction wrapper.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beacon_core::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection};

use crate::adapter::{SqlRow, SqlValue, Statement, StorageAdapter};

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Embedded single-process store.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) a database file. `:memory:` opens a private
    /// in-memory database, used by tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory().map_err(db_err)?
        } else {
            let conn = Connection::open(path).map_err(db_err)?;
            // WAL keeps readers unblocked during the write path.
            conn.pragma_update(None, "journal_mode", "WAL").map_err(db_err)?;
            conn.pragma_update(None, "synchronous", "NORMAL").map_err(db_err)?;
            conn
        };
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::internal(format!("storage task failed: {}", e)))?
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn execute(&self, stmt: Statement) -> Result<u64> {
        self.run_blocking(move |conn| {
            let n = conn
                .execute(&stmt.sql, params_from_iter(stmt.params.iter().map(to_rusqlite)))
                .map_err(db_err)?;
            Ok(n as u64)
        })
        .await
    }

    async fn execute_batch(&self, stmts: Vec<Statement>) -> Result<()> {
        self.run_blocking(move |conn| {
            let tx = conn.transaction().map_err(db_err)?;
            for stmt in &stmts {
                tx.execute(&stmt.sql, params_from_iter(stmt.params.iter().map(to_rusqlite)))
                    .map_err(db_err)?;
            }
            tx.commit().map_err(db_err)
        })
        .await
    }

    async fn fetch_all(&self, stmt: Statement) -> Result<Vec<SqlRow>> {
        self.run_blocking(move |conn| fetch_rows(conn, &stmt)).await
    }

    async fn fetch_one(&self, stmt: Statement) -> Result<Option<SqlRow>> {
        self.run_blocking(move |conn| Ok(fetch_rows(conn, &stmt)?.into_iter().next()))
            .await
    }
}

fn fetch_rows(conn: &Connection, stmt: &Statement) -> Result<Vec<SqlRow>> {
    let mut prepared = conn.prepare(&stmt.sql).map_err(db_err)?;
    let columns: Arc<Vec<String>> =
        Arc::new(prepared.column_names().iter().map(|c| c.to_string()).collect());
    let count = columns.len();

    let mut rows = prepared
        .query(params_from_iter(stmt.params.iter().map(to_rusqlite)))
        .map_err(db_err)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(db_err)? {
        let mut values = Vec::with_capacity(count);
        for i in 0..count {
            let value: rusqlite::types::Value = row.get(i).map_err(db_err)?;
            values.push(from_rusqlite(value));
        }
        out.push(SqlRow::new(columns.clone(), values));
    }
    Ok(out)
}

fn to_rusqlite(value: &SqlValue) -> rusqlite::types::Value {
    match value {
        SqlValue::Null => rusqlite::types::Value::Null,
        SqlValue::Integer(i) => rusqlite::types::Value::Integer(*i),
        SqlValue::Real(f) => rusqlite::types::Value::Real(*f),
        SqlValue::Text(s) => rusqlite::types::Value::Text(s.clone()),
        SqlValue::Blob(b) => rusqlite::types::Value::Blob(b.clone()),
    }
}

fn from_rusqlite(value: rusqlite::types::Value) -> SqlValue {
    match value {
        rusqlite::types::Value::Null => SqlValue::Null,
        rusqlite::types::Value::Integer(i) => SqlValue::Integer(i),
        rusqlite::types::Value::Real(f) => SqlValue::Real(f),
        rusqlite::types::Value::Text(s) => SqlValue::Text(s),
        rusqlite::types::Value::Blob(b) => SqlValue::Blob(b),
    }
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::database(e.to_string())
}

//! Remote libsql adapter.
//!
//! Talks to a Turso-style distributed SQLite over its native async
//! protocol. Batches run inside an interactive transaction so the
//! event-insert + session-upsert unit of work keeps the same atomicity
//! as the embedded adapter.

use std::sync::Arc;

use async_trait::async_trait;
use beacon_core::{Error, Result};

use crate::adapter::{SqlRow, SqlValue, Statement, StorageAdapter};

/// Networked/distributed store.
#[derive(Clone)]
pub struct RemoteStorage {
    // Held so the connection outlives its database handle.
    _db: Arc<libsql::Database>,
    conn: libsql::Connection,
}

impl RemoteStorage {
    /// Connect to a remote database URL with an auth token.
    pub async fn connect(url: &str, auth_token: &str) -> Result<Self> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;
        Ok(Self { _db: Arc::new(db), conn })
    }
}

#[async_trait]
impl StorageAdapter for RemoteStorage {
    async fn execute(&self, stmt: Statement) -> Result<u64> {
        self.conn
            .execute(&stmt.sql, to_libsql_params(&stmt.params))
            .await
            .map_err(db_err)
    }

    async fn execute_batch(&self, stmts: Vec<Statement>) -> Result<()> {
        let tx = self.conn.transaction().await.map_err(db_err)?;
        for stmt in &stmts {
            tx.execute(&stmt.sql, to_libsql_params(&stmt.params))
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn fetch_all(&self, stmt: Statement) -> Result<Vec<SqlRow>> {
        let mut rows = self
            .conn
            .query(&stmt.sql, to_libsql_params(&stmt.params))
            .await
            .map_err(db_err)?;

        let count = rows.column_count() as usize;
        let columns: Arc<Vec<String>> = Arc::new(
            (0..count)
                .map(|i| rows.column_name(i as i32).unwrap_or_default().to_string())
                .collect(),
        );

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let mut values = Vec::with_capacity(count);
            for i in 0..count {
                values.push(from_libsql(row.get_value(i as i32).map_err(db_err)?));
            }
            out.push(SqlRow::new(columns.clone(), values));
        }
        Ok(out)
    }

    async fn fetch_one(&self, stmt: Statement) -> Result<Option<SqlRow>> {
        Ok(self.fetch_all(stmt).await?.into_iter().next())
    }
}

fn to_libsql_params(params: &[SqlValue]) -> Vec<libsql::Value> {
    params
        .iter()
        .map(|p| match p {
            SqlValue::Null => libsql::Value::Null,
            SqlValue::Integer(i) => libsql::Value::Integer(*i),
            SqlValue::Real(f) => libsql::Value::Real(*f),
            SqlValue::Text(s) => libsql::Value::Text(s.clone()),
            SqlValue::Blob(b) => libsql::Value::Blob(b.clone()),
        })
        .collect()
}

fn from_libsql(value: libsql::Value) -> SqlValue {
    match value {
        libsql::Value::Null => SqlValue::Null,
        libsql::Value::Integer(i) => SqlValue::Integer(i),
        libsql::Value::Real(f) => SqlValue::Real(f),
        libsql::Value::Text(s) => SqlValue::Text(s),
        libsql::Value::Blob(b) => SqlValue::Blob(b),
    }
}

fn db_err(e: libsql::Error) -> Error {
    Error::database(e.to_string())
}

// SPDX-License-Identifier: Apache-2.0

//! SQLite Driver
//!
//! Implements the DataEngine trait for SQLite databases using SQLx.
//!
//! ## SQLite Specifics
//!
//! - SQLite is a file-based database, so `host` in ConnectionConfig contains the file path
//! - When `host` is a directory and `database` is set, the file is `<host>/<database>.db`,
//!   which lets a roster of SQLite files look like a roster of servers
//! - Supports `:memory:` for in-memory databases
//! - Missing files are a connection failure; nothing is created on connect

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row, TypeInfo};
use tokio::sync::RwLock;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::DataEngine;
use crate::engine::types::{
    ColumnInfo, ConnectionConfig, QueryResult, Row as QRow, SessionId, Value,
};

/// Holds the connection state for a SQLite session.
pub struct SqliteSession {
    pub pool: SqlitePool,
    pub db_path: String,
}

/// SQLite driver implementation
pub struct SqliteDriver {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<SqliteSession>>>>,
}

impl SqliteDriver {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn get_session(&self, session: SessionId) -> EngineResult<Arc<SqliteSession>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session)
            .cloned()
            .ok_or_else(|| EngineError::session_not_found(session.0.to_string()))
    }

    /// Resolves the database file for a connection config.
    fn resolve_path(config: &ConnectionConfig) -> String {
        let host = config.host.trim();
        match config.database.as_deref() {
            Some(db) if !db.is_empty() && Path::new(host).is_dir() => Path::new(host)
                .join(format!("{db}.db"))
                .to_string_lossy()
                .into_owned(),
            _ => host.to_string(),
        }
    }

    /// Validates the SQLite connection path
    fn validate_path(path: &str) -> EngineResult<()> {
        if path == ":memory:" {
            return Ok(());
        }

        if path.is_empty() {
            return Err(EngineError::connection_failed(
                "SQLite path cannot be empty.".to_string(),
            ));
        }

        if path.contains("://") {
            return Err(EngineError::connection_failed(format!(
                "Invalid SQLite path format: {}",
                path
            )));
        }

        Ok(())
    }

    fn build_connect_options(path: &str) -> SqliteConnectOptions {
        let opts = if path == ":memory:" {
            SqliteConnectOptions::new().in_memory(true)
        } else {
            SqliteConnectOptions::new().filename(path)
        };

        opts.create_if_missing(false)
            .busy_timeout(std::time::Duration::from_secs(30))
    }

    async fn create_pool(config: &ConnectionConfig, path: &str) -> EngineResult<SqlitePool> {
        let max_connections = config.pool_max_connections.unwrap_or(1);
        let acquire_timeout = config.pool_acquire_timeout_secs.unwrap_or(30) as u64;

        SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(acquire_timeout))
            .connect_with(Self::build_connect_options(path))
            .await
            .map_err(|e| EngineError::connection_failed(format!("{path}: {e}")))
    }

    /// Converts a SQLx row to our universal Row type
    fn convert_row(sqlite_row: &SqliteRow) -> QRow {
        let values: Vec<Value> = sqlite_row
            .columns()
            .iter()
            .map(|col| Self::extract_value(sqlite_row, col.ordinal()))
            .collect();

        QRow { values }
    }

    /// Extracts a value from a SqliteRow at the given index
    ///
    /// SQLite has dynamic typing, so we try multiple types in order of likelihood
    fn extract_value(row: &SqliteRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(Value::Float).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::Text).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v.map(Value::Bytes).unwrap_or(Value::Null);
        }

        Value::Null
    }

    fn get_column_info(row: &SqliteRow) -> Vec<ColumnInfo> {
        row.columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                data_type: col.type_info().name().to_string(),
                nullable: true, // SQLite doesn't easily expose nullability from row metadata
            })
            .collect()
    }

    /// Column metadata for a query that produced no rows.
    async fn describe_columns(pool: &SqlitePool, query: &str) -> Vec<ColumnInfo> {
        match pool.describe(query).await {
            Ok(describe) => describe
                .columns()
                .iter()
                .map(|col| ColumnInfo {
                    name: col.name().to_string(),
                    data_type: col.type_info().name().to_string(),
                    nullable: true,
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataEngine for SqliteDriver {
    fn driver_id(&self) -> &'static str {
        "sqlite"
    }

    fn driver_name(&self) -> &'static str {
        "SQLite"
    }

    fn default_port(&self) -> u16 {
        0
    }

    async fn test_connection(&self, config: &ConnectionConfig) -> EngineResult<()> {
        let path = Self::resolve_path(config);
        Self::validate_path(&path)?;
        let pool = Self::create_pool(config, &path).await?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| EngineError::execution_error(e.to_string()))?;
        pool.close().await;
        Ok(())
    }

    async fn connect(&self, config: &ConnectionConfig) -> EngineResult<SessionId> {
        let path = Self::resolve_path(config);
        Self::validate_path(&path)?;

        let pool = Self::create_pool(config, &path).await?;

        let session_id = SessionId::new();
        let session = Arc::new(SqliteSession {
            pool,
            db_path: path,
        });

        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, session);

        Ok(session_id)
    }

    async fn disconnect(&self, session: SessionId) -> EngineResult<()> {
        let session = {
            let mut sessions = self.sessions.write().await;
            sessions
                .remove(&session)
                .ok_or_else(|| EngineError::session_not_found(session.0.to_string()))?
        };

        session.pool.close().await;
        Ok(())
    }

    async fn execute(&self, session: SessionId, query: &str) -> EngineResult<QueryResult> {
        let sqlite_session = self.get_session(session).await?;
        let start = Instant::now();

        let sqlite_rows: Vec<SqliteRow> = sqlx::query(query)
            .fetch_all(&sqlite_session.pool)
            .await
            .map_err(|e| EngineError::from_query_message(e.to_string()))?;

        let columns = match sqlite_rows.first() {
            Some(first) => Self::get_column_info(first),
            None => Self::describe_columns(&sqlite_session.pool, query).await,
        };
        let rows = sqlite_rows.iter().map(Self::convert_row).collect();
        let execution_time_ms = start.elapsed().as_micros() as f64 / 1000.0;

        tracing::debug!(path = %sqlite_session.db_path, rows = %sqlite_rows.len(), "SQLite query finished");

        Ok(QueryResult {
            columns,
            rows,
            affected_rows: None,
            execution_time_ms,
        })
    }
}

// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL Driver
//!
//! Implements the DataEngine trait for PostgreSQL databases using SQLx.
//! Each session owns a small `PgPool` bound to one database.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::{Column, Executor, Row, TypeInfo};
use tokio::sync::RwLock;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::DataEngine;
use crate::engine::types::{
    ColumnInfo, ConnectionConfig, QueryResult, Row as QRow, SessionId, Value,
};

/// Holds the connection state for a PostgreSQL session.
pub struct PostgresSession {
    pub pool: PgPool,
}

/// PostgreSQL driver implementation
pub struct PostgresDriver {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<PostgresSession>>>>,
}

impl PostgresDriver {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn get_session(&self, session: SessionId) -> EngineResult<Arc<PostgresSession>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session)
            .cloned()
            .ok_or_else(|| EngineError::session_not_found(session.0.to_string()))
    }

    fn build_connect_options(config: &ConnectionConfig) -> PgConnectOptions {
        let mut opts = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(config.password.expose())
            .ssl_mode(if config.ssl {
                PgSslMode::Require
            } else {
                PgSslMode::Prefer
            });
        if let Some(ref db) = config.database {
            opts = opts.database(db);
        }
        opts
    }

    async fn create_pool(config: &ConnectionConfig) -> EngineResult<PgPool> {
        let max_connections = config.pool_max_connections.unwrap_or(1);
        let acquire_timeout = config.pool_acquire_timeout_secs.unwrap_or(30) as u64;

        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(acquire_timeout))
            .connect_with(Self::build_connect_options(config))
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("password authentication failed") {
                    EngineError::auth_failed(msg)
                } else {
                    EngineError::connection_failed(msg)
                }
            })
    }

    /// Converts a SQLx row to our universal Row type
    fn convert_row(pg_row: &PgRow) -> QRow {
        let values: Vec<Value> = pg_row
            .columns()
            .iter()
            .map(|col| Self::extract_value(pg_row, col.ordinal()))
            .collect();

        QRow { values }
    }

    /// Extracts a value from a PgRow at the given index
    ///
    /// Postgres is strictly typed, so a mismatched decode fails and the next
    /// candidate is tried.
    fn extract_value(row: &PgRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            return v.map(|f| Value::Float(f as f64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(Value::Float).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<rust_decimal::Decimal>, _>(idx) {
            return v
                .map(|d| match d.to_f64() {
                    Some(f) => Value::Float(f),
                    None => Value::Text(d.to_string()),
                })
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::Text).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
            return v.map(|u| Value::Text(u.to_string())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            return v.map(|dt| Value::Text(dt.to_rfc3339())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return v
                .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return v
                .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
            return v.map(Value::Json).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v.map(Value::Bytes).unwrap_or(Value::Null);
        }

        Value::Null
    }

    fn get_column_info(row: &PgRow) -> Vec<ColumnInfo> {
        row.columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                data_type: col.type_info().name().to_string(),
                nullable: true,
            })
            .collect()
    }

    /// Column metadata for a query that produced no rows.
    async fn describe_columns(pool: &PgPool, query: &str) -> Vec<ColumnInfo> {
        match pool.describe(query).await {
            Ok(describe) => describe
                .columns()
                .iter()
                .enumerate()
                .map(|(i, col)| ColumnInfo {
                    name: col.name().to_string(),
                    data_type: col.type_info().name().to_string(),
                    nullable: describe.nullable(i).unwrap_or(true),
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataEngine for PostgresDriver {
    fn driver_id(&self) -> &'static str {
        "postgres"
    }

    fn driver_name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn default_port(&self) -> u16 {
        5432
    }

    async fn test_connection(&self, config: &ConnectionConfig) -> EngineResult<()> {
        let pool = Self::create_pool(config).await?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| EngineError::execution_error(e.to_string()))?;
        pool.close().await;
        Ok(())
    }

    async fn connect(&self, config: &ConnectionConfig) -> EngineResult<SessionId> {
        let pool = Self::create_pool(config).await?;

        let session_id = SessionId::new();
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, Arc::new(PostgresSession { pool }));

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
        let pg_session = self.get_session(session).await?;
        let start = Instant::now();

        let pg_rows: Vec<PgRow> = sqlx::query(query)
            .fetch_all(&pg_session.pool)
            .await
            .map_err(|e| EngineError::from_query_message(e.to_string()))?;

        let columns = match pg_rows.first() {
            Some(first) => Self::get_column_info(first),
            None => Self::describe_columns(&pg_session.pool, query).await,
        };
        let rows = pg_rows.iter().map(Self::convert_row).collect();
        let execution_time_ms = start.elapsed().as_micros() as f64 / 1000.0;

        Ok(QueryResult {
            columns,
            rows,
            affected_rows: None,
            execution_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Sensitive;

    #[test]
    fn connect_options_target_project_database() {
        let config = ConnectionConfig {
            driver: "postgres".into(),
            host: "pg-reports.local".into(),
            port: 6432,
            username: "report".into(),
            password: Sensitive::new("secret".into()),
            database: Some("project_b".into()),
            ssl: true,
            pool_max_connections: None,
            pool_acquire_timeout_secs: None,
        };

        let opts = PostgresDriver::build_connect_options(&config);
        assert_eq!(opts.get_host(), "pg-reports.local");
        assert_eq!(opts.get_port(), 6432);
        assert_eq!(opts.get_database(), Some("project_b"));
        assert_eq!(opts.get_username(), "report");
    }
}

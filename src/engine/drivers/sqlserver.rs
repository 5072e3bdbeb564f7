// SPDX-License-Identifier: Apache-2.0

//! SQL Server Driver
//!
//! Implements the DataEngine trait for Microsoft SQL Server using Tiberius.
//! Uses bb8 for async connection pooling.
//!
//! ## SQL Server Specifics
//!
//! - Client-server database using TDS (Tabular Data Stream) protocol
//! - Default port: 1433
//! - Project databases are addressed by host + database name; the
//!   database is selected at login time
//! - Only the first result set of a batch is returned
//!
//! ## Connection Model
//!
//! Uses `bb8::Pool<bb8_tiberius::ConnectionManager>` per session. A fan-out
//! run opens one session per project database and drops the pool on
//! disconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bb8::Pool;
use bb8_tiberius::ConnectionManager;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::DataEngine;
use crate::engine::types::{
    ColumnInfo, ConnectionConfig, QueryResult, Row as QRow, SessionId, Value,
};

// ==================== Types ====================

type MssqlPool = Pool<ConnectionManager>;
type MssqlClient = Client<Compat<TcpStream>>;

// ==================== Session & Driver ====================

pub struct SqlServerSession {
    pool: MssqlPool,
}

pub struct SqlServerDriver {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<SqlServerSession>>>>,
}

impl SqlServerDriver {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn get_session(&self, session: SessionId) -> EngineResult<Arc<SqlServerSession>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session)
            .cloned()
            .ok_or_else(|| EngineError::session_not_found(session.0.to_string()))
    }

    /// Build a tiberius Config from a ConnectionConfig.
    fn build_config(config: &ConnectionConfig) -> EngineResult<Config> {
        if config.host.trim().is_empty() {
            return Err(EngineError::validation("SQL Server host cannot be empty"));
        }

        let mut tib_config = Config::new();
        tib_config.host(&config.host);
        tib_config.port(config.port);
        tib_config.authentication(Self::auth_method(config));
        if let Some(ref db) = config.database {
            if !db.is_empty() {
                tib_config.database(db);
            }
        }
        tib_config.encryption(if config.ssl {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::NotSupported
        });
        tib_config.trust_cert();
        Ok(tib_config)
    }

    /// Windows hosts fall back to integrated auth when no user is configured.
    fn auth_method(config: &ConnectionConfig) -> AuthMethod {
        #[cfg(windows)]
        if config.username.is_empty() {
            return AuthMethod::Integrated;
        }

        AuthMethod::sql_server(&config.username, config.password.expose())
    }

    /// Create a raw tiberius Client (not pooled) for test_connection.
    async fn connect_raw(config: &ConnectionConfig) -> EngineResult<MssqlClient> {
        let tib_config = Self::build_config(config)?;
        let tcp = TcpStream::connect(tib_config.get_addr())
            .await
            .map_err(|e| {
                EngineError::connection_failed(format!(
                    "Failed to connect to {}:{} - {}",
                    config.host, config.port, e
                ))
            })?;
        tcp.set_nodelay(true).ok();

        Client::connect(tib_config, tcp.compat_write())
            .await
            .map_err(classify_connect_error)
    }

    /// Create a bb8 connection pool.
    async fn create_pool(config: &ConnectionConfig) -> EngineResult<MssqlPool> {
        let tib_config = Self::build_config(config)?;
        let mgr = ConnectionManager::new(tib_config);

        let max_size = config.pool_max_connections.unwrap_or(1);
        let timeout_secs = config.pool_acquire_timeout_secs.unwrap_or(30) as u64;

        Pool::builder()
            .max_size(max_size)
            .connection_timeout(std::time::Duration::from_secs(timeout_secs))
            .build(mgr)
            .await
            .map_err(|e| {
                EngineError::connection_failed(format!("Failed to create connection pool: {e}"))
            })
    }
}

impl Default for SqlServerDriver {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== Type Conversion ====================

/// Convert a tiberius ColumnData to a Value.
fn convert_column_data(data: &ColumnData<'_>) -> Value {
    match data {
        ColumnData::Bit(Some(b)) => Value::Bool(*b),
        ColumnData::U8(Some(v)) => Value::Int(*v as i64),
        ColumnData::I16(Some(v)) => Value::Int(*v as i64),
        ColumnData::I32(Some(v)) => Value::Int(*v as i64),
        ColumnData::I64(Some(v)) => Value::Int(*v),
        ColumnData::F32(Some(v)) => Value::Float(*v as f64),
        ColumnData::F64(Some(v)) => Value::Float(*v),
        ColumnData::Numeric(Some(n)) => {
            let val = n.value() as f64 / 10f64.powi(n.scale() as i32);
            Value::Float(val)
        }
        ColumnData::String(Some(s)) => Value::Text(s.to_string()),
        ColumnData::Guid(Some(g)) => Value::Text(g.to_string()),
        ColumnData::Binary(Some(b)) => Value::Bytes(b.to_vec()),
        ColumnData::Xml(Some(xml)) => Value::Text(xml.to_string()),
        _ => Value::Null,
    }
}

/// Convert a tiberius Row, using chrono for the date/time family.
fn convert_row(row: &tiberius::Row) -> QRow {
    let values: Vec<Value> = row
        .cells()
        .enumerate()
        .map(|(i, (_col, data))| match data {
            ColumnData::DateTime(Some(_))
            | ColumnData::SmallDateTime(Some(_))
            | ColumnData::DateTime2(Some(_)) => row
                .try_get::<chrono::NaiveDateTime, _>(i)
                .ok()
                .flatten()
                .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
                .unwrap_or(Value::Null),
            ColumnData::DateTimeOffset(Some(_)) => row
                .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                .ok()
                .flatten()
                .map(|dt| Value::Text(dt.to_rfc3339()))
                .unwrap_or(Value::Null),
            ColumnData::Date(Some(_)) => row
                .try_get::<chrono::NaiveDate, _>(i)
                .ok()
                .flatten()
                .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null),
            ColumnData::Time(Some(_)) => row
                .try_get::<chrono::NaiveTime, _>(i)
                .ok()
                .flatten()
                .map(|t| Value::Text(t.format("%H:%M:%S%.f").to_string()))
                .unwrap_or(Value::Null),
            _ => convert_column_data(data),
        })
        .collect();
    QRow { values }
}

/// Extract column info from tiberius result metadata.
fn get_column_info(columns: &[tiberius::Column]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|col| ColumnInfo {
            name: col.name().to_string(),
            data_type: format!("{:?}", col.column_type()),
            nullable: true,
        })
        .collect()
}

/// Login failures are reported as authentication errors.
fn classify_connect_error(err: tiberius::error::Error) -> EngineError {
    let msg = err.to_string();
    if msg.to_lowercase().contains("login failed") {
        EngineError::auth_failed(msg)
    } else {
        EngineError::connection_failed(msg)
    }
}

// ==================== DataEngine Implementation ====================

#[async_trait]
impl DataEngine for SqlServerDriver {
    fn driver_id(&self) -> &'static str {
        "sqlserver"
    }

    fn driver_name(&self) -> &'static str {
        "SQL Server"
    }

    fn default_port(&self) -> u16 {
        1433
    }

    async fn test_connection(&self, config: &ConnectionConfig) -> EngineResult<()> {
        let mut client = Self::connect_raw(config).await?;

        let stream = client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| EngineError::execution_error(e.to_string()))?;

        stream
            .into_results()
            .await
            .map_err(|e| EngineError::execution_error(e.to_string()))?;

        Ok(())
    }

    async fn connect(&self, config: &ConnectionConfig) -> EngineResult<SessionId> {
        let pool = Self::create_pool(config).await?;

        let session_id = SessionId::new();
        let session = Arc::new(SqlServerSession { pool });

        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, session);

        Ok(session_id)
    }

    async fn disconnect(&self, session: SessionId) -> EngineResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(&session)
            .ok_or_else(|| EngineError::session_not_found(session.0.to_string()))?;
        Ok(())
    }

    async fn execute(&self, session: SessionId, query: &str) -> EngineResult<QueryResult> {
        let mssql_session = self.get_session(session).await?;
        let start = Instant::now();

        let mut conn = mssql_session.pool.get().await.map_err(|e| {
            EngineError::connection_failed(format!("Failed to acquire connection: {e}"))
        })?;

        let mut stream = conn
            .simple_query(query)
            .await
            .map_err(|e| EngineError::from_query_message(e.to_string()))?;

        let columns = stream
            .columns()
            .await
            .map_err(|e| EngineError::from_query_message(e.to_string()))?
            .map(get_column_info)
            .unwrap_or_default();

        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| EngineError::from_query_message(e.to_string()))?;

        let execution_time_ms = start.elapsed().as_micros() as f64 / 1000.0;

        Ok(QueryResult {
            columns,
            rows: rows.iter().map(convert_row).collect(),
            affected_rows: None,
            execution_time_ms,
        })
    }
}

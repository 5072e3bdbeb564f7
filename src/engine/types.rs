//! Universal data types for the engine layer
//!
//! These types provide a normalized representation of connections, values and
//! result sets across the SQL Server, PostgreSQL, MySQL and SQLite drivers.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::observability::Sensitive;

/// Unique identifier for a database session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Database connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Sensitive<String>,
    pub database: Option<String>,
    pub ssl: bool,
    pub pool_max_connections: Option<u32>,
    pub pool_acquire_timeout_secs: Option<u32>,
}

impl ConnectionConfig {
    /// Display label used in logs; never includes the password.
    pub fn display_name(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username,
            self.host,
            self.port,
            self.database.as_deref().unwrap_or("default")
        )
    }
}

/// Shared credentials and pool settings for reaching many databases.
///
/// Project databases differ only by host and name, so a run holds one
/// profile and derives a [`ConnectionConfig`] per roster entry.
#[derive(Debug, Clone)]
pub struct ConnectionProfile {
    pub driver: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: Sensitive<String>,
    pub ssl: bool,
    pub pool_max_connections: Option<u32>,
    pub pool_acquire_timeout_secs: Option<u32>,
}

impl ConnectionProfile {
    /// Builds the config for one database. `host` may carry its own port as
    /// `host,port` or `host:port`, which wins over the profile port.
    pub fn config_for(&self, host: &str, database: &str, default_port: u16) -> ConnectionConfig {
        let (host, host_port) = split_host_port(host);
        ConnectionConfig {
            driver: self.driver.clone(),
            host: host.to_string(),
            port: host_port.or(self.port).unwrap_or(default_port),
            username: self.username.clone(),
            password: self.password.clone(),
            database: Some(database.to_string()),
            ssl: self.ssl,
            pool_max_connections: self.pool_max_connections,
            pool_acquire_timeout_secs: self.pool_acquire_timeout_secs,
        }
    }
}

fn split_host_port(host: &str) -> (&str, Option<u16>) {
    let host = host.trim();
    let split = host
        .rsplit_once(',')
        .or_else(|| host.split_once(':').filter(|(_, rest)| !rest.contains(':')));

    match split {
        Some((name, port)) => match port.trim().parse::<u16>() {
            Ok(port) => (name.trim(), Some(port)),
            Err(_) => (host, None),
        },
        None => (host, None),
    }
}

/// Universal value representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// Plain rendering used by text exports; `Null` renders as the empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&STANDARD.encode(b)),
            Value::Json(j) => write!(f, "{j}"),
            Value::Array(arr) => {
                let json = serde_json::to_string(arr).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }
}

/// A single row of data (indexed by column order)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }
}

/// Query execution result; also the table type handed between runner and merger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column information
    pub columns: Vec<ColumnInfo>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Number of affected rows (for INSERT/UPDATE/DELETE)
    pub affected_rows: Option<u64>,
    /// Execution time in milliseconds
    pub execution_time_ms: f64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: None,
            execution_time_ms: 0.0,
        }
    }

    pub fn with_affected_rows(affected: u64, time_ms: f64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: Some(affected),
            execution_time_ms: time_ms,
        }
    }

    pub fn from_parts(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            affected_rows: None,
            execution_time_ms: 0.0,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Position of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Values of one column, in row order. Short rows yield `Null`.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.values.get(idx).unwrap_or(&Value::Null))
                .collect(),
        )
    }
}

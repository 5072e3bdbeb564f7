// SPDX-License-Identifier: Apache-2.0

//! Roster sources.
//!
//! A roster is the list of project databases to visit. It normally comes from
//! the directory database (one row per project with its database name and
//! server host) but can also be read from a CSV export or given in memory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::engine::error::EngineError;
use crate::engine::types::{ConnectionProfile, QueryResult, Value};
use crate::engine::SessionManager;

use super::error::{ForeachError, ForeachResult};
use super::script::ScriptStore;
use super::types::RosterEntry;

/// Column holding the project database name.
pub const DEFAULT_NAME_COLUMN: &str = "databaseName";
/// Column holding the server host of that database.
pub const DEFAULT_HOST_COLUMN: &str = "serverHostName";
/// Script listing the projects in the directory database.
pub const DEFAULT_ROSTER_SCRIPT: &str = "dcrm_projects";

#[async_trait]
pub trait RosterProvider: Send + Sync {
    async fn load_roster(&self) -> ForeachResult<Vec<RosterEntry>>;
}

/// Roster held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    entries: Vec<RosterEntry>,
}

impl StaticRoster {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl RosterProvider for StaticRoster {
    async fn load_roster(&self) -> ForeachResult<Vec<RosterEntry>> {
        Ok(self.entries.clone())
    }
}

/// Which columns of a roster table carry the name and host.
#[derive(Debug, Clone)]
pub struct RosterColumns {
    pub name: String,
    pub host: String,
}

impl Default for RosterColumns {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME_COLUMN.to_string(),
            host: DEFAULT_HOST_COLUMN.to_string(),
        }
    }
}

fn missing_column(column: &str) -> ForeachError {
    ForeachError::Roster(EngineError::validation(format!(
        "Roster is missing column '{column}'"
    )))
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => {
            let text = other.to_string();
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
    }
}

/// Turns a roster table into entries. Rows without a name or host are
/// skipped with a warning.
pub fn roster_from_table(
    table: &QueryResult,
    columns: &RosterColumns,
) -> ForeachResult<Vec<RosterEntry>> {
    let names = table
        .column_values(&columns.name)
        .ok_or_else(|| missing_column(&columns.name))?;
    let hosts = table
        .column_values(&columns.host)
        .ok_or_else(|| missing_column(&columns.host))?;

    let mut entries = Vec::with_capacity(names.len());
    for (row, (name, host)) in names.into_iter().zip(hosts).enumerate() {
        match (cell_text(name), cell_text(host)) {
            (Some(database_name), Some(server_host)) => {
                entries.push(RosterEntry {
                    database_name,
                    server_host,
                })
            }
            _ => warn!(row, "Skipping roster row without database name or host"),
        }
    }
    Ok(entries)
}

/// Where the directory provider gets its roster query from.
#[derive(Debug, Clone)]
pub enum RosterQuery {
    Inline(String),
    Script(String),
}

/// Loads the roster from the directory database.
pub struct DirectoryRosterProvider {
    sessions: Arc<SessionManager>,
    profile: ConnectionProfile,
    host: String,
    database: String,
    query: RosterQuery,
    scripts: ScriptStore,
    columns: RosterColumns,
}

impl DirectoryRosterProvider {
    pub fn new(
        sessions: Arc<SessionManager>,
        profile: ConnectionProfile,
        host: impl Into<String>,
        database: impl Into<String>,
        scripts: ScriptStore,
    ) -> Self {
        Self {
            sessions,
            profile,
            host: host.into(),
            database: database.into(),
            query: RosterQuery::Script(DEFAULT_ROSTER_SCRIPT.to_string()),
            scripts,
            columns: RosterColumns::default(),
        }
    }

    pub fn with_query(mut self, query: RosterQuery) -> Self {
        self.query = query;
        self
    }

    pub fn with_columns(mut self, columns: RosterColumns) -> Self {
        self.columns = columns;
        self
    }

    fn query_text(&self) -> ForeachResult<String> {
        match &self.query {
            RosterQuery::Inline(sql) => Ok(sql.clone()),
            RosterQuery::Script(name) => Ok(self.scripts.load(name)?.text),
        }
    }
}

#[async_trait]
impl RosterProvider for DirectoryRosterProvider {
    async fn load_roster(&self) -> ForeachResult<Vec<RosterEntry>> {
        let query = self.query_text()?;
        let default_port = self
            .sessions
            .registry()
            .get(&self.profile.driver)
            .map(|driver| driver.default_port())
            .ok_or_else(|| {
                ForeachError::Roster(EngineError::driver_not_found(&self.profile.driver))
            })?;

        let config = self.profile.config_for(&self.host, &self.database, default_port);
        let table = self
            .sessions
            .run_once(config, &query)
            .await
            .map_err(ForeachError::Roster)?;

        let entries = roster_from_table(&table, &self.columns)?;
        info!(
            host = %self.host,
            database = %self.database,
            projects = entries.len(),
            "Loaded roster from directory database"
        );
        Ok(entries)
    }
}

/// Loads the roster from a CSV file with a header row.
pub struct CsvRosterProvider {
    path: PathBuf,
    columns: RosterColumns,
}

impl CsvRosterProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            columns: RosterColumns::default(),
        }
    }

    pub fn with_columns(mut self, columns: RosterColumns) -> Self {
        self.columns = columns;
        self
    }

    fn read(path: &Path, columns: &RosterColumns) -> ForeachResult<Vec<RosterEntry>> {
        let csv_error = |e: csv::Error| {
            ForeachError::Roster(EngineError::validation(format!("{}: {e}", path.display())))
        };

        let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
        let headers = reader.headers().map_err(csv_error)?.clone();
        let position = |column: &str| {
            headers
                .iter()
                .position(|h| h.trim() == column)
                .ok_or_else(|| missing_column(column))
        };
        let name_idx = position(&columns.name)?;
        let host_idx = position(&columns.host)?;

        let mut entries = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(csv_error)?;
            let name = record.get(name_idx).map(str::trim).unwrap_or_default();
            let host = record.get(host_idx).map(str::trim).unwrap_or_default();
            if name.is_empty() || host.is_empty() {
                warn!(row, "Skipping roster row without database name or host");
                continue;
            }
            entries.push(RosterEntry::new(name, host));
        }
        Ok(entries)
    }
}

#[async_trait]
impl RosterProvider for CsvRosterProvider {
    async fn load_roster(&self) -> ForeachResult<Vec<RosterEntry>> {
        let entries = Self::read(&self.path, &self.columns)?;
        info!(path = %self.path.display(), projects = entries.len(), "Loaded roster file");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{ColumnInfo, Row};

    fn roster_table(rows: Vec<(Value, Value)>) -> QueryResult {
        QueryResult::from_parts(
            vec![
                ColumnInfo::new("projectId", "int", false),
                ColumnInfo::new("databaseName", "nvarchar", true),
                ColumnInfo::new("serverHostName", "nvarchar", true),
            ],
            rows.into_iter()
                .enumerate()
                .map(|(i, (name, host))| Row::new(vec![Value::Int(i as i64), name, host]))
                .collect(),
        )
    }

    #[test]
    fn table_rows_become_entries() {
        let table = roster_table(vec![
            (Value::Text("ProjectA".into()), Value::Text("db1".into())),
            (Value::Null, Value::Text("db2".into())),
            (Value::Text("ProjectC".into()), Value::Text("  ".into())),
            (Value::Text(" ProjectD ".into()), Value::Text("db4".into())),
        ]);

        let entries = roster_from_table(&table, &RosterColumns::default()).expect("roster");
        assert_eq!(
            entries,
            vec![
                RosterEntry::new("ProjectA", "db1"),
                RosterEntry::new("ProjectD", "db4"),
            ]
        );
    }

    #[test]
    fn missing_roster_column_is_fatal() {
        let table = roster_table(vec![]);
        let columns = RosterColumns {
            name: "dbName".into(),
            host: DEFAULT_HOST_COLUMN.into(),
        };

        let err = roster_from_table(&table, &columns).expect_err("missing column");
        assert!(matches!(err, ForeachError::Roster(_)));
        assert!(err.to_string().contains("dbName"));
    }

    #[tokio::test]
    async fn csv_roster_is_read_in_file_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("roster.csv");
        std::fs::write(
            &path,
            "serverHostName,databaseName\ndb2,Beta\n,Orphan\ndb1,Alpha\n",
        )
        .expect("write roster");

        let entries = CsvRosterProvider::new(&path)
            .load_roster()
            .await
            .expect("roster");
        assert_eq!(
            entries,
            vec![RosterEntry::new("Beta", "db2"), RosterEntry::new("Alpha", "db1")]
        );
    }

    #[tokio::test]
    async fn missing_csv_is_a_roster_error() {
        let err = CsvRosterProvider::new("/definitely/not/here.csv")
            .load_roster()
            .await
            .expect_err("missing file");
        assert!(matches!(err, ForeachError::Roster(_)));
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Types shared by the fan-out runner, executors and the merger.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::types::QueryResult;

/// Well-known name under which the ad-hoc query is stored.
pub const TEMP_QUERY_NAME: &str = "__temp_query";

/// One project database from the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub database_name: String,
    pub server_host: String,
}

impl RosterEntry {
    pub fn new(database_name: impl Into<String>, server_host: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            server_host: server_host.into(),
        }
    }
}

/// A named query handed to every executor call of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryScript {
    pub name: String,
    pub text: String,
}

impl QueryScript {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// The ad-hoc query of a run, under [`TEMP_QUERY_NAME`].
    pub fn temp(text: impl Into<String>) -> Self {
        Self::new(TEMP_QUERY_NAME, text)
    }
}

/// Outcome of running the query against one database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DatabaseOutcome {
    Succeeded(QueryResult),
    Failed { error: String },
}

impl DatabaseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DatabaseOutcome::Succeeded(_))
    }

    pub fn table(&self) -> Option<&QueryResult> {
        match self {
            DatabaseOutcome::Succeeded(table) => Some(table),
            DatabaseOutcome::Failed { .. } => None,
        }
    }
}

/// Stored form of one [`ResultsMap`] entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsEntry {
    pub database: String,
    #[serde(flatten)]
    pub outcome: DatabaseOutcome,
}

/// Per-database outcomes keyed by database name, in insertion order.
///
/// A missing key means the database was never attempted. Any present key,
/// failed or not, stops the runner from attempting that database again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<ResultsEntry>", into = "Vec<ResultsEntry>")]
pub struct ResultsMap {
    entries: Vec<(String, DatabaseOutcome)>,
    index: HashMap<String, usize>,
}

impl ResultsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, database_name: &str) -> bool {
        self.index.contains_key(database_name)
    }

    pub fn get(&self, database_name: &str) -> Option<&DatabaseOutcome> {
        self.index
            .get(database_name)
            .map(|&pos| &self.entries[pos].1)
    }

    /// Inserts an outcome. An existing key keeps its position and the
    /// previous outcome is returned.
    pub fn insert(
        &mut self,
        database_name: impl Into<String>,
        outcome: DatabaseOutcome,
    ) -> Option<DatabaseOutcome> {
        let database_name = database_name.into();
        if let Some(&pos) = self.index.get(&database_name) {
            return Some(std::mem::replace(&mut self.entries[pos].1, outcome));
        }
        self.index.insert(database_name.clone(), self.entries.len());
        self.entries.push((database_name, outcome));
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatabaseOutcome)> {
        self.entries.iter().map(|(name, outcome)| (name.as_str(), outcome))
    }

    /// Successful tables in insertion order.
    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &QueryResult)> {
        self.iter()
            .filter_map(|(name, outcome)| outcome.table().map(|table| (name, table)))
    }

    /// Failed databases and their diagnostics, in insertion order.
    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter_map(|(name, outcome)| match outcome {
            DatabaseOutcome::Failed { error } => Some((name, error.as_str())),
            DatabaseOutcome::Succeeded(_) => None,
        })
    }
}

impl From<Vec<ResultsEntry>> for ResultsMap {
    fn from(stored: Vec<ResultsEntry>) -> Self {
        let mut map = ResultsMap::new();
        for entry in stored {
            map.insert(entry.database, entry.outcome);
        }
        map
    }
}

impl From<ResultsMap> for Vec<ResultsEntry> {
    fn from(map: ResultsMap) -> Self {
        map.entries
            .into_iter()
            .map(|(database, outcome)| ResultsEntry { database, outcome })
            .collect()
    }
}

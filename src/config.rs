// SPDX-License-Identifier: Apache-2.0

//! Run configuration.
//!
//! Loaded from a JSON file (`qore-foreach.json` by default). Every field is
//! optional; credentials can also come from the environment so they stay
//! out of the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::engine::types::ConnectionProfile;
use crate::foreach::error::{ForeachError, ForeachResult};
use crate::foreach::roster::{RosterColumns, RosterQuery, DEFAULT_ROSTER_SCRIPT};
use crate::observability::Sensitive;

pub const DEFAULT_CONFIG_FILE: &str = "qore-foreach.json";

const ENV_DRIVER: &str = "QORE_FOREACH_DRIVER";
const ENV_USER: &str = "QORE_FOREACH_USER";
const ENV_PASSWORD: &str = "QORE_FOREACH_PASSWORD";

/// Where the project roster lives.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub host: Option<String>,
    pub database: Option<String>,
    /// Inline roster query; takes precedence over `script`.
    pub query: Option<String>,
    /// Named script in `script_dir`.
    pub script: Option<String>,
    pub name_column: Option<String>,
    pub host_column: Option<String>,
}

impl DirectoryConfig {
    pub fn roster_query(&self) -> RosterQuery {
        match (&self.query, &self.script) {
            (Some(sql), _) => RosterQuery::Inline(sql.clone()),
            (None, Some(name)) => RosterQuery::Script(name.clone()),
            (None, None) => RosterQuery::Script(DEFAULT_ROSTER_SCRIPT.to_string()),
        }
    }

    pub fn columns(&self) -> RosterColumns {
        let defaults = RosterColumns::default();
        RosterColumns {
            name: self.name_column.clone().unwrap_or(defaults.name),
            host: self.host_column.clone().unwrap_or(defaults.host),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForeachConfig {
    pub driver: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: Sensitive<String>,
    pub ssl: bool,
    pub connect_timeout_ms: u64,
    pub query_timeout_ms: Option<u64>,
    pub pool_max_connections: u32,
    pub script_dir: PathBuf,
    pub persist_query: bool,
    pub seed: Option<u64>,
    pub directory: DirectoryConfig,
}

impl Default for ForeachConfig {
    fn default() -> Self {
        Self {
            driver: "sqlserver".to_string(),
            port: None,
            username: String::new(),
            password: Sensitive::new(String::new()),
            ssl: false,
            connect_timeout_ms: 15_000,
            query_timeout_ms: None,
            pool_max_connections: 1,
            script_dir: PathBuf::from("."),
            persist_query: true,
            seed: None,
            directory: DirectoryConfig::default(),
        }
    }
}

impl ForeachConfig {
    /// Reads the config file, falling back to defaults when it does not
    /// exist, then applies environment overrides.
    pub fn load(path: &Path) -> ForeachResult<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                ForeachError::config(format!("Failed to read {}: {e}", path.display()))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                ForeachError::config(format!("Failed to parse {}: {e}", path.display()))
            })?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            ForeachConfig::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `QORE_FOREACH_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(driver) = lookup(ENV_DRIVER).filter(|v| !v.is_empty()) {
            self.driver = driver;
        }
        if let Some(user) = lookup(ENV_USER) {
            self.username = user;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.password = Sensitive::new(password);
        }
    }

    /// Credentials and pool settings shared by every database of a run.
    pub fn profile(&self) -> ConnectionProfile {
        ConnectionProfile {
            driver: self.driver.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            ssl: self.ssl,
            pool_max_connections: Some(self.pool_max_connections.max(1)),
            pool_acquire_timeout_secs: Some(self.connect_timeout_ms.div_ceil(1000).max(1) as u32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ForeachConfig::load(&dir.path().join("absent.json")).expect("load");

        assert_eq!(config.driver, "sqlserver");
        assert_eq!(config.connect_timeout_ms, 15_000);
        assert_eq!(config.pool_max_connections, 1);
        assert!(config.persist_query);
        assert!(matches!(
            config.directory.roster_query(),
            RosterQuery::Script(name) if name == "dcrm_projects"
        ));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("qore-foreach.json");
        fs::write(
            &path,
            r#"{
                "driver": "postgres",
                "port": 6432,
                "username": "report",
                "password": "s3cret",
                "query_timeout_ms": 60000,
                "seed": 11,
                "directory": {
                    "host": "directory.local",
                    "database": "dcrm",
                    "query": "SELECT name AS databaseName, host AS serverHostName FROM projects",
                    "host_column": "serverHostName"
                }
            }"#,
        )
        .expect("write config");

        let mut config: ForeachConfig =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        config.apply_env(|_| None);

        assert_eq!(config.driver, "postgres");
        assert_eq!(config.query_timeout_ms, Some(60_000));
        assert_eq!(config.seed, Some(11));
        assert_eq!(config.password.expose(), "s3cret");
        assert!(matches!(config.directory.roster_query(), RosterQuery::Inline(_)));
        assert_eq!(config.directory.columns().name, "databaseName");

        let profile = config.profile();
        assert_eq!(profile.port, Some(6432));
        assert_eq!(profile.pool_acquire_timeout_secs, Some(15));
        assert!(!format!("{profile:?}").contains("s3cret"));
    }

    #[test]
    fn env_overrides_credentials() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("QORE_FOREACH_DRIVER", "mysql"),
            ("QORE_FOREACH_USER", "batch"),
            ("QORE_FOREACH_PASSWORD", "from-env"),
        ]);
        let mut config = ForeachConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.driver, "mysql");
        assert_eq!(config.username, "batch");
        assert_eq!(config.password.expose(), "from-env");
    }

    #[test]
    fn invalid_json_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("qore-foreach.json");
        fs::write(&path, "{ driver: sqlserver }").expect("write config");

        let err = ForeachConfig::load(&path).expect_err("invalid json");
        assert!(matches!(err, ForeachError::Config { .. }));
    }
}

// SPDX-License-Identifier: Apache-2.0

// qore-foreach - run one query across every project database
// Core library

pub mod config;
pub mod engine;
pub mod export;
pub mod foreach;
pub mod metrics;
pub mod observability;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use config::ForeachConfig;
use engine::error::EngineError;
use engine::{DriverRegistry, SessionManager};
use foreach::{
    CsvRosterProvider, DirectoryRosterProvider, ForeachError, ForeachResult, ForeachRunner,
    RosterProvider, ScriptStore, SessionExecutor,
};

/// Wiring shared by the CLI commands.
pub struct AppState {
    pub config: ForeachConfig,
    pub registry: Arc<DriverRegistry>,
    pub session_manager: Arc<SessionManager>,
}

impl AppState {
    pub fn new(config: ForeachConfig) -> Self {
        let registry = Arc::new(DriverRegistry::with_default_drivers());
        let session_manager = Arc::new(
            SessionManager::new(Arc::clone(&registry))
                .with_timeouts(config.connect_timeout_ms, config.query_timeout_ms),
        );

        Self {
            config,
            registry,
            session_manager,
        }
    }

    pub fn script_store(&self) -> ScriptStore {
        ScriptStore::new(&self.config.script_dir)
    }

    /// Roster from a CSV file when given, otherwise from the directory database.
    pub fn roster_provider(&self, roster_csv: Option<&Path>) -> ForeachResult<Arc<dyn RosterProvider>> {
        let directory = &self.config.directory;
        if let Some(path) = roster_csv {
            return Ok(Arc::new(
                CsvRosterProvider::new(path).with_columns(directory.columns()),
            ));
        }

        let (host, database) = self.directory_target()?;

        Ok(Arc::new(
            DirectoryRosterProvider::new(
                Arc::clone(&self.session_manager),
                self.config.profile(),
                host.to_string(),
                database.to_string(),
                self.script_store(),
            )
            .with_query(directory.roster_query())
            .with_columns(directory.columns()),
        ))
    }

    fn directory_target(&self) -> ForeachResult<(&str, &str)> {
        let directory = &self.config.directory;
        match (&directory.host, &directory.database) {
            (Some(host), Some(database)) => Ok((host, database)),
            _ => Err(ForeachError::config(
                "directory.host and directory.database are required without a roster file",
            )),
        }
    }

    /// Checks that a database accepts a login without keeping a session.
    /// Defaults to the directory database. Returns the checked target.
    pub async fn ping(&self, target: Option<(&str, &str)>) -> ForeachResult<String> {
        let (host, database) = match target {
            Some(target) => target,
            None => self.directory_target()?,
        };

        let profile = self.config.profile();
        let driver = self
            .registry
            .get(&profile.driver)
            .ok_or_else(|| EngineError::driver_not_found(&profile.driver))?;
        let config = profile.config_for(host, database, driver.default_port());
        let label = config.display_name();

        self.session_manager.test_connection(&config).await?;
        info!(target = %label, "Connection OK");
        Ok(label)
    }

    pub fn runner(&self, roster: Arc<dyn RosterProvider>, seed: Option<u64>) -> ForeachRunner {
        let executor = Arc::new(SessionExecutor::new(
            Arc::clone(&self.session_manager),
            self.config.profile(),
        ));

        let runner = ForeachRunner::new(roster, executor).with_seed(seed.or(self.config.seed));
        if self.config.persist_query {
            runner.with_script_store(self.script_store())
        } else {
            runner
        }
    }
}

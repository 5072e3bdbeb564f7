// SPDX-License-Identifier: Apache-2.0

//! Running the query against a single project database.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::{ConnectionProfile, QueryResult};
use crate::engine::SessionManager;
use crate::metrics;

use super::types::{DatabaseOutcome, QueryScript, RosterEntry};

/// Loads one project database's result table for a script.
#[async_trait]
pub trait DatabaseExecutor: Send + Sync {
    async fn load(&self, entry: &RosterEntry, script: &QueryScript) -> EngineResult<QueryResult>;
}

/// Executor backed by the engine drivers. Each call opens its own session
/// and releases it before returning.
pub struct SessionExecutor {
    sessions: Arc<SessionManager>,
    profile: ConnectionProfile,
}

impl SessionExecutor {
    pub fn new(sessions: Arc<SessionManager>, profile: ConnectionProfile) -> Self {
        Self { sessions, profile }
    }
}

#[async_trait]
impl DatabaseExecutor for SessionExecutor {
    async fn load(&self, entry: &RosterEntry, script: &QueryScript) -> EngineResult<QueryResult> {
        let driver = self
            .sessions
            .registry()
            .get(&self.profile.driver)
            .ok_or_else(|| EngineError::driver_not_found(&self.profile.driver))?;

        let config = self.profile.config_for(
            &entry.server_host,
            &entry.database_name,
            driver.default_port(),
        );
        self.sessions.run_once(config, &script.text).await
    }
}

/// Runs the script for one roster entry and captures any failure as a
/// [`DatabaseOutcome::Failed`] instead of propagating it. A panic inside the
/// executor counts as a failure too.
pub async fn run_query_for_database(
    executor: &dyn DatabaseExecutor,
    entry: &RosterEntry,
    script: &QueryScript,
) -> DatabaseOutcome {
    let started = Instant::now();
    let result = match AssertUnwindSafe(executor.load(entry, script))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(payload) => Err(EngineError::internal(format!(
            "driver panicked: {}",
            panic_message(payload.as_ref())
        ))),
    };
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    metrics::record_database(elapsed_ms, result.is_ok());

    match result {
        Ok(table) => {
            debug!(
                database = %entry.database_name,
                host = %entry.server_host,
                rows = table.row_count(),
                elapsed_ms,
                "Database query succeeded"
            );
            DatabaseOutcome::Succeeded(table)
        }
        Err(err) => {
            warn!(
                database = %entry.database_name,
                host = %entry.server_host,
                error = %err,
                "SKIP {}: query failed",
                entry.database_name
            );
            DatabaseOutcome::Failed {
                error: err.to_string(),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

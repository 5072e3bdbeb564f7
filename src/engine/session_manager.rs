//! Session Manager
//!
//! Centralized management of all active database sessions.
//! Every per-database connection opened during a fan-out run goes through
//! here, so timeouts are applied in one place.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::{timeout, Duration};
use tracing::instrument;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::DataEngine;
use crate::engine::types::{ConnectionConfig, QueryResult, SessionId};
use crate::engine::DriverRegistry;

/// Active session bookkeeping
pub struct ActiveSession {
    pub driver_id: String,
    pub display_name: String,
}

/// Manages all active database sessions
pub struct SessionManager {
    registry: Arc<DriverRegistry>,
    sessions: RwLock<HashMap<SessionId, ActiveSession>>,
    connect_timeout_ms: u64,
    query_timeout_ms: Option<u64>,
}

impl SessionManager {
    pub const CONNECT_TIMEOUT_MS: u64 = 15000;
    const TEST_TIMEOUT_MS: u64 = 10000;

    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            registry,
            sessions: RwLock::new(HashMap::new()),
            connect_timeout_ms: Self::CONNECT_TIMEOUT_MS,
            query_timeout_ms: None,
        }
    }

    /// Overrides the connect timeout and sets an optional per-query timeout.
    pub fn with_timeouts(mut self, connect_timeout_ms: u64, query_timeout_ms: Option<u64>) -> Self {
        self.connect_timeout_ms = connect_timeout_ms;
        self.query_timeout_ms = query_timeout_ms;
        self
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    fn driver_for(&self, driver_id: &str) -> EngineResult<Arc<dyn DataEngine>> {
        self.registry
            .get(driver_id)
            .ok_or_else(|| EngineError::driver_not_found(driver_id))
    }

    /// Tests a connection without keeping a session
    #[instrument(
        skip(self, config),
        fields(driver = %config.driver, host = %config.host, database = ?config.database)
    )]
    pub async fn test_connection(&self, config: &ConnectionConfig) -> EngineResult<()> {
        let driver = self.driver_for(&config.driver)?;

        match timeout(
            Duration::from_millis(Self::TEST_TIMEOUT_MS),
            driver.test_connection(config),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout {
                timeout_ms: Self::TEST_TIMEOUT_MS,
            }),
        }
    }

    /// Establishes a new connection and returns its session ID
    #[instrument(
        skip(self, config),
        fields(driver = %config.driver, host = %config.host, database = ?config.database)
    )]
    pub async fn connect(&self, config: ConnectionConfig) -> EngineResult<SessionId> {
        let driver = self.driver_for(&config.driver)?;

        let connect_future = async {
            let session_id = driver.connect(&config).await?;

            let session = ActiveSession {
                driver_id: config.driver.clone(),
                display_name: config.display_name(),
            };

            let mut sessions = self.sessions.write().await;
            sessions.insert(session_id, session);

            Ok(session_id)
        };

        match timeout(Duration::from_millis(self.connect_timeout_ms), connect_future).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout {
                timeout_ms: self.connect_timeout_ms,
            }),
        }
    }

    /// Executes a query on an open session, honouring the query timeout.
    pub async fn execute(&self, session_id: SessionId, query: &str) -> EngineResult<QueryResult> {
        let driver = self.get_driver(session_id).await?;

        match self.query_timeout_ms {
            Some(limit) => timeout(Duration::from_millis(limit), driver.execute(session_id, query))
                .await
                .map_err(|_| EngineError::Timeout { timeout_ms: limit })?,
            None => driver.execute(session_id, query).await,
        }
    }

    /// Connects, runs one query and disconnects.
    ///
    /// The session is released whether the query succeeds, fails or times
    /// out; a failed release is only logged.
    pub async fn run_once(&self, config: ConnectionConfig, query: &str) -> EngineResult<QueryResult> {
        let label = config.display_name();
        let session_id = self.connect(config).await?;

        let result = self.execute(session_id, query).await;

        if let Err(err) = self.disconnect(session_id).await {
            tracing::warn!(session = %label, error = %err, "Failed to release session");
        }

        result
    }

    /// Disconnects a session
    #[instrument(skip(self), fields(session_id = %session_id.0))]
    pub async fn disconnect(&self, session_id: SessionId) -> EngineResult<()> {
        let session = {
            let mut sessions = self.sessions.write().await;
            sessions
                .remove(&session_id)
                .ok_or_else(|| EngineError::session_not_found(session_id.0.to_string()))?
        };

        let driver = self.driver_for(&session.driver_id)?;

        // Disconnect from database; restore session on failure.
        if let Err(err) = driver.disconnect(session_id).await {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session_id, session);
            return Err(err);
        }

        Ok(())
    }

    /// Gets a driver for an existing session
    pub async fn get_driver(&self, session_id: SessionId) -> EngineResult<Arc<dyn DataEngine>> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(&session_id)
            .ok_or_else(|| EngineError::session_not_found(session_id.0.to_string()))?;

        self.driver_for(&session.driver_id)
    }

    /// Lists all active sessions
    pub async fn list_sessions(&self) -> Vec<(SessionId, String)> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .map(|(id, session)| (*id, session.display_name.clone()))
            .collect()
    }
}

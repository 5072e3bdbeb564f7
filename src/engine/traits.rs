//! DataEngine trait definition
//!
//! This is the core abstraction that all database drivers must implement.
//! It provides a unified interface for connecting, querying, and releasing
//! sessions against one server/database pair at a time.

use async_trait::async_trait;

use crate::engine::error::EngineResult;
use crate::engine::types::{ConnectionConfig, QueryResult, SessionId};

/// Core trait that all database drivers must implement
#[async_trait]
pub trait DataEngine: Send + Sync {
    /// Returns the unique identifier for this driver (e.g., "sqlserver", "postgres")
    fn driver_id(&self) -> &'static str;

    /// Returns a human-readable name for this driver
    fn driver_name(&self) -> &'static str;

    /// Port used when the configuration does not name one
    fn default_port(&self) -> u16;

    /// Tests the connection without establishing a persistent session
    async fn test_connection(&self, config: &ConnectionConfig) -> EngineResult<()>;

    /// Establishes a connection and returns a session identifier
    ///
    /// The session ID is used for all subsequent operations on this connection.
    async fn connect(&self, config: &ConnectionConfig) -> EngineResult<SessionId>;

    /// Closes a session and releases associated resources
    async fn disconnect(&self, session: SessionId) -> EngineResult<()>;

    /// Executes a query and returns the result
    async fn execute(&self, session: SessionId, query: &str) -> EngineResult<QueryResult>;
}

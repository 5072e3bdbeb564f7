//! Driver Registry
//!
//! Central registry for all available database drivers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::drivers::mysql::MySqlDriver;
use crate::engine::drivers::postgres::PostgresDriver;
use crate::engine::drivers::sqlite::SqliteDriver;
use crate::engine::drivers::sqlserver::SqlServerDriver;
use crate::engine::traits::DataEngine;

/// Registry that holds all available database drivers
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DataEngine>>,
}

impl DriverRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Registry preloaded with every built-in driver.
    pub fn with_default_drivers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SqlServerDriver::new()));
        registry.register(Arc::new(PostgresDriver::new()));
        registry.register(Arc::new(MySqlDriver::new()));
        registry.register(Arc::new(SqliteDriver::new()));
        registry
    }

    /// Registers a new driver
    ///
    /// The driver's `driver_id()` is used as the key.
    pub fn register(&mut self, driver: Arc<dyn DataEngine>) {
        let id = driver.driver_id().to_string();
        self.drivers.insert(id, driver);
    }

    /// Gets a driver by its ID
    pub fn get(&self, driver_id: &str) -> Option<Arc<dyn DataEngine>> {
        self.drivers.get(driver_id).cloned()
    }

    /// Lists all registered driver IDs, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of registered drivers
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Returns true if no drivers are registered
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::EngineResult;
    use crate::engine::types::{ConnectionConfig, QueryResult, SessionId};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct MockDriver {
        id: &'static str,
    }

    impl MockDriver {
        fn new(id: &'static str) -> Self {
            Self { id }
        }
    }

    #[async_trait]
    impl DataEngine for MockDriver {
        fn driver_id(&self) -> &'static str {
            self.id
        }

        fn driver_name(&self) -> &'static str {
            "Mock Driver"
        }

        fn default_port(&self) -> u16 {
            0
        }

        async fn test_connection(&self, _config: &ConnectionConfig) -> EngineResult<()> {
            Ok(())
        }

        async fn connect(&self, _config: &ConnectionConfig) -> EngineResult<SessionId> {
            Ok(SessionId::new())
        }

        async fn disconnect(&self, _session: SessionId) -> EngineResult<()> {
            Ok(())
        }

        async fn execute(&self, _session: SessionId, _query: &str) -> EngineResult<QueryResult> {
            Ok(QueryResult::empty())
        }
    }

    #[test]
    fn test_registry_basics() {
        let mut registry = DriverRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(MockDriver::new("mock1")));
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());

        registry.register(Arc::new(MockDriver::new("mock2")));
        assert_eq!(registry.len(), 2);

        assert!(registry.get("mock1").is_some());
        assert!(registry.get("mock2").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_default_drivers() {
        let registry = DriverRegistry::with_default_drivers();
        assert_eq!(registry.list(), vec!["mysql", "postgres", "sqlite", "sqlserver"]);
        assert_eq!(
            registry.get("sqlserver").map(|d| d.default_port()),
            Some(1433)
        );
    }
}

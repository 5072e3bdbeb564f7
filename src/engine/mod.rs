// Data Engine Module
// Connection and query execution layer used once per project database

pub mod drivers;
pub mod error;
pub mod registry;
pub mod session_manager;
pub mod traits;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use registry::DriverRegistry;
pub use session_manager::SessionManager;
pub use traits::DataEngine;
pub use types::*;

// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the engine layer
//!
//! All driver-specific errors are mapped to these unified error types so the
//! fan-out runner can treat every backend the same way.

use thiserror::Error;

/// Unified error type for all data engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Query syntax error: {message}")]
    SyntaxError { message: String },

    #[error("Query execution error: {message}")]
    ExecutionError { message: String },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Driver not found: {driver_id}")]
    DriverNotFound { driver_id: String },

    #[error("Session not found or expired: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

impl EngineError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: msg.into() }
    }

    pub fn syntax_error(msg: impl Into<String>) -> Self {
        Self::SyntaxError { message: msg.into() }
    }

    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError { message: msg.into() }
    }

    pub fn driver_not_found(id: impl Into<String>) -> Self {
        Self::DriverNotFound { driver_id: id.into() }
    }

    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound { session_id: id.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError { message: msg.into() }
    }

    /// Classifies a raw driver message into a syntax or execution error.
    pub fn from_query_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let lower = msg.to_lowercase();
        if lower.contains("syntax") || lower.contains("parse") {
            Self::syntax_error(msg)
        } else {
            Self::execution_error(msg)
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_syntax_messages() {
        let err = EngineError::from_query_message("Incorrect syntax near 'FORM'.");
        assert!(matches!(err, EngineError::SyntaxError { .. }));

        let err = EngineError::from_query_message("Invalid object name 'dbo.Orders'.");
        assert!(matches!(err, EngineError::ExecutionError { .. }));
    }

    #[test]
    fn timeout_display_includes_duration() {
        let err = EngineError::Timeout { timeout_ms: 1500 };
        assert_eq!(err.to_string(), "Operation timed out after 1500ms");
    }
}

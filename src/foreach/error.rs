// SPDX-License-Identifier: Apache-2.0

//! Errors that abort a fan-out run.
//!
//! Per-database failures never surface here; they are recorded as
//! [`DatabaseOutcome::Failed`](super::types::DatabaseOutcome::Failed).

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::error::EngineError;

#[derive(Debug, Error)]
pub enum ForeachError {
    #[error("Failed to load roster: {0}")]
    Roster(#[source] EngineError),

    #[error("Invalid sample fraction {value}: expected a number in (0, 1]")]
    InvalidSampleFraction { value: f64 },

    #[error("Script '{name}' at {path}: {source}")]
    Script {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No successful database results to merge")]
    NothingToMerge,

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Failed to write {path}: {message}")]
    Output { path: PathBuf, message: String },

    #[error("Unreadable results file {path}: {message}")]
    State { path: PathBuf, message: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ForeachError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config { message: msg.into() }
    }

    pub fn output(path: impl Into<PathBuf>, msg: impl ToString) -> Self {
        Self::Output {
            path: path.into(),
            message: msg.to_string(),
        }
    }

    pub fn state(path: impl Into<PathBuf>, msg: impl ToString) -> Self {
        Self::State {
            path: path.into(),
            message: msg.to_string(),
        }
    }
}

pub type ForeachResult<T> = Result<T, ForeachError>;

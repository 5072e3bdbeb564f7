// SPDX-License-Identifier: Apache-2.0

//! Fan-out of one query across a roster of project databases, and fan-in of
//! the successful result sets into a single table.

pub mod error;
pub mod executor;
pub mod merge;
pub mod roster;
pub mod runner;
pub mod script;
pub mod state;
pub mod types;

pub use error::{ForeachError, ForeachResult};
pub use executor::{run_query_for_database, DatabaseExecutor, SessionExecutor};
pub use merge::{merge_results, DATABASE_COLUMN};
pub use roster::{
    CsvRosterProvider, DirectoryRosterProvider, RosterColumns, RosterProvider, RosterQuery,
    StaticRoster,
};
pub use runner::{sample_roster, ForeachRunner, RunSummary};
pub use script::ScriptStore;
pub use state::{load_results, save_results};
pub use types::{DatabaseOutcome, QueryScript, ResultsMap, RosterEntry, TEMP_QUERY_NAME};

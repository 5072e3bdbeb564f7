// SPDX-License-Identifier: Apache-2.0

//! Named SQL scripts on disk.
//!
//! Scripts live as `<name>.sql` in one directory. The ad-hoc query of a run
//! is written under [`TEMP_QUERY_NAME`](super::types::TEMP_QUERY_NAME) so it
//! can be found by name afterwards; executors receive the text directly and
//! never read it back.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::{ForeachError, ForeachResult};
use super::types::QueryScript;

const SCRIPT_EXTENSION: &str = "sql";

#[derive(Debug, Clone)]
pub struct ScriptStore {
    dir: PathBuf,
}

impl ScriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{SCRIPT_EXTENSION}"))
    }

    /// Writes a script, replacing any previous file with the same name.
    pub fn write(&self, script: &QueryScript) -> ForeachResult<PathBuf> {
        let path = self.path_for(&script.name);
        fs::write(&path, script.text.as_bytes()).map_err(|source| ForeachError::Script {
            name: script.name.clone(),
            path: path.clone(),
            source,
        })?;
        debug!(name = %script.name, path = %path.display(), "Stored query script");
        Ok(path)
    }

    /// Loads a script by name.
    pub fn load(&self, name: &str) -> ForeachResult<QueryScript> {
        let path = self.path_for(name);
        let text = fs::read_to_string(&path).map_err(|source| ForeachError::Script {
            name: name.to_string(),
            path,
            source,
        })?;
        Ok(QueryScript::new(name, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreach::types::TEMP_QUERY_NAME;

    #[test]
    fn write_overwrites_previous_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ScriptStore::new(dir.path());

        store.write(&QueryScript::temp("SELECT 1")).expect("first write");
        let path = store.write(&QueryScript::temp("SELECT 2")).expect("second write");

        assert_eq!(path, dir.path().join("__temp_query.sql"));
        let loaded = store.load(TEMP_QUERY_NAME).expect("load");
        assert_eq!(loaded.text, "SELECT 2");
    }

    #[test]
    fn write_to_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ScriptStore::new(dir.path().join("nope"));

        let err = store
            .write(&QueryScript::temp("SELECT 1"))
            .expect_err("directory does not exist");
        assert!(matches!(err, ForeachError::Script { .. }));
    }

    #[test]
    fn load_missing_script_names_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ScriptStore::new(dir.path())
            .load("dcrm_projects")
            .expect_err("missing");
        assert!(err.to_string().contains("dcrm_projects"));
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Results map persistence, so a batch can be resumed by a later invocation.

use std::fs;
use std::path::Path;

use tracing::info;

use super::error::{ForeachError, ForeachResult};
use super::types::ResultsMap;

/// Loads a saved results map. A missing file is an empty map.
pub fn load_results(path: &Path) -> ForeachResult<ResultsMap> {
    if !path.exists() {
        return Ok(ResultsMap::new());
    }

    let content = fs::read_to_string(path).map_err(|e| ForeachError::state(path, e))?;
    let results: ResultsMap =
        serde_json::from_str(&content).map_err(|e| ForeachError::state(path, e))?;

    info!(path = %path.display(), databases = results.len(), "Resuming from saved results");
    Ok(results)
}

/// Writes the results map as JSON, replacing the file atomically.
pub fn save_results(path: &Path, results: &ResultsMap) -> ForeachResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ForeachError::output(path, e))?;
    }

    let content = serde_json::to_string_pretty(results).map_err(|e| ForeachError::output(path, e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(|e| ForeachError::output(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| ForeachError::output(path, e))?;
    Ok(())
}

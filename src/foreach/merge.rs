// SPDX-License-Identifier: Apache-2.0

//! Concatenates per-database tables into one table tagged by source database.

use std::collections::HashMap;

use crate::engine::types::{ColumnInfo, QueryResult, Row, Value};

use super::error::{ForeachError, ForeachResult};
use super::types::ResultsMap;

/// Name of the column added to every merged row.
pub const DATABASE_COLUMN: &str = "database";

/// Merges every successful table in `results`, in map order.
///
/// Output columns are the union of the input columns in first-seen order,
/// followed by a single `database` column. A column an input lacks is filled
/// with `Null` for that input's rows. An input's own `database` column is
/// replaced by the tag.
pub fn merge_results(results: &ResultsMap) -> ForeachResult<QueryResult> {
    let tables: Vec<(&str, &QueryResult)> = results.succeeded().collect();
    if tables.is_empty() {
        return Err(ForeachError::NothingToMerge);
    }

    // Each table's columns keyed by (name, occurrence), so `SELECT a.id, b.id`
    // or two unnamed expressions keep both values.
    let keyed: Vec<HashMap<(&str, usize), usize>> = tables
        .iter()
        .map(|(_, table)| column_keys(table).collect())
        .collect();

    let mut columns: Vec<ColumnInfo> = Vec::new();
    let mut keys: Vec<(&str, usize)> = Vec::new();
    let mut positions: HashMap<(&str, usize), usize> = HashMap::new();
    for (_, table) in &tables {
        for (key, idx) in column_keys(table) {
            let column = &table.columns[idx];
            match positions.get(&key) {
                Some(&pos) => columns[pos].nullable |= column.nullable,
                None => {
                    positions.insert(key, columns.len());
                    keys.push(key);
                    columns.push(column.clone());
                }
            }
        }
    }

    // Columns absent from at least one input become nullable.
    for (column, key) in columns.iter_mut().zip(&keys) {
        if keyed.iter().any(|table_keys| !table_keys.contains_key(key)) {
            column.nullable = true;
        }
    }

    let width = columns.len();
    let total_rows: usize = tables.iter().map(|(_, table)| table.row_count()).sum();
    let mut rows = Vec::with_capacity(total_rows);
    let mut execution_time_ms = 0.0;

    for ((database, table), table_keys) in tables.iter().zip(&keyed) {
        // Source index for every output column of this table.
        let mapping: Vec<Option<usize>> =
            keys.iter().map(|key| table_keys.get(key).copied()).collect();

        for row in &table.rows {
            let mut values = Vec::with_capacity(width + 1);
            for source in &mapping {
                let value = source
                    .and_then(|idx| row.values.get(idx))
                    .cloned()
                    .unwrap_or(Value::Null);
                values.push(value);
            }
            values.push(Value::Text((*database).to_string()));
            rows.push(Row::new(values));
        }
        execution_time_ms += table.execution_time_ms;
    }

    columns.push(ColumnInfo::new(DATABASE_COLUMN, "text", false));

    Ok(QueryResult {
        columns,
        rows,
        affected_rows: None,
        execution_time_ms,
    })
}

/// `((name, occurrence), index)` for every column except `database`.
fn column_keys(table: &QueryResult) -> impl Iterator<Item = ((&str, usize), usize)> + '_ {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, column)| column.name != DATABASE_COLUMN)
        .map(move |(idx, column)| {
            let name = column.name.as_str();
            let occurrence = seen.entry(name).or_insert(0);
            let key = (name, *occurrence);
            *occurrence += 1;
            (key, idx)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreach::types::DatabaseOutcome;

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> DatabaseOutcome {
        DatabaseOutcome::Succeeded(QueryResult::from_parts(
            columns
                .iter()
                .map(|name| ColumnInfo::new(*name, "int", false))
                .collect(),
            rows.into_iter().map(Row::new).collect(),
        ))
    }

    fn names(result: &QueryResult) -> Vec<&str> {
        result.columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn rows_keep_map_and_table_order() {
        let mut results = ResultsMap::new();
        results.insert("B", table(&["v"], vec![vec![Value::Int(1)], vec![Value::Int(2)]]));
        results.insert("A", table(&["v"], vec![vec![Value::Int(3)]]));

        let merged = merge_results(&results).expect("merge");
        assert_eq!(names(&merged), vec!["v", "database"]);
        assert_eq!(merged.row_count(), 3);

        let values: Vec<Vec<Value>> = merged.rows.iter().map(|r| r.values.clone()).collect();
        assert_eq!(
            values,
            vec![
                vec![Value::Int(1), Value::Text("B".into())],
                vec![Value::Int(2), Value::Text("B".into())],
                vec![Value::Int(3), Value::Text("A".into())],
            ]
        );
    }

    #[test]
    fn failures_are_excluded() {
        let mut results = ResultsMap::new();
        results.insert("X", table(&["v"], vec![vec![Value::Int(1)]]));
        results.insert("Y", DatabaseOutcome::Failed { error: "timeout".into() });
        results.insert("Z", table(&["v"], vec![vec![Value::Int(5)], vec![Value::Int(6)]]));

        let merged = merge_results(&results).expect("merge");
        assert_eq!(merged.row_count(), 3);
        let tags: Vec<String> = merged
            .column_values(DATABASE_COLUMN)
            .expect("tag column")
            .into_iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(tags, vec!["X", "Z", "Z"]);
    }

    #[test]
    fn mismatched_schemas_are_unioned() {
        let mut results = ResultsMap::new();
        results.insert("X", table(&["id", "total"], vec![vec![Value::Int(1), Value::Int(10)]]));
        results.insert("Y", table(&["id", "region"], vec![vec![Value::Int(2), Value::Text("eu".into())]]));

        let merged = merge_results(&results).expect("merge");
        assert_eq!(names(&merged), vec!["id", "total", "region", "database"]);
        assert!(!merged.columns[0].nullable);
        assert!(merged.columns[1].nullable);
        assert!(merged.columns[2].nullable);
        assert_eq!(
            merged.rows[1].values,
            vec![Value::Int(2), Value::Null, Value::Text("eu".into()), Value::Text("Y".into())]
        );
    }

    #[test]
    fn existing_database_column_is_replaced() {
        let mut results = ResultsMap::new();
        results.insert(
            "ProjectA",
            table(&["database", "v"], vec![vec![Value::Text("master".into()), Value::Int(1)]]),
        );

        let merged = merge_results(&results).expect("merge");
        assert_eq!(names(&merged), vec!["v", "database"]);
        assert_eq!(
            merged.rows[0].values,
            vec![Value::Int(1), Value::Text("ProjectA".into())]
        );
    }

    #[test]
    fn empty_tables_still_merge() {
        let mut results = ResultsMap::new();
        results.insert("X", table(&["v"], vec![]));

        let merged = merge_results(&results).expect("merge");
        assert_eq!(merged.row_count(), 0);
        assert_eq!(names(&merged), vec!["v", "database"]);
    }

    #[test]
    fn repeated_and_blank_names_keep_every_column() {
        let mut results = ResultsMap::new();
        results.insert(
            "X",
            table(
                &["", "", "id", "id"],
                vec![vec![Value::Int(10), Value::Int(99), Value::Int(1), Value::Int(2)]],
            ),
        );
        results.insert("Y", table(&["", "id"], vec![vec![Value::Int(7), Value::Int(3)]]));

        let merged = merge_results(&results).expect("merge");
        assert_eq!(names(&merged), vec!["", "", "id", "id", "database"]);
        assert!(!merged.columns[0].nullable);
        assert!(merged.columns[1].nullable);
        assert!(merged.columns[3].nullable);
        assert_eq!(
            merged.rows[0].values,
            vec![
                Value::Int(10),
                Value::Int(99),
                Value::Int(1),
                Value::Int(2),
                Value::Text("X".into())
            ]
        );
        assert_eq!(
            merged.rows[1].values,
            vec![Value::Int(7), Value::Null, Value::Int(3), Value::Null, Value::Text("Y".into())]
        );
    }

    #[test]
    fn nothing_to_merge() {
        let mut results = ResultsMap::new();
        assert!(matches!(merge_results(&results), Err(ForeachError::NothingToMerge)));

        results.insert("Y", DatabaseOutcome::Failed { error: "login failed".into() });
        assert!(matches!(merge_results(&results), Err(ForeachError::NothingToMerge)));
    }
}

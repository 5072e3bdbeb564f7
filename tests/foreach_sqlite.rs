// SPDX-License-Identifier: Apache-2.0

//! End-to-end fan-out over project databases stored as SQLite files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};

use qore_foreach::config::ForeachConfig;
use qore_foreach::engine::Value;
use qore_foreach::export::{export_table, ExportFormat};
use qore_foreach::foreach::{
    load_results, merge_results, save_results, DatabaseOutcome, ForeachError, ResultsMap,
    RosterEntry,
};
use qore_foreach::AppState;

const QUERY: &str = "SELECT sku, qty FROM orders ORDER BY sku";

async fn create_project(dir: &Path, name: &str, statements: &[&str]) {
    let options = SqliteConnectOptions::new()
        .filename(dir.join(format!("{name}.db")))
        .create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .expect("create project database");
    for sql in statements {
        sqlx::query(sql).execute(&mut conn).await.expect("seed project");
    }
    conn.close().await.expect("close");
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    state: AppState,
    roster_csv: PathBuf,
}

/// alpha and gamma have orders, beta has no file, delta has no orders table.
async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_path_buf();
    let host = root.to_string_lossy().into_owned();

    create_project(
        &root,
        "alpha",
        &[
            "CREATE TABLE orders (sku TEXT NOT NULL, qty INTEGER)",
            "INSERT INTO orders VALUES ('A-1', 2), ('A-2', 5)",
        ],
    )
    .await;
    create_project(
        &root,
        "gamma",
        &[
            "CREATE TABLE orders (sku TEXT NOT NULL, qty INTEGER)",
            "INSERT INTO orders VALUES ('G-1', NULL)",
        ],
    )
    .await;
    create_project(&root, "delta", &["CREATE TABLE customers (id INTEGER)"]).await;

    let roster_csv = root.join("roster.csv");
    let mut csv = String::from("databaseName,serverHostName\n");
    for name in ["alpha", "beta", "gamma", "delta"] {
        csv.push_str(&format!("{name},{host}\n"));
    }
    std::fs::write(&roster_csv, csv).expect("write roster");

    let config = ForeachConfig {
        driver: "sqlite".to_string(),
        script_dir: root.clone(),
        seed: Some(3),
        ..ForeachConfig::default()
    };

    Fixture {
        _dir: dir,
        root,
        state: AppState::new(config),
        roster_csv,
    }
}

#[tokio::test]
async fn failing_projects_are_skipped_and_the_rest_merged() {
    let fx = fixture().await;
    let provider = fx
        .state
        .roster_provider(Some(fx.roster_csv.as_path()))
        .expect("roster provider");
    let runner = fx.state.runner(provider, None);

    let results = runner
        .run_foreach(QUERY, None, ResultsMap::new(), 1.0)
        .await
        .expect("run");

    assert_eq!(results.len(), 4);
    let failed: HashSet<&str> = results.failed().map(|(name, _)| name).collect();
    assert_eq!(failed, HashSet::from(["beta", "delta"]));
    match results.get("delta") {
        Some(DatabaseOutcome::Failed { error }) => assert!(error.contains("orders")),
        other => panic!("delta should have failed, got {other:?}"),
    }

    let stored = std::fs::read_to_string(fx.root.join("__temp_query.sql")).expect("temp query");
    assert_eq!(stored, QUERY);

    let merged = merge_results(&results).expect("merge");
    let columns: Vec<&str> = merged.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["sku", "qty", "database"]);
    assert_eq!(merged.row_count(), 3);

    let mut tagged: Vec<(String, String)> = merged
        .rows
        .iter()
        .map(|row| (row.values[0].to_string(), row.values[2].to_string()))
        .collect();
    tagged.sort();
    assert_eq!(
        tagged,
        vec![
            ("A-1".to_string(), "alpha".to_string()),
            ("A-2".to_string(), "alpha".to_string()),
            ("G-1".to_string(), "gamma".to_string()),
        ]
    );

    let gamma_row = merged
        .rows
        .iter()
        .find(|row| row.values[2] == Value::Text("gamma".into()))
        .expect("gamma row");
    assert_eq!(gamma_row.values[1], Value::Null);

    let out = fx.root.join("merged.csv");
    export_table(&merged, &out, Some(ExportFormat::Csv))
        .await
        .expect("export");
    let content = std::fs::read_to_string(&out).expect("read export");
    assert!(content.starts_with("sku,qty,database\n"));
    assert_eq!(content.lines().count(), 4);

    assert!(fx.state.session_manager.list_sessions().await.is_empty());
}

#[tokio::test]
async fn resumed_run_only_visits_new_projects() {
    let fx = fixture().await;
    let state_file = fx.root.join("state.json");

    let first_roster = vec![RosterEntry::new("alpha", fx.root.to_string_lossy())];
    let provider = fx
        .state
        .roster_provider(Some(fx.roster_csv.as_path()))
        .expect("roster provider");
    let runner = fx.state.runner(provider, None);

    let results = runner
        .run_foreach(QUERY, Some(first_roster), ResultsMap::new(), 1.0)
        .await
        .expect("first run");
    save_results(&state_file, &results).expect("save");

    // Replace alpha's data; a resumed run must not query it again.
    create_project(&fx.root, "alpha", &["DELETE FROM orders"]).await;

    let resumed = load_results(&state_file).expect("load");
    let results = runner
        .run_foreach(QUERY, None, resumed, 1.0)
        .await
        .expect("resumed run");

    assert_eq!(results.len(), 4);
    let alpha = results
        .get("alpha")
        .and_then(DatabaseOutcome::table)
        .expect("alpha table");
    assert_eq!(alpha.row_count(), 2);
}

#[tokio::test]
async fn sampling_visits_a_subset() {
    let fx = fixture().await;
    let provider = fx
        .state
        .roster_provider(Some(fx.roster_csv.as_path()))
        .expect("roster provider");

    let results = fx
        .state
        .runner(provider, Some(99))
        .run_foreach(QUERY, None, ResultsMap::new(), 0.5)
        .await
        .expect("run");
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn only_missing_projects_means_nothing_to_merge() {
    let fx = fixture().await;
    let host = fx.root.to_string_lossy().into_owned();
    let roster = vec![
        RosterEntry::new("beta", host.clone()),
        RosterEntry::new("omega", host),
    ];
    let provider = fx
        .state
        .roster_provider(Some(fx.roster_csv.as_path()))
        .expect("roster provider");

    let results = fx
        .state
        .runner(provider, None)
        .run_foreach(QUERY, Some(roster), ResultsMap::new(), 1.0)
        .await
        .expect("run");

    assert_eq!(results.failed().count(), 2);
    assert!(matches!(
        merge_results(&results),
        Err(ForeachError::NothingToMerge)
    ));
}

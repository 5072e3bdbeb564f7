// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};

use qore_foreach::config::{ForeachConfig, DEFAULT_CONFIG_FILE};
use qore_foreach::export::{self, ExportFormat};
use qore_foreach::foreach::{
    load_results, merge_results, save_results, ForeachError, ForeachResult, ResultsMap,
};
use qore_foreach::{metrics, observability, AppState};

#[derive(Parser)]
#[command(name = "qore-foreach")]
#[command(about = "Run one SQL query against every project database and merge the results", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE, env = "QORE_FOREACH_CONFIG")]
    config: PathBuf,
    /// Also write JSON logs to this directory
    #[arg(long, global = true, env = "QORE_FOREACH_LOG_DIR")]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query across the roster and merge the successful results
    Run {
        /// SQL text to run against each database
        #[arg(long, conflicts_with = "query_file", required_unless_present = "query_file")]
        query: Option<String>,
        /// File containing the SQL to run
        #[arg(long)]
        query_file: Option<PathBuf>,
        /// Roster CSV with databaseName and serverHostName columns
        #[arg(long)]
        roster: Option<PathBuf>,
        /// Fraction of the roster to sample, in (0, 1]
        #[arg(long, default_value_t = 1.0)]
        fraction: f64,
        /// Write the merged table here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Output format; defaults to the output file extension
        #[arg(long, value_enum)]
        format: Option<Format>,
        /// Results file to resume from and update
        #[arg(long)]
        resume: Option<PathBuf>,
        /// Seed for the sampling order
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Check that the directory database, or one project database, accepts a login
    Ping {
        /// Project database to check instead of the directory database
        #[arg(long, requires = "host")]
        database: Option<String>,
        /// Server host of the project database
        #[arg(long, requires = "database")]
        host: Option<String>,
    },
    /// Print the roster
    Roster {
        /// Roster CSV instead of the directory database
        #[arg(long)]
        roster: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Json,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => ExportFormat::Csv,
            Format::Json => ExportFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = observability::init_tracing(cli.log_dir.as_deref());

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "qore-foreach failed");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> ForeachResult<()> {
    let config = ForeachConfig::load(&cli.config)?;
    let state = AppState::new(config);

    match cli.command {
        Commands::Run {
            query,
            query_file,
            roster,
            fraction,
            output,
            format,
            resume,
            seed,
        } => {
            let query = match (query, query_file) {
                (Some(sql), _) => sql,
                (None, Some(path)) => read_query(&path)?,
                (None, None) => {
                    return Err(ForeachError::config(
                        "either --query or --query-file is required",
                    ))
                }
            };

            let results = match &resume {
                Some(path) => load_results(path)?,
                None => ResultsMap::new(),
            };

            let provider = state.roster_provider(roster.as_deref())?;
            let runner = state.runner(provider, seed);
            let results = runner.run_foreach(&query, None, results, fraction).await?;

            if let Some(path) = &resume {
                save_results(path, &results)?;
            }

            let failed = results.failed().count();
            if failed > 0 {
                warn!(failed, "Some databases failed; see SKIP lines above");
            }

            let merged = merge_results(&results)?;
            match output {
                Some(path) => {
                    export::export_table(&merged, &path, format.map(ExportFormat::from)).await?;
                }
                None => {
                    if matches!(format, Some(Format::Json)) {
                        let json = export::json::table_to_json(&merged.columns, &merged.rows);
                        let text = serde_json::to_string_pretty(&json)
                            .map_err(|e| ForeachError::output("<stdout>", e))?;
                        println!("{text}");
                    } else {
                        export::csv::write_table(std::io::stdout().lock(), &merged.columns, &merged.rows)
                            .map_err(|e| ForeachError::output("<stdout>", e))?;
                    }
                }
            }

            let snapshot = metrics::snapshot();
            info!(
                databases = results.len(),
                failed,
                rows = merged.row_count(),
                avg_ms = snapshot.avg_ms.unwrap_or_default(),
                max_ms = snapshot.max_ms.unwrap_or_default(),
                "Done"
            );
            Ok(())
        }
        Commands::Ping { database, host } => {
            let target = host.as_deref().zip(database.as_deref());
            let label = state.ping(target).await?;
            println!("OK {label}");
            Ok(())
        }
        Commands::Roster { roster } => {
            let entries = state.roster_provider(roster.as_deref())?.load_roster().await?;
            for entry in &entries {
                println!("{}\t{}", entry.database_name, entry.server_host);
            }
            info!(projects = entries.len(), "Roster loaded");
            Ok(())
        }
    }
}

fn read_query(path: &Path) -> ForeachResult<String> {
    std::fs::read_to_string(path).map_err(|source| ForeachError::Script {
        name: path.display().to_string(),
        path: path.to_path_buf(),
        source,
    })
}

// SPDX-License-Identifier: Apache-2.0

//! Fan-out driver.
//!
//! Visits the sampled roster one database at a time, skipping databases that
//! already have an outcome in the results map. Per-database failures are
//! recorded and the run continues; anything failing outside that boundary
//! aborts the run.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{info, instrument};

use crate::metrics;

use super::error::{ForeachError, ForeachResult};
use super::executor::{run_query_for_database, DatabaseExecutor};
use super::roster::RosterProvider;
use super::script::ScriptStore;
use super::types::{QueryScript, ResultsMap, RosterEntry};

/// Counts for one call to [`ForeachRunner::run_foreach`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sampled: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct ForeachRunner {
    roster: Arc<dyn RosterProvider>,
    executor: Arc<dyn DatabaseExecutor>,
    scripts: Option<ScriptStore>,
    seed: Option<u64>,
}

impl ForeachRunner {
    pub fn new(roster: Arc<dyn RosterProvider>, executor: Arc<dyn DatabaseExecutor>) -> Self {
        Self {
            roster,
            executor,
            scripts: None,
            seed: None,
        }
    }

    /// Persists each run's query as `__temp_query.sql` in this store.
    pub fn with_script_store(mut self, scripts: ScriptStore) -> Self {
        self.scripts = Some(scripts);
        self
    }

    /// Makes the sampling order reproducible.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Runs `query` against every sampled roster entry not yet in `results`
    /// and returns the updated map.
    ///
    /// When `roster` is `None` the roster provider is consulted. The map is
    /// owned by the caller; passing the map of a previous run makes the call
    /// skip every database already attempted, failures included.
    #[instrument(skip(self, query, roster, results))]
    pub async fn run_foreach(
        &self,
        query: &str,
        roster: Option<Vec<RosterEntry>>,
        results: ResultsMap,
        sample_fraction: f64,
    ) -> ForeachResult<ResultsMap> {
        self.run_with_summary(query, roster, results, sample_fraction)
            .await
            .map(|(results, _)| results)
    }

    /// Same as [`run_foreach`](Self::run_foreach), also returning the run's counts.
    pub async fn run_with_summary(
        &self,
        query: &str,
        roster: Option<Vec<RosterEntry>>,
        mut results: ResultsMap,
        sample_fraction: f64,
    ) -> ForeachResult<(ResultsMap, RunSummary)> {
        validate_fraction(sample_fraction)?;

        let roster = match roster {
            Some(entries) => entries,
            None => self.roster.load_roster().await?,
        };

        let script = QueryScript::temp(query);
        if let Some(store) = &self.scripts {
            store.write(&script)?;
        }

        let sampled = sample_roster(&roster, sample_fraction, &mut self.rng())?;
        let total = sampled.len();
        let mut summary = RunSummary {
            sampled: total,
            ..RunSummary::default()
        };
        info!(roster = roster.len(), sampled = total, "Starting fan-out run");

        for (i, entry) in sampled.iter().enumerate() {
            let progress = format!("{}/{}", i + 1, total);
            if results.contains(&entry.database_name) {
                info!(database = %entry.database_name, %progress, "Already attempted, skipping");
                metrics::record_skipped();
                summary.skipped += 1;
                continue;
            }

            info!(database = %entry.database_name, host = %entry.server_host, %progress, "Querying database");
            let outcome = run_query_for_database(self.executor.as_ref(), entry, &script).await;
            summary.attempted += 1;
            if outcome.is_success() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            results.insert(entry.database_name.clone(), outcome);
        }

        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "Fan-out run finished"
        );
        Ok((results, summary))
    }
}

fn validate_fraction(fraction: f64) -> ForeachResult<()> {
    if fraction.is_finite() && fraction > 0.0 && fraction <= 1.0 {
        Ok(())
    } else {
        Err(ForeachError::InvalidSampleFraction { value: fraction })
    }
}

/// Number of entries kept for a fraction, rounding half to even.
pub fn sample_size(len: usize, fraction: f64) -> usize {
    let size = (fraction * len as f64).round_ties_even() as usize;
    size.min(len)
}

/// Random sample of the roster without replacement, in random order.
pub fn sample_roster<R: Rng + ?Sized>(
    roster: &[RosterEntry],
    fraction: f64,
    rng: &mut R,
) -> ForeachResult<Vec<RosterEntry>> {
    validate_fraction(fraction)?;
    let mut sampled = roster.to_vec();
    sampled.shuffle(rng);
    sampled.truncate(sample_size(roster.len(), fraction));
    Ok(sampled)
}

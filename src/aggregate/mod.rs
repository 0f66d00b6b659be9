//! Match and league aggregation.
//!
//! [`Aggregator::aggregate`] runs the six executed query types for both
//! sides over one match range and derives z-score and percentile rows from
//! the per-player round averages. The same routine serves single-match and
//! league-to-date ranges so that both produce comparable percentiles.

pub mod rolling;

pub use rolling::{recent_form, window_range};

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::debug;

use crate::calculate::{self, PopulationStats};
use crate::models::{BySide, MatchId, MatchRange, PlayerStatRow, QueryType, Side, StatBundle};
use crate::query::{self, QueryDescription, QueryError};
use crate::source::{FactSource, SourceError};

/// Errors that can occur during aggregation.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Aggregation task failed: {0}")]
    Task(#[from] JoinError),

    #[error("Recent window ending at match {end} failed: {source}")]
    Window {
        end: MatchId,
        #[source]
        source: Box<AggregateError>,
    },
}

/// Runs aggregation queries against a shared fact source.
///
/// Cloning is cheap; clones share the source and the query permits.
#[derive(Clone)]
pub struct Aggregator {
    source: Arc<dyn FactSource>,
    permits: Arc<Semaphore>,
}

impl Aggregator {
    /// `max_concurrent_queries` bounds in-flight `execute` calls across all clones.
    pub fn new(source: Arc<dyn FactSource>, max_concurrent_queries: usize) -> Self {
        Self {
            source,
            permits: Arc::new(Semaphore::new(max_concurrent_queries.max(1))),
        }
    }

    pub fn source(&self) -> &Arc<dyn FactSource> {
        &self.source
    }

    /// Execute one query under a permit.
    pub async fn execute(&self, query: QueryDescription) -> Result<Vec<PlayerStatRow>, AggregateError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SourceError::Unavailable("query permits closed".to_string()))?;

        debug!("Executing on {}: {}", self.source.name(), query);
        Ok(self.source.execute(&query).await?)
    }

    /// Every query type for both sides over `range`, normalized.
    pub async fn aggregate(&self, range: MatchRange) -> Result<BySide<StatBundle>, AggregateError> {
        // Build everything first so configuration errors fail before any I/O.
        let mut queries = Vec::with_capacity(Side::ALL.len() * QueryType::EXECUTED.len());
        for side in Side::ALL {
            for query_type in QueryType::EXECUTED {
                queries.push((side, query_type, query::for_query_type(side, query_type, range)?));
            }
        }

        let mut tasks = JoinSet::new();
        for (side, query_type, query) in queries {
            let this = self.clone();
            tasks.spawn(async move {
                this.execute(query)
                    .await
                    .map(|rows| (side, query_type, rows))
            });
        }

        let mut bundles = BySide::from_fn(|_| StatBundle::new());
        while let Some(joined) = tasks.join_next().await {
            let (side, query_type, rows) = joined??;
            bundles.get_mut(side).insert(query_type, rows);
        }

        for side in Side::ALL {
            normalize(side, bundles.get_mut(side));
        }
        debug!("Aggregated {}", range);
        Ok(bundles)
    }

    /// Per-round share of team output for one match, both sides.
    pub async fn round_breakdown(
        &self,
        match_id: MatchId,
    ) -> Result<BySide<Vec<PlayerStatRow>>, AggregateError> {
        let survivor = self
            .execute(query::round_breakdown(Side::Survivor, match_id)?)
            .await?;
        let infected = self
            .execute(query::round_breakdown(Side::Infected, match_id)?)
            .await?;
        Ok(BySide::new(survivor, infected))
    }
}

/// Derive z-score and percentile rows for one side's raw bundle.
///
/// The round-count column of the `roundAverage` and `stddev` rows is replaced
/// by the population mean and spread of rounds played, taken over the
/// `individualTotal` rows. Every `individualRoundAverage` row then yields one
/// z-score row and one percentile row with the same identity.
pub fn normalize(side: Side, bundle: &mut StatBundle) {
    let rounds_column = side.round_count_column();
    let rounds: Vec<f64> = bundle
        .get(QueryType::IndividualTotal)
        .iter()
        .map(|row| row.get(rounds_column).unwrap_or(0.0))
        .collect();
    let population = PopulationStats::from_samples(&rounds);

    if let Some(row) = bundle.rows_mut(QueryType::RoundAverage).first_mut() {
        row.set(rounds_column, population.mean);
    }
    if let Some(row) = bundle.rows_mut(QueryType::Stddev).first_mut() {
        row.set(rounds_column, population.stddev);
    }

    let mean = bundle
        .get(QueryType::RoundAverage)
        .first()
        .cloned()
        .unwrap_or_default();
    let spread = bundle
        .get(QueryType::Stddev)
        .first()
        .cloned()
        .unwrap_or_default();

    let individual = bundle.get(QueryType::IndividualRoundAverage);
    let mut z_rows = Vec::with_capacity(individual.len());
    let mut percentile_rows = Vec::with_capacity(individual.len());
    for row in individual {
        let mut z_row = row.identity();
        let mut percentile_row = row.identity();
        for (column, value) in &row.values {
            let z = calculate::z_score(
                *value,
                mean.get(column).unwrap_or(0.0),
                spread.get(column).unwrap_or(0.0),
            );
            z_row.set(column.clone(), z);
            percentile_row.set(column.clone(), calculate::z_score_to_percentile(z));
        }
        z_rows.push(z_row);
        percentile_rows.push(percentile_row);
    }

    bundle.insert(QueryType::IndividualZScore, z_rows);
    bundle.insert(QueryType::IndividualPercentile, percentile_rows);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SteamId;
    use crate::source::fixtures::{league, round};
    use crate::source::{CountingSource, FailingSource, MemorySource};

    fn aggregator(source: MemorySource) -> Aggregator {
        Aggregator::new(Arc::new(source), 4)
    }

    fn row_for<'a>(rows: &'a [PlayerStatRow], steam_id: &str) -> &'a PlayerStatRow {
        rows.iter()
            .find(|row| row.belongs_to(&SteamId::from(steam_id)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_two_player_normalization() {
        let source = MemorySource::new(
            vec![
                round(5, 1, 0, "low", Side::Survivor, &[("plyTotalRounds", 10.0), ("plyCommon", 10.0)]),
                round(5, 1, 0, "high", Side::Survivor, &[("plyTotalRounds", 20.0), ("plyCommon", 20.0)]),
            ],
            vec![],
        );

        let bundles = aggregator(source)
            .aggregate(MatchRange::single(MatchId::new(5)))
            .await
            .unwrap();
        let survivor = &bundles.survivor;

        assert_eq!(survivor.get(QueryType::RoundAverage)[0].get("plyTotalRounds"), Some(15.0));
        assert_eq!(survivor.get(QueryType::Stddev)[0].get("plyTotalRounds"), Some(5.0));

        let z = survivor.get(QueryType::IndividualZScore);
        assert_eq!(row_for(z, "low").get("plyTotalRounds"), Some(-1.0));
        assert_eq!(row_for(z, "high").get("plyTotalRounds"), Some(1.0));

        let percentile = survivor.get(QueryType::IndividualPercentile);
        let low = row_for(percentile, "low").get("plyTotalRounds").unwrap();
        let high = row_for(percentile, "high").get("plyTotalRounds").unwrap();
        assert!((low - 15.87).abs() < 0.01);
        assert!((high - 84.13).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_derived_rows_match_individual_rows() {
        let bundles = aggregator(league(4))
            .aggregate(MatchRange::to_date(MatchId::new(4)))
            .await
            .unwrap();

        for (_, bundle) in bundles.iter() {
            let averages = bundle.get(QueryType::IndividualRoundAverage);
            let z = bundle.get(QueryType::IndividualZScore);
            let percentile = bundle.get(QueryType::IndividualPercentile);
            assert!(!averages.is_empty());
            assert_eq!(averages.len(), z.len());
            assert_eq!(averages.len(), percentile.len());
            for ((a, z), p) in averages.iter().zip(z).zip(percentile) {
                assert_eq!(a.steam_id, z.steam_id);
                assert_eq!(a.steam_id, p.steam_id);
                assert_eq!(a.values.len(), z.values.len());
                assert!(p.values.values().all(|v| (0.0..=100.0).contains(v)));
            }
        }
    }

    #[tokio::test]
    async fn test_single_and_to_date_agree_on_one_match() {
        let only_five = MemorySource::new(
            vec![
                round(5, 1, 0, "a", Side::Survivor, &[("plyCommon", 12.0), ("plyDeaths", 1.0)]),
                round(5, 1, 0, "b", Side::Survivor, &[("plyCommon", 4.0)]),
                round(5, 2, 0, "a", Side::Survivor, &[("plyCommon", 9.0)]),
                round(5, 1, 1, "c", Side::Infected, &[("infDmgTotal", 40.0)]),
                round(5, 1, 1, "d", Side::Infected, &[("infDmgTotal", 10.0)]),
            ],
            vec![],
        );
        let aggregator = aggregator(only_five);

        let single = aggregator
            .aggregate(MatchRange::single(MatchId::new(5)))
            .await
            .unwrap();
        let to_date = aggregator
            .aggregate(MatchRange::to_date(MatchId::new(5)))
            .await
            .unwrap();
        assert_eq!(single, to_date);
    }

    #[tokio::test]
    async fn test_identical_players_get_neutral_scores() {
        let source = MemorySource::new(
            vec![
                round(1, 1, 0, "a", Side::Infected, &[("infSpawns", 3.0)]),
                round(1, 1, 0, "b", Side::Infected, &[("infSpawns", 3.0)]),
            ],
            vec![],
        );

        let bundles = aggregator(source)
            .aggregate(MatchRange::single(MatchId::new(1)))
            .await
            .unwrap();

        for row in bundles.infected.get(QueryType::IndividualZScore) {
            assert!(row.values.values().all(|z| *z == 0.0));
        }
        for row in bundles.infected.get(QueryType::IndividualPercentile) {
            assert!(row.values.values().all(|p| *p == 50.0));
        }
    }

    #[tokio::test]
    async fn test_identical_fractional_rates_get_neutral_scores() {
        let records = (0..10)
            .map(|p| {
                round(1, 1, p % 2, &format!("p{}", p), Side::Survivor, &[("plyCommon", 0.1)])
            })
            .collect();
        let bundles = aggregator(MemorySource::new(records, vec![]))
            .aggregate(MatchRange::single(MatchId::new(1)))
            .await
            .unwrap();

        let z = bundles.survivor.get(QueryType::IndividualZScore);
        let percentile = bundles.survivor.get(QueryType::IndividualPercentile);
        assert_eq!(z.len(), 10);
        for (z, p) in z.iter().zip(percentile) {
            assert_eq!(z.get("plyCommon"), Some(0.0));
            assert_eq!(p.get("plyCommon"), Some(50.0));
        }
    }

    #[tokio::test]
    async fn test_queries_stay_within_permits() {
        let source = Arc::new(CountingSource::new(league(4)));
        let aggregator = Aggregator::new(source.clone(), 2);

        aggregator
            .aggregate(MatchRange::to_date(MatchId::new(4)))
            .await
            .unwrap();

        assert!(source.peak() >= 1);
        assert!(source.peak() <= 2, "peak concurrency {}", source.peak());
    }

    #[tokio::test]
    async fn test_empty_range_has_no_players() {
        let bundles = aggregator(league(2))
            .aggregate(MatchRange::single(MatchId::new(40)))
            .await
            .unwrap();

        assert_eq!(bundles.survivor.get(QueryType::Total).len(), 1);
        assert!(bundles.survivor.get(QueryType::IndividualTotal).is_empty());
        assert!(bundles.survivor.get(QueryType::IndividualZScore).is_empty());
    }

    #[tokio::test]
    async fn test_round_breakdown() {
        let breakdown = aggregator(league(2))
            .round_breakdown(MatchId::new(2))
            .await
            .unwrap();

        // Two rounds, two players per side per round.
        assert_eq!(breakdown.survivor.len(), 4);
        assert!(breakdown
            .survivor
            .iter()
            .all(|row| row.match_id == Some(MatchId::new(2)) && row.round.is_some()));
    }

    #[tokio::test]
    async fn test_source_failure_propagates() {
        let failing = FailingSource::new(league(3), MatchId::new(2));
        let aggregator = Aggregator::new(Arc::new(failing), 2);

        assert!(aggregator
            .aggregate(MatchRange::single(MatchId::new(1)))
            .await
            .is_ok());
        let err = aggregator
            .aggregate(MatchRange::to_date(MatchId::new(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::Source(SourceError::QueryFailed { .. })));
    }
}

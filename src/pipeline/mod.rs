//! Batch orchestrator.
//!
//! A run goes through these phases:
//! 1. Resolve the target match ids (all of them, or an incremental subset)
//! 2. Aggregate each target match and its league-to-date state
//! 3. Rate matches in ascending order
//! 4. Assemble player histories and recent-form windows
//! 5. Rebuild the league-wide roster, match index and win-loss matrix
//! 6. Persist league snapshots, match documents, summaries and merged player
//!    documents
//!
//! Everything is computed before the first write. A failure in any phase
//! leaves the store untouched and names the match that was being processed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{info, warn};

use crate::aggregate::{self, AggregateError, Aggregator};
use crate::merge::{merge_histories, MergePolicy};
use crate::models::{
    validate_registry, BySide, LeagueSnapshot, MatchDocument, MatchId, MatchOutcome, MatchRange,
    MatchSummary, ModelError, PlayerHistory, PlayerRating, PlayerStatRow, RosterEntry, Scope,
    StatBundle, SteamId, WinLossMatrix,
};
use crate::ranking::RankingAdapter;
use crate::source::{FactSource, SourceError};
use crate::storage::{DocumentKey, JsonStore, StorageConfig, StorageError};
use crate::summary;

/// Errors that can occur during a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Run failed while processing match {match_id}: {source}")]
    Match {
        match_id: MatchId,
        #[source]
        source: AggregateError,
    },

    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid column registry: {0}")]
    Registry(#[from] ModelError),

    #[error("Task failed: {0}")]
    Task(#[from] JoinError),
}

impl RunError {
    fn at(match_id: MatchId, source: impl Into<AggregateError>) -> Self {
        RunError::Match {
            match_id,
            source: source.into(),
        }
    }

    fn from_window(error: AggregateError) -> Self {
        match error {
            AggregateError::Window { end, source } => RunError::Match {
                match_id: end,
                source: *source,
            },
            other => RunError::Aggregate(other),
        }
    }
}

/// Configuration for pipeline runs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub storage: StorageConfig,

    /// Upper bound on concurrent fact source queries
    pub max_concurrent_queries: usize,

    /// Matches per recent-form window
    pub window_size: usize,

    pub merge_policy: MergePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            max_concurrent_queries: 8,
            window_size: 5,
            merge_policy: MergePolicy::default(),
        }
    }
}

/// Which matches a run processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Every known match. Player documents are replaced.
    Full,
    /// Only the listed matches. Player documents are merged.
    Incremental(Vec<MatchId>),
}

impl RunMode {
    pub fn kind(&self) -> RunKind {
        match self {
            RunMode::Full => RunKind::Full,
            RunMode::Incremental(_) => RunKind::Incremental,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Full => write!(f, "full"),
            RunMode::Incremental(ids) => write!(f, "incremental ({} matches)", ids.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Full,
    Incremental,
}

/// Record of the last successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub mode: RunKind,
    pub match_ids: Vec<MatchId>,
}

/// Result of a run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub mode: RunKind,
    pub matches_processed: usize,
    pub players_written: usize,
    pub duration: Duration,
}

/// Documents produced by a run, before persistence.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub match_ids: Vec<MatchId>,
    /// Newest known match, if this run processed it.
    pub latest: Option<MatchId>,
    pub league: Vec<LeagueSnapshot>,
    pub matches: Vec<MatchDocument>,
    pub players: BTreeMap<SteamId, PlayerHistory>,
    pub roster: Vec<RosterEntry>,
    pub match_index: Vec<MatchSummary>,
    pub win_loss: WinLossMatrix,
}

struct MatchAggregates {
    single: BySide<StatBundle>,
    cumulative: BySide<StatBundle>,
    rounds: BySide<Vec<PlayerStatRow>>,
}

/// Pipeline orchestrator.
pub struct Pipeline {
    config: PipelineConfig,
    aggregator: Aggregator,
    ranking: Box<dyn RankingAdapter>,
    store: JsonStore,
}

impl Pipeline {
    /// Create a pipeline. Fails if the static column registry is inconsistent.
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn FactSource>,
        ranking: Box<dyn RankingAdapter>,
    ) -> Result<Self, RunError> {
        validate_registry()?;

        Ok(Self {
            aggregator: Aggregator::new(source, config.max_concurrent_queries),
            store: JsonStore::new(config.storage.clone()),
            ranking,
            config,
        })
    }

    pub fn store(&self) -> &JsonStore {
        &self.store
    }

    /// Compute and persist.
    pub async fn run(&mut self, mode: RunMode) -> Result<RunResult, RunError> {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(
            "Starting {} run against {} source",
            mode,
            self.aggregator.source().name()
        );

        let output = self.compute(&mode).await?;
        let players_written = self.persist(&mode, &output, started_at)?;

        let duration = start.elapsed();
        info!(
            "Run completed: {} matches, {} players in {:?}",
            output.match_ids.len(),
            players_written,
            duration
        );

        Ok(RunResult {
            mode: mode.kind(),
            matches_processed: output.match_ids.len(),
            players_written,
            duration,
        })
    }

    /// Compute every document for `mode` without writing anything.
    pub async fn compute(&mut self, mode: &RunMode) -> Result<RunOutput, RunError> {
        let source = Arc::clone(self.aggregator.source());
        let all_ids = source.match_ids().await?;
        let histories = source.player_matches().await?;

        let mut outcomes = BTreeMap::new();
        for &match_id in &all_ids {
            let found = source
                .match_outcomes(match_id)
                .await
                .map_err(|e| RunError::at(match_id, e))?;
            outcomes.insert(match_id, found);
        }
        let all_outcomes: Vec<MatchOutcome> = outcomes.values().flatten().cloned().collect();
        let roster = summary::roster(&histories, &all_outcomes);
        let match_index = summary::match_index(&all_outcomes);
        let win_loss = summary::win_loss_matrix(&all_outcomes);
        info!(
            "Summarized {} players and {} decided matches",
            roster.len(),
            match_index.len()
        );

        let targets = resolve_targets(mode, &all_ids);
        if targets.is_empty() {
            info!("No matches to process");
            return Ok(RunOutput {
                roster,
                match_index,
                win_loss,
                ..RunOutput::default()
            });
        }
        info!("Processing {} of {} matches", targets.len(), all_ids.len());

        let aggregates = self.aggregate_matches(&targets).await?;
        let mut rankings = self.rate_matches(&all_ids, &targets, &aggregates, &outcomes)?;

        let target_set: BTreeSet<MatchId> = targets.iter().copied().collect();

        let mut players: BTreeMap<SteamId, PlayerHistory> = BTreeMap::new();
        for (steam_id, played) in &histories {
            for match_id in played.iter().filter(|id| target_set.contains(*id)) {
                let Some(found) = aggregates.get(match_id) else {
                    continue;
                };
                let history = players.entry(steam_id.clone()).or_default();
                history.extend(Scope::Single, &player_rows(&found.single, steam_id, *match_id));
                history.extend(
                    Scope::Cumulative,
                    &player_rows(&found.cumulative, steam_id, *match_id),
                );
            }
        }

        let recent = aggregate::recent_form(
            &self.aggregator,
            self.config.window_size,
            &histories,
            Some(&target_set),
        )
        .await
        .map_err(RunError::from_window)?;
        for (steam_id, bundle) in &recent {
            players
                .entry(steam_id.clone())
                .or_default()
                .extend(Scope::Recent, bundle);
        }
        info!("Assembled histories for {} players", players.len());

        let mut league = Vec::with_capacity(targets.len());
        let mut matches = Vec::with_capacity(targets.len());
        for (match_id, found) in aggregates {
            league.push(LeagueSnapshot {
                match_id,
                stats: found.cumulative,
                rankings: rankings.remove(&match_id).unwrap_or_default(),
            });
            matches.push(MatchDocument {
                match_id,
                stats: found.single,
                rounds: found.rounds,
            });
        }

        let latest = all_ids.last().copied().filter(|id| target_set.contains(id));
        Ok(RunOutput {
            match_ids: targets,
            latest,
            league,
            matches,
            players,
            roster,
            match_index,
            win_loss,
        })
    }

    /// Single-match, league-to-date and per-round aggregates for each target.
    async fn aggregate_matches(
        &self,
        targets: &[MatchId],
    ) -> Result<BTreeMap<MatchId, MatchAggregates>, RunError> {
        let mut tasks = JoinSet::new();
        for &match_id in targets {
            let aggregator = self.aggregator.clone();
            tasks.spawn(async move {
                let result = tokio::try_join!(
                    aggregator.aggregate(MatchRange::single(match_id)),
                    aggregator.aggregate(MatchRange::to_date(match_id)),
                    aggregator.round_breakdown(match_id),
                );
                (match_id, result)
            });
        }

        let mut aggregates = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined? {
                (match_id, Ok((single, cumulative, rounds))) => {
                    aggregates.insert(
                        match_id,
                        MatchAggregates {
                            single,
                            cumulative,
                            rounds,
                        },
                    );
                }
                (match_id, Err(e)) => return Err(RunError::at(match_id, e)),
            }
        }
        Ok(aggregates)
    }

    /// Ratings table after each target match, in ascending order.
    fn rate_matches(
        &mut self,
        all_ids: &[MatchId],
        targets: &[MatchId],
        aggregates: &BTreeMap<MatchId, MatchAggregates>,
        outcomes: &BTreeMap<MatchId, Vec<MatchOutcome>>,
    ) -> Result<BTreeMap<MatchId, Vec<PlayerRating>>, RunError> {
        let mut rankings = BTreeMap::new();
        let mut last_rated: Option<MatchId> = None;

        for &match_id in targets {
            let predecessor = all_ids
                .iter()
                .take_while(|id| **id < match_id)
                .last()
                .copied();
            if last_rated.is_none() || last_rated != predecessor {
                self.seed_ratings(predecessor)?;
            }

            let Some(found) = aggregates.get(&match_id) else {
                continue;
            };
            let played = outcomes.get(&match_id).map(Vec::as_slice).unwrap_or_default();
            rankings.insert(
                match_id,
                self.ranking.rate(match_id, &found.cumulative, played),
            );
            last_rated = Some(match_id);
        }

        info!("Rated {} matches with {}", rankings.len(), self.ranking.name());
        Ok(rankings)
    }

    /// Restore ratings as published with the snapshot of `predecessor`.
    fn seed_ratings(&mut self, predecessor: Option<MatchId>) -> Result<(), RunError> {
        let ratings = match predecessor {
            None => Vec::new(),
            Some(match_id) => {
                match self
                    .store
                    .read::<LeagueSnapshot>(&DocumentKey::League(match_id))?
                {
                    Some(snapshot) => snapshot.rankings,
                    None => {
                        warn!(
                            "No league snapshot for match {}; ratings restart from scratch",
                            match_id
                        );
                        Vec::new()
                    }
                }
            }
        };
        self.ranking.seed(&ratings);
        Ok(())
    }

    /// Write a computed run. Returns the number of player documents written.
    pub fn persist(
        &self,
        mode: &RunMode,
        output: &RunOutput,
        started_at: DateTime<Utc>,
    ) -> Result<usize, RunError> {
        for steam_id in output.players.keys() {
            DocumentKey::Player(steam_id.clone()).validate()?;
        }

        for snapshot in &output.league {
            self.store
                .write(&DocumentKey::League(snapshot.match_id), snapshot)?;
            if output.latest == Some(snapshot.match_id) {
                self.store.write(&DocumentKey::LatestLeague, snapshot)?;
            }
        }

        for document in &output.matches {
            self.store
                .write(&DocumentKey::Match(document.match_id), document)?;
        }

        self.store.write(&DocumentKey::Roster, &output.roster)?;
        self.store.write(&DocumentKey::MatchIndex, &output.match_index)?;
        self.store.write(&DocumentKey::WinLoss, &output.win_loss)?;

        for (steam_id, incoming) in &output.players {
            let key = DocumentKey::Player(steam_id.clone());
            let existing = match mode {
                RunMode::Full => None,
                RunMode::Incremental(_) => self.store.read::<PlayerHistory>(&key)?,
            };
            match existing {
                Some(existing) => {
                    let merged = merge_histories(&existing, incoming, self.config.merge_policy);
                    self.store.write(&key, &merged)?;
                }
                None => self.store.write(&key, incoming)?,
            }
        }

        let state = RunState {
            started_at,
            completed_at: Utc::now(),
            mode: mode.kind(),
            match_ids: output.match_ids.clone(),
        };
        self.store.write(&DocumentKey::LastRun, &state)?;

        info!(
            "Persisted {} league snapshots, {} match documents, {} player documents",
            output.league.len(),
            output.matches.len(),
            output.players.len()
        );
        Ok(output.players.len())
    }
}

/// Sorted, de-duplicated ids to process. Unknown incremental ids are dropped.
fn resolve_targets(mode: &RunMode, all_ids: &[MatchId]) -> Vec<MatchId> {
    match mode {
        RunMode::Full => all_ids.to_vec(),
        RunMode::Incremental(requested) => {
            let known: BTreeSet<MatchId> = all_ids.iter().copied().collect();
            let requested: BTreeSet<MatchId> = requested.iter().copied().collect();
            requested
                .into_iter()
                .filter(|id| {
                    let found = known.contains(id);
                    if !found {
                        warn!("Match {} is not known to the source; skipping", id);
                    }
                    found
                })
                .collect()
        }
    }
}

fn player_rows(
    bundles: &BySide<StatBundle>,
    steam_id: &SteamId,
    match_id: MatchId,
) -> BySide<StatBundle> {
    BySide::from_fn(|side| bundles.get(side).player_rows(steam_id, match_id))
}

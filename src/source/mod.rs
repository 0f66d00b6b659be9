//! Raw fact sources.
//!
//! A [`FactSource`] executes [`QueryDescription`]s over per-round records and
//! enumerates the known match identifiers. Every call is an independent,
//! read-only request; the pipeline may issue many concurrently.

pub mod memory;

pub use memory::MemorySource;

#[cfg(test)]
pub(crate) use memory::fixtures;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{MatchId, MatchOutcome, PlayerStatRow, SteamId};
use crate::query::QueryDescription;
use crate::storage::StorageError;

/// Errors that can occur while talking to a fact source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Fact source unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed ({query}): {message}")]
    QueryFailed { query: String, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Trait for raw fact sources.
#[async_trait]
pub trait FactSource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &'static str;

    /// Execute an aggregation query.
    async fn execute(&self, query: &QueryDescription) -> Result<Vec<PlayerStatRow>, SourceError>;

    /// Every known match id, ascending.
    async fn match_ids(&self) -> Result<Vec<MatchId>, SourceError>;

    /// For each player, the ascending match ids they took part in.
    async fn player_matches(&self) -> Result<BTreeMap<SteamId, Vec<MatchId>>, SourceError>;

    /// Per-player results of one match.
    async fn match_outcomes(&self, match_id: MatchId) -> Result<Vec<MatchOutcome>, SourceError>;
}

/// Source wrapper that fails every query ending at one match.
#[cfg(test)]
pub struct FailingSource {
    inner: MemorySource,
    fail_at: MatchId,
}

#[cfg(test)]
impl FailingSource {
    pub fn new(inner: MemorySource, fail_at: MatchId) -> Self {
        Self { inner, fail_at }
    }
}

#[cfg(test)]
#[async_trait]
impl FactSource for FailingSource {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn execute(&self, query: &QueryDescription) -> Result<Vec<PlayerStatRow>, SourceError> {
        if query.range.max == self.fail_at {
            return Err(SourceError::QueryFailed {
                query: query.to_string(),
                message: "connection reset".to_string(),
            });
        }
        self.inner.execute(query).await
    }

    async fn match_ids(&self) -> Result<Vec<MatchId>, SourceError> {
        self.inner.match_ids().await
    }

    async fn player_matches(&self) -> Result<BTreeMap<SteamId, Vec<MatchId>>, SourceError> {
        self.inner.player_matches().await
    }

    async fn match_outcomes(&self, match_id: MatchId) -> Result<Vec<MatchOutcome>, SourceError> {
        self.inner.match_outcomes(match_id).await
    }
}

/// Source wrapper that records the peak number of concurrent `execute` calls.
#[cfg(test)]
pub struct CountingSource {
    inner: MemorySource,
    in_flight: std::sync::atomic::AtomicUsize,
    peak: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl CountingSource {
    pub fn new(inner: MemorySource) -> Self {
        Self {
            inner,
            in_flight: std::sync::atomic::AtomicUsize::new(0),
            peak: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl FactSource for CountingSource {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn execute(&self, query: &QueryDescription) -> Result<Vec<PlayerStatRow>, SourceError> {
        use std::sync::atomic::Ordering;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let result = self.inner.execute(query).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn match_ids(&self) -> Result<Vec<MatchId>, SourceError> {
        self.inner.match_ids().await
    }

    async fn player_matches(&self) -> Result<BTreeMap<SteamId, Vec<MatchId>>, SourceError> {
        self.inner.player_matches().await
    }

    async fn match_outcomes(&self, match_id: MatchId) -> Result<Vec<MatchOutcome>, SourceError> {
        self.inner.match_outcomes(match_id).await
    }
}

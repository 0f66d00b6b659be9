//! # League Stats
//!
//! Per-round match telemetry aggregation with incremental player history
//! merging.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (sides, columns, rows, bundles, documents)
//! - **query**: Aggregate query builder
//! - **calculate**: Population statistics (mean, stddev, z-score, percentile)
//! - **source**: Raw fact sources and the in-memory reference source
//! - **aggregate**: Match/league aggregation and recent-form windows
//! - **merge**: Incremental merge of player histories
//! - **ranking**: Pluggable player ratings (team Elo)
//! - **storage**: JSON document store and JSONL readers
//! - **summary**: Roster, match index and head-to-head win-loss records
//! - **pipeline**: Full and incremental batch runs
//! - **config**: Configuration loading and validation

pub mod aggregate;
pub mod calculate;
pub mod config;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod ranking;
pub mod source;
pub mod storage;
pub mod summary;

pub use models::*;

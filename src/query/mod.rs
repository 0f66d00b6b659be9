//! Aggregate query builder.
//!
//! Turns (side, columns, reduction, grouping, match range) into a declarative
//! [`QueryDescription`] for a [`FactSource`](crate::source::FactSource) to
//! execute. Building performs no I/O; invalid requests are configuration
//! errors and fail before anything runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::models::{MatchId, MatchRange, QueryType, Side, StatColumn};

/// Errors raised while building a query. All of them are configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Column {column} belongs to {found}, not {expected}")]
    ColumnSideMismatch {
        column: StatColumn,
        expected: Side,
        found: Side,
    },

    #[error("No columns requested for {0}")]
    NoColumns(Side),

    #[error("Column {0} requested more than once")]
    DuplicateColumn(StatColumn),

    #[error("Grouping column {0} requested more than once")]
    DuplicateGrouping(GroupingColumn),

    #[error("Invalid match range: min {min} is greater than max {max}")]
    InvalidRange { min: MatchId, max: MatchId },

    #[error("{0} is derived and cannot be executed")]
    NotExecutable(QueryType),
}

/// Reduction applied per column within each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregationMode {
    /// Sum.
    Total,
    /// Sum divided by rounds played.
    Average,
    /// Population standard deviation of the per-round rate.
    Stddev,
    /// Share of the team's total for the same round, in percent.
    PercentOfTeam,
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregationMode::Total => "total",
            AggregationMode::Average => "average",
            AggregationMode::Stddev => "stddev",
            AggregationMode::PercentOfTeam => "percentOfTeam",
        };
        write!(f, "{}", name)
    }
}

/// Identity column a query can group by. Declaration order is key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupingColumn {
    Match,
    Round,
    Team,
    Player,
}

impl fmt::Display for GroupingColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupingColumn::Match => "matchId",
            GroupingColumn::Round => "round",
            GroupingColumn::Team => "team",
            GroupingColumn::Player => "steamId",
        };
        write!(f, "{}", name)
    }
}

/// A validated, declarative aggregation request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescription {
    pub side: Side,
    pub mode: AggregationMode,
    pub columns: Vec<StatColumn>,
    /// Always reported alongside `columns`.
    pub round_count_column: &'static str,
    /// Sorted and unique. Empty means a single aggregate row.
    pub grouping: Vec<GroupingColumn>,
    pub range: MatchRange,
}

impl QueryDescription {
    /// Logical table the query reads.
    pub fn table(&self) -> &'static str {
        self.side.as_str()
    }

    pub fn groups_by(&self, column: GroupingColumn) -> bool {
        self.grouping.contains(&column)
    }
}

impl fmt::Display for QueryDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<&str> = self.columns.iter().map(|c| c.name()).collect();
        write!(
            f,
            "{}({}, {}) FROM {} WHERE matchId IN {}",
            self.mode,
            columns.join(", "),
            self.round_count_column,
            self.table(),
            self.range
        )?;
        if !self.grouping.is_empty() {
            let grouping: Vec<String> = self.grouping.iter().map(|g| g.to_string()).collect();
            write!(f, " GROUP BY {}", grouping.join(", "))?;
        }
        Ok(())
    }
}

/// Build a query description.
pub fn build(
    side: Side,
    columns: &[StatColumn],
    mode: AggregationMode,
    grouping: &[GroupingColumn],
    range: MatchRange,
) -> Result<QueryDescription, QueryError> {
    if columns.is_empty() {
        return Err(QueryError::NoColumns(side));
    }

    let mut checked: Vec<StatColumn> = Vec::with_capacity(columns.len());
    for column in columns {
        if column.side() != side {
            return Err(QueryError::ColumnSideMismatch {
                column: *column,
                expected: side,
                found: column.side(),
            });
        }
        if checked.contains(column) {
            return Err(QueryError::DuplicateColumn(*column));
        }
        checked.push(*column);
    }

    let mut groups: Vec<GroupingColumn> = Vec::with_capacity(grouping.len());
    for column in grouping {
        if groups.contains(column) {
            return Err(QueryError::DuplicateGrouping(*column));
        }
        groups.push(*column);
    }
    groups.sort();

    if let Some(min) = range.min {
        if min > range.max {
            return Err(QueryError::InvalidRange {
                min,
                max: range.max,
            });
        }
    }

    Ok(QueryDescription {
        side,
        mode,
        columns: checked,
        round_count_column: side.round_count_column(),
        grouping: groups,
        range,
    })
}

/// The executed query behind a query type, over every column of `side`.
pub fn for_query_type(
    side: Side,
    query_type: QueryType,
    range: MatchRange,
) -> Result<QueryDescription, QueryError> {
    let (mode, grouping): (AggregationMode, &[GroupingColumn]) = match query_type {
        QueryType::Total => (AggregationMode::Total, &[]),
        QueryType::RoundAverage => (AggregationMode::Average, &[]),
        QueryType::Stddev => (AggregationMode::Stddev, &[]),
        QueryType::IndividualTotal => (AggregationMode::Total, &[GroupingColumn::Player]),
        QueryType::IndividualRoundAverage => {
            (AggregationMode::Average, &[GroupingColumn::Player])
        }
        QueryType::IndividualPercentOfTeam => {
            (AggregationMode::PercentOfTeam, &[GroupingColumn::Player])
        }
        QueryType::IndividualZScore | QueryType::IndividualPercentile => {
            return Err(QueryError::NotExecutable(query_type))
        }
    };
    build(side, side.columns(), mode, grouping, range)
}

/// Per-round share of team output for one match.
pub fn round_breakdown(side: Side, match_id: MatchId) -> Result<QueryDescription, QueryError> {
    build(
        side,
        side.columns(),
        AggregationMode::PercentOfTeam,
        &[
            GroupingColumn::Match,
            GroupingColumn::Round,
            GroupingColumn::Team,
            GroupingColumn::Player,
        ],
        MatchRange::single(match_id),
    )
}

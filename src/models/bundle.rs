//! Statistic bundles and per-player history.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{BySide, MatchId, PlayerStatRow, SteamId};

/// Kind of result sequence held in a [`StatBundle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryType {
    /// League total, one row.
    Total,
    /// League per-round average, one row.
    RoundAverage,
    /// Spread of per-round rates, one row.
    Stddev,
    IndividualTotal,
    IndividualRoundAverage,
    IndividualPercentOfTeam,
    /// Derived from `IndividualRoundAverage`.
    IndividualZScore,
    /// Derived from `IndividualZScore`.
    IndividualPercentile,
}

impl QueryType {
    /// Query types executed against the fact source.
    pub const EXECUTED: [QueryType; 6] = [
        QueryType::Total,
        QueryType::RoundAverage,
        QueryType::Stddev,
        QueryType::IndividualTotal,
        QueryType::IndividualRoundAverage,
        QueryType::IndividualPercentOfTeam,
    ];

    /// Query types kept in player histories.
    pub const PLAYER: [QueryType; 5] = [
        QueryType::IndividualTotal,
        QueryType::IndividualRoundAverage,
        QueryType::IndividualPercentOfTeam,
        QueryType::IndividualZScore,
        QueryType::IndividualPercentile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Total => "total",
            QueryType::RoundAverage => "roundAverage",
            QueryType::Stddev => "stddev",
            QueryType::IndividualTotal => "individualTotal",
            QueryType::IndividualRoundAverage => "individualRoundAverage",
            QueryType::IndividualPercentOfTeam => "individualPercentOfTeam",
            QueryType::IndividualZScore => "individualZScore",
            QueryType::IndividualPercentile => "individualPercentile",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rows keyed by query type, for one side and one scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatBundle(BTreeMap<QueryType, Vec<PlayerStatRow>>);

impl StatBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundle with an empty sequence for every player query type.
    pub fn for_player() -> Self {
        let mut bundle = Self::new();
        for query_type in QueryType::PLAYER {
            bundle.0.insert(query_type, Vec::new());
        }
        bundle
    }

    pub fn get(&self, query_type: QueryType) -> &[PlayerStatRow] {
        self.0.get(&query_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rows_mut(&mut self, query_type: QueryType) -> &mut Vec<PlayerStatRow> {
        self.0.entry(query_type).or_default()
    }

    pub fn insert(&mut self, query_type: QueryType, rows: Vec<PlayerStatRow>) {
        self.0.insert(query_type, rows);
    }

    pub fn push(&mut self, query_type: QueryType, row: PlayerStatRow) {
        self.rows_mut(query_type).push(row);
    }

    pub fn query_types(&self) -> impl Iterator<Item = QueryType> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (QueryType, &[PlayerStatRow])> {
        self.0.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// The player's rows for every player query type, tagged with `match_id`.
    pub fn player_rows(&self, steam_id: &SteamId, match_id: MatchId) -> StatBundle {
        let mut bundle = StatBundle::new();
        for query_type in QueryType::PLAYER {
            let rows = self
                .get(query_type)
                .iter()
                .filter(|row| row.belongs_to(steam_id))
                .map(|row| row.clone().with_match(match_id))
                .collect();
            bundle.insert(query_type, rows);
        }
        bundle
    }
}

/// Temporal scope of a player history bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// One match.
    Single,
    /// League-to-date as of a match.
    Cumulative,
    /// Trailing window ending at a match.
    Recent,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Single, Scope::Cumulative, Scope::Recent];
}

/// Everything persisted for one player.
///
/// Within each (scope, side, query type) sequence there is at most one row
/// per match id, ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerHistory {
    pub single: BySide<StatBundle>,
    pub cumulative: BySide<StatBundle>,
    pub recent: BySide<StatBundle>,
}

impl Default for PlayerHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerHistory {
    pub fn new() -> Self {
        Self {
            single: BySide::from_fn(|_| StatBundle::for_player()),
            cumulative: BySide::from_fn(|_| StatBundle::for_player()),
            recent: BySide::from_fn(|_| StatBundle::for_player()),
        }
    }

    pub fn scope(&self, scope: Scope) -> &BySide<StatBundle> {
        match scope {
            Scope::Single => &self.single,
            Scope::Cumulative => &self.cumulative,
            Scope::Recent => &self.recent,
        }
    }

    pub fn scope_mut(&mut self, scope: Scope) -> &mut BySide<StatBundle> {
        match scope {
            Scope::Single => &mut self.single,
            Scope::Cumulative => &mut self.cumulative,
            Scope::Recent => &mut self.recent,
        }
    }

    /// Append every row of `bundle` to the matching sequences of `scope`.
    pub fn extend(&mut self, scope: Scope, bundle: &BySide<StatBundle>) {
        let target = self.scope_mut(scope);
        for (side, incoming) in bundle.iter() {
            let side_bundle = target.get_mut(side);
            for (query_type, rows) in incoming.iter() {
                side_bundle
                    .rows_mut(query_type)
                    .extend(rows.iter().cloned());
            }
        }
    }

    /// Number of rows across every sequence.
    pub fn row_count(&self) -> usize {
        Scope::ALL
            .iter()
            .flat_map(|scope| {
                let sides = self.scope(*scope);
                [&sides.survivor, &sides.infected]
            })
            .flat_map(|bundle| bundle.iter().map(|(_, rows)| rows.len()))
            .sum()
    }
}

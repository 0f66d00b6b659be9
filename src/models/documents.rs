//! Raw facts and persisted documents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{BySide, MatchId, PlayerStatRow, Side, StatBundle, SteamId};

/// One player's statistics for one round on one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecord {
    pub match_id: MatchId,
    pub round: u32,
    pub team: u8,
    pub steam_id: SteamId,
    pub side: Side,

    /// Stat columns and the side's round-count column.
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

impl RoundRecord {
    /// Value of a column; absent columns count as zero.
    pub fn value(&self, column: &str) -> f64 {
        self.values.get(column).copied().unwrap_or(0.0)
    }

    /// Rounds this record stands for, usually 1.
    pub fn rounds(&self) -> f64 {
        self.value(self.side.round_count_column())
    }
}

/// A player's result in a match: +1 win, -1 loss, 0 draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub match_id: MatchId,
    pub steam_id: SteamId,
    pub team: u8,
    pub result: i8,
}

impl MatchOutcome {
    /// Score in [0, 1] for rating updates.
    pub fn score(&self) -> f64 {
        match self.result.signum() {
            1 => 1.0,
            -1 => 0.0,
            _ => 0.5,
        }
    }
}

/// A player's rating as of a league snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRating {
    pub steam_id: SteamId,
    pub rating: f64,
    pub matches: u32,
}

/// League-to-date statistics as of one match, plus ratings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueSnapshot {
    pub match_id: MatchId,
    pub stats: BySide<StatBundle>,
    #[serde(default)]
    pub rankings: Vec<PlayerRating>,
}

/// Statistics for a single match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDocument {
    pub match_id: MatchId,
    pub stats: BySide<StatBundle>,
    /// Share of team output per player per round.
    pub rounds: BySide<Vec<PlayerStatRow>>,
}

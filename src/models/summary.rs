//! League-wide summary documents rebuilt on every run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{MatchId, SteamId};

/// One player known to the league.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub steam_id: SteamId,

    /// Distinct matches with round records or a recorded result
    pub matches: u32,

    pub first_match: MatchId,
    pub last_match: MatchId,
}

/// Which team won a match. Team A is team 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchWinner {
    TeamA,
    TeamB,
    Draw,
}

/// One row of the match index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub match_id: MatchId,
    pub team_a: Vec<SteamId>,
    pub team_b: Vec<SteamId>,
    pub winner: MatchWinner,
}

/// Results of matches shared by two players.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinLoss {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,

    /// Wins as a share of matches (0.0 to 1.0)
    pub win_rate: f64,
}

impl WinLoss {
    pub fn record(&mut self, result: i8) {
        match result.signum() {
            1 => self.wins += 1,
            -1 => self.losses += 1,
            _ => self.draws += 1,
        }
    }

    pub fn played(&self) -> u32 {
        self.wins + self.losses + self.draws
    }
}

/// Player -> other player -> results, keyed by steam id.
pub type WinLossTable = BTreeMap<SteamId, BTreeMap<SteamId, WinLoss>>;

/// Head-to-head results: as teammates (`with`) and as opponents (`against`).
///
/// Rows are from the point of view of the outer key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WinLossMatrix {
    pub with: WinLossTable,
    pub against: WinLossTable,
}

impl WinLossMatrix {
    pub fn with(&self, player: &SteamId, other: &SteamId) -> Option<&WinLoss> {
        self.with.get(player).and_then(|row| row.get(other))
    }

    pub fn against(&self, player: &SteamId, other: &SteamId) -> Option<&WinLoss> {
        self.against.get(player).and_then(|row| row.get(other))
    }
}

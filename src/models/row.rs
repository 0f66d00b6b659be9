//! Statistic rows and match ranges.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{MatchId, SteamId};

/// Inclusive range of match identifiers. `min: None` means from the start
/// of history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchRange {
    pub min: Option<MatchId>,
    pub max: MatchId,
}

impl MatchRange {
    /// Exactly one match.
    pub fn single(id: MatchId) -> Self {
        Self {
            min: Some(id),
            max: id,
        }
    }

    /// League-to-date: everything up to and including `id`.
    pub fn to_date(id: MatchId) -> Self {
        Self { min: None, max: id }
    }

    pub fn between(min: MatchId, max: MatchId) -> Self {
        Self {
            min: Some(min),
            max,
        }
    }

    pub fn contains(&self, id: MatchId) -> bool {
        self.min.map_or(true, |min| id >= min) && id <= self.max
    }
}

impl fmt::Display for MatchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.min {
            Some(min) => write!(f, "[{}..={}]", min, self.max),
            None => write!(f, "[..={}]", self.max),
        }
    }
}

/// One statistical observation: named numeric values plus identity.
///
/// Two rows describe the same observation iff `steam_id` and `match_id`
/// agree. A row with only `match_id` set is a placeholder meaning "no data".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steam_id: Option<SteamId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<MatchId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<u8>,

    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

impl PlayerStatRow {
    pub fn for_player(steam_id: SteamId) -> Self {
        Self {
            steam_id: Some(steam_id),
            ..Default::default()
        }
    }

    /// A row carrying only a match id and no statistics.
    pub fn placeholder(match_id: MatchId) -> Self {
        Self {
            match_id: Some(match_id),
            ..Default::default()
        }
    }

    /// A row with the same identity fields and no values.
    pub fn identity(&self) -> Self {
        Self {
            steam_id: self.steam_id.clone(),
            match_id: self.match_id,
            round: self.round,
            team: self.team,
            values: BTreeMap::new(),
        }
    }

    pub fn with_match(mut self, match_id: MatchId) -> Self {
        self.match_id = Some(match_id);
        self
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }

    pub fn set(&mut self, column: impl Into<String>, value: f64) {
        self.values.insert(column.into(), value);
    }

    pub fn is_placeholder(&self) -> bool {
        self.steam_id.is_none() && self.values.is_empty() && self.match_id.is_some()
    }

    pub fn belongs_to(&self, steam_id: &SteamId) -> bool {
        self.steam_id.as_ref() == Some(steam_id)
    }
}

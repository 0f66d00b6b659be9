//! Game sides and their statistic columns.
//!
//! Each side owns a disjoint set of columns. The registry is static; it is
//! checked once at startup by [`validate_registry`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by side parsing and the column registry check.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Unknown side: {0}")]
    UnknownSide(String),

    #[error("Column {column} is listed under {listed} but reports {reports}")]
    MisplacedColumn {
        column: StatColumn,
        listed: Side,
        reports: Side,
    },

    #[error("Column {column} does not carry the {side} prefix '{prefix}'")]
    MissingPrefix {
        column: StatColumn,
        side: Side,
        prefix: &'static str,
    },

    #[error("Column {0} shadows a round-count column")]
    ShadowsRoundCount(StatColumn),

    #[error("Duplicate column name {0}")]
    DuplicateColumn(StatColumn),
}

/// One of the two player roles in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Survivor,
    Infected,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Survivor, Side::Infected];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Survivor => "survivor",
            Side::Infected => "infected",
        }
    }

    /// Column name prefix shared by every column of this side.
    pub fn prefix(&self) -> &'static str {
        match self {
            Side::Survivor => "ply",
            Side::Infected => "inf",
        }
    }

    /// Rounds played on this side. Used as the normalization denominator.
    pub fn round_count_column(&self) -> &'static str {
        match self {
            Side::Survivor => "plyTotalRounds",
            Side::Infected => "infTotalRounds",
        }
    }

    /// Statistic columns belonging to this side, excluding the round count.
    pub fn columns(&self) -> &'static [StatColumn] {
        match self {
            Side::Survivor => SURVIVOR_COLUMNS,
            Side::Infected => INFECTED_COLUMNS,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Side {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "survivor" => Ok(Side::Survivor),
            "infected" => Ok(Side::Infected),
            _ => Err(ModelError::UnknownSide(s.to_string())),
        }
    }
}

/// A numeric statistic recorded per player per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatColumn {
    // Survivor
    CommonKills,
    SpecialKills,
    SpecialDamage,
    TankDamage,
    WitchDamage,
    Incaps,
    Deaths,
    FriendlyFireGiven,
    FriendlyFireTaken,
    DamageTaken,

    // Infected
    InfectedDamage,
    UprightDamage,
    InfectedIncaps,
    InfectedKills,
    Spawns,
    HunterPounces,
    BoomerHits,
    ChargerImpacts,
}

const SURVIVOR_COLUMNS: &[StatColumn] = &[
    StatColumn::CommonKills,
    StatColumn::SpecialKills,
    StatColumn::SpecialDamage,
    StatColumn::TankDamage,
    StatColumn::WitchDamage,
    StatColumn::Incaps,
    StatColumn::Deaths,
    StatColumn::FriendlyFireGiven,
    StatColumn::FriendlyFireTaken,
    StatColumn::DamageTaken,
];

const INFECTED_COLUMNS: &[StatColumn] = &[
    StatColumn::InfectedDamage,
    StatColumn::UprightDamage,
    StatColumn::InfectedIncaps,
    StatColumn::InfectedKills,
    StatColumn::Spawns,
    StatColumn::HunterPounces,
    StatColumn::BoomerHits,
    StatColumn::ChargerImpacts,
];

impl StatColumn {
    /// Column name as stored in raw round records and output rows.
    pub fn name(&self) -> &'static str {
        match self {
            StatColumn::CommonKills => "plyCommon",
            StatColumn::SpecialKills => "plySIKilled",
            StatColumn::SpecialDamage => "plySIDamage",
            StatColumn::TankDamage => "plyTankDamage",
            StatColumn::WitchDamage => "plyWitchDamage",
            StatColumn::Incaps => "plyIncaps",
            StatColumn::Deaths => "plyDeaths",
            StatColumn::FriendlyFireGiven => "plyFFGiven",
            StatColumn::FriendlyFireTaken => "plyFFTaken",
            StatColumn::DamageTaken => "plyDmgTaken",
            StatColumn::InfectedDamage => "infDmgTotal",
            StatColumn::UprightDamage => "infDmgUpright",
            StatColumn::InfectedIncaps => "infIncaps",
            StatColumn::InfectedKills => "infKills",
            StatColumn::Spawns => "infSpawns",
            StatColumn::HunterPounces => "infHunterPounces",
            StatColumn::BoomerHits => "infBoomerHits",
            StatColumn::ChargerImpacts => "infChargerImpacts",
        }
    }

    pub fn side(&self) -> Side {
        match self {
            StatColumn::CommonKills
            | StatColumn::SpecialKills
            | StatColumn::SpecialDamage
            | StatColumn::TankDamage
            | StatColumn::WitchDamage
            | StatColumn::Incaps
            | StatColumn::Deaths
            | StatColumn::FriendlyFireGiven
            | StatColumn::FriendlyFireTaken
            | StatColumn::DamageTaken => Side::Survivor,
            _ => Side::Infected,
        }
    }
}

impl fmt::Display for StatColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Check the static column registry.
///
/// Every column must be listed under the side it reports, carry that side's
/// prefix, and have a unique name that does not shadow a round-count column.
pub fn validate_registry() -> Result<(), ModelError> {
    check_columns(Side::ALL.iter().map(|side| (*side, side.columns())))
}

fn check_columns<'a>(
    listing: impl IntoIterator<Item = (Side, &'a [StatColumn])>,
) -> Result<(), ModelError> {
    let mut seen = HashSet::new();
    for (side, columns) in listing {
        for column in columns {
            if column.side() != side {
                return Err(ModelError::MisplacedColumn {
                    column: *column,
                    listed: side,
                    reports: column.side(),
                });
            }
            if !column.name().starts_with(side.prefix()) {
                return Err(ModelError::MissingPrefix {
                    column: *column,
                    side,
                    prefix: side.prefix(),
                });
            }
            if Side::ALL
                .iter()
                .any(|s| s.round_count_column() == column.name())
            {
                return Err(ModelError::ShadowsRoundCount(*column));
            }
            if !seen.insert(column.name()) {
                return Err(ModelError::DuplicateColumn(*column));
            }
        }
    }
    Ok(())
}

/// A value held once per side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BySide<T> {
    pub survivor: T,
    pub infected: T,
}

impl<T> BySide<T> {
    pub fn new(survivor: T, infected: T) -> Self {
        Self { survivor, infected }
    }

    pub fn from_fn(mut f: impl FnMut(Side) -> T) -> Self {
        Self {
            survivor: f(Side::Survivor),
            infected: f(Side::Infected),
        }
    }

    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Survivor => &self.survivor,
            Side::Infected => &self.infected,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Survivor => &mut self.survivor,
            Side::Infected => &mut self.infected,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Side, &T)> {
        [(Side::Survivor, &self.survivor), (Side::Infected, &self.infected)].into_iter()
    }
}

//! Filesystem storage.
//!
//! - Raw facts are read from JSONL files (one record per line)
//! - Derived documents are JSON files addressed by [`DocumentKey`]:
//!   `players/<steamId>`, `matches/<matchId>`, `league/<matchId>`, `league`,
//!   `players`, `matches`, `win_loss`, `state/last_run`

pub mod document;
pub mod jsonl;

pub use document::JsonStore;
pub use jsonl::JsonlReader;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::models::{MatchId, SteamId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Invalid document key: {0}")]
    InvalidKey(String),
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn players_dir(&self) -> PathBuf {
        self.data_dir.join("players")
    }

    pub fn matches_dir(&self) -> PathBuf {
        self.data_dir.join("matches")
    }

    pub fn league_dir(&self) -> PathBuf {
        self.data_dir.join("league")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./data"))
    }
}

/// Address of a persisted document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKey {
    Player(SteamId),
    Match(MatchId),
    League(MatchId),
    /// Copy of the newest league snapshot.
    LatestLeague,
    Roster,
    MatchIndex,
    WinLoss,
    LastRun,
}

impl DocumentKey {
    /// File path of this document under `config`.
    pub fn path(&self, config: &StorageConfig) -> PathBuf {
        match self {
            DocumentKey::Player(id) => config.players_dir().join(format!("{}.json", id)),
            DocumentKey::Match(id) => config.matches_dir().join(format!("{}.json", id)),
            DocumentKey::League(id) => config.league_dir().join(format!("{}.json", id)),
            DocumentKey::LatestLeague => config.data_dir.join("league.json"),
            DocumentKey::Roster => config.data_dir.join("players.json"),
            DocumentKey::MatchIndex => config.data_dir.join("matches.json"),
            DocumentKey::WinLoss => config.data_dir.join("win_loss.json"),
            DocumentKey::LastRun => config.state_dir().join("last_run.json"),
        }
    }

    /// Reject keys whose path would leave their directory.
    pub fn validate(&self) -> Result<(), StorageError> {
        match self {
            DocumentKey::Player(id) if !is_file_stem(id.as_str()) => {
                Err(StorageError::InvalidKey(self.to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// A single, non-special path component.
fn is_file_stem(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && !s.contains(|c: char| c == '/' || c == '\\' || c == '\0')
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKey::Player(id) => write!(f, "players/{}", id),
            DocumentKey::Match(id) => write!(f, "matches/{}", id),
            DocumentKey::League(id) => write!(f, "league/{}", id),
            DocumentKey::LatestLeague => write!(f, "league"),
            DocumentKey::Roster => write!(f, "players"),
            DocumentKey::MatchIndex => write!(f, "matches"),
            DocumentKey::WinLoss => write!(f, "win_loss"),
            DocumentKey::LastRun => write!(f, "state/last_run"),
        }
    }
}

impl FromStr for DocumentKey {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches(".json");
        let invalid = || StorageError::InvalidKey(s.to_string());
        match s.split_once('/') {
            None if s == "league" => Ok(DocumentKey::LatestLeague),
            None if s == "players" => Ok(DocumentKey::Roster),
            None if s == "matches" => Ok(DocumentKey::MatchIndex),
            None if s == "win_loss" => Ok(DocumentKey::WinLoss),
            Some(("state", "last_run")) => Ok(DocumentKey::LastRun),
            Some(("players", id)) if is_file_stem(id) => {
                Ok(DocumentKey::Player(SteamId::from(id)))
            }
            Some(("matches", id)) => id.parse().map(DocumentKey::Match).map_err(|_| invalid()),
            Some(("league", id)) => id.parse().map(DocumentKey::League).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

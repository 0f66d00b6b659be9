//! Player ratings.
//!
//! A [`RankingAdapter`] is fed league-to-date statistics and match results
//! one match at a time, in ascending match order, and keeps its own state
//! between calls. [`EloRanking`] is the bundled team Elo implementation.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{BySide, MatchId, MatchOutcome, PlayerRating, QueryType, SteamId, StatBundle};

/// Elo parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Rating given to a player on first appearance.
    pub initial_rating: f64,
    pub k_factor: f64,
    /// Rating difference at which the stronger team is expected to win ten to one.
    pub scale: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            initial_rating: 1500.0,
            k_factor: 32.0,
            scale: 400.0,
        }
    }
}

/// Stateful rating function over an ordered match sequence.
pub trait RankingAdapter: Send {
    /// Adapter name for logging.
    fn name(&self) -> &'static str;

    /// Replace all state with previously published ratings.
    fn seed(&mut self, ratings: &[PlayerRating]);

    /// Fold one match into the ratings and return the table as of that
    /// match, best first.
    fn rate(
        &mut self,
        match_id: MatchId,
        league: &BySide<StatBundle>,
        outcomes: &[MatchOutcome],
    ) -> Vec<PlayerRating>;
}

/// Team Elo: a team's strength is the mean rating of its players, and every
/// player moves by the team's `k * (score - expected)`.
#[derive(Debug, Clone)]
pub struct EloRanking {
    config: RankingConfig,
    ratings: HashMap<SteamId, PlayerRating>,
}

impl EloRanking {
    pub fn new(config: RankingConfig) -> Self {
        Self {
            config,
            ratings: HashMap::new(),
        }
    }

    pub fn rating(&self, steam_id: &SteamId) -> Option<f64> {
        self.ratings.get(steam_id).map(|r| r.rating)
    }

    fn entry(&mut self, steam_id: &SteamId) -> &mut PlayerRating {
        let initial = self.config.initial_rating;
        self.ratings
            .entry(steam_id.clone())
            .or_insert_with(|| PlayerRating {
                steam_id: steam_id.clone(),
                rating: initial,
                matches: 0,
            })
    }

    fn strength(&mut self, team: &[&MatchOutcome]) -> f64 {
        let total: f64 = team.iter().map(|o| self.entry(&o.steam_id).rating).sum();
        total / team.len() as f64
    }

    fn expected_score(&self, rating: f64, opponent: f64) -> f64 {
        1.0 / (1.0 + 10f64.powf((opponent - rating) / self.config.scale))
    }

    fn table(&self) -> Vec<PlayerRating> {
        let mut table: Vec<PlayerRating> = self.ratings.values().cloned().collect();
        table.sort_by(|a, b| {
            b.rating
                .total_cmp(&a.rating)
                .then_with(|| a.steam_id.cmp(&b.steam_id))
        });
        table
    }
}

impl RankingAdapter for EloRanking {
    fn name(&self) -> &'static str {
        "elo"
    }

    fn seed(&mut self, ratings: &[PlayerRating]) {
        self.ratings = ratings
            .iter()
            .map(|r| (r.steam_id.clone(), r.clone()))
            .collect();
    }

    fn rate(
        &mut self,
        match_id: MatchId,
        league: &BySide<StatBundle>,
        outcomes: &[MatchOutcome],
    ) -> Vec<PlayerRating> {
        for (_, bundle) in league.iter() {
            for row in bundle.get(QueryType::IndividualTotal) {
                if let Some(steam_id) = &row.steam_id {
                    self.entry(steam_id);
                }
            }
        }

        let mut teams: BTreeMap<u8, Vec<&MatchOutcome>> = BTreeMap::new();
        for outcome in outcomes {
            teams.entry(outcome.team).or_default().push(outcome);
        }

        if teams.len() != 2 {
            if !outcomes.is_empty() {
                warn!(
                    "Match {} has {} teams in its results; ratings unchanged",
                    match_id,
                    teams.len()
                );
            }
            return self.table();
        }

        let mut sides = teams.into_values();
        let (Some(team_a), Some(team_b)) = (sides.next(), sides.next()) else {
            return self.table();
        };

        let strength_a = self.strength(&team_a);
        let strength_b = self.strength(&team_b);
        let score_a = team_a.iter().map(|o| o.score()).sum::<f64>() / team_a.len() as f64;
        let delta = self.config.k_factor * (score_a - self.expected_score(strength_a, strength_b));

        for (team, change) in [(&team_a, delta), (&team_b, -delta)] {
            for outcome in team.iter() {
                let rating = self.entry(&outcome.steam_id);
                rating.rating += change;
                rating.matches += 1;
            }
        }

        debug!("Rated match {}: team delta {:.2}", match_id, delta);
        self.table()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlayerStatRow;

    fn outcome(steam_id: &str, team: u8, result: i8) -> MatchOutcome {
        MatchOutcome {
            match_id: MatchId::new(1),
            steam_id: SteamId::from(steam_id),
            team,
            result,
        }
    }

    fn no_stats() -> BySide<StatBundle> {
        BySide::from_fn(|_| StatBundle::new())
    }

    #[test]
    fn test_even_teams_move_by_half_k() {
        let mut elo = EloRanking::new(RankingConfig::default());
        let table = elo.rate(
            MatchId::new(1),
            &no_stats(),
            &[
                outcome("a", 0, 1),
                outcome("b", 0, 1),
                outcome("c", 1, -1),
                outcome("d", 1, -1),
            ],
        );

        assert_eq!(table.len(), 4);
        assert_eq!(table[0].steam_id, SteamId::from("a"));
        assert_eq!(table[0].rating, 1516.0);
        assert_eq!(table[0].matches, 1);
        assert_eq!(elo.rating(&SteamId::from("d")), Some(1484.0));
    }

    #[test]
    fn test_ratings_are_zero_sum() {
        let mut elo = EloRanking::new(RankingConfig::default());
        elo.seed(&[PlayerRating {
            steam_id: SteamId::from("a"),
            rating: 1700.0,
            matches: 12,
        }]);

        let table = elo.rate(
            MatchId::new(2),
            &no_stats(),
            &[outcome("a", 0, -1), outcome("b", 1, 1)],
        );
        let total: f64 = table.iter().map(|r| r.rating).sum();
        assert!((total - 3200.0).abs() < 1e-9);

        // The upset costs the favourite more than half of k.
        let a = elo.rating(&SteamId::from("a")).unwrap();
        assert!(1700.0 - a > 16.0);
    }

    #[test]
    fn test_draw_between_equals_changes_nothing() {
        let mut elo = EloRanking::new(RankingConfig::default());
        let table = elo.rate(
            MatchId::new(1),
            &no_stats(),
            &[outcome("a", 0, 0), outcome("b", 1, 0)],
        );
        assert!(table.iter().all(|r| r.rating == 1500.0 && r.matches == 1));
    }

    #[test]
    fn test_league_players_without_results_are_listed() {
        let mut league = no_stats();
        league.survivor.push(
            QueryType::IndividualTotal,
            PlayerStatRow::for_player(SteamId::from("spectator")),
        );

        let mut elo = EloRanking::new(RankingConfig::default());
        let table = elo.rate(MatchId::new(1), &league, &[]);

        assert_eq!(table.len(), 1);
        assert_eq!(table[0].rating, 1500.0);
        assert_eq!(table[0].matches, 0);
    }

    #[test]
    fn test_single_team_results_are_ignored() {
        let mut elo = EloRanking::new(RankingConfig::default());
        let table = elo.rate(MatchId::new(1), &no_stats(), &[outcome("a", 0, 1)]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_seed_replaces_state() {
        let mut elo = EloRanking::new(RankingConfig::default());
        elo.rate(
            MatchId::new(1),
            &no_stats(),
            &[outcome("a", 0, 1), outcome("b", 1, -1)],
        );

        elo.seed(&[]);
        assert_eq!(elo.rating(&SteamId::from("a")), None);
    }

    #[test]
    fn test_ranking_config_defaults_from_partial_toml() {
        let config: RankingConfig = toml::from_str("k_factor = 16.0").unwrap();
        assert_eq!(config.k_factor, 16.0);
        assert_eq!(config.initial_rating, 1500.0);
        assert_eq!(config.scale, 400.0);
    }
}

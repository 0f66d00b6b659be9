//! League-wide summaries derived from match results.
//!
//! Unlike player documents these are rebuilt from the full result set on
//! every run:
//! - the roster of known players
//! - the match index (teams and winner per match)
//! - the with/against win-loss matrix

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::calculate;
use crate::models::{
    MatchId, MatchOutcome, MatchSummary, MatchWinner, RosterEntry, SteamId, WinLossMatrix,
};

/// Every player with round records or a recorded result, by steam id.
pub fn roster(
    histories: &BTreeMap<SteamId, Vec<MatchId>>,
    outcomes: &[MatchOutcome],
) -> Vec<RosterEntry> {
    let mut played: BTreeMap<&SteamId, BTreeSet<MatchId>> = BTreeMap::new();
    for (steam_id, matches) in histories {
        played.entry(steam_id).or_default().extend(matches.iter().copied());
    }
    for outcome in outcomes {
        played
            .entry(&outcome.steam_id)
            .or_default()
            .insert(outcome.match_id);
    }

    played
        .into_iter()
        .filter_map(|(steam_id, matches)| {
            Some(RosterEntry {
                steam_id: steam_id.clone(),
                matches: matches.len() as u32,
                first_match: *matches.first()?,
                last_match: *matches.last()?,
            })
        })
        .collect()
}

/// One outcome per player per match, grouped by match.
fn by_match(outcomes: &[MatchOutcome]) -> BTreeMap<MatchId, Vec<&MatchOutcome>> {
    let mut grouped: BTreeMap<MatchId, Vec<&MatchOutcome>> = BTreeMap::new();
    for outcome in outcomes {
        let entries = grouped.entry(outcome.match_id).or_default();
        if entries.iter().any(|o| o.steam_id == outcome.steam_id) {
            debug!(
                "Ignoring repeated result for {} in match {}",
                outcome.steam_id, outcome.match_id
            );
            continue;
        }
        entries.push(outcome);
    }
    grouped
}

/// Teams and winner of every match with results for both teams, ascending.
pub fn match_index(outcomes: &[MatchOutcome]) -> Vec<MatchSummary> {
    let mut index = Vec::new();
    for (match_id, entries) in by_match(outcomes) {
        let team = |t: u8| -> Vec<&MatchOutcome> {
            entries.iter().copied().filter(|o| o.team == t).collect()
        };
        let (team_a, team_b) = (team(0), team(1));
        let (Some(a), Some(b)) = (team_a.first(), team_b.first()) else {
            debug!("Match {} lacks results for both teams", match_id);
            continue;
        };

        let winner = match a.result.signum().cmp(&b.result.signum()) {
            std::cmp::Ordering::Greater => MatchWinner::TeamA,
            std::cmp::Ordering::Less => MatchWinner::TeamB,
            std::cmp::Ordering::Equal => MatchWinner::Draw,
        };
        let ids = |team: &[&MatchOutcome]| -> Vec<SteamId> {
            let mut ids: Vec<SteamId> = team.iter().map(|o| o.steam_id.clone()).collect();
            ids.sort();
            ids
        };

        index.push(MatchSummary {
            match_id,
            team_a: ids(&team_a),
            team_b: ids(&team_b),
            winner,
        });
    }
    index
}

/// Head-to-head results for every pair of players who shared a match.
pub fn win_loss_matrix(outcomes: &[MatchOutcome]) -> WinLossMatrix {
    let mut matrix = WinLossMatrix::default();
    for entries in by_match(outcomes).values() {
        for player in entries {
            for other in entries {
                if player.steam_id == other.steam_id {
                    continue;
                }
                let table = if player.team == other.team {
                    &mut matrix.with
                } else {
                    &mut matrix.against
                };
                table
                    .entry(player.steam_id.clone())
                    .or_default()
                    .entry(other.steam_id.clone())
                    .or_default()
                    .record(player.result);
            }
        }
    }

    for row in matrix.with.values_mut().chain(matrix.against.values_mut()) {
        for record in row.values_mut() {
            record.win_rate = calculate::win_rate(record.wins, record.losses, record.draws);
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixtures::outcome;
    use pretty_assertions::assert_eq;

    fn ids(raw: &[&str]) -> Vec<SteamId> {
        raw.iter().map(|s| SteamId::from(*s)).collect()
    }

    /// Match 1: a+b beat c+d. Match 2: a+c draw with b+d.
    fn results() -> Vec<MatchOutcome> {
        vec![
            outcome(1, "b", 0, 1),
            outcome(1, "a", 0, 1),
            outcome(1, "c", 1, -1),
            outcome(1, "d", 1, -1),
            outcome(2, "a", 0, 0),
            outcome(2, "c", 0, 0),
            outcome(2, "b", 1, 0),
            outcome(2, "d", 1, 0),
        ]
    }

    #[test]
    fn test_roster_merges_records_and_results() {
        let histories = BTreeMap::from([
            (SteamId::from("a"), vec![MatchId::new(1), MatchId::new(3)]),
            (SteamId::from("z"), vec![MatchId::new(4)]),
        ]);

        let roster = roster(&histories, &results());
        let steam_ids: Vec<SteamId> = roster.iter().map(|e| e.steam_id.clone()).collect();
        assert_eq!(steam_ids, ids(&["a", "b", "c", "d", "z"]));

        let a = &roster[0];
        assert_eq!(a.matches, 3);
        assert_eq!(a.first_match, MatchId::new(1));
        assert_eq!(a.last_match, MatchId::new(3));
        assert_eq!(roster[4].matches, 1);
    }

    #[test]
    fn test_match_index() {
        let mut outcomes = results();
        // Only one team reported: left out of the index.
        outcomes.push(outcome(3, "a", 0, 1));

        let index = match_index(&outcomes);
        assert_eq!(index.len(), 2);

        assert_eq!(index[0].match_id, MatchId::new(1));
        assert_eq!(index[0].team_a, ids(&["a", "b"]));
        assert_eq!(index[0].team_b, ids(&["c", "d"]));
        assert_eq!(index[0].winner, MatchWinner::TeamA);

        assert_eq!(index[1].winner, MatchWinner::Draw);
    }

    #[test]
    fn test_match_index_team_b_wins() {
        let index = match_index(&[outcome(5, "a", 0, -1), outcome(5, "b", 1, 1)]);
        assert_eq!(index[0].winner, MatchWinner::TeamB);
    }

    #[test]
    fn test_win_loss_matrix() {
        let matrix = win_loss_matrix(&results());
        let (a, b, c, d) = (
            SteamId::from("a"),
            SteamId::from("b"),
            SteamId::from("c"),
            SteamId::from("d"),
        );

        let a_with_b = matrix.with(&a, &b).unwrap();
        assert_eq!((a_with_b.wins, a_with_b.losses, a_with_b.draws), (1, 0, 0));
        assert_eq!(a_with_b.win_rate, 1.0);

        // Opponents in match 1, teammates in match 2.
        let c_against_a = matrix.against(&c, &a).unwrap();
        assert_eq!((c_against_a.wins, c_against_a.losses), (0, 1));
        let a_with_c = matrix.with(&a, &c).unwrap();
        assert_eq!(a_with_c.draws, 1);
        assert_eq!(a_with_c.win_rate, 0.0);

        // a and b were opponents in match 2 only, a draw.
        let a_against_b = matrix.against(&a, &b).unwrap();
        assert_eq!(a_against_b.played(), 1);
        assert_eq!(a_against_b.draws, 1);

        assert!(matrix.with(&a, &a).is_none());
        assert!(matrix.with(&a, &d).is_none());
    }

    #[test]
    fn test_repeated_results_count_once() {
        let mut outcomes = results();
        outcomes.push(outcome(1, "a", 0, 1));

        let matrix = win_loss_matrix(&outcomes);
        let record = matrix.with(&SteamId::from("a"), &SteamId::from("b")).unwrap();
        assert_eq!(record.played(), 1);
    }
}

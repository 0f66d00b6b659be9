//! In-memory fact source over round records.
//!
//! Reductions, per column within each group:
//! - `total`: sum
//! - `average`: sum / rounds played
//! - `stddev`: population spread of the per-record rate `value / rounds`
//! - `percentOfTeam`: mean over records of `100 * value / team total` for
//!   the same (match, round, team); 0 where the team total is 0
//!
//! The round-count column is reported as rounds played, or 0 under `stddev`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{FactSource, SourceError};
use crate::calculate;
use crate::models::{MatchId, MatchOutcome, PlayerStatRow, RoundRecord, SteamId};
use crate::query::{AggregationMode, GroupingColumn, QueryDescription};
use crate::storage::JsonlReader;

type TeamRoundKey = (MatchId, u32, u8);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
struct GroupKey {
    match_id: Option<MatchId>,
    round: Option<u32>,
    team: Option<u8>,
    steam_id: Option<SteamId>,
}

impl GroupKey {
    fn of(record: &RoundRecord, query: &QueryDescription) -> Self {
        Self {
            match_id: query
                .groups_by(GroupingColumn::Match)
                .then_some(record.match_id),
            round: query.groups_by(GroupingColumn::Round).then_some(record.round),
            team: query.groups_by(GroupingColumn::Team).then_some(record.team),
            steam_id: query
                .groups_by(GroupingColumn::Player)
                .then(|| record.steam_id.clone()),
        }
    }

    fn into_row(self) -> PlayerStatRow {
        PlayerStatRow {
            steam_id: self.steam_id,
            match_id: self.match_id,
            round: self.round,
            team: self.team,
            values: BTreeMap::new(),
        }
    }
}

/// Fact source holding every record in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<RoundRecord>,
    outcomes: Vec<MatchOutcome>,
}

impl MemorySource {
    pub fn new(records: Vec<RoundRecord>, outcomes: Vec<MatchOutcome>) -> Self {
        Self { records, outcomes }
    }

    /// Load round records and, if present, match outcomes from JSONL files.
    pub fn from_jsonl(
        rounds_path: PathBuf,
        outcomes_path: Option<PathBuf>,
    ) -> Result<Self, SourceError> {
        let records = JsonlReader::<RoundRecord>::new(rounds_path).read_all(false)?;

        let outcomes = match outcomes_path {
            Some(path) => {
                let reader = JsonlReader::<MatchOutcome>::new(path);
                if reader.exists() {
                    reader.read_all(false)?
                } else {
                    warn!(
                        "Outcomes file {:?} not found; ratings will not move",
                        reader.path()
                    );
                    Vec::new()
                }
            }
            None => Vec::new(),
        };

        info!(
            "Loaded {} round records and {} match outcomes",
            records.len(),
            outcomes.len()
        );
        Ok(Self::new(records, outcomes))
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn run_query(&self, query: &QueryDescription) -> Vec<PlayerStatRow> {
        let in_scope: Vec<&RoundRecord> = self
            .records
            .iter()
            .filter(|r| r.side == query.side && query.range.contains(r.match_id))
            .collect();

        let team_totals = if query.mode == AggregationMode::PercentOfTeam {
            team_totals(&in_scope, query)
        } else {
            HashMap::new()
        };

        let mut groups: BTreeMap<GroupKey, Vec<&RoundRecord>> = BTreeMap::new();
        for record in &in_scope {
            groups
                .entry(GroupKey::of(record, query))
                .or_default()
                .push(*record);
        }
        if query.grouping.is_empty() {
            groups.entry(GroupKey::default()).or_default();
        }

        let mut rows = Vec::with_capacity(groups.len());
        for (key, records) in groups {
            let rounds: f64 = records.iter().map(|r| r.rounds()).sum();
            // Players who never took the field are not part of the population.
            if query.groups_by(GroupingColumn::Player) && rounds <= 0.0 {
                continue;
            }

            let mut row = key.into_row();
            for column in &query.columns {
                let value = reduce(query.mode, column.name(), &records, &team_totals);
                row.set(column.name(), value);
            }
            let rounds_value = match query.mode {
                AggregationMode::Stddev => 0.0,
                _ => rounds,
            };
            row.set(query.round_count_column, rounds_value);
            rows.push(row);
        }
        rows
    }
}

fn team_totals<'a>(
    records: &[&RoundRecord],
    query: &'a QueryDescription,
) -> HashMap<TeamRoundKey, BTreeMap<&'a str, f64>> {
    let mut totals: HashMap<TeamRoundKey, BTreeMap<&'a str, f64>> = HashMap::new();
    for record in records {
        let entry = totals
            .entry((record.match_id, record.round, record.team))
            .or_default();
        for column in &query.columns {
            *entry.entry(column.name()).or_insert(0.0) += record.value(column.name());
        }
    }
    totals
}

fn reduce(
    mode: AggregationMode,
    column: &str,
    records: &[&RoundRecord],
    team_totals: &HashMap<TeamRoundKey, BTreeMap<&str, f64>>,
) -> f64 {
    match mode {
        AggregationMode::Total => records.iter().map(|r| r.value(column)).sum(),
        AggregationMode::Average => {
            let rounds: f64 = records.iter().map(|r| r.rounds()).sum();
            if rounds > 0.0 {
                records.iter().map(|r| r.value(column)).sum::<f64>() / rounds
            } else {
                0.0
            }
        }
        AggregationMode::Stddev => {
            let rates: Vec<f64> = records
                .iter()
                .filter(|r| r.rounds() > 0.0)
                .map(|r| r.value(column) / r.rounds())
                .collect();
            calculate::stddev(&rates)
        }
        AggregationMode::PercentOfTeam => {
            let shares: Vec<f64> = records
                .iter()
                .map(|r| {
                    let total = team_totals
                        .get(&(r.match_id, r.round, r.team))
                        .and_then(|t| t.get(column))
                        .copied()
                        .unwrap_or(0.0);
                    if total == 0.0 {
                        0.0
                    } else {
                        100.0 * r.value(column) / total
                    }
                })
                .collect();
            calculate::average(&shares)
        }
    }
}

#[async_trait]
impl FactSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn execute(&self, query: &QueryDescription) -> Result<Vec<PlayerStatRow>, SourceError> {
        let rows = self.run_query(query);
        debug!("{} -> {} rows", query, rows.len());
        Ok(rows)
    }

    async fn match_ids(&self) -> Result<Vec<MatchId>, SourceError> {
        let ids: BTreeSet<MatchId> = self
            .records
            .iter()
            .map(|r| r.match_id)
            .chain(self.outcomes.iter().map(|o| o.match_id))
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn player_matches(&self) -> Result<BTreeMap<SteamId, Vec<MatchId>>, SourceError> {
        let mut played: BTreeMap<SteamId, BTreeSet<MatchId>> = BTreeMap::new();
        let pairs = self
            .records
            .iter()
            .map(|r| (&r.steam_id, r.match_id))
            .chain(self.outcomes.iter().map(|o| (&o.steam_id, o.match_id)));
        for (steam_id, match_id) in pairs {
            played.entry(steam_id.clone()).or_default().insert(match_id);
        }
        Ok(played
            .into_iter()
            .map(|(steam_id, ids)| (steam_id, ids.into_iter().collect()))
            .collect())
    }

    async fn match_outcomes(&self, match_id: MatchId) -> Result<Vec<MatchOutcome>, SourceError> {
        Ok(self
            .outcomes
            .iter()
            .filter(|o| o.match_id == match_id)
            .cloned()
            .collect())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{outcome, round};
    use super::*;
    use crate::models::{MatchRange, Side, StatColumn};
    use crate::query::{build, AggregationMode, GroupingColumn};

    fn source() -> MemorySource {
        MemorySource::new(
            vec![
                round(1, 1, 0, "a", Side::Survivor, &[("plyCommon", 10.0)]),
                round(1, 1, 0, "b", Side::Survivor, &[("plyCommon", 30.0)]),
                round(1, 2, 0, "a", Side::Survivor, &[("plyCommon", 20.0)]),
                round(1, 2, 0, "b", Side::Survivor, &[("plyCommon", 20.0)]),
                round(2, 1, 1, "a", Side::Survivor, &[("plyCommon", 6.0)]),
                round(2, 1, 0, "c", Side::Infected, &[("infSpawns", 3.0)]),
            ],
            vec![outcome(1, "a", 0, 1), outcome(2, "c", 0, -1)],
        )
    }

    fn query(mode: AggregationMode, grouping: &[GroupingColumn], range: MatchRange) -> QueryDescription {
        build(Side::Survivor, &[StatColumn::CommonKills], mode, grouping, range).unwrap()
    }

    #[tokio::test]
    async fn test_total_by_player() {
        let rows = source()
            .execute(&query(
                AggregationMode::Total,
                &[GroupingColumn::Player],
                MatchRange::single(MatchId::new(1)),
            ))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].steam_id, Some(SteamId::from("a")));
        assert_eq!(rows[0].get("plyCommon"), Some(30.0));
        assert_eq!(rows[0].get("plyTotalRounds"), Some(2.0));
        assert_eq!(rows[1].get("plyCommon"), Some(50.0));
    }

    #[tokio::test]
    async fn test_average_divides_by_rounds() {
        let rows = source()
            .execute(&query(
                AggregationMode::Average,
                &[GroupingColumn::Player],
                MatchRange::to_date(MatchId::new(2)),
            ))
            .await
            .unwrap();

        // a: (10 + 20 + 6) / 3
        assert_eq!(rows[0].get("plyCommon"), Some(12.0));
        assert_eq!(rows[0].get("plyTotalRounds"), Some(3.0));
    }

    #[tokio::test]
    async fn test_stddev_of_rates() {
        let rows = source()
            .execute(&query(
                AggregationMode::Stddev,
                &[],
                MatchRange::single(MatchId::new(1)),
            ))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        // rates 10, 30, 20, 20: mean 20, population variance 50
        let spread = rows[0].get("plyCommon").unwrap();
        assert!((spread - 50f64.sqrt()).abs() < 1e-12);
        assert_eq!(rows[0].get("plyTotalRounds"), Some(0.0));
    }

    #[tokio::test]
    async fn test_percent_of_team() {
        let rows = source()
            .execute(&query(
                AggregationMode::PercentOfTeam,
                &[GroupingColumn::Player],
                MatchRange::single(MatchId::new(1)),
            ))
            .await
            .unwrap();

        // a: round 1 10/40 = 25%, round 2 20/40 = 50%
        assert_eq!(rows[0].get("plyCommon"), Some(37.5));
        assert_eq!(rows[1].get("plyCommon"), Some(62.5));
    }

    #[tokio::test]
    async fn test_round_grouping_carries_identity() {
        let rows = source()
            .execute(&query(
                AggregationMode::PercentOfTeam,
                &[
                    GroupingColumn::Match,
                    GroupingColumn::Round,
                    GroupingColumn::Team,
                    GroupingColumn::Player,
                ],
                MatchRange::single(MatchId::new(1)),
            ))
            .await
            .unwrap();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].match_id, Some(MatchId::new(1)));
        assert_eq!(rows[0].round, Some(1));
        assert_eq!(rows[0].team, Some(0));
        assert_eq!(rows[0].get("plyCommon"), Some(25.0));
    }

    #[tokio::test]
    async fn test_ungrouped_empty_range_yields_zero_row() {
        let rows = source()
            .execute(&query(
                AggregationMode::Total,
                &[],
                MatchRange::single(MatchId::new(99)),
            ))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("plyCommon"), Some(0.0));
        assert!(rows[0].steam_id.is_none());
    }

    #[tokio::test]
    async fn test_grouped_excludes_non_participants() {
        let mut records = vec![round(1, 1, 0, "a", Side::Survivor, &[("plyCommon", 4.0)])];
        records.push(round(
            1,
            1,
            0,
            "bench",
            Side::Survivor,
            &[("plyTotalRounds", 0.0), ("plyCommon", 0.0)],
        ));
        let source = MemorySource::new(records, vec![]);

        let rows = source
            .execute(&query(
                AggregationMode::Total,
                &[GroupingColumn::Player],
                MatchRange::single(MatchId::new(1)),
            ))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].steam_id, Some(SteamId::from("a")));
    }

    #[tokio::test]
    async fn test_enumerators() {
        let source = source();
        assert_eq!(
            source.match_ids().await.unwrap(),
            vec![MatchId::new(1), MatchId::new(2)]
        );

        let played = source.player_matches().await.unwrap();
        assert_eq!(
            played[&SteamId::from("a")],
            vec![MatchId::new(1), MatchId::new(2)]
        );
        assert_eq!(played[&SteamId::from("c")], vec![MatchId::new(2)]);

        let outcomes = source.match_outcomes(MatchId::new(1)).await.unwrap();
        assert_eq!(outcomes.len(), 1);
    }

    #[tokio::test]
    async fn test_from_jsonl() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let rounds = temp_dir.path().join("rounds.jsonl");
        std::fs::write(
            &rounds,
            r#"{"matchId":1,"round":1,"team":0,"steamId":"a","side":"survivor","plyTotalRounds":1,"plyCommon":5}
{"matchId":1,"round":1,"team":1,"steamId":"b","side":"infected","infTotalRounds":1,"infSpawns":2}
"#,
        )
        .unwrap();

        let source =
            MemorySource::from_jsonl(rounds, Some(temp_dir.path().join("missing.jsonl"))).unwrap();
        assert_eq!(source.record_count(), 2);
        assert!(source.match_outcomes(MatchId::new(1)).await.unwrap().is_empty());
    }

    #[test]
    fn test_league_fixture_shape() {
        let source = fixtures::league(3);
        // 3 matches x 2 rounds x 4 players
        assert_eq!(source.record_count(), 24);
    }
}

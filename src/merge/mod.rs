//! Incremental merge of player histories.
//!
//! Pure functions: callers own reading and writing persisted documents.
//! Every merged sequence holds at most one row per match id and is sorted
//! ascending by match id.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::{BySide, MatchId, PlayerHistory, PlayerStatRow, Scope, StatBundle};

/// Which row survives when both sides of a merge carry the same match id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Persisted rows are never replaced.
    #[default]
    KeepExisting,
    /// Freshly computed rows replace persisted rows for the same match.
    PreferIncoming,
}

/// Merge two row sequences.
pub fn merge_rows(
    existing: &[PlayerStatRow],
    incoming: &[PlayerStatRow],
    policy: MergePolicy,
) -> Vec<PlayerStatRow> {
    let (first, second) = match policy {
        MergePolicy::KeepExisting => (existing, incoming),
        MergePolicy::PreferIncoming => (incoming, existing),
    };

    let mut seen: BTreeSet<Option<MatchId>> = BTreeSet::new();
    let mut merged = Vec::with_capacity(existing.len() + incoming.len());
    for row in first.iter().chain(second) {
        if seen.insert(row.match_id) {
            merged.push(row.clone());
        }
    }
    merged.sort_by_key(|row| row.match_id);
    merged
}

/// Merge every query-type sequence of two bundles.
pub fn merge_bundle(existing: &StatBundle, incoming: &StatBundle, policy: MergePolicy) -> StatBundle {
    let query_types: BTreeSet<_> = existing
        .query_types()
        .chain(incoming.query_types())
        .collect();

    let mut merged = StatBundle::new();
    for query_type in query_types {
        merged.insert(
            query_type,
            merge_rows(existing.get(query_type), incoming.get(query_type), policy),
        );
    }
    merged
}

/// Merge a freshly computed history into a persisted one.
pub fn merge_histories(
    existing: &PlayerHistory,
    incoming: &PlayerHistory,
    policy: MergePolicy,
) -> PlayerHistory {
    let mut merged = PlayerHistory::new();
    for scope in Scope::ALL {
        let (old, new) = (existing.scope(scope), incoming.scope(scope));
        *merged.scope_mut(scope) = BySide::from_fn(|side| {
            merge_bundle(old.get(side), new.get(side), policy)
        });
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QueryType, Side, SteamId};
    use pretty_assertions::assert_eq;

    fn row(match_id: u64, value: f64) -> PlayerStatRow {
        let mut row = PlayerStatRow::for_player(SteamId::from("p")).with_match(MatchId::new(match_id));
        row.set("plyCommon", value);
        row
    }

    fn history(rows: &[(u64, f64)]) -> PlayerHistory {
        let mut history = PlayerHistory::new();
        for scope in Scope::ALL {
            for side in Side::ALL {
                let bundle = history.scope_mut(scope).get_mut(side);
                for (match_id, value) in rows {
                    bundle.push(QueryType::IndividualTotal, row(*match_id, *value));
                    bundle.push(QueryType::IndividualZScore, row(*match_id, -*value));
                }
            }
        }
        history
    }

    fn match_ids(rows: &[PlayerStatRow]) -> Vec<u64> {
        rows.iter().filter_map(|r| r.match_id).map(MatchId::get).collect()
    }

    #[test]
    fn test_merge_rows_appends_and_sorts() {
        let merged = merge_rows(
            &[row(3, 1.0), row(5, 1.0)],
            &[row(4, 2.0), row(1, 2.0)],
            MergePolicy::KeepExisting,
        );
        assert_eq!(match_ids(&merged), vec![1, 3, 4, 5]);
    }

    #[test]
    fn test_keep_existing_is_first_write_wins() {
        let merged = merge_rows(&[row(2, 1.0)], &[row(2, 9.0)], MergePolicy::KeepExisting);
        assert_eq!(merged, vec![row(2, 1.0)]);
    }

    #[test]
    fn test_prefer_incoming_replaces() {
        let merged = merge_rows(
            &[row(1, 1.0), row(2, 1.0)],
            &[row(2, 9.0)],
            MergePolicy::PreferIncoming,
        );
        assert_eq!(merged, vec![row(1, 1.0), row(2, 9.0)]);
    }

    #[test]
    fn test_incoming_duplicates_collapse() {
        let merged = merge_rows(&[], &[row(7, 1.0), row(7, 2.0)], MergePolicy::KeepExisting);
        assert_eq!(merged, vec![row(7, 1.0)]);
    }

    #[test]
    fn test_placeholders_merge_by_match_id() {
        let merged = merge_rows(
            &[PlayerStatRow::placeholder(MatchId::new(1))],
            &[PlayerStatRow::placeholder(MatchId::new(1)), row(6, 3.0)],
            MergePolicy::KeepExisting,
        );
        assert_eq!(merged.len(), 2);
        assert!(merged[0].is_placeholder());
    }

    #[test]
    fn test_merge_histories_is_idempotent() {
        let existing = history(&[(1, 1.0), (2, 2.0), (4, 4.0)]);
        let incoming = history(&[(3, 3.0), (4, 40.0), (5, 5.0)]);

        for policy in [MergePolicy::KeepExisting, MergePolicy::PreferIncoming] {
            let once = merge_histories(&existing, &incoming, policy);
            let twice = merge_histories(&once, &incoming, policy);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_merge_histories_unique_and_ascending() {
        let existing = history(&[(9, 1.0), (2, 2.0)]);
        let incoming = history(&[(2, 5.0), (1, 3.0), (12, 3.0)]);

        let merged = merge_histories(&existing, &incoming, MergePolicy::KeepExisting);
        for scope in Scope::ALL {
            for (_, bundle) in merged.scope(scope).iter() {
                for (_, rows) in bundle.iter() {
                    let ids = match_ids(rows);
                    let mut expected = ids.clone();
                    expected.sort_unstable();
                    expected.dedup();
                    assert_eq!(ids, expected);
                }
            }
        }
        let totals = merged.single.survivor.get(QueryType::IndividualTotal);
        assert_eq!(match_ids(totals), vec![1, 2, 9, 12]);
        assert_eq!(totals[1].get("plyCommon"), Some(2.0));
    }

    #[test]
    fn test_merge_into_empty_history() {
        let incoming = history(&[(1, 1.0), (2, 2.0)]);
        let merged = merge_histories(&PlayerHistory::new(), &incoming, MergePolicy::KeepExisting);
        assert_eq!(merged, incoming);
    }

    #[test]
    fn test_merge_policy_serialization() {
        assert_eq!(
            serde_json::to_string(&MergePolicy::PreferIncoming).unwrap(),
            "\"prefer-incoming\""
        );
        let parsed: MergePolicy = serde_json::from_str("\"keep-existing\"").unwrap();
        assert_eq!(parsed, MergePolicy::KeepExisting);
    }
}

//! Trailing-window ("recent form") aggregation per player.
//!
//! For a player's ascending match history and an index `i`, the window is
//! the last `size` matches ending at `history[i]`. Until the window is full
//! the player gets a placeholder row carrying only the match id.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tokio::task::JoinSet;
use tracing::{debug, info};

use super::{AggregateError, Aggregator};
use crate::models::{BySide, MatchId, MatchRange, PlayerStatRow, QueryType, SteamId, StatBundle};

/// Match range of the window ending at `history[index]`, or `None` while
/// fewer than `size` matches have been played.
pub fn window_range(history: &[MatchId], index: usize, size: usize) -> Option<MatchRange> {
    if size == 0 || index >= history.len() || index + 1 < size {
        return None;
    }
    Some(MatchRange::between(history[index + 1 - size], history[index]))
}

/// Placeholder rows for every player query type on both sides.
pub fn placeholder_bundle(match_id: MatchId) -> BySide<StatBundle> {
    BySide::from_fn(|_| {
        let mut bundle = StatBundle::new();
        for query_type in QueryType::PLAYER {
            bundle.push(query_type, PlayerStatRow::placeholder(match_id));
        }
        bundle
    })
}

struct PlannedWindow {
    steam_id: SteamId,
    end: MatchId,
    range: Option<MatchRange>,
}

/// Recent-form bundles for every player.
///
/// `histories` holds each player's full ascending match history. With
/// `targets`, only windows ending at one of those matches are computed.
/// Players with nothing to compute are absent from the result. Windows shared
/// by several players are aggregated once.
pub async fn recent_form(
    aggregator: &Aggregator,
    window_size: usize,
    histories: &BTreeMap<SteamId, Vec<MatchId>>,
    targets: Option<&BTreeSet<MatchId>>,
) -> Result<BTreeMap<SteamId, BySide<StatBundle>>, AggregateError> {
    let mut plan = Vec::new();
    for (steam_id, history) in histories {
        for (index, end) in history.iter().enumerate() {
            if targets.map_or(false, |t| !t.contains(end)) {
                continue;
            }
            plan.push(PlannedWindow {
                steam_id: steam_id.clone(),
                end: *end,
                range: window_range(history, index, window_size),
            });
        }
    }

    let ranges: BTreeSet<MatchRange> = plan.iter().filter_map(|p| p.range).collect();
    info!(
        "Computing {} recent windows ({} distinct ranges)",
        plan.len(),
        ranges.len()
    );

    let mut tasks = JoinSet::new();
    for range in ranges {
        let aggregator = aggregator.clone();
        tasks.spawn(async move {
            aggregator
                .aggregate(range)
                .await
                .map(|bundles| (range, bundles))
                .map_err(|e| AggregateError::Window {
                    end: range.max,
                    source: Box::new(e),
                })
        });
    }

    let mut windows: HashMap<MatchRange, BySide<StatBundle>> = HashMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (range, bundles) = joined??;
        windows.insert(range, bundles);
    }

    let mut recent: BTreeMap<SteamId, BySide<StatBundle>> = BTreeMap::new();
    for planned in plan {
        let rows = match planned.range.and_then(|range| windows.get(&range)) {
            Some(bundles) => BySide::from_fn(|side| {
                bundles
                    .get(side)
                    .player_rows(&planned.steam_id, planned.end)
            }),
            None => placeholder_bundle(planned.end),
        };

        let entry = recent
            .entry(planned.steam_id)
            .or_insert_with(|| BySide::from_fn(|_| StatBundle::for_player()));
        for (side, bundle) in rows.iter() {
            for (query_type, rows) in bundle.iter() {
                entry
                    .get_mut(side)
                    .rows_mut(query_type)
                    .extend(rows.iter().cloned());
            }
        }
    }

    debug!("Recent form computed for {} players", recent.len());
    Ok(recent)
}

use crate::detector::crossing_rule;
use chrono::NaiveDate;
use configuration::Thresholds;
use core_types::{KeyNodeType, ReferenceNode};
use database::{DbError, RecordStore};

/// Finds the historical node today's key node is measured against.
///
/// Both key nodes of a phase share one candidate set: the last crossing that
/// closed a sub-cycle of that phase and the last day 1 of that phase, each
/// strictly before `date`. The most recent candidate wins, which anchors every
/// sub-cycle either to its predecessor crossing or to the start of the cycle.
pub async fn resolve_reference(
    store: &dyn RecordStore,
    asset: &str,
    date: NaiveDate,
    node: KeyNodeType,
    thresholds: &Thresholds,
) -> Result<Option<ReferenceNode>, DbError> {
    let phase = node.phase();
    let (threshold, direction) = crossing_rule(phase, thresholds);

    let crossing = store
        .find_crossing(asset, date, threshold, direction)
        .await?
        .map(|c| ReferenceNode {
            date: c.date,
            offchain_index: c.offchain_index,
            node_type: phase.crossing_node(),
        });

    let day1 = store
        .find_last_phase_day1(asset, phase, date)
        .await?
        .map(|a| ReferenceNode {
            date: a.date,
            offchain_index: a.offchain_index,
            node_type: phase.day1_node(),
        });

    Ok(select_nearest([crossing, day1].into_iter().flatten()))
}

/// Picks the candidate with the latest date. On equal dates the earlier
/// candidate is kept.
pub fn select_nearest(candidates: impl IntoIterator<Item = ReferenceNode>) -> Option<ReferenceNode> {
    candidates
        .into_iter()
        .reduce(|best, next| if next.date > best.date { next } else { best })
}

use crate::corrections::base_change;
use crate::detector::crossing_rule;
use configuration::Thresholds;
use core_types::{CrossDirection, DailyRecord, KeyNodeType, ReferenceNode, Section};
use database::{DbError, RecordStore};

/// Labels the sub-cycle a key node predicts.
///
/// Day 1 nodes predict sub-cycle 1. A crossing node of the record's own phase
/// is the Nth crossing since that phase's last day 1 and predicts sub-cycle
/// N + 1. A crossing of the other phase's threshold is labelled sub-cycle 1.
pub async fn identify_section(
    store: &dyn RecordStore,
    record: &DailyRecord,
    node: KeyNodeType,
    reference: &ReferenceNode,
    thresholds: &Thresholds,
) -> Result<Section, DbError> {
    let phase = record.phase;
    let number = if node == phase.crossing_node() {
        crossings_since_day1(store, record, thresholds).await? + 1
    } else {
        1
    };

    Ok(Section {
        number,
        description: format!("{phase} sub-cycle {number} quality"),
        change_pct: base_change(reference.offchain_index, record.offchain_index, phase),
    })
}

/// Crossings of the phase's threshold from its last day 1 through `record`.
/// Without a day 1 on file the count is taken to be 1.
async fn crossings_since_day1(
    store: &dyn RecordStore,
    record: &DailyRecord,
    thresholds: &Thresholds,
) -> Result<u32, DbError> {
    let Some(anchor) = store
        .find_last_phase_day1(&record.asset, record.phase, record.date)
        .await?
    else {
        return Ok(1);
    };

    let (threshold, direction) = crossing_rule(record.phase, thresholds);
    let window = store
        .history_between(&record.asset, anchor.date, record.date)
        .await?;
    Ok(count_crossings(&window, threshold, direction))
}

/// Counts adjacent pairs in an oldest-first window that cross `threshold`.
pub fn count_crossings(records_asc: &[DailyRecord], threshold: i64, direction: CrossDirection) -> u32 {
    records_asc
        .windows(2)
        .filter(|pair| direction.crosses(pair[0].break_index, pair[1].break_index, threshold))
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use core_types::Phase;

    #[test]
    fn counts_each_downward_pass_once() {
        let date = |d| NaiveDate::from_ymd_opt(2025, 10, d).unwrap();
        let breaks = [150, 210, 250, 180, 190, 215, 230, 190, 185];
        let window: Vec<_> = breaks
            .iter()
            .enumerate()
            .map(|(i, &b)| DailyRecord::new(date(i as u32 + 1), "ETH", Phase::Entry, i as u32 + 1, 1000, b).unwrap())
            .collect();

        assert_eq!(count_crossings(&window, 200, CrossDirection::Down), 2);
        assert_eq!(count_crossings(&window[..4], 200, CrossDirection::Down), 1);
        assert_eq!(count_crossings(&window[..1], 200, CrossDirection::Down), 0);
        assert_eq!(count_crossings(&window, 200, CrossDirection::Up), 2);
    }
}

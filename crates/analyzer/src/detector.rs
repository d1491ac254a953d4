use configuration::Thresholds;
use core_types::{CrossDirection, DailyRecord, KeyNodeType, Phase};

/// The break-index threshold and direction whose crossing closes a sub-cycle of `phase`.
pub fn crossing_rule(phase: Phase, thresholds: &Thresholds) -> (i64, CrossDirection) {
    match phase {
        Phase::Entry => (thresholds.break_upper, CrossDirection::Down),
        Phase::Exit => (thresholds.break_lower, CrossDirection::Up),
    }
}

/// Classifies a day into one of the four key nodes, if any.
///
/// Phase day 1 is checked first and needs no history, so an asset's very
/// first record can already be a day 1 node. The break-index
/// crossings compare against `previous`, the most recent earlier record by
/// date, and never fire without it.
pub fn detect_key_node(
    today: &DailyRecord,
    previous: Option<&DailyRecord>,
    thresholds: &Thresholds,
) -> Option<KeyNodeType> {
    if today.is_phase_day1() {
        return Some(today.phase.day1_node());
    }

    let previous = previous?;

    [Phase::Entry, Phase::Exit].into_iter().find_map(|phase| {
        let (threshold, direction) = crossing_rule(phase, thresholds);
        direction
            .crosses(previous.break_index, today.break_index, threshold)
            .then(|| phase.crossing_node())
    })
}

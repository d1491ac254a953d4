//! Secondary events recorded alongside, but independently of, key-node analysis.
//!
//! Every record is scanned, key node or not. Insertion is idempotent, so a
//! rescan of the same day never duplicates a node.

use crate::detector::crossing_rule;
use chrono::NaiveDate;
use configuration::AnalysisConfig;
use core_types::{CrossDirection, DailyRecord, Phase, SpecialNode, SpecialNodeType};
use database::{DbError, RecordStore};
use rust_decimal::Decimal;

/// Scans `record` for special nodes and stores them.
/// Returns the nodes that were newly inserted.
pub async fn scan(
    store: &dyn RecordStore,
    record: &DailyRecord,
    previous: Option<&DailyRecord>,
    config: &AnalysisConfig,
) -> Result<Vec<SpecialNode>, DbError> {
    let mut candidates = threshold_events(record, previous, config);

    if let Some(warning) = quality_warning(store, record, previous, config).await? {
        candidates.push(warning);
    }

    let mut inserted = Vec::new();
    for node in candidates {
        if store.insert_special_node(&node).await? {
            tracing::debug!(asset = %node.asset, date = %node.date, node_type = %node.node_type, "Special node recorded.");
            inserted.push(node);
        }
    }
    Ok(inserted)
}

/// Events decided by today's flags and the step from the previous record.
fn threshold_events(
    record: &DailyRecord,
    previous: Option<&DailyRecord>,
    config: &AnalysisConfig,
) -> Vec<SpecialNode> {
    let values = format!("offchain {}, break {}", record.offchain_index, record.break_index);
    let mut nodes = Vec::new();

    if record.is_approaching {
        nodes.push(SpecialNode::for_record(
            record,
            SpecialNodeType::Approaching,
            format!("{} approaching: {values}", record.phase),
        ));
    }

    let Some(previous) = previous else {
        return nodes;
    };

    let boundary = config.thresholds.phase_boundary;
    if CrossDirection::Up.crosses(previous.offchain_index, record.offchain_index, boundary) {
        nodes.push(SpecialNode::for_record(
            record,
            SpecialNodeType::OffchainAbove1000,
            format!("Off-chain index rose above {boundary}: {values}"),
        ));
    }
    if CrossDirection::Down.crosses(previous.offchain_index, record.offchain_index, boundary) {
        nodes.push(SpecialNode::for_record(
            record,
            SpecialNodeType::OffchainBelow1000,
            format!("Off-chain index fell below {boundary}: {values}"),
        ));
    }

    let upper = config.thresholds.break_upper;
    if CrossDirection::Up.crosses(previous.break_index, record.break_index, upper) {
        nodes.push(SpecialNode::for_record(
            record,
            SpecialNodeType::BreakAbove200,
            format!("Break index rose above {upper}: {values}"),
        ));
    }

    nodes
}

/// The once-per-sub-cycle warning raised on exactly the Nth update of a
/// sub-cycle whose break index has not reached the phase's extreme.
async fn quality_warning(
    store: &dyn RecordStore,
    record: &DailyRecord,
    previous: Option<&DailyRecord>,
    config: &AnalysisConfig,
) -> Result<Option<SpecialNode>, DbError> {
    let Some(start) = section_start(store, record, previous, config).await? else {
        return Ok(None);
    };

    let node_type = SpecialNodeType::quality_warning(record.phase);
    if store
        .has_special_node_in_range(&record.asset, node_type, start, record.date)
        .await?
    {
        return Ok(None);
    }

    let updates = config.warnings.updates_for(record.is_benchmark_equity);
    let window = store.history_between(&record.asset, start, record.date).await?;
    if window.len() != updates {
        return Ok(None);
    }

    let breaks: Vec<i64> = window.iter().rev().map(|r| r.break_index).collect();
    let thresholds = &config.thresholds;
    let description = match record.phase {
        Phase::Entry => {
            let reached = breaks.iter().any(|&b| b >= thresholds.break_upper);
            if reached || !is_declining(&breaks) {
                return Ok(None);
            }
            format!(
                "Entry update {updates}: break index stayed below {} and is trending down",
                thresholds.break_upper
            )
        }
        Phase::Exit => {
            if breaks.iter().any(|&b| b < thresholds.break_lower) {
                return Ok(None);
            }
            format!(
                "Exit update {updates}: break index never fell below {}",
                thresholds.break_lower
            )
        }
    };

    Ok(Some(SpecialNode::for_record(record, node_type, description)))
}

/// The first day of the sub-cycle `record` belongs to.
///
/// Today if it is a phase day 1 or closes a sub-cycle itself, otherwise the
/// later of the phase's last day 1 and its last sub-cycle-closing crossing.
pub async fn section_start(
    store: &dyn RecordStore,
    record: &DailyRecord,
    previous: Option<&DailyRecord>,
    config: &AnalysisConfig,
) -> Result<Option<NaiveDate>, DbError> {
    if record.is_phase_day1() {
        return Ok(Some(record.date));
    }

    let (threshold, direction) = crossing_rule(record.phase, &config.thresholds);
    if previous.is_some_and(|p| direction.crosses(p.break_index, record.break_index, threshold)) {
        return Ok(Some(record.date));
    }

    let day1 = store
        .find_last_phase_day1(&record.asset, record.phase, record.date)
        .await?
        .map(|a| a.date);
    let crossing = store
        .find_crossing(&record.asset, record.date, threshold, direction)
        .await?
        .map(|c| c.date);

    Ok(day1.max(crossing))
}

/// Takes values newest first, splits them at `len / 2` and reports whether the
/// tail (the older values) averages lower than the head.
///
/// For an odd count the head is the shorter part.
pub fn is_declining(values_newest_first: &[i64]) -> bool {
    if values_newest_first.len() < 2 {
        return false;
    }
    let (head, tail) = values_newest_first.split_at(values_newest_first.len() / 2);
    mean(tail) < mean(head)
}

fn mean(values: &[i64]) -> Decimal {
    let sum: i64 = values.iter().sum();
    Decimal::from(sum) / Decimal::from(values.len())
}

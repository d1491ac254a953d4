use crate::benchmark::{BenchmarkDay, ChainScope};
use configuration::{AnalysisConfig, Benchmarks, Corrections, PhaseTransition};
use core_types::{DailyRecord, DivergenceEntry, KeyNodeType, Phase};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Percentage change from `reference` to `current`, sign-adjusted for the phase.
///
/// Exit reads a falling index as favourable, so its sign is flipped. A zero
/// reference yields zero.
pub fn base_change(reference: i64, current: i64, phase: Phase) -> Decimal {
    if reference == 0 {
        return Decimal::ZERO;
    }
    let reference = Decimal::from(reference);
    let raw = (Decimal::from(current) - reference) / reference * Decimal::ONE_HUNDRED;
    match phase {
        Phase::Entry => raw,
        Phase::Exit => -raw,
    }
}

/// Applies when the move from `reference` to `current` crosses `boundary`
/// in either direction, with the lower side half-open.
pub fn phase_transition_correction(
    reference: i64,
    current: i64,
    phase: Phase,
    boundary: i64,
    transition: &PhaseTransition,
) -> Decimal {
    if reference == 0 {
        return Decimal::ZERO;
    }
    let crosses = (reference < boundary && boundary <= current) || (current < boundary && boundary <= reference);
    if !crosses {
        return Decimal::ZERO;
    }
    transition.correction(phase, current > reference)
}

/// Sum of the weights of every benchmark whose phase disagrees with `record`,
/// with a per-benchmark breakdown.
pub fn divergence_correction(
    record: &DailyRecord,
    day: &BenchmarkDay,
    benchmarks: &Benchmarks,
) -> (Decimal, BTreeMap<String, DivergenceEntry>) {
    let scope = ChainScope::for_record(record, benchmarks);
    let mut details = BTreeMap::new();

    let mut consider = |benchmark: &DailyRecord, weight: Decimal| {
        if benchmark.phase != record.phase {
            details.insert(
                benchmark.asset.clone(),
                DivergenceEntry {
                    weight,
                    phase: benchmark.phase,
                },
            );
        }
    };

    if scope.equity {
        if let Some(equity) = &day.equity {
            consider(equity, benchmarks.equity_weight);
        }
    }
    if scope.primary_coin {
        if let Some(primary) = &day.primary_coin {
            consider(primary, benchmarks.primary_coin_weight);
        }
    }
    if scope.leaders {
        for leader in &day.leaders {
            // Leaders without a configured weight are outside the correction.
            if let Some(weight) = benchmarks.leader_weight(&leader.asset) {
                consider(leader, weight);
            }
        }
    }

    let total = details.values().map(|entry| entry.weight).sum();
    (total, details)
}

pub fn break_index_correction(
    node: KeyNodeType,
    break_index: i64,
    config: &AnalysisConfig,
) -> Decimal {
    let thresholds = &config.thresholds;
    match node {
        KeyNodeType::EnterDay1 if break_index > thresholds.break_upper => config.corrections.entry_day1_hot,
        KeyNodeType::ExitDay1 if break_index < thresholds.break_lower => config.corrections.exit_day1_cold,
        _ => Decimal::ZERO,
    }
}

pub fn approaching_correction(record: &DailyRecord, corrections: &Corrections) -> Decimal {
    if record.is_approaching {
        corrections.approaching
    } else {
        Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn rec(asset: &str, phase: Phase) -> DailyRecord {
        let date = NaiveDate::from_ymd_opt(2025, 10, 16).unwrap();
        DailyRecord::new(date, asset, phase, 4, 1100, 120).unwrap()
    }

    fn exit_chain() -> BenchmarkDay {
        BenchmarkDay {
            equity: Some(rec("NASDAQ", Phase::Exit).benchmark_equity()),
            primary_coin: Some(rec("BTC", Phase::Exit)),
            leaders: ["BNB", "DOGE", "ETH", "SOL", "XRP"]
                .into_iter()
                .map(|asset| rec(asset, Phase::Exit).benchmark_leader())
                .collect(),
        }
    }

    #[test]
    fn base_change_flips_sign_in_exit() {
        let entry = base_change(900, 1100, Phase::Entry);
        assert_eq!(entry.round_dp(4), dec!(22.2222));
        assert_eq!(base_change(900, 1100, Phase::Exit), -entry);
        assert_eq!(base_change(0, 1100, Phase::Entry), Decimal::ZERO);
        assert_eq!(base_change(1000, 950, Phase::Entry), dec!(-5));
    }

    #[test]
    fn phase_transition_needs_a_boundary_crossing() {
        let transition = PhaseTransition::default();
        assert_eq!(phase_transition_correction(900, 1100, Phase::Entry, 1000, &transition), dec!(5));
        assert_eq!(phase_transition_correction(900, 1100, Phase::Exit, 1000, &transition), dec!(-5));
        assert_eq!(phase_transition_correction(1100, 900, Phase::Entry, 1000, &transition), dec!(-5));
        assert_eq!(phase_transition_correction(1100, 900, Phase::Exit, 1000, &transition), dec!(5));
        // Landing exactly on the boundary counts as crossing upwards.
        assert_eq!(phase_transition_correction(999, 1000, Phase::Entry, 1000, &transition), dec!(5));
        // Starting on the boundary and staying above does not.
        assert_eq!(phase_transition_correction(1000, 1200, Phase::Entry, 1000, &transition), Decimal::ZERO);
        assert_eq!(phase_transition_correction(1000, 999, Phase::Entry, 1000, &transition), dec!(-5));
    }

    #[test]
    fn small_coin_collects_every_disagreeing_weight() {
        let benchmarks = Benchmarks::default();
        let (total, details) = divergence_correction(&rec("PEPE", Phase::Entry), &exit_chain(), &benchmarks);

        // -10 - 5 - 2.5 - 1.5 - 1.0 - 0.5; XRP carries no weight.
        assert_eq!(total, dec!(-20.5));
        assert_eq!(details.len(), 6);
        assert!(!details.contains_key("XRP"));
        assert_eq!(details["NASDAQ"].phase, Phase::Exit);
    }

    #[test]
    fn chain_position_limits_the_comparison() {
        let benchmarks = Benchmarks::default();
        let day = exit_chain();

        let (leader_total, leader_details) =
            divergence_correction(&rec("ETH", Phase::Entry).benchmark_leader(), &day, &benchmarks);
        assert_eq!(leader_total, dec!(-15));
        assert_eq!(leader_details.keys().collect::<Vec<_>>(), vec!["BTC", "NASDAQ"]);

        let (btc_total, _) = divergence_correction(&rec("BTC", Phase::Entry), &day, &benchmarks);
        assert_eq!(btc_total, dec!(-10));
    }

    #[test]
    fn equity_flagged_assets_never_diverge() {
        let benchmarks = Benchmarks::default();
        let day = exit_chain();
        for record in [
            rec("NASDAQ", Phase::Entry).benchmark_equity(),
            rec("600519", Phase::Entry).domestic_equity(),
        ] {
            let (total, details) = divergence_correction(&record, &day, &benchmarks);
            assert_eq!(total, Decimal::ZERO);
            assert!(details.is_empty());
        }
    }

    #[test]
    fn break_index_correction_only_on_extreme_day_one() {
        let config = AnalysisConfig::default();
        assert_eq!(break_index_correction(KeyNodeType::EnterDay1, 201, &config), dec!(-2.5));
        assert_eq!(break_index_correction(KeyNodeType::EnterDay1, 200, &config), Decimal::ZERO);
        assert_eq!(break_index_correction(KeyNodeType::ExitDay1, -1, &config), dec!(-2.5));
        assert_eq!(break_index_correction(KeyNodeType::ExitDay1, 0, &config), Decimal::ZERO);
        assert_eq!(break_index_correction(KeyNodeType::BreakDown200, 500, &config), Decimal::ZERO);
    }

    #[test]
    fn approaching_flag_costs_five_points() {
        let corrections = Corrections::default();
        assert_eq!(approaching_correction(&rec("SOL", Phase::Entry).approaching(), &corrections), dec!(-5));
        assert_eq!(approaching_correction(&rec("SOL", Phase::Entry), &corrections), Decimal::ZERO);
    }
}

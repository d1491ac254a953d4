use analyzer::Analyzer;
use chrono::NaiveDate;
use configuration::AnalysisConfig;
use core_types::{DailyRecord, KeyNodeType, Phase, QualityTier, SpecialNodeType};
use database::{MemoryStore, RecordStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, day).unwrap()
}

fn rec(asset: &str, day: u32, phase: Phase, phase_days: u32, offchain: i64, brk: i64) -> DailyRecord {
    DailyRecord::new(d(day), asset, phase, phase_days, offchain, brk).unwrap()
}

/// An entry cycle with two downward passes through 200 (10-05 and 10-09).
fn entry_cycle(asset: &str) -> Vec<DailyRecord> {
    [
        (1, 900, 150),
        (2, 950, 180),
        (3, 1000, 210),
        (4, 1050, 250),
        (5, 1020, 180),
        (6, 1060, 190),
        (7, 1100, 215),
        (8, 1120, 230),
        (9, 1090, 190),
    ]
    .into_iter()
    .map(|(day, offchain, brk)| rec(asset, day, Phase::Entry, day, offchain, brk))
    .collect()
}

async fn analyze_days(analyzer: &Analyzer, store: &MemoryStore, asset: &str, days: std::ops::RangeInclusive<u32>) {
    for day in days {
        analyzer.analyze(store, asset, d(day)).await.unwrap();
    }
}

#[tokio::test]
async fn entry_cycle_anchors_each_sub_cycle_to_its_predecessor() {
    let store = MemoryStore::from_records(entry_cycle("TEST"));
    let analyzer = Analyzer::new(AnalysisConfig::default());

    assert!(analyzer.analyze(&store, "TEST", d(1)).await.unwrap().is_none());
    analyze_days(&analyzer, &store, "TEST", 2..=4).await;

    let first = analyzer.analyze(&store, "TEST", d(5)).await.unwrap().unwrap();
    assert_eq!(first.node_type, KeyNodeType::BreakDown200);
    assert_eq!(first.reference.date, d(1));
    assert_eq!(first.reference.offchain_index, 900);
    assert_eq!(first.reference.node_type, KeyNodeType::EnterDay1);
    assert_eq!(first.current_offchain_index, 1029);
    assert_eq!(first.phase_correction, dec!(5));
    assert_eq!(first.section.number, 2);
    assert_eq!(first.section.description, "Entry sub-cycle 2 quality");
    assert_eq!(first.quality, QualityTier::Excellent);

    analyze_days(&analyzer, &store, "TEST", 6..=8).await;

    let second = analyzer.analyze(&store, "TEST", d(9)).await.unwrap().unwrap();
    assert_eq!(second.reference.date, d(5));
    assert_eq!(second.reference.offchain_index, 1029);
    assert_eq!(second.reference.node_type, KeyNodeType::BreakDown200);
    // 1097.5 rounds half to even.
    assert_eq!(second.current_offchain_index, 1098);
    assert_eq!(second.phase_correction, Decimal::ZERO);
    assert_eq!(second.section.number, 3);
    assert_eq!(
        second.section.change_pct,
        (Decimal::from(1090) - Decimal::from(1029)) / Decimal::from(1029) * Decimal::ONE_HUNDRED
    );
    assert_eq!(second.final_pct, second.change_pct + second.total_correction());

    let stored = store.results_in_range(d(1), d(9)).await.unwrap();
    assert_eq!(stored, vec![first, second]);
}

#[tokio::test]
async fn gaps_and_out_of_order_imports_do_not_move_the_reference() {
    let mut records = entry_cycle("TEST");
    records.retain(|r| r.date != d(6));
    records.reverse();

    let store = MemoryStore::new();
    for record in &records {
        store.upsert_record(record).await.unwrap();
    }
    let analyzer = Analyzer::new(AnalysisConfig::default());

    let result = analyzer.analyze(&store, "TEST", d(9)).await.unwrap().unwrap();
    assert_eq!(result.reference.date, d(5));
    assert_eq!(result.reference.offchain_index, 1029);
    assert_eq!(result.current_offchain_index, 1098);
}

#[tokio::test]
async fn entry_and_exit_read_the_same_move_oppositely() {
    let analyzer = Analyzer::new(AnalysisConfig::default());

    let entry = MemoryStore::from_records([
        rec("UP", 1, Phase::Entry, 1, 900, 150),
        rec("UP", 2, Phase::Exit, 1, 950, 150),
        rec("UP", 3, Phase::Entry, 1, 1100, 150),
    ]);
    let result = analyzer.analyze(&entry, "UP", d(3)).await.unwrap().unwrap();
    assert_eq!(result.node_type, KeyNodeType::EnterDay1);
    assert_eq!(result.change_pct.round_dp(1), dec!(22.2));
    assert_eq!(result.phase_correction, dec!(5));
    assert_eq!((result.change_pct + result.phase_correction).round_dp(1), dec!(27.2));
    assert_eq!(result.section.number, 1);

    let exit = MemoryStore::from_records([
        rec("DOWN", 1, Phase::Exit, 1, 900, -50),
        rec("DOWN", 2, Phase::Entry, 1, 950, -20),
        rec("DOWN", 3, Phase::Exit, 1, 1100, -10),
    ]);
    let result = analyzer.analyze(&exit, "DOWN", d(3)).await.unwrap().unwrap();
    assert_eq!(result.node_type, KeyNodeType::ExitDay1);
    assert_eq!(result.reference.date, d(1));
    assert_eq!(result.change_pct.round_dp(1), dec!(-22.2));
    assert_eq!(result.phase_correction, dec!(-5));
    // Exiting with the break index still negative.
    assert_eq!(result.break_index_correction, dec!(-2.5));
    assert_eq!(result.quality, QualityTier::Poor);
    assert_eq!(result.section.description, "Exit sub-cycle 1 quality");
}

/// Three assets sharing one timeline, plus the benchmark chain on the key node day.
fn divergence_store() -> MemoryStore {
    let mut records = Vec::new();
    for (asset, flag) in [("PEPE", None), ("600519", Some("domestic")), ("DJI", Some("equity"))] {
        for (day, phase_days, offchain, brk) in [(1, 1, 1000, 150), (2, 2, 1040, 250), (3, 3, 1060, 180)] {
            let record = rec(asset, day, Phase::Entry, phase_days, offchain, brk);
            records.push(match flag {
                Some("domestic") => record.domestic_equity(),
                Some("equity") => record.benchmark_equity(),
                _ => record,
            });
        }
    }
    records.push(rec("NASDAQ", 3, Phase::Exit, 4, 900, 50).benchmark_equity());
    records.push(rec("BTC", 3, Phase::Exit, 4, 900, 50));
    records.push(rec("ETH", 3, Phase::Exit, 4, 900, 50).benchmark_leader());
    records.push(rec("SOL", 3, Phase::Entry, 4, 1300, 240).benchmark_leader());
    MemoryStore::from_records(records)
}

#[tokio::test]
async fn divergence_follows_the_benchmark_chain() {
    let store = divergence_store();
    let analyzer = Analyzer::new(AnalysisConfig::default());

    let pepe = analyzer.analyze(&store, "PEPE", d(3)).await.unwrap().unwrap();
    assert_eq!(pepe.divergence_correction, dec!(-17.5));
    assert_eq!(
        pepe.divergence_details.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["BTC", "ETH", "NASDAQ"]
    );
    assert_eq!(pepe.benchmark_status.leaders.len(), 2);
    assert!(!analyzer.chain_passes(&store, "PEPE", d(3)).await.unwrap());

    for asset in ["600519", "DJI"] {
        let result = analyzer.analyze(&store, asset, d(3)).await.unwrap().unwrap();
        assert_eq!(result.divergence_correction, Decimal::ZERO, "{asset}");
        assert!(result.divergence_details.is_empty());
        assert!(result.benchmark_status.is_empty());
        assert!(analyzer.chain_passes(&store, asset, d(3)).await.unwrap());
    }
}

#[tokio::test]
async fn approaching_flag_is_a_correction_and_a_special_node() {
    let store = MemoryStore::from_records([
        rec("ARB", 1, Phase::Entry, 1, 1000, 150),
        rec("ARB", 2, Phase::Entry, 2, 1010, 210),
        rec("ARB", 3, Phase::Entry, 3, 1020, 190).approaching(),
    ]);
    let analyzer = Analyzer::new(AnalysisConfig::default());
    analyze_days(&analyzer, &store, "ARB", 1..=2).await;

    let result = analyzer.analyze(&store, "ARB", d(3)).await.unwrap().unwrap();
    assert_eq!(result.approaching_correction, dec!(-5));

    let nodes = store.special_nodes_in_range(d(1), d(3)).await.unwrap();
    let kinds: Vec<_> = nodes.iter().map(|n| (n.date, n.node_type)).collect();
    assert_eq!(
        kinds,
        vec![(d(2), SpecialNodeType::BreakAbove200), (d(3), SpecialNodeType::Approaching)]
    );
}

#[tokio::test]
async fn scanning_a_day_twice_keeps_one_special_node() {
    let store = MemoryStore::from_records(entry_cycle("TEST"));
    let analyzer = Analyzer::new(AnalysisConfig::default());

    analyze_days(&analyzer, &store, "TEST", 1..=9).await;
    analyze_days(&analyzer, &store, "TEST", 3..=3).await;

    let nodes = store.special_nodes_in_range(d(1), d(9)).await.unwrap();
    let kinds: Vec<_> = nodes.iter().map(|n| (n.date, n.node_type)).collect();
    assert_eq!(
        kinds,
        vec![
            (d(3), SpecialNodeType::OffchainAbove1000),
            (d(3), SpecialNodeType::BreakAbove200),
            (d(7), SpecialNodeType::BreakAbove200),
        ]
    );
}

#[tokio::test]
async fn entry_warning_fires_once_on_the_seventh_update_below_200() {
    let breaks = [100, 110, 120, 130, 140, 150, 160, 170];
    let store = MemoryStore::from_records(
        breaks
            .iter()
            .zip(1..)
            .map(|(&brk, day)| rec("FADE", day, Phase::Entry, day, 1000, brk)),
    );
    let analyzer = Analyzer::new(AnalysisConfig::default());
    analyze_days(&analyzer, &store, "FADE", 1..=8).await;

    let warnings: Vec<_> = store
        .special_nodes_in_range(d(1), d(8))
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.node_type == SpecialNodeType::QualityWarningEntry)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].date, d(7));
    assert_eq!(warnings[0].break_index, 160);
}

#[tokio::test]
async fn entry_warning_compares_the_newest_three_with_the_oldest_four() {
    // Newest first on day 7: [120, 130, 140 | 150, 170, 160, 150]. The older part
    // averages higher, so no warning.
    let breaks = [150, 160, 170, 150, 140, 130, 120];
    let store = MemoryStore::from_records(
        breaks
            .iter()
            .zip(1..)
            .map(|(&brk, day)| rec("SLIDE", day, Phase::Entry, day, 1000, brk)),
    );
    let analyzer = Analyzer::new(AnalysisConfig::default());
    analyze_days(&analyzer, &store, "SLIDE", 1..=7).await;

    assert!(!store
        .has_special_node_in_range("SLIDE", SpecialNodeType::QualityWarningEntry, d(1), d(7))
        .await
        .unwrap());
}

#[tokio::test]
async fn benchmark_equity_waits_fourteen_updates() {
    let store = MemoryStore::from_records((1..=14).map(|day| {
        rec("NASDAQ", day, Phase::Entry, day, 1000, 176 + day as i64).benchmark_equity()
    }));
    let analyzer = Analyzer::new(AnalysisConfig::default());
    analyze_days(&analyzer, &store, "NASDAQ", 1..=14).await;

    let warnings: Vec<_> = store
        .special_nodes_in_range(d(1), d(14))
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.node_type == SpecialNodeType::QualityWarningEntry)
        .map(|n| n.date)
        .collect();
    assert_eq!(warnings, vec![d(14)]);
}

#[tokio::test]
async fn exit_warning_needs_no_trend() {
    let breaks = [10, 20, 5, 30, 15, 25, 40];
    let store = MemoryStore::from_records(
        breaks
            .iter()
            .zip(1..)
            .map(|(&brk, day)| rec("HOLD", day, Phase::Exit, day, 900, brk)),
    );
    let analyzer = Analyzer::new(AnalysisConfig::default());
    analyze_days(&analyzer, &store, "HOLD", 1..=7).await;

    assert!(store
        .has_special_node_in_range("HOLD", SpecialNodeType::QualityWarningExit, d(7), d(7))
        .await
        .unwrap());
}

#[tokio::test]
async fn missing_record_is_not_an_error() {
    let store = MemoryStore::new();
    let analyzer = Analyzer::new(AnalysisConfig::default());
    assert!(analyzer.analyze(&store, "NONE", d(1)).await.unwrap().is_none());
    assert!(!analyzer.chain_passes(&store, "NONE", d(1)).await.unwrap());
}

use crate::enums::{KeyNodeType, Phase, QualityTier, SpecialNodeType};
use crate::error::CoreError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One asset's metrics for one calendar day. Unique per (date, asset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub asset: String,
    pub phase: Phase,
    /// Day count since the current phase started, starting at 1.
    pub phase_days: u32,
    pub offchain_index: i64,
    pub break_index: i64,
    /// Informational only; never used by the analysis.
    #[serde(default)]
    pub reference_price: Option<Decimal>,
    #[serde(default)]
    pub is_benchmark_leader: bool,
    #[serde(default)]
    pub is_benchmark_equity: bool,
    /// Domestic-equity assets sit outside the benchmark chain entirely.
    #[serde(default)]
    pub is_domestic_equity: bool,
    #[serde(default)]
    pub is_approaching: bool,
}

impl DailyRecord {
    /// Builds a validated record with every flag cleared.
    pub fn new(
        date: NaiveDate,
        asset: impl Into<String>,
        phase: Phase,
        phase_days: u32,
        offchain_index: i64,
        break_index: i64,
    ) -> Result<Self, CoreError> {
        let record = Self {
            date,
            asset: asset.into(),
            phase,
            phase_days,
            offchain_index,
            break_index,
            reference_price: None,
            is_benchmark_leader: false,
            is_benchmark_equity: false,
            is_domestic_equity: false,
            is_approaching: false,
        };
        record.validate()?;
        Ok(record)
    }

    /// Checks the invariants a record must hold before it is stored.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.asset.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "asset".to_string(),
                format!("empty asset id on {}", self.date),
            ));
        }
        if self.phase_days == 0 {
            return Err(CoreError::InvalidInput(
                "phase_days".to_string(),
                format!("{} on {}: phase days start at 1", self.asset, self.date),
            ));
        }
        Ok(())
    }

    pub fn is_phase_day1(&self) -> bool {
        self.phase_days == 1
    }

    pub fn benchmark_leader(mut self) -> Self {
        self.is_benchmark_leader = true;
        self
    }

    pub fn benchmark_equity(mut self) -> Self {
        self.is_benchmark_equity = true;
        self
    }

    pub fn domestic_equity(mut self) -> Self {
        self.is_domestic_equity = true;
        self
    }

    pub fn approaching(mut self) -> Self {
        self.is_approaching = true;
        self
    }
}

/// A threshold crossing found in history: the day the crossing was observed and
/// the off-chain index interpolated at the exact threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crossing {
    pub date: NaiveDate,
    pub offchain_index: i64,
}

/// The most recent day 1 of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseAnchor {
    pub date: NaiveDate,
    pub offchain_index: i64,
}

/// The historical point a key node is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceNode {
    pub date: NaiveDate,
    pub offchain_index: i64,
    /// The candidate source this reference was selected from.
    pub node_type: KeyNodeType,
}

/// One benchmark's contribution to the divergence correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceEntry {
    pub weight: Decimal,
    /// The benchmark's phase on the analysed date.
    pub phase: Phase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkSnapshot {
    pub asset: String,
    pub phase: Phase,
    pub offchain_index: i64,
}

impl From<&DailyRecord> for BenchmarkSnapshot {
    fn from(record: &DailyRecord) -> Self {
        Self {
            asset: record.asset.clone(),
            phase: record.phase,
            offchain_index: record.offchain_index,
        }
    }
}

/// The state of the benchmark chain on a given date, kept for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkChainStatus {
    pub equity: Option<BenchmarkSnapshot>,
    pub primary_coin: Option<BenchmarkSnapshot>,
    pub leaders: Vec<BenchmarkSnapshot>,
}

impl BenchmarkChainStatus {
    pub fn is_empty(&self) -> bool {
        self.equity.is_none() && self.primary_coin.is_none() && self.leaders.is_empty()
    }
}

/// Which sub-cycle a key node predicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub number: u32,
    pub description: String,
    /// Sign-adjusted change from the reference to today's recorded index.
    pub change_pct: Decimal,
}

/// The full, auditable outcome of analysing one key node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub date: NaiveDate,
    pub asset: String,
    pub node_type: KeyNodeType,
    pub phase: Phase,
    pub reference: ReferenceNode,
    /// Today's off-chain index, interpolated at the threshold for crossing nodes.
    pub current_offchain_index: i64,
    pub change_pct: Decimal,
    pub phase_correction: Decimal,
    pub divergence_correction: Decimal,
    pub divergence_details: BTreeMap<String, DivergenceEntry>,
    pub break_index_correction: Decimal,
    pub approaching_correction: Decimal,
    pub final_pct: Decimal,
    pub quality: QualityTier,
    pub section: Section,
    pub benchmark_status: BenchmarkChainStatus,
}

impl AnalysisResult {
    /// Sum of every correction term applied on top of the base change.
    pub fn total_correction(&self) -> Decimal {
        self.phase_correction
            + self.divergence_correction
            + self.break_index_correction
            + self.approaching_correction
    }
}

/// A secondary event. Unique per (date, asset, node_type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialNode {
    pub date: NaiveDate,
    pub asset: String,
    pub node_type: SpecialNodeType,
    pub description: String,
    pub offchain_index: i64,
    pub break_index: i64,
}

impl SpecialNode {
    /// Creates a node carrying the given record's index values.
    pub fn for_record(record: &DailyRecord, node_type: SpecialNodeType, description: String) -> Self {
        Self {
            date: record.date,
            asset: record.asset.clone(),
            node_type,
            description,
            offchain_index: record.offchain_index,
            break_index: record.break_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 16).unwrap()
    }

    #[test]
    fn rejects_records_that_break_invariants() {
        assert!(matches!(
            DailyRecord::new(day(), "  ", Phase::Entry, 1, 1000, 100),
            Err(CoreError::InvalidInput(field, _)) if field == "asset"
        ));
        assert!(matches!(
            DailyRecord::new(day(), "BTC", Phase::Exit, 0, 1000, 100),
            Err(CoreError::InvalidInput(field, _)) if field == "phase_days"
        ));
    }

    #[test]
    fn flags_default_to_false_when_absent_from_json() {
        let json = r#"{
            "date": "2025-10-16",
            "asset": "SOL",
            "phase": "Entry",
            "phase_days": 3,
            "offchain_index": 1210,
            "break_index": 245,
            "is_benchmark_leader": true
        }"#;
        let record: DailyRecord = serde_json::from_str(json).unwrap();
        assert!(record.is_benchmark_leader);
        assert!(!record.is_approaching);
        assert!(!record.is_domestic_equity);
        assert_eq!(record.reference_price, None);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn builder_flags_compose() {
        let record = DailyRecord::new(day(), "COIN", Phase::Entry, 1, 1200, 250)
            .unwrap()
            .benchmark_equity()
            .approaching();
        assert!(record.is_benchmark_equity && record.is_approaching);
        assert!(record.is_phase_day1());
    }
}

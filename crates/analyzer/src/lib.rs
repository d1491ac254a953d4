//! # MAG Analyzer Crate
//!
//! The key-node analysis engine. For one asset on one day it decides whether
//! the day is a key node, finds the historical node to compare against,
//! stacks the corrections on top of the raw move and rates the outcome.
//!
//! ## Architectural Principles
//!
//! - **Explicit Configuration:** Every weight, threshold and cadence comes from
//!   the `AnalysisConfig` handed to `Analyzer::new`. Nothing reads global state.
//! - **Storage Agnostic:** The engine talks to `database::RecordStore` only, so it
//!   runs the same way against PostgreSQL and the in-memory store.
//! - **Strictly Ordered:** Later days depend on special nodes and results written
//!   by earlier days. Within one asset, days must be analysed in ascending order;
//!   every store call is awaited before the next one is issued.
//!
//! ## Public API
//!
//! - `Analyzer`: `analyze` one (asset, date) and `chain_passes` for display.
//! - `Reanalyzer`: destructive-then-rebuild batch analysis of a date range.
//! - `AnalyzerError`: The specific error types that can be returned from this crate.

use crate::benchmark::BenchmarkDay;
use crate::error::AnalyzerError;
use chrono::NaiveDate;
use configuration::AnalysisConfig;
use core_types::{interpolate_between, AnalysisResult, DailyRecord, KeyNodeType};
use database::RecordStore;

pub mod benchmark;
pub mod corrections;
pub mod detector;
pub mod error;
pub mod quality;
pub mod reanalyze;
pub mod reference;
pub mod section;
pub mod special;

pub use reanalyze::{ReanalysisSummary, Reanalyzer};

/// The main analysis engine.
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Analyses `asset` on `date` and stores the result.
    ///
    /// The special-node scan runs first and always. `Ok(None)` means the day is
    /// not a key node, has no record, or has nothing to compare against.
    #[tracing::instrument(name = "analyze", skip(self, store))]
    pub async fn analyze(
        &self,
        store: &dyn RecordStore,
        asset: &str,
        date: NaiveDate,
    ) -> Result<Option<AnalysisResult>, AnalyzerError> {
        let Some(record) = store.get(asset, date).await? else {
            tracing::debug!("No record for this day.");
            return Ok(None);
        };
        let previous = store.get_previous(asset, date).await?;

        special::scan(store, &record, previous.as_ref(), &self.config).await?;

        let thresholds = &self.config.thresholds;
        let Some(node) = detector::detect_key_node(&record, previous.as_ref(), thresholds) else {
            return Ok(None);
        };

        let Some(reference) =
            reference::resolve_reference(store, asset, date, node, thresholds).await?
        else {
            tracing::debug!(%node, "Key node without a reference; skipping.");
            return Ok(None);
        };

        let section = section::identify_section(store, &record, node, &reference, thresholds).await?;
        let current_offchain_index = self.current_index(&record, previous.as_ref(), node);

        let phase = record.phase;
        let change_pct = corrections::base_change(reference.offchain_index, current_offchain_index, phase);
        let phase_correction = corrections::phase_transition_correction(
            reference.offchain_index,
            current_offchain_index,
            phase,
            thresholds.phase_boundary,
            &self.config.phase_transition,
        );

        let benchmarks = &self.config.benchmarks;
        let day = BenchmarkDay::load(store, date, benchmarks).await?;
        let benchmark_status = day.status_for(&record, benchmarks);
        let (divergence_correction, divergence_details) =
            corrections::divergence_correction(&record, &day, benchmarks);

        let break_index_correction = corrections::break_index_correction(node, record.break_index, &self.config);
        let approaching_correction = corrections::approaching_correction(&record, &self.config.corrections);

        let final_pct = change_pct
            + phase_correction
            + divergence_correction
            + break_index_correction
            + approaching_correction;
        let quality = quality::classify(final_pct, &self.config.quality);

        let result = AnalysisResult {
            date,
            asset: asset.to_string(),
            node_type: node,
            phase,
            reference,
            current_offchain_index,
            change_pct,
            phase_correction,
            divergence_correction,
            divergence_details,
            break_index_correction,
            approaching_correction,
            final_pct,
            quality,
            section,
            benchmark_status,
        };

        store.save_result(&result).await?;
        tracing::info!(
            %node,
            reference_date = %result.reference.date,
            final_pct = %result.final_pct.round_dp(2),
            %quality,
            "Key node analysed."
        );

        Ok(Some(result))
    }

    /// Whether the benchmark chain above `asset` is all in Entry on `date`.
    /// An asset without a record on that date does not pass.
    pub async fn chain_passes(
        &self,
        store: &dyn RecordStore,
        asset: &str,
        date: NaiveDate,
    ) -> Result<bool, AnalyzerError> {
        let Some(record) = store.get(asset, date).await? else {
            return Ok(false);
        };
        let day = BenchmarkDay::load(store, date, &self.config.benchmarks).await?;
        Ok(day.chain_passes(&record, &self.config.benchmarks))
    }

    /// Today's off-chain index, interpolated at the threshold for crossing nodes.
    fn current_index(&self, record: &DailyRecord, previous: Option<&DailyRecord>, node: KeyNodeType) -> i64 {
        match previous {
            Some(previous) if node.is_crossing() => {
                let (threshold, _) = detector::crossing_rule(node.phase(), &self.config.thresholds);
                interpolate_between(previous, record, threshold)
            }
            _ => record.offchain_index,
        }
    }
}

use crate::DbError;
use async_trait::async_trait;
use chrono::NaiveDate;
use core_types::{
    interpolate_between, AnalysisResult, CrossDirection, Crossing, DailyRecord, Phase,
    PhaseAnchor, SpecialNode, SpecialNodeType,
};

/// The date- and asset-indexed storage the analysis engine reads from and writes to.
///
/// Every lookup keyed by a date uses the actual date ordering of the stored
/// records, so gaps in the calendar and out-of-order imports are tolerated.
/// "Before" always means strictly before.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts a record, overwriting any existing record for the same (date, asset).
    async fn upsert_record(&self, record: &DailyRecord) -> Result<(), DbError>;

    async fn get(&self, asset: &str, date: NaiveDate) -> Result<Option<DailyRecord>, DbError>;

    /// The most recent record strictly before `date`.
    async fn get_previous(&self, asset: &str, date: NaiveDate) -> Result<Option<DailyRecord>, DbError>;

    /// The earliest record strictly after `date`.
    async fn get_next(&self, asset: &str, date: NaiveDate) -> Result<Option<DailyRecord>, DbError>;

    /// Up to `limit` records, most recent first.
    async fn history(&self, asset: &str, limit: usize) -> Result<Vec<DailyRecord>, DbError>;

    /// Records with `start <= date <= end`, oldest first.
    async fn history_between(
        &self,
        asset: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, DbError>;

    /// Every record strictly before `before`, most recent first.
    async fn records_before(&self, asset: &str, before: NaiveDate) -> Result<Vec<DailyRecord>, DbError>;

    /// The most recent day 1 of `phase` strictly before `before`.
    async fn find_last_phase_day1(
        &self,
        asset: &str,
        phase: Phase,
        before: NaiveDate,
    ) -> Result<Option<PhaseAnchor>, DbError>;

    /// All benchmark-leader records for a date, ordered by asset id.
    async fn benchmark_leaders(&self, date: NaiveDate) -> Result<Vec<DailyRecord>, DbError>;

    /// Stores a result, replacing any earlier result for the same (date, asset).
    async fn save_result(&self, result: &AnalysisResult) -> Result<(), DbError>;

    /// Inserts a special node. Returns `false` (and changes nothing) when a node
    /// with the same (date, asset, node_type) already exists.
    async fn insert_special_node(&self, node: &SpecialNode) -> Result<bool, DbError>;

    async fn has_special_node_in_range(
        &self,
        asset: &str,
        node_type: SpecialNodeType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<bool, DbError>;

    /// Deletes analysis results dated within `[start, end]`, optionally only for `assets`.
    async fn delete_results(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        assets: Option<&[String]>,
    ) -> Result<u64, DbError>;

    /// Deletes special nodes dated within `[start, end]`, optionally only for `assets`.
    async fn delete_special_nodes(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        assets: Option<&[String]>,
    ) -> Result<u64, DbError>;

    /// All records within `[start, end]`, ordered by (date, asset).
    async fn records_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyRecord>, DbError>;

    /// All results within `[start, end]`, ordered by (date, asset).
    async fn results_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AnalysisResult>, DbError>;

    /// All special nodes within `[start, end]`, ordered by (date, asset, node_type).
    async fn special_nodes_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<SpecialNode>, DbError>;

    /// Finds the most recent break-index crossing of `threshold` strictly before `before`.
    ///
    /// History is scanned from just before `before` backwards; the first adjacent
    /// pair of records whose break values straddle the threshold in `direction`
    /// wins. The returned date is the later day of that pair and the value is the
    /// off-chain index interpolated at the threshold.
    async fn find_crossing(
        &self,
        asset: &str,
        before: NaiveDate,
        threshold: i64,
        direction: CrossDirection,
    ) -> Result<Option<Crossing>, DbError> {
        let records = self.records_before(asset, before).await?;
        Ok(scan_for_crossing(&records, threshold, direction))
    }
}

/// Scans records ordered most recent first for the latest crossing.
pub fn scan_for_crossing(
    records_desc: &[DailyRecord],
    threshold: i64,
    direction: CrossDirection,
) -> Option<Crossing> {
    records_desc.windows(2).find_map(|pair| {
        let (current, previous) = (&pair[0], &pair[1]);
        direction
            .crosses(previous.break_index, current.break_index, threshold)
            .then(|| Crossing {
                date: current.date,
                offchain_index: interpolate_between(previous, current, threshold),
            })
    })
}

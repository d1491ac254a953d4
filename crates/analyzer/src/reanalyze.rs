use crate::error::AnalyzerError;
use crate::Analyzer;
use chrono::NaiveDate;
use core_types::AnalysisResult;
use database::RecordStore;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

/// What a reanalysis batch removed and rebuilt.
#[derive(Debug, Clone, Serialize)]
pub struct ReanalysisSummary {
    pub run_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub results_deleted: u64,
    pub special_nodes_deleted: u64,
    pub records_visited: usize,
    pub results: Vec<AnalysisResult>,
}

type ProgressFn<'a> = Box<dyn Fn(usize, usize) + Send + Sync + 'a>;

/// Rebuilds analysis results and special nodes for a date range.
///
/// Existing rows in the range are deleted first, then every record is
/// analysed again in ascending date order (asset order within a day). Running
/// the same range twice over unchanged records produces identical results.
pub struct Reanalyzer<'a> {
    analyzer: &'a Analyzer,
    store: &'a dyn RecordStore,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> Reanalyzer<'a> {
    pub fn new(analyzer: &'a Analyzer, store: &'a dyn RecordStore) -> Self {
        Self {
            analyzer,
            store,
            progress: None,
        }
    }

    /// Registers a callback invoked after each record with `(done, total)`.
    pub fn with_progress(mut self, progress: impl Fn(usize, usize) + Send + Sync + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Reanalyses `[start, end]`, optionally only for `assets`.
    ///
    /// A storage failure aborts the batch; rows written before the failure are
    /// cleaned up by the next run over the same range.
    pub async fn run(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        assets: Option<&[String]>,
    ) -> Result<ReanalysisSummary, AnalyzerError> {
        if start > end {
            return Err(AnalyzerError::InvalidRange { start, end });
        }

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("reanalyze", %run_id, %start, %end);
        self.rebuild(run_id, start, end, assets).instrument(span).await
    }

    async fn rebuild(
        &self,
        run_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        assets: Option<&[String]>,
    ) -> Result<ReanalysisSummary, AnalyzerError> {
        let results_deleted = self.store.delete_results(start, end, assets).await?;
        let special_nodes_deleted = self.store.delete_special_nodes(start, end, assets).await?;
        tracing::info!(results_deleted, special_nodes_deleted, "Cleared previous analysis.");

        let records: Vec<_> = self
            .store
            .records_in_range(start, end)
            .await?
            .into_iter()
            .filter(|r| assets.map_or(true, |list| list.contains(&r.asset)))
            .collect();

        let total = records.len();
        let mut results = Vec::new();
        for (done, record) in records.iter().enumerate() {
            if let Some(result) = self.analyzer.analyze(self.store, &record.asset, record.date).await? {
                results.push(result);
            }
            if let Some(progress) = &self.progress {
                progress(done + 1, total);
            }
        }

        tracing::info!(records = total, key_nodes = results.len(), "Reanalysis complete.");

        Ok(ReanalysisSummary {
            run_id,
            start,
            end,
            results_deleted,
            special_nodes_deleted,
            records_visited: total,
            results,
        })
    }
}

use crate::store::RecordStore;
use crate::DbError;
use async_trait::async_trait;
use chrono::NaiveDate;
use core_types::{AnalysisResult, DailyRecord, Phase, PhaseAnchor, SpecialNode, SpecialNodeType};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type RecordKey = (String, NaiveDate);
type ResultKey = (NaiveDate, String);
type SpecialNodeKey = (NaiveDate, String, SpecialNodeType);

#[derive(Debug, Default)]
struct Tables {
    /// Keyed by asset first so per-asset history is a contiguous range.
    records: BTreeMap<RecordKey, DailyRecord>,
    results: BTreeMap<ResultKey, AnalysisResult>,
    special_nodes: BTreeMap<SpecialNodeKey, SpecialNode>,
}

/// A `RecordStore` held entirely in memory.
///
/// Used by the test suites and by dry runs of the CLI. Ordering and uniqueness
/// follow the same keys as the PostgreSQL schema.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store pre-loaded with records; later records overwrite earlier ones
    /// with the same (date, asset).
    pub fn from_records(records: impl IntoIterator<Item = DailyRecord>) -> Self {
        let tables = Tables {
            records: records
                .into_iter()
                .map(|r| ((r.asset.clone(), r.date), r))
                .collect(),
            ..Tables::default()
        };
        Self {
            tables: RwLock::new(tables),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, DbError> {
        self.tables.read().map_err(|_| DbError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, DbError> {
        self.tables.write().map_err(|_| DbError::LockPoisoned)
    }
}

fn asset_range(asset: &str, start: NaiveDate, end: NaiveDate) -> std::ops::RangeInclusive<RecordKey> {
    (asset.to_string(), start)..=(asset.to_string(), end)
}

fn in_scope(asset: &str, assets: Option<&[String]>) -> bool {
    assets.map_or(true, |list| list.iter().any(|a| a == asset))
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert_record(&self, record: &DailyRecord) -> Result<(), DbError> {
        record.validate()?;
        self.write()?
            .records
            .insert((record.asset.clone(), record.date), record.clone());
        Ok(())
    }

    async fn get(&self, asset: &str, date: NaiveDate) -> Result<Option<DailyRecord>, DbError> {
        Ok(self.read()?.records.get(&(asset.to_string(), date)).cloned())
    }

    async fn get_previous(&self, asset: &str, date: NaiveDate) -> Result<Option<DailyRecord>, DbError> {
        let tables = self.read()?;
        let previous = tables
            .records
            .range((asset.to_string(), NaiveDate::MIN)..(asset.to_string(), date))
            .next_back()
            .map(|(_, r)| r.clone());
        Ok(previous)
    }

    async fn get_next(&self, asset: &str, date: NaiveDate) -> Result<Option<DailyRecord>, DbError> {
        let Some(after) = date.succ_opt() else {
            return Ok(None);
        };
        let tables = self.read()?;
        let next = tables
            .records
            .range(asset_range(asset, after, NaiveDate::MAX))
            .next()
            .map(|(_, r)| r.clone());
        Ok(next)
    }

    async fn history(&self, asset: &str, limit: usize) -> Result<Vec<DailyRecord>, DbError> {
        let tables = self.read()?;
        Ok(tables
            .records
            .range(asset_range(asset, NaiveDate::MIN, NaiveDate::MAX))
            .rev()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn history_between(
        &self,
        asset: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, DbError> {
        if start > end {
            return Ok(Vec::new());
        }
        let tables = self.read()?;
        Ok(tables
            .records
            .range(asset_range(asset, start, end))
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn records_before(&self, asset: &str, before: NaiveDate) -> Result<Vec<DailyRecord>, DbError> {
        let tables = self.read()?;
        Ok(tables
            .records
            .range((asset.to_string(), NaiveDate::MIN)..(asset.to_string(), before))
            .rev()
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn find_last_phase_day1(
        &self,
        asset: &str,
        phase: Phase,
        before: NaiveDate,
    ) -> Result<Option<PhaseAnchor>, DbError> {
        let tables = self.read()?;
        let anchor = tables
            .records
            .range((asset.to_string(), NaiveDate::MIN)..(asset.to_string(), before))
            .rev()
            .map(|(_, r)| r)
            .find(|r| r.phase == phase && r.is_phase_day1())
            .map(|r| PhaseAnchor {
                date: r.date,
                offchain_index: r.offchain_index,
            });
        Ok(anchor)
    }

    async fn benchmark_leaders(&self, date: NaiveDate) -> Result<Vec<DailyRecord>, DbError> {
        let tables = self.read()?;
        Ok(tables
            .records
            .values()
            .filter(|r| r.date == date && r.is_benchmark_leader)
            .cloned()
            .collect())
    }

    async fn save_result(&self, result: &AnalysisResult) -> Result<(), DbError> {
        self.write()?
            .results
            .insert((result.date, result.asset.clone()), result.clone());
        Ok(())
    }

    async fn insert_special_node(&self, node: &SpecialNode) -> Result<bool, DbError> {
        let mut tables = self.write()?;
        let key = (node.date, node.asset.clone(), node.node_type);
        if tables.special_nodes.contains_key(&key) {
            return Ok(false);
        }
        tables.special_nodes.insert(key, node.clone());
        Ok(true)
    }

    async fn has_special_node_in_range(
        &self,
        asset: &str,
        node_type: SpecialNodeType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<bool, DbError> {
        let tables = self.read()?;
        Ok(tables.special_nodes.values().any(|n| {
            n.asset == asset && n.node_type == node_type && n.date >= start && n.date <= end
        }))
    }

    async fn delete_results(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        assets: Option<&[String]>,
    ) -> Result<u64, DbError> {
        let mut tables = self.write()?;
        let before = tables.results.len();
        tables
            .results
            .retain(|(date, asset), _| !(*date >= start && *date <= end && in_scope(asset, assets)));
        Ok((before - tables.results.len()) as u64)
    }

    async fn delete_special_nodes(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        assets: Option<&[String]>,
    ) -> Result<u64, DbError> {
        let mut tables = self.write()?;
        let before = tables.special_nodes.len();
        tables
            .special_nodes
            .retain(|(date, asset, _), _| !(*date >= start && *date <= end && in_scope(asset, assets)));
        Ok((before - tables.special_nodes.len()) as u64)
    }

    async fn records_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyRecord>, DbError> {
        let tables = self.read()?;
        let mut records: Vec<DailyRecord> = tables
            .records
            .values()
            .filter(|r| r.date >= start && r.date <= end)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.asset.cmp(&b.asset)));
        Ok(records)
    }

    async fn results_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AnalysisResult>, DbError> {
        let tables = self.read()?;
        Ok(tables
            .results
            .range((start, String::new())..)
            .take_while(|((date, _), _)| *date <= end)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn special_nodes_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<SpecialNode>, DbError> {
        let tables = self.read()?;
        Ok(tables
            .special_nodes
            .values()
            .filter(|n| n.date >= start && n.date <= end)
            .cloned()
            .collect())
    }
}

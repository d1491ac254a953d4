use crate::store::RecordStore;
use crate::DbError;
use async_trait::async_trait;
use chrono::NaiveDate;
use core_types::{
    interpolate_offchain, AnalysisResult, BenchmarkChainStatus, CoreError, CrossDirection,
    Crossing, DailyRecord, DivergenceEntry, Phase, PhaseAnchor, ReferenceNode, Section,
    SpecialNode, SpecialNodeType,
};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::collections::BTreeMap;

const RECORD_COLUMNS: &str = "date, asset, phase, phase_days, offchain_index, break_index, \
     reference_price, is_benchmark_leader, is_benchmark_equity, is_domestic_equity, is_approaching";

const RESULT_COLUMNS: &str = "date, asset, node_type, phase, reference_date, reference_offchain_index, \
     reference_node_type, current_offchain_index, change_pct, phase_correction, divergence_correction, \
     divergence_details, break_index_correction, approaching_correction, final_pct, quality, \
     section_number, section_description, section_change_pct, benchmark_status";

const SPECIAL_NODE_COLUMNS: &str = "date, asset, node_type, description, offchain_index, break_index";

/// The `DbRepository` is the PostgreSQL implementation of [`RecordStore`].
/// It encapsulates all SQL queries and row mapping.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const UPSERT_RECORD: &str = r#"
    INSERT INTO daily_records (
        date, asset, phase, phase_days, offchain_index, break_index, reference_price,
        is_benchmark_leader, is_benchmark_equity, is_domestic_equity, is_approaching
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (date, asset) DO UPDATE SET
        phase = EXCLUDED.phase,
        phase_days = EXCLUDED.phase_days,
        offchain_index = EXCLUDED.offchain_index,
        break_index = EXCLUDED.break_index,
        reference_price = EXCLUDED.reference_price,
        is_benchmark_leader = EXCLUDED.is_benchmark_leader,
        is_benchmark_equity = EXCLUDED.is_benchmark_equity,
        is_domestic_equity = EXCLUDED.is_domestic_equity,
        is_approaching = EXCLUDED.is_approaching
"#;

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn bind_record<'q>(query: PgQuery<'q>, record: &'q DailyRecord) -> PgQuery<'q> {
    query
        .bind(record.date)
        .bind(&record.asset)
        .bind(record.phase.as_str())
        .bind(record.phase_days as i32)
        .bind(record.offchain_index)
        .bind(record.break_index)
        .bind(record.reference_price)
        .bind(record.is_benchmark_leader)
        .bind(record.is_benchmark_equity)
        .bind(record.is_domestic_equity)
        .bind(record.is_approaching)
}

fn parse_tag<T>(row: &PgRow, column: &str) -> Result<T, DbError>
where
    T: std::str::FromStr<Err = CoreError>,
{
    let raw: String = row.try_get(column)?;
    Ok(raw.parse()?)
}

fn record_from_row(row: &PgRow) -> Result<DailyRecord, DbError> {
    let phase_days: i32 = row.try_get("phase_days")?;
    let phase_days = u32::try_from(phase_days).map_err(|_| {
        CoreError::InvalidInput("phase_days".to_string(), format!("negative value {phase_days}"))
    })?;

    Ok(DailyRecord {
        date: row.try_get("date")?,
        asset: row.try_get("asset")?,
        phase: parse_tag(row, "phase")?,
        phase_days,
        offchain_index: row.try_get("offchain_index")?,
        break_index: row.try_get("break_index")?,
        reference_price: row.try_get("reference_price")?,
        is_benchmark_leader: row.try_get("is_benchmark_leader")?,
        is_benchmark_equity: row.try_get("is_benchmark_equity")?,
        is_domestic_equity: row.try_get("is_domestic_equity")?,
        is_approaching: row.try_get("is_approaching")?,
    })
}

fn result_from_row(row: &PgRow) -> Result<AnalysisResult, DbError> {
    let Json(divergence_details): Json<BTreeMap<String, DivergenceEntry>> =
        row.try_get("divergence_details")?;
    let Json(benchmark_status): Json<BenchmarkChainStatus> = row.try_get("benchmark_status")?;
    let section_number: i32 = row.try_get("section_number")?;

    Ok(AnalysisResult {
        date: row.try_get("date")?,
        asset: row.try_get("asset")?,
        node_type: parse_tag(row, "node_type")?,
        phase: parse_tag(row, "phase")?,
        reference: ReferenceNode {
            date: row.try_get("reference_date")?,
            offchain_index: row.try_get("reference_offchain_index")?,
            node_type: parse_tag(row, "reference_node_type")?,
        },
        current_offchain_index: row.try_get("current_offchain_index")?,
        change_pct: row.try_get("change_pct")?,
        phase_correction: row.try_get("phase_correction")?,
        divergence_correction: row.try_get("divergence_correction")?,
        divergence_details,
        break_index_correction: row.try_get("break_index_correction")?,
        approaching_correction: row.try_get("approaching_correction")?,
        final_pct: row.try_get("final_pct")?,
        quality: parse_tag(row, "quality")?,
        section: Section {
            number: section_number.max(0) as u32,
            description: row.try_get("section_description")?,
            change_pct: row.try_get("section_change_pct")?,
        },
        benchmark_status,
    })
}

fn special_node_from_row(row: &PgRow) -> Result<SpecialNode, DbError> {
    Ok(SpecialNode {
        date: row.try_get("date")?,
        asset: row.try_get("asset")?,
        node_type: parse_tag(row, "node_type")?,
        description: row.try_get("description")?,
        offchain_index: row.try_get("offchain_index")?,
        break_index: row.try_get("break_index")?,
    })
}

fn map_rows<T>(rows: &[PgRow], f: fn(&PgRow) -> Result<T, DbError>) -> Result<Vec<T>, DbError> {
    rows.iter().map(f).collect()
}

#[async_trait]
impl RecordStore for DbRepository {
    async fn upsert_record(&self, record: &DailyRecord) -> Result<(), DbError> {
        record.validate()?;
        bind_record(sqlx::query(UPSERT_RECORD), record)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, asset: &str, date: NaiveDate) -> Result<Option<DailyRecord>, DbError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM daily_records WHERE asset = $1 AND date = $2"
        ))
        .bind(asset)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn get_previous(&self, asset: &str, date: NaiveDate) -> Result<Option<DailyRecord>, DbError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM daily_records WHERE asset = $1 AND date < $2 \
             ORDER BY date DESC LIMIT 1"
        ))
        .bind(asset)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn get_next(&self, asset: &str, date: NaiveDate) -> Result<Option<DailyRecord>, DbError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM daily_records WHERE asset = $1 AND date > $2 \
             ORDER BY date ASC LIMIT 1"
        ))
        .bind(asset)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn history(&self, asset: &str, limit: usize) -> Result<Vec<DailyRecord>, DbError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM daily_records WHERE asset = $1 ORDER BY date DESC LIMIT $2"
        ))
        .bind(asset)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        map_rows(&rows, record_from_row)
    }

    async fn history_between(
        &self,
        asset: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, DbError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM daily_records \
             WHERE asset = $1 AND date >= $2 AND date <= $3 ORDER BY date ASC"
        ))
        .bind(asset)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        map_rows(&rows, record_from_row)
    }

    async fn records_before(&self, asset: &str, before: NaiveDate) -> Result<Vec<DailyRecord>, DbError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM daily_records WHERE asset = $1 AND date < $2 ORDER BY date DESC"
        ))
        .bind(asset)
        .bind(before)
        .fetch_all(&self.pool)
        .await?;
        map_rows(&rows, record_from_row)
    }

    async fn find_last_phase_day1(
        &self,
        asset: &str,
        phase: Phase,
        before: NaiveDate,
    ) -> Result<Option<PhaseAnchor>, DbError> {
        let row = sqlx::query(
            r#"
            SELECT date, offchain_index
            FROM daily_records
            WHERE asset = $1 AND phase = $2 AND phase_days = 1 AND date < $3
            ORDER BY date DESC
            LIMIT 1
            "#,
        )
        .bind(asset)
        .bind(phase.as_str())
        .bind(before)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(PhaseAnchor {
                date: row.try_get("date")?,
                offchain_index: row.try_get("offchain_index")?,
            })
        })
        .transpose()
    }

    async fn benchmark_leaders(&self, date: NaiveDate) -> Result<Vec<DailyRecord>, DbError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM daily_records \
             WHERE date = $1 AND is_benchmark_leader ORDER BY asset ASC"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        map_rows(&rows, record_from_row)
    }

    async fn save_result(&self, result: &AnalysisResult) -> Result<(), DbError> {
        let query = r#"
            INSERT INTO analysis_results (
                date, asset, node_type, phase, reference_date, reference_offchain_index,
                reference_node_type, current_offchain_index, change_pct, phase_correction,
                divergence_correction, divergence_details, break_index_correction,
                approaching_correction, final_pct, quality, section_number,
                section_description, section_change_pct, benchmark_status
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
            )
            ON CONFLICT (date, asset) DO UPDATE SET
                node_type = EXCLUDED.node_type,
                phase = EXCLUDED.phase,
                reference_date = EXCLUDED.reference_date,
                reference_offchain_index = EXCLUDED.reference_offchain_index,
                reference_node_type = EXCLUDED.reference_node_type,
                current_offchain_index = EXCLUDED.current_offchain_index,
                change_pct = EXCLUDED.change_pct,
                phase_correction = EXCLUDED.phase_correction,
                divergence_correction = EXCLUDED.divergence_correction,
                divergence_details = EXCLUDED.divergence_details,
                break_index_correction = EXCLUDED.break_index_correction,
                approaching_correction = EXCLUDED.approaching_correction,
                final_pct = EXCLUDED.final_pct,
                quality = EXCLUDED.quality,
                section_number = EXCLUDED.section_number,
                section_description = EXCLUDED.section_description,
                section_change_pct = EXCLUDED.section_change_pct,
                benchmark_status = EXCLUDED.benchmark_status,
                analyzed_at = NOW()
            "#;

        sqlx::query(query)
            .bind(result.date)
            .bind(&result.asset)
            .bind(result.node_type.as_str())
            .bind(result.phase.as_str())
            .bind(result.reference.date)
            .bind(result.reference.offchain_index)
            .bind(result.reference.node_type.as_str())
            .bind(result.current_offchain_index)
            .bind(result.change_pct)
            .bind(result.phase_correction)
            .bind(result.divergence_correction)
            .bind(Json(&result.divergence_details))
            .bind(result.break_index_correction)
            .bind(result.approaching_correction)
            .bind(result.final_pct)
            .bind(result.quality.as_str())
            .bind(result.section.number as i32)
            .bind(&result.section.description)
            .bind(result.section.change_pct)
            .bind(Json(&result.benchmark_status))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_special_node(&self, node: &SpecialNode) -> Result<bool, DbError> {
        let outcome = sqlx::query(
            r#"
            INSERT INTO special_nodes (date, asset, node_type, description, offchain_index, break_index)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (date, asset, node_type) DO NOTHING
            "#,
        )
        .bind(node.date)
        .bind(&node.asset)
        .bind(node.node_type.as_str())
        .bind(&node.description)
        .bind(node.offchain_index)
        .bind(node.break_index)
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() == 1)
    }

    async fn has_special_node_in_range(
        &self,
        asset: &str,
        node_type: SpecialNodeType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<bool, DbError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM special_nodes
                WHERE asset = $1 AND node_type = $2 AND date >= $3 AND date <= $4
            )
            "#,
        )
        .bind(asset)
        .bind(node_type.as_str())
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn delete_results(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        assets: Option<&[String]>,
    ) -> Result<u64, DbError> {
        let outcome = sqlx::query(
            "DELETE FROM analysis_results \
             WHERE date >= $1 AND date <= $2 AND ($3::text[] IS NULL OR asset = ANY($3))",
        )
        .bind(start)
        .bind(end)
        .bind(assets)
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected())
    }

    async fn delete_special_nodes(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        assets: Option<&[String]>,
    ) -> Result<u64, DbError> {
        let outcome = sqlx::query(
            "DELETE FROM special_nodes \
             WHERE date >= $1 AND date <= $2 AND ($3::text[] IS NULL OR asset = ANY($3))",
        )
        .bind(start)
        .bind(end)
        .bind(assets)
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected())
    }

    async fn records_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyRecord>, DbError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM daily_records \
             WHERE date >= $1 AND date <= $2 ORDER BY date ASC, asset ASC"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        map_rows(&rows, record_from_row)
    }

    async fn results_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AnalysisResult>, DbError> {
        let rows = sqlx::query(&format!(
            "SELECT {RESULT_COLUMNS} FROM analysis_results \
             WHERE date >= $1 AND date <= $2 ORDER BY date ASC, asset ASC"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        map_rows(&rows, result_from_row)
    }

    async fn special_nodes_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<SpecialNode>, DbError> {
        let rows = sqlx::query(&format!(
            "SELECT {SPECIAL_NODE_COLUMNS} FROM special_nodes \
             WHERE date >= $1 AND date <= $2 ORDER BY date ASC, asset ASC, node_type ASC"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        map_rows(&rows, special_node_from_row)
    }

    /// Pairs each record with its predecessor in SQL so only the latest
    /// straddling pair leaves the database.
    async fn find_crossing(
        &self,
        asset: &str,
        before: NaiveDate,
        threshold: i64,
        direction: CrossDirection,
    ) -> Result<Option<Crossing>, DbError> {
        let row = sqlx::query(
            r#"
            SELECT date, offchain_index, break_index, prev_offchain_index, prev_break_index
            FROM (
                SELECT
                    date, offchain_index, break_index,
                    LAG(offchain_index) OVER (ORDER BY date) AS prev_offchain_index,
                    LAG(break_index) OVER (ORDER BY date) AS prev_break_index
                FROM daily_records
                WHERE asset = $1 AND date < $2
            ) AS paired
            WHERE prev_break_index IS NOT NULL
              AND (
                ($4 AND prev_break_index >= $3 AND break_index < $3)
                OR (NOT $4 AND prev_break_index < $3 AND break_index >= $3)
              )
            ORDER BY date DESC
            LIMIT 1
            "#,
        )
        .bind(asset)
        .bind(before)
        .bind(threshold)
        .bind(direction == CrossDirection::Down)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let offchain_index = interpolate_offchain(
            row.try_get("prev_offchain_index")?,
            row.try_get("offchain_index")?,
            row.try_get("prev_break_index")?,
            row.try_get("break_index")?,
            threshold,
        );

        Ok(Some(Crossing {
            date: row.try_get("date")?,
            offchain_index,
        }))
    }
}

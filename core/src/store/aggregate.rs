//! Store methods for the derived burn-rate and inequality views.

use super::{decimal_from_row, decimal_to_sql, SurveyStore};
use crate::{
    aggregator::{AggregateReport, BurnRateAggregate, BurnRateStatus, InequalityAggregate},
    error::{EtlError, EtlResult},
};
use rusqlite::params;
use rust_decimal::prelude::ToPrimitive;

impl SurveyStore {
    /// Full replacement of the burn-rate view.
    pub fn replace_burn_rate(&self, rows: &[BurnRateAggregate]) -> EtlResult<()> {
        self.conn.execute("DELETE FROM burn_rate", [])?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO burn_rate (
                segment_type, segment_value, income, spending,
                burn_rate_pct, surplus_deficit, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for r in rows {
            stmt.execute(params![
                &r.segment_type,
                &r.segment_value,
                decimal_to_sql(&r.income),
                decimal_to_sql(&r.spending),
                r.burn_rate_pct.to_f64().unwrap_or(0.0),
                decimal_to_sql(&r.surplus_deficit),
                r.status.as_str(),
            ])?;
        }
        Ok(())
    }

    /// Full replacement of the inequality view.
    pub fn replace_inequality(&self, rows: &[InequalityAggregate]) -> EtlResult<()> {
        self.conn.execute("DELETE FROM inequality", [])?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO inequality (
                segment_type, item_name, high_segment, high_spend,
                low_segment, low_spend, inequality_ratio, avg_spend
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for r in rows {
            stmt.execute(params![
                &r.segment_type,
                &r.item_name,
                &r.high_segment,
                decimal_to_sql(&r.high_spend),
                &r.low_segment,
                decimal_to_sql(&r.low_spend),
                r.inequality_ratio.to_f64().unwrap_or(0.0),
                decimal_to_sql(&r.avg_spend),
            ])?;
        }
        Ok(())
    }

    pub fn insert_aggregate_refresh(&self, report: &AggregateReport) -> EtlResult<()> {
        self.conn.execute(
            "INSERT INTO aggregate_refresh (
                refreshed_at, burn_rate_rows, inequality_rows,
                segments_considered, segments_excluded, warnings
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chrono::Utc::now().to_rfc3339(),
                report.burn_rate.len() as i64,
                report.inequality.len() as i64,
                report.segments_considered as i64,
                report.segments_excluded as i64,
                serde_json::to_string(&report.warnings)?,
            ],
        )?;
        Ok(())
    }

    // ── Readers (API layer contract, tests, runner summary) ─────────

    pub fn burn_rate_rows(&self) -> EtlResult<Vec<BurnRateAggregate>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.segment_type, b.segment_value, b.income, b.spending,
                    b.burn_rate_pct, b.surplus_deficit, b.status
             FROM burn_rate b
             LEFT JOIN dim_segment d
               ON d.segment_type = b.segment_type AND d.segment_value = b.segment_value
             ORDER BY b.segment_type, d.segment_order, b.segment_value",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let pct: f64 = row.get(4)?;
            let status: String = row.get(6)?;
            out.push(BurnRateAggregate {
                segment_type: row.get(0)?,
                segment_value: row.get(1)?,
                income: decimal_from_row(row, 2, "burn_rate.income")?,
                spending: decimal_from_row(row, 3, "burn_rate.spending")?,
                burn_rate_pct: rust_decimal::Decimal::try_from(pct)
                    .map_err(|_| EtlError::CorruptColumn {
                        column: "burn_rate.burn_rate_pct",
                        value: pct.to_string(),
                    })?
                    .round_dp(2),
                surplus_deficit: decimal_from_row(row, 5, "burn_rate.surplus_deficit")?,
                status: BurnRateStatus::parse(&status).ok_or(EtlError::CorruptColumn {
                    column: "burn_rate.status",
                    value: status.clone(),
                })?,
            });
        }
        Ok(out)
    }

    pub fn inequality_rows(&self) -> EtlResult<Vec<InequalityAggregate>> {
        let mut stmt = self.conn.prepare(
            "SELECT segment_type, item_name, high_segment, high_spend,
                    low_segment, low_spend, inequality_ratio, avg_spend
             FROM inequality
             ORDER BY segment_type, inequality_ratio DESC, item_name",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let ratio: f64 = row.get(6)?;
            out.push(InequalityAggregate {
                segment_type: row.get(0)?,
                item_name: row.get(1)?,
                high_segment: row.get(2)?,
                high_spend: decimal_from_row(row, 3, "inequality.high_spend")?,
                low_segment: row.get(4)?,
                low_spend: decimal_from_row(row, 5, "inequality.low_spend")?,
                inequality_ratio: rust_decimal::Decimal::try_from(ratio)
                    .map_err(|_| EtlError::CorruptColumn {
                        column: "inequality.inequality_ratio",
                        value: ratio.to_string(),
                    })?
                    .round_dp(2),
                avg_spend: decimal_from_row(row, 7, "inequality.avg_spend")?,
            });
        }
        Ok(out)
    }

    /// Segments excluded by the most recent refresh.
    pub fn last_refresh_excluded(&self) -> EtlResult<Option<i64>> {
        use rusqlite::OptionalExtension;
        let excluded = self
            .conn
            .query_row(
                "SELECT segments_excluded FROM aggregate_refresh ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(excluded)
    }
}

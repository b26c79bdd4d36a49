//! Store methods for the segment dimension and expenditure facts.

use super::{decimal_from_row, decimal_to_sql, SurveyStore};
use crate::{
    error::EtlResult,
    normalizer::FactTuple,
    types::{MetricFlag, SegmentId},
};
use rusqlite::{params, OptionalExtension};
use rust_decimal::Decimal;

/// A fact joined with its segment dimension, as the aggregator reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFact {
    pub fact_id: i64,
    pub item_name: String,
    pub segment_id: SegmentId,
    pub segment_type: String,
    pub segment_value: String,
    pub segment_order: Option<i64>,
    pub value: Decimal,
    pub flag: MetricFlag,
}

impl SurveyStore {
    // ── Segment dimension ─────────────────────────────────────────

    /// Insert the segment if new, otherwise leave it alone apart from
    /// backfilling a missing `segment_order`. Returns the segment id.
    pub fn upsert_segment(
        &self,
        segment_type: &str,
        segment_value: &str,
        segment_order: Option<i64>,
        source_file: &str,
    ) -> EtlResult<SegmentId> {
        self.conn.execute(
            "INSERT INTO dim_segment (segment_type, segment_value, segment_order, source_file)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(segment_type, segment_value) DO UPDATE SET
                segment_order = COALESCE(dim_segment.segment_order, excluded.segment_order)",
            params![segment_type, segment_value, segment_order, source_file],
        )?;
        let id = self.conn.query_row(
            "SELECT segment_id FROM dim_segment
             WHERE segment_type = ?1 AND segment_value = ?2",
            params![segment_type, segment_value],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn find_segment(
        &self,
        segment_type: &str,
        segment_value: &str,
    ) -> EtlResult<Option<(SegmentId, Option<i64>)>> {
        let found = self
            .conn
            .query_row(
                "SELECT segment_id, segment_order FROM dim_segment
                 WHERE segment_type = ?1 AND segment_value = ?2",
                params![segment_type, segment_value],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(found)
    }

    pub fn segment_count(&self, segment_type: &str) -> EtlResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM dim_segment WHERE segment_type = ?1",
            params![segment_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Facts ─────────────────────────────────────────────────────

    /// Plain insert: a second row for the same (segment, item) is a
    /// constraint violation, never a silent merge.
    pub fn insert_fact(&self, segment_id: SegmentId, fact: &FactTuple) -> EtlResult<()> {
        self.conn.execute(
            "INSERT INTO fact_segment_expenditure (
                item_name, segment_id, value, is_income_metric, is_consumption_metric
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &fact.item_name,
                segment_id,
                decimal_to_sql(&fact.value),
                fact.is_income_metric(),
                fact.is_consumption_metric(),
            ],
        )?;
        Ok(())
    }

    pub fn fact_count_for_segment_type(&self, segment_type: &str) -> EtlResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM fact_segment_expenditure f
             JOIN dim_segment d ON d.segment_id = f.segment_id
             WHERE d.segment_type = ?1",
            params![segment_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn fact_count_total(&self) -> EtlResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM fact_segment_expenditure",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Clear one segment type's facts ahead of a reload. Dimensions stay.
    pub fn delete_facts_for_segment_type(&self, segment_type: &str) -> EtlResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM fact_segment_expenditure
             WHERE segment_id IN (SELECT segment_id FROM dim_segment WHERE segment_type = ?1)",
            params![segment_type],
        )?;
        Ok(deleted)
    }

    /// Every fact with its segment, ordered by type, item, then segment.
    pub fn all_facts(&self) -> EtlResult<Vec<StoredFact>> {
        let mut stmt = self.conn.prepare(
            "SELECT f.fact_id, f.item_name, f.segment_id, d.segment_type, d.segment_value,
                    d.segment_order, f.value, f.is_income_metric, f.is_consumption_metric
             FROM fact_segment_expenditure f
             JOIN dim_segment d ON d.segment_id = f.segment_id
             ORDER BY d.segment_type, f.item_name, d.segment_id",
        )?;
        let mut rows = stmt.query([])?;
        let mut facts = Vec::new();
        while let Some(row) = rows.next()? {
            facts.push(StoredFact {
                fact_id: row.get(0)?,
                item_name: row.get(1)?,
                segment_id: row.get(2)?,
                segment_type: row.get(3)?,
                segment_value: row.get(4)?,
                segment_order: row.get(5)?,
                value: decimal_from_row(row, 6, "fact_segment_expenditure.value")?,
                flag: MetricFlag::from_columns(row.get(7)?, row.get(8)?),
            });
        }
        Ok(facts)
    }

    /// All facts for one item within a segment type (for tests and tooling).
    pub fn facts_for_item(&self, segment_type: &str, item_name: &str) -> EtlResult<Vec<StoredFact>> {
        Ok(self
            .all_facts()?
            .into_iter()
            .filter(|f| f.segment_type == segment_type && f.item_name == item_name)
            .collect())
    }
}

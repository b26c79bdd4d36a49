//! Normalization: wide table in, long fact tuples out.
//!
//! Steps, in order:
//!   1. drop non-data rows (classifier)
//!   2. clean every segment cell (notation)
//!   3. reshape: one tuple per (row, segment column) with a numeric value
//!   4. flag income / consumption summary rows by keyword
//!
//! R kept rows x C segment columns yields at most R*C tuples.
//!
//! Repeated item names are resolved per row. A repeated ordinary item keeps
//! its first row whole. A repeated income or consumption row rejects the
//! file: keeping either copy would hide the conflict from the burn rate.

use crate::{
    classifier::{classify, SkipReason},
    config::ValidatedFile,
    error::{EtlError, EtlResult},
    extractor::{ExtractedTable, SegmentColumn},
    notation::clean,
    types::{CellValue, MetricFlag},
};
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct FactTuple {
    pub item_name: String,
    pub segment_value: String,
    pub value: Decimal,
    pub flag: MetricFlag,
}

impl FactTuple {
    pub fn is_income_metric(&self) -> bool {
        self.flag.is_income()
    }

    pub fn is_consumption_metric(&self) -> bool {
        self.flag.is_consumption()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeStats {
    pub rows_seen: usize,
    pub rows_kept: usize,
    pub rows_skipped: HashMap<SkipReason, usize>,
    pub cells_missing: usize,
    /// Whole rows dropped because their item name was already seen.
    pub duplicates_dropped: usize,
    pub facts_emitted: usize,
}

impl NormalizeStats {
    pub fn skipped_total(&self) -> usize {
        self.rows_skipped.values().sum()
    }
}

/// A file's facts plus everything the loader needs to resolve dimensions.
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub source_file: String,
    pub segment_type: String,
    pub segments: Vec<SegmentColumn>,
    pub facts: Vec<FactTuple>,
    pub stats: NormalizeStats,
}

pub fn flag_item(item_name: &str, file: &ValidatedFile) -> MetricFlag {
    let lowered = item_name.to_lowercase();
    if lowered.contains(file.income_keyword()) {
        MetricFlag::Income
    } else if lowered.contains(file.consumption_keyword()) {
        MetricFlag::Consumption
    } else {
        MetricFlag::Neither
    }
}

pub fn normalize(table: &ExtractedTable, file: &ValidatedFile) -> EtlResult<NormalizedBatch> {
    let mut stats = NormalizeStats::default();
    let mut facts = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for row in &table.rows {
        stats.rows_seen += 1;
        if let Some(reason) = classify(&row.item, &row.cells) {
            log::debug!(
                "file={} normalize: skip row {} ({}): '{}'",
                file.name(),
                row.row_index,
                reason.as_str(),
                row.item
            );
            *stats.rows_skipped.entry(reason).or_default() += 1;
            continue;
        }

        let item_name = collapse_whitespace(&row.item.to_string());
        let flag = flag_item(&item_name, file);

        if let Some(first_row) = seen.get(&item_name) {
            if flag != MetricFlag::Neither {
                return Err(EtlError::LoadIntegrity {
                    file: file.name().to_string(),
                    reason: format!(
                        "{} row '{}' appears at rows {} and {}",
                        if flag.is_income() { "income" } else { "consumption" },
                        item_name,
                        first_row,
                        row.row_index
                    ),
                });
            }
            stats.duplicates_dropped += 1;
            log::warn!(
                "file={} normalize: item '{}' at row {} repeats row {}, keeping the first",
                file.name(),
                item_name,
                row.row_index,
                first_row
            );
            continue;
        }
        seen.insert(item_name.clone(), row.row_index);
        stats.rows_kept += 1;

        for (col_pos, cell) in row.cells.iter().enumerate() {
            let value = match clean(cell) {
                CellValue::Numeric(v) => v,
                CellValue::Missing => {
                    stats.cells_missing += 1;
                    continue;
                }
            };
            facts.push(FactTuple {
                item_name: item_name.clone(),
                segment_value: table.segment_columns[col_pos].label.clone(),
                value,
                flag,
            });
        }
    }
    stats.facts_emitted = facts.len();

    log::info!(
        "file={} normalize: {} rows kept, {} skipped, {} facts ({} missing cells)",
        file.name(),
        stats.rows_kept,
        stats.skipped_total(),
        stats.facts_emitted,
        stats.cells_missing
    );

    Ok(NormalizedBatch {
        source_file: table.source_file.clone(),
        segment_type: file.segment_type().to_string(),
        segments: table.segment_columns.clone(),
        facts,
        stats,
    })
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

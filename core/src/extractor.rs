//! Extraction: locate the header row, resolve segment columns and the item
//! column, and lift the item rows out of the sheet.
//!
//! `header_row` is never guessed. It comes from the file's config because
//! the agency's layouts are too inconsistent for reliable detection.

use crate::{
    config::{ItemColumnHint, SegmentRule, ValidatedFile},
    error::{EtlError, EtlResult},
    sheet::{read_sheet, RawSheet},
    types::RawCell,
};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentColumn {
    pub index: usize,
    pub label: String,
    pub order: Option<i64>,
}

/// One candidate item row: the item cell and the cells under each resolved
/// segment column, in the same order as `ExtractedTable::segment_columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub row_index: usize,
    pub item: RawCell,
    pub cells: Vec<RawCell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedTable {
    pub source_file: String,
    pub item_column: usize,
    pub segment_columns: Vec<SegmentColumn>,
    pub rows: Vec<RawRow>,
}

/// Read the file at `data_dir/source_file` and extract it.
pub fn extract_file(data_dir: &Path, file: &ValidatedFile) -> EtlResult<ExtractedTable> {
    let path = data_dir.join(&file.config.source_file);
    let sheet = read_sheet(&path, file.config.sheet.as_deref())?;
    log::debug!(
        "file={} extract: read {} rows from {}",
        file.name(),
        sheet.row_count(),
        path.display()
    );
    extract(&sheet, file)
}

pub fn extract(sheet: &RawSheet, file: &ValidatedFile) -> EtlResult<ExtractedTable> {
    let cfg = &file.config;
    let header = sheet.row(cfg.header_row).ok_or_else(|| {
        EtlError::config(
            file.name(),
            "header_row",
            format!("sheet has {} rows, header_row is {}", sheet.row_count(), cfg.header_row),
        )
    })?;

    let segment_columns = resolve_segment_columns(header, sheet.width(), file)?;
    if segment_columns.is_empty() {
        return Err(EtlError::config(
            file.name(),
            "segment_identification",
            format!("no segment columns resolved in header row {}", cfg.header_row),
        ));
    }

    let item_column = resolve_item_column(header, sheet.width(), &segment_columns, file)?;

    let rows = (cfg.data_start()..sheet.row_count())
        .map(|r| RawRow {
            row_index: r,
            item: sheet.cell(r, item_column).clone(),
            cells: segment_columns
                .iter()
                .map(|c| sheet.cell(r, c.index).clone())
                .collect(),
        })
        .collect::<Vec<_>>();

    log::info!(
        "file={} extract: {} segment columns, item column {}, {} candidate rows",
        file.name(),
        segment_columns.len(),
        item_column,
        rows.len()
    );

    Ok(ExtractedTable {
        source_file: cfg.source_file.clone(),
        item_column,
        segment_columns,
        rows,
    })
}

fn resolve_segment_columns(
    header: &[RawCell],
    width: usize,
    file: &ValidatedFile,
) -> EtlResult<Vec<SegmentColumn>> {
    match &file.segment_rule {
        SegmentRule::Pattern { regex, order_from_label } => {
            let mut columns = Vec::new();
            for (index, cell) in header.iter().enumerate() {
                let label = cell.to_string();
                if label.is_empty() || !regex.is_match(&label) {
                    continue;
                }
                if columns.iter().any(|c: &SegmentColumn| c.label == label) {
                    return Err(EtlError::config(
                        file.name(),
                        "segment_identification",
                        format!("header label '{label}' matched more than once"),
                    ));
                }
                let order = if *order_from_label { label.parse::<i64>().ok() } else { None };
                columns.push(SegmentColumn { index, label, order });
            }
            Ok(columns)
        }
        SegmentRule::Explicit(mapping) => {
            let mut columns = Vec::with_capacity(mapping.len());
            for col in mapping {
                if col.column >= width {
                    return Err(EtlError::config(
                        file.name(),
                        "segment_identification",
                        format!("column {} is beyond the sheet width {width}", col.column),
                    ));
                }
                columns.push(SegmentColumn {
                    index: col.column,
                    label: col.label.clone(),
                    order: col.order,
                });
            }
            Ok(columns)
        }
    }
}

fn resolve_item_column(
    header: &[RawCell],
    width: usize,
    segments: &[SegmentColumn],
    file: &ValidatedFile,
) -> EtlResult<usize> {
    let is_segment = |i: usize| segments.iter().any(|c| c.index == i);
    let resolved = match &file.config.item_column_hint {
        ItemColumnHint::FirstNonSegment => (0..width).find(|i| !is_segment(*i)),
        ItemColumnHint::Column { index } => Some(*index).filter(|i| *i < width),
        ItemColumnHint::Header { label } => header
            .iter()
            .position(|c| c.to_string().eq_ignore_ascii_case(label.trim())),
    };
    match resolved {
        Some(i) if !is_segment(i) => Ok(i),
        Some(i) => Err(EtlError::config(
            file.name(),
            "item_column_hint",
            format!("item column {i} is also a segment column"),
        )),
        None => Err(EtlError::config(
            file.name(),
            "item_column_hint",
            format!("{:?} did not resolve to a column", file.config.item_column_hint),
        )),
    }
}

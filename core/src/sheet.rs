//! Raw sheet input. Reads a CSV file or a workbook worksheet into a grid of
//! `RawCell`s that keeps absolute row and column positions, so `header_row`
//! and explicit column indices mean the same thing for every format.

use crate::{
    error::{EtlError, EtlResult},
    types::RawCell,
};
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSheet {
    rows: Vec<Vec<RawCell>>,
}

impl RawSheet {
    pub fn from_rows(rows: Vec<Vec<RawCell>>) -> Self {
        Self { rows }
    }

    /// Convenience for tests and fixtures: every non-empty string is text.
    pub fn from_text_rows(rows: &[&[&str]]) -> Self {
        Self::from_rows(
            rows.iter()
                .map(|r| {
                    r.iter()
                        .map(|s| if s.is_empty() { RawCell::Empty } else { RawCell::text(*s) })
                        .collect()
                })
                .collect(),
        )
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, index: usize) -> Option<&[RawCell]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Cell at (row, column); missing positions read as `Empty`.
    pub fn cell(&self, row: usize, column: usize) -> &RawCell {
        static EMPTY: RawCell = RawCell::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&EMPTY)
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Read `path`, picking the reader from the file extension.
pub fn read_sheet(path: &Path, sheet: Option<&str>) -> EtlResult<RawSheet> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_workbook(path, sheet),
        other => Err(EtlError::config(
            &path.display().to_string(),
            "source_file",
            format!("unsupported file extension '{other}'"),
        )),
    }
}

fn read_csv(path: &Path) -> EtlResult<RawSheet> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let row = record
            .iter()
            .map(|field| {
                let field = field.trim_start_matches('\u{feff}');
                if field.trim().is_empty() {
                    RawCell::Empty
                } else {
                    RawCell::text(field)
                }
            })
            .collect();
        rows.push(row);
    }
    Ok(RawSheet::from_rows(rows))
}

fn read_workbook(path: &Path, sheet: Option<&str>) -> EtlResult<RawSheet> {
    let mut workbook = open_workbook_auto(path)?;
    let name = match sheet {
        Some(name) => name.to_string(),
        None => workbook.sheet_names().first().cloned().ok_or_else(|| {
            EtlError::config(&path.display().to_string(), "sheet", "workbook has no sheets")
        })?,
    };
    let range = workbook.worksheet_range(&name)?;

    // Ranges start at the first used cell, not at A1.
    let (row0, col0) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<RawCell>> = vec![Vec::new(); row0];
    for data_row in range.rows() {
        let mut row = vec![RawCell::Empty; col0];
        row.extend(data_row.iter().map(cell_from_data));
        rows.push(row);
    }
    Ok(RawSheet::from_rows(rows))
}

fn cell_from_data(cell: &Data) -> RawCell {
    match cell {
        Data::Empty => RawCell::Empty,
        Data::Int(i) => RawCell::Number(*i as f64),
        Data::Float(f) => RawCell::Number(*f),
        Data::String(s) if s.trim().is_empty() => RawCell::Empty,
        Data::String(s) => RawCell::text(s.as_str()),
        other => RawCell::text(other.to_string()),
    }
}

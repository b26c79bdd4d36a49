//! Shared primitive types used across the pipeline.

use rust_decimal::Decimal;
use std::fmt;

/// Surrogate key of a `dim_segment` row.
pub type SegmentId = i64;

/// The canonical ingest run identifier.
pub type RunId = String;

/// One spreadsheet cell exactly as read from the source file.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
}

impl RawCell {
    pub fn text(s: impl Into<String>) -> Self {
        RawCell::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            RawCell::Number(n) => n.is_nan(),
        }
    }

    /// True when the cell carries the error-margin separator.
    pub fn has_error_margin(&self) -> bool {
        matches!(self, RawCell::Text(s) if s.contains(crate::notation::ERROR_MARGIN))
    }
}

impl fmt::Display for RawCell {
    /// Whole numbers print without a fractional part so header cells read as
    /// "5" rather than "5.0".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawCell::Empty => Ok(()),
            RawCell::Text(s) => write!(f, "{}", s.trim()),
            RawCell::Number(n) if n.is_nan() => Ok(()),
            RawCell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            RawCell::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A cell after notation cleaning. Nothing downstream of the cleaner looks at
/// a `RawCell` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellValue {
    Missing,
    Numeric(Decimal),
}

impl CellValue {
    pub fn numeric(self) -> Option<Decimal> {
        match self {
            CellValue::Numeric(d) => Some(d),
            CellValue::Missing => None,
        }
    }
}

/// Which summary metric, if any, a fact row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricFlag {
    Income,
    Consumption,
    Neither,
}

impl MetricFlag {
    pub fn is_income(self) -> bool {
        self == MetricFlag::Income
    }

    pub fn is_consumption(self) -> bool {
        self == MetricFlag::Consumption
    }

    pub fn from_columns(is_income: bool, is_consumption: bool) -> Self {
        match (is_income, is_consumption) {
            (true, _) => MetricFlag::Income,
            (false, true) => MetricFlag::Consumption,
            _ => MetricFlag::Neither,
        }
    }
}

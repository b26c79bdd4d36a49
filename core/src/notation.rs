//! Statistical-notation cleaning for a single cell.
//!
//! The agency marks cells in several ways that all have to collapse into
//! either a number or "missing":
//!
//!   ".." / "-"     suppressed, too few observations  -> Missing
//!   "5.8±0.3"      value with its error margin        -> 5.8
//!   "(42.3)"       low-reliability estimate           -> 42.3
//!   "1,234"        thousands separator                -> 1234
//!   "-5.2"         rounding artifact                  -> 5.2
//!
//! Nothing here returns an error: unparseable input is Missing.

use crate::types::{CellValue, RawCell};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

pub const ERROR_MARGIN: char = '±';

const SUPPRESSED_MARKERS: &[&str] = &["..", "-"];

pub fn clean(cell: &RawCell) -> CellValue {
    match cell {
        RawCell::Empty => CellValue::Missing,
        RawCell::Number(n) => match Decimal::from_f64(*n) {
            Some(d) => CellValue::Numeric(d.abs().normalize()),
            None => CellValue::Missing,
        },
        RawCell::Text(s) => clean_text(s),
    }
}

pub fn clean_text(raw: &str) -> CellValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() || SUPPRESSED_MARKERS.contains(&trimmed) {
        return CellValue::Missing;
    }

    let value = match trimmed.split_once(ERROR_MARGIN) {
        Some((before, _)) => before.trim(),
        None => trimmed,
    };

    let value = value
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .unwrap_or(value)
        .trim();

    let value: String = value.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();

    match Decimal::from_str(&value) {
        Ok(d) => CellValue::Numeric(d.abs()),
        Err(_) => CellValue::Missing,
    }
}

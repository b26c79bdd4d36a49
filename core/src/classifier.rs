//! Row classification: data row or something to drop.

use crate::types::RawCell;
use regex::RegexSet;
use std::sync::OnceLock;

/// Why a row was dropped before reshaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    EmptyItem,
    ErrorMarginRow,
    Footnote,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::EmptyItem => "empty_item",
            SkipReason::ErrorMarginRow => "error_margin_row",
            SkipReason::Footnote => "footnote",
        }
    }
}

// Footnote and metadata markers in English and Hebrew.
const FOOTNOTE_PATTERNS: &[&str] = &[
    r"^\s*\(\d+\)",
    r"(?i)^\s*tables?\s+\d",
    r"(?i)\bsee\s+tables?\s+\d",
    r"(?i)\bpublications?\s+(no\.?\s*)?\d",
    r"(?i)^\s*(source|notes?)\s*:",
    r"^\s*לוח",
    r"פרסום",
    r"^\s*מקור\s*:",
];

fn footnote_patterns() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| RegexSet::new(FOOTNOTE_PATTERNS).expect("footnote patterns compile"))
}

/// Returns `Some(reason)` when the row must not produce facts.
pub fn classify(item: &RawCell, values: &[RawCell]) -> Option<SkipReason> {
    if item.is_empty() {
        return Some(SkipReason::EmptyItem);
    }
    let name = item.to_string();
    if name.eq_ignore_ascii_case("nan") {
        return Some(SkipReason::EmptyItem);
    }
    if item.has_error_margin() || values.iter().any(RawCell::has_error_margin) {
        return Some(SkipReason::ErrorMarginRow);
    }
    if footnote_patterns().is_match(&name) {
        return Some(SkipReason::Footnote);
    }
    None
}

pub fn should_skip(item: &RawCell, values: &[RawCell]) -> bool {
    classify(item, values).is_some()
}

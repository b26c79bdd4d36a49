//! Declarative per-file configuration.
//!
//! One `FileConfig` per ingestible source file. Adding a file means adding a
//! record to `data/sources.json`, never a code branch. The whole catalogue is
//! validated once at startup (`PipelineConfig::validate`) and the compiled
//! form is passed by reference into extraction and normalization.

use crate::error::{EtlError, EtlResult};
use regex::{Regex, RegexBuilder, RegexSet, RegexSetBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ── File descriptors ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Path relative to the data directory.
    pub source_file: String,
    /// Label attached to every segment this file produces.
    pub segment_type: String,
    /// Worksheet to read from a workbook. First sheet when absent.
    #[serde(default)]
    pub sheet: Option<String>,
    /// 0-based row index holding the segment column labels.
    pub header_row: usize,
    /// First row of item data. Defaults to the row after the header.
    #[serde(default)]
    pub first_data_row: Option<usize>,
    pub segment_identification: SegmentIdentification,
    pub income_row_keyword: String,
    pub consumption_row_keyword: String,
    #[serde(default)]
    pub item_column_hint: ItemColumnHint,
}

impl FileConfig {
    pub fn data_start(&self) -> usize {
        self.first_data_row.unwrap_or(self.header_row + 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentIdentification {
    /// Header cells whose text matches `regex` are segment columns.
    Pattern {
        regex: String,
        /// Integer labels ("1".."10") double as the segment order.
        #[serde(default)]
        order_from_label: bool,
    },
    /// Column positions mapped explicitly to segment labels.
    Explicit { columns: Vec<ExplicitColumn> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplicitColumn {
    pub column: usize,
    pub label: String,
    #[serde(default)]
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemColumnHint {
    #[default]
    FirstNonSegment,
    Column { index: usize },
    Header { label: String },
}

// ── Aggregation settings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Case-insensitive patterns naming non-consumption rows (income, taxes,
    /// transfers, survey metadata). Matching items never enter the
    /// inequality view.
    pub exclusion_patterns: Vec<String>,
    /// Segment values that summarise the whole population ("Total").
    #[serde(default)]
    pub summary_segment_values: Vec<String>,
    #[serde(default)]
    pub burn_rate_bands: BurnRateBands,
}

/// Upper bounds, in percent of income, for the burn-rate status bands.
/// Anything above `breakeven_max` is a deficit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurnRateBands {
    pub healthy_saving_max: Decimal,
    pub low_saving_max: Decimal,
    pub breakeven_max: Decimal,
}

impl Default for BurnRateBands {
    fn default() -> Self {
        Self {
            healthy_saving_max: Decimal::from(80),
            low_saving_max: Decimal::from(95),
            breakeven_max: Decimal::from(100),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            exclusion_patterns: DEFAULT_EXCLUSION_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            summary_segment_values: vec!["Total".into(), "סך הכל".into()],
            burn_rate_bands: BurnRateBands::default(),
        }
    }
}

const DEFAULT_EXCLUSION_PATTERNS: &[&str] = &[
    r"\bincome\b",
    r"\btax(es)?\b",
    r"national insurance",
    r"health insurance",
    r"mandatory payments?",
    r"\btransfers?\b",
    r"\ballowances?\b",
    r"\bpensions?\b",
    r"^households\b",
    r"\bpersons?\b",
    r"\bearners?\b",
    r"\bnumber of\b",
    r"\baverage\b",
    r"\bpercent(age)?\b",
    r"%",
    r"standard (deviation|error)",
    r"\bhead of household\b",
    r"הכנסה",
    r"\bמס(ים)?\b",
    r"ביטוח לאומי",
    r"ביטוח בריאות",
    r"תשלומי חובה",
    r"העברות",
    r"משקי בית",
    r"נפשות",
    r"מפרנסים",
];

// ── Pipeline catalogue ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub files: Vec<FileConfig>,
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

impl PipelineConfig {
    /// Load the catalogue from a JSON file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(config)
    }

    /// Compile every pattern and check the cross-file keyword invariant.
    pub fn validate(&self) -> EtlResult<ValidatedConfig> {
        let mut files = Vec::with_capacity(self.files.len());
        for cfg in &self.files {
            files.push(ValidatedFile::compile(cfg)?);
        }
        check_keyword_overlap(&self.files)?;

        // Load idempotency is tracked per segment type, so each type has one file.
        let mut types = std::collections::HashSet::new();
        for cfg in &self.files {
            if !types.insert(cfg.segment_type.trim().to_lowercase()) {
                return Err(EtlError::config(
                    &cfg.source_file,
                    "segment_type",
                    format!("segment type '{}' is produced by another file", cfg.segment_type),
                ));
            }
        }

        let exclusions = RegexSetBuilder::new(&self.aggregation.exclusion_patterns)
            .case_insensitive(true)
            .build()
            .map_err(|e| EtlError::config("<aggregation>", "exclusion_patterns", e.to_string()))?;

        Ok(ValidatedConfig {
            files,
            aggregation: self.aggregation.clone(),
            exclusions,
        })
    }

    /// Config with hardcoded descriptors for use in tests.
    pub fn default_test() -> Self {
        Self {
            files: vec![
                FileConfig {
                    source_file: "income_quintiles.csv".into(),
                    segment_type: "Income Quintile".into(),
                    sheet: None,
                    header_row: 2,
                    first_data_row: None,
                    segment_identification: SegmentIdentification::Pattern {
                        regex: r"^(\d{1,2}|Total)$".into(),
                        order_from_label: true,
                    },
                    income_row_keyword: "net money income".into(),
                    consumption_row_keyword: "consumption expenditure".into(),
                    item_column_hint: ItemColumnHint::FirstNonSegment,
                },
                FileConfig {
                    source_file: "religiosity.csv".into(),
                    segment_type: "Religiosity".into(),
                    sheet: None,
                    header_row: 1,
                    first_data_row: None,
                    segment_identification: SegmentIdentification::Explicit {
                        columns: vec![
                            ExplicitColumn { column: 1, label: "Ultra-Orthodox".into(), order: None },
                            ExplicitColumn { column: 2, label: "Religious".into(), order: None },
                            ExplicitColumn { column: 3, label: "Traditional".into(), order: None },
                            ExplicitColumn { column: 4, label: "Secular".into(), order: None },
                        ],
                    },
                    income_row_keyword: "net money income".into(),
                    consumption_row_keyword: "consumption expenditure".into(),
                    item_column_hint: ItemColumnHint::Column { index: 0 },
                },
            ],
            aggregation: AggregationConfig::default(),
        }
    }
}

fn keywords_overlap(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    a.contains(&b) || b.contains(&a)
}

/// No income keyword may overlap any consumption keyword, in any pair of
/// files, or a single row could be flagged both ways.
fn check_keyword_overlap(files: &[FileConfig]) -> EtlResult<()> {
    for income_cfg in files {
        for consumption_cfg in files {
            if keywords_overlap(
                &income_cfg.income_row_keyword,
                &consumption_cfg.consumption_row_keyword,
            ) {
                return Err(EtlError::config(
                    &income_cfg.source_file,
                    "income_row_keyword",
                    format!(
                        "'{}' overlaps consumption keyword '{}' of '{}'",
                        income_cfg.income_row_keyword,
                        consumption_cfg.consumption_row_keyword,
                        consumption_cfg.source_file
                    ),
                ));
            }
        }
    }
    Ok(())
}

// ── Validated form ───────────────────────────────────────────────────────────

/// Segment identification with its regex compiled.
#[derive(Debug, Clone)]
pub enum SegmentRule {
    Pattern { regex: Regex, order_from_label: bool },
    Explicit(Vec<ExplicitColumn>),
}

#[derive(Debug, Clone)]
pub struct ValidatedFile {
    pub config: FileConfig,
    pub segment_rule: SegmentRule,
    income_keyword: String,
    consumption_keyword: String,
}

impl ValidatedFile {
    pub fn compile(cfg: &FileConfig) -> EtlResult<Self> {
        let file = cfg.source_file.as_str();
        if cfg.segment_type.trim().is_empty() {
            return Err(EtlError::config(file, "segment_type", "must not be empty"));
        }
        if cfg.income_row_keyword.trim().is_empty() {
            return Err(EtlError::config(file, "income_row_keyword", "must not be empty"));
        }
        if cfg.consumption_row_keyword.trim().is_empty() {
            return Err(EtlError::config(file, "consumption_row_keyword", "must not be empty"));
        }
        if cfg.data_start() <= cfg.header_row {
            return Err(EtlError::config(
                file,
                "first_data_row",
                format!("must come after header_row {}", cfg.header_row),
            ));
        }

        let segment_rule = match &cfg.segment_identification {
            SegmentIdentification::Pattern { regex, order_from_label } => {
                let regex = RegexBuilder::new(regex)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| EtlError::config(file, "segment_identification", e.to_string()))?;
                SegmentRule::Pattern { regex, order_from_label: *order_from_label }
            }
            SegmentIdentification::Explicit { columns } => {
                if columns.is_empty() {
                    return Err(EtlError::config(
                        file,
                        "segment_identification",
                        "explicit mapping lists no columns",
                    ));
                }
                let mut labels = std::collections::HashSet::new();
                let mut indices = std::collections::HashSet::new();
                for col in columns {
                    if !labels.insert(col.label.as_str()) {
                        return Err(EtlError::config(
                            file,
                            "segment_identification",
                            format!("label '{}' mapped twice", col.label),
                        ));
                    }
                    if !indices.insert(col.column) {
                        return Err(EtlError::config(
                            file,
                            "segment_identification",
                            format!("column {} mapped twice", col.column),
                        ));
                    }
                }
                SegmentRule::Explicit(columns.clone())
            }
        };

        Ok(Self {
            config: cfg.clone(),
            segment_rule,
            income_keyword: cfg.income_row_keyword.trim().to_lowercase(),
            consumption_keyword: cfg.consumption_row_keyword.trim().to_lowercase(),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.source_file
    }

    pub fn segment_type(&self) -> &str {
        &self.config.segment_type
    }

    /// Lower-cased income keyword.
    pub fn income_keyword(&self) -> &str {
        &self.income_keyword
    }

    /// Lower-cased consumption keyword.
    pub fn consumption_keyword(&self) -> &str {
        &self.consumption_keyword
    }
}

#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub files: Vec<ValidatedFile>,
    pub aggregation: AggregationConfig,
    exclusions: RegexSet,
}

impl ValidatedConfig {
    /// True when the item names a non-consumption row.
    pub fn is_excluded_item(&self, item_name: &str) -> bool {
        self.exclusions.is_match(item_name)
    }

    pub fn is_summary_segment(&self, segment_value: &str) -> bool {
        self.aggregation
            .summary_segment_values
            .iter()
            .any(|s| s.trim().eq_ignore_ascii_case(segment_value.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_test_catalogue_validates() {
        let validated = PipelineConfig::default_test().validate().unwrap();
        assert_eq!(validated.files.len(), 2);
    }

    #[test]
    fn overlapping_keywords_across_files_are_rejected() {
        let mut config = PipelineConfig::default_test();
        config.files[1].consumption_row_keyword = "Money Income".into();
        match config.validate() {
            Err(EtlError::Configuration { field, .. }) => assert_eq!(field, "income_row_keyword"),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_segment_regex_names_the_field() {
        let mut config = PipelineConfig::default_test();
        config.files[0].segment_identification = SegmentIdentification::Pattern {
            regex: "([0-9".into(),
            order_from_label: false,
        };
        match config.validate() {
            Err(EtlError::Configuration { file, field, .. }) => {
                assert_eq!(file, "income_quintiles.csv");
                assert_eq!(field, "segment_identification");
            }
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn explicit_mapping_rejects_a_reused_column() {
        let mut config = PipelineConfig::default_test();
        config.files[1].segment_identification = SegmentIdentification::Explicit {
            columns: vec![
                ExplicitColumn { column: 1, label: "Ultra-Orthodox".into(), order: None },
                ExplicitColumn { column: 1, label: "Religious".into(), order: None },
            ],
        };
        match config.validate() {
            Err(EtlError::Configuration { file, field, reason }) => {
                assert_eq!(file, "religiosity.csv");
                assert_eq!(field, "segment_identification");
                assert!(reason.contains("column 1"), "{reason}");
            }
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn exclusion_patterns_match_non_consumption_rows_only() {
        let validated = PipelineConfig::default_test().validate().unwrap();
        assert!(validated.is_excluded_item("National Insurance payments"));
        assert!(validated.is_excluded_item("Income tax"));
        assert!(validated.is_excluded_item("Net money income per household"));
        assert!(validated.is_excluded_item("Number of persons in household"));
        assert!(!validated.is_excluded_item("Travel abroad"));
        assert!(!validated.is_excluded_item("Alcoholic beverages"));
        assert!(!validated.is_excluded_item("Taxi rides"));
        assert!(!validated.is_excluded_item("מסעדות"));
    }

    #[test]
    fn config_parses_from_json() {
        let json = r#"{
            "files": [{
                "source_file": "regions.xlsx",
                "segment_type": "District",
                "sheet": "2022",
                "header_row": 4,
                "segment_identification": {
                    "kind": "explicit",
                    "columns": [
                        {"column": 2, "label": "Jerusalem"},
                        {"column": 3, "label": "North"}
                    ]
                },
                "income_row_keyword": "net money income",
                "consumption_row_keyword": "consumption expenditure",
                "item_column_hint": {"kind": "header", "label": "Item"}
            }]
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.files[0].data_start(), 5);
        assert_eq!(
            config.files[0].item_column_hint,
            ItemColumnHint::Header { label: "Item".into() }
        );
        assert!(!config.aggregation.exclusion_patterns.is_empty());
    }
}

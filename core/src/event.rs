//! Ingest events, persisted as JSON in `ingest_event`.
//!
//! Operators read this log to see why a file produced fewer facts than
//! expected or why a segment is missing from the burn-rate view.

use crate::types::RunId;
use serde::{Deserialize, Serialize};

/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EtlEvent {
    RunStarted {
        run_id: RunId,
        files_configured: usize,
    },
    FileExtracted {
        segment_columns: Vec<String>,
        item_column: usize,
        candidate_rows: usize,
    },
    RowsSkipped {
        reason: String,
        count: usize,
    },
    FileLoaded {
        segments_upserted: usize,
        facts_inserted: usize,
        facts_replaced: usize,
    },
    FileSkipped {
        existing_facts: i64,
    },
    FileFailed {
        error: String,
    },
    DataQualityWarning {
        segment_type: String,
        segment_value: String,
        metric: String,
        found: usize,
    },
    AggregatesRefreshed {
        burn_rate_rows: usize,
        inequality_rows: usize,
        segments_excluded: usize,
    },
}

impl EtlEvent {
    /// Stable name for the `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            EtlEvent::RunStarted { .. }          => "run_started",
            EtlEvent::FileExtracted { .. }       => "file_extracted",
            EtlEvent::RowsSkipped { .. }         => "rows_skipped",
            EtlEvent::FileLoaded { .. }          => "file_loaded",
            EtlEvent::FileSkipped { .. }         => "file_skipped",
            EtlEvent::FileFailed { .. }          => "file_failed",
            EtlEvent::DataQualityWarning { .. }  => "data_quality_warning",
            EtlEvent::AggregatesRefreshed { .. } => "aggregates_refreshed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:          Option<i64>,
    pub run_id:      RunId,
    pub source_file: Option<String>,
    pub event_type:  String,
    pub payload:     String,
}

impl EventLogEntry {
    pub fn new(run_id: &str, source_file: Option<&str>, event: &EtlEvent) -> serde_json::Result<Self> {
        Ok(Self {
            id:          None,
            run_id:      run_id.to_string(),
            source_file: source_file.map(str::to_string),
            event_type:  event.type_name().to_string(),
            payload:     serde_json::to_string(event)?,
        })
    }

    pub fn event(&self) -> serde_json::Result<EtlEvent> {
        serde_json::from_str(&self.payload)
    }
}

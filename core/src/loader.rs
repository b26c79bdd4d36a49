//! Loading: upsert segment dimensions and insert fact rows for one file.
//!
//! Each load runs in a single transaction. Dimension upserts are always
//! idempotent. Fact rows are keyed on (segment_id, item_name); re-running a
//! file is either a no-op (`SkipExisting`) or an explicit clear-and-reload of
//! that segment type (`Replace`). Nothing is deduplicated silently.

use crate::{
    error::{EtlError, EtlResult},
    normalizer::NormalizedBatch,
    store::SurveyStore,
    types::SegmentId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Leave a segment type that already has facts untouched.
    #[default]
    SkipExisting,
    /// Delete the segment type's facts, then load.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded {
        segments_upserted: usize,
        facts_inserted: usize,
        facts_replaced: usize,
    },
    Skipped {
        existing_facts: i64,
    },
}

pub fn load(store: &SurveyStore, batch: &NormalizedBatch, mode: LoadMode) -> EtlResult<LoadOutcome> {
    let file = batch.source_file.as_str();
    let segment_type = batch.segment_type.as_str();

    let outcome = store.in_transaction(|s| {
        let existing = s.fact_count_for_segment_type(segment_type)?;
        let facts_replaced = match mode {
            LoadMode::SkipExisting if existing > 0 => {
                return Ok(LoadOutcome::Skipped { existing_facts: existing });
            }
            LoadMode::SkipExisting => 0,
            LoadMode::Replace => s.delete_facts_for_segment_type(segment_type)?,
        };

        let mut ids: HashMap<&str, SegmentId> = HashMap::new();
        for segment in &batch.segments {
            if !batch.facts.iter().any(|f| f.segment_value == segment.label) {
                continue;
            }
            let id = s
                .upsert_segment(segment_type, &segment.label, segment.order, file)
                .map_err(|e| integrity(file, e))?;
            ids.insert(segment.label.as_str(), id);
        }

        for fact in &batch.facts {
            let segment_id = *ids.get(fact.segment_value.as_str()).ok_or_else(|| {
                EtlError::LoadIntegrity {
                    file: file.to_string(),
                    reason: format!("segment '{}' was not resolved", fact.segment_value),
                }
            })?;
            s.insert_fact(segment_id, fact).map_err(|e| integrity(file, e))?;
        }

        Ok(LoadOutcome::Loaded {
            segments_upserted: ids.len(),
            facts_inserted: batch.facts.len(),
            facts_replaced,
        })
    })?;

    match &outcome {
        LoadOutcome::Loaded { segments_upserted, facts_inserted, facts_replaced } => log::info!(
            "file={file} load: {facts_inserted} facts across {segments_upserted} segments \
             ({facts_replaced} replaced)"
        ),
        LoadOutcome::Skipped { existing_facts } => log::info!(
            "file={file} load: skipped, segment type '{segment_type}' already has \
             {existing_facts} facts"
        ),
    }
    Ok(outcome)
}

/// Unique-key violations become `LoadIntegrity`; anything else passes through.
fn integrity(file: &str, err: EtlError) -> EtlError {
    match err {
        EtlError::Database(rusqlite::Error::SqliteFailure(code, msg))
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            EtlError::LoadIntegrity {
                file: file.to_string(),
                reason: msg.unwrap_or_else(|| "constraint violation".to_string()),
            }
        }
        other => other,
    }
}

//! The batch pipeline.
//!
//! EXECUTION ORDER (fixed):
//!   1. Validate the whole config catalogue once.
//!   2. For each configured file, in order: extract -> normalize -> load.
//!      A file runs to completion before the next one starts.
//!   3. Refresh the derived aggregates.
//!
//! RULES:
//!   - A failure in one file aborts that file only; later files still run.
//!   - Every file outcome is recorded in ingest_file_log.
//!   - Concurrent runs against the same store are not supported. The caller
//!     must serialize them.

use crate::{
    aggregator::{self, AggregateReport},
    config::{PipelineConfig, ValidatedConfig, ValidatedFile},
    error::EtlResult,
    event::{EtlEvent, EventLogEntry},
    extractor::extract_file,
    loader::{load, LoadMode, LoadOutcome},
    normalizer::{normalize, NormalizeStats},
    store::{FileLogRow, SurveyStore},
    types::RunId,
};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    Loaded { facts: usize, segments: usize },
    Skipped { existing_facts: i64 },
    Failed { error: String },
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Loaded { .. } => "loaded",
            FileStatus::Skipped { .. } => "skipped",
            FileStatus::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub source_file: String,
    pub segment_type: String,
    pub status: FileStatus,
    pub stats: Option<NormalizeStats>,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: RunId,
    pub files: Vec<FileOutcome>,
    pub aggregates: Option<AggregateReport>,
}

impl BatchReport {
    pub fn count(&self, status: &str) -> usize {
        self.files.iter().filter(|f| f.status.as_str() == status).count()
    }
}

pub struct EtlPipeline<'a> {
    store: &'a SurveyStore,
    config: ValidatedConfig,
}

impl<'a> EtlPipeline<'a> {
    /// Validate `config` up front. A bad catalogue never starts a batch.
    pub fn new(store: &'a SurveyStore, config: &PipelineConfig) -> EtlResult<Self> {
        Ok(Self {
            store,
            config: config.validate()?,
        })
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    /// Run every configured file, then refresh aggregates.
    pub fn run(&self, data_dir: &Path, mode: LoadMode) -> EtlResult<BatchReport> {
        let run_id = format!("ingest-{}", uuid::Uuid::new_v4());
        self.store.insert_run(&run_id, env!("CARGO_PKG_VERSION"))?;
        self.record(
            &run_id,
            None,
            &EtlEvent::RunStarted {
                run_id: run_id.clone(),
                files_configured: self.config.files.len(),
            },
        )?;
        log::info!("run={run_id} starting batch of {} files", self.config.files.len());

        let mut files = Vec::with_capacity(self.config.files.len());
        for file in &self.config.files {
            let outcome = self.run_file(&run_id, data_dir, file, mode)?;
            files.push(outcome);
        }

        let aggregates = self.refresh_aggregates(&run_id)?;

        let report = BatchReport {
            run_id: run_id.clone(),
            files,
            aggregates: Some(aggregates),
        };
        self.store.finish_run(
            &run_id,
            report.count("loaded"),
            report.count("skipped"),
            report.count("failed"),
        )?;
        Ok(report)
    }

    /// Extract, normalize and load one file. Per-file errors are recorded
    /// and returned as a `Failed` outcome; only store bookkeeping errors
    /// propagate. Events are written after the outcome is settled, so a
    /// bookkeeping error surfaces as `Err`, never as a `Failed` file.
    pub fn run_file(
        &self,
        run_id: &str,
        data_dir: &Path,
        file: &ValidatedFile,
        mode: LoadMode,
    ) -> EtlResult<FileOutcome> {
        let name = file.name();
        let mut stats = None;
        let mut events = Vec::new();

        let result = (|| -> EtlResult<FileStatus> {
            let table = extract_file(data_dir, file)?;
            events.push(EtlEvent::FileExtracted {
                segment_columns: table.segment_columns.iter().map(|c| c.label.clone()).collect(),
                item_column: table.item_column,
                candidate_rows: table.rows.len(),
            });

            let batch = normalize(&table, file)?;
            for (reason, count) in &batch.stats.rows_skipped {
                events.push(EtlEvent::RowsSkipped {
                    reason: reason.as_str().to_string(),
                    count: *count,
                });
            }
            stats = Some(batch.stats.clone());

            match load(self.store, &batch, mode)? {
                LoadOutcome::Loaded { segments_upserted, facts_inserted, facts_replaced } => {
                    events.push(EtlEvent::FileLoaded { segments_upserted, facts_inserted, facts_replaced });
                    Ok(FileStatus::Loaded { facts: facts_inserted, segments: segments_upserted })
                }
                LoadOutcome::Skipped { existing_facts } => {
                    events.push(EtlEvent::FileSkipped { existing_facts });
                    Ok(FileStatus::Skipped { existing_facts })
                }
            }
        })();

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                log::error!("file={name} failed: {e}");
                let error = e.to_string();
                events.push(EtlEvent::FileFailed { error: error.clone() });
                FileStatus::Failed { error }
            }
        };

        let (facts_loaded, error) = match &status {
            FileStatus::Loaded { facts, .. } => (*facts as i64, None),
            FileStatus::Skipped { .. } => (0, None),
            FileStatus::Failed { error } => (0, Some(error.clone())),
        };
        self.store.insert_file_log(
            run_id,
            &FileLogRow {
                source_file: name.to_string(),
                segment_type: file.segment_type().to_string(),
                status: status.as_str().to_string(),
                facts_loaded,
                rows_skipped: stats.as_ref().map_or(0, |s| s.skipped_total() as i64),
                error,
            },
        )?;
        for event in &events {
            self.record(run_id, Some(name), event)?;
        }

        Ok(FileOutcome {
            source_file: name.to_string(),
            segment_type: file.segment_type().to_string(),
            status,
            stats,
        })
    }

    /// Recompute both derived views and log their coverage.
    pub fn refresh_aggregates(&self, run_id: &str) -> EtlResult<AggregateReport> {
        let report = aggregator::refresh(self.store, &self.config)?;
        for w in &report.warnings {
            self.record(
                run_id,
                None,
                &EtlEvent::DataQualityWarning {
                    segment_type: w.segment_type.clone(),
                    segment_value: w.segment_value.clone(),
                    metric: w.metric.as_str().to_string(),
                    found: w.found,
                },
            )?;
        }
        self.record(
            run_id,
            None,
            &EtlEvent::AggregatesRefreshed {
                burn_rate_rows: report.burn_rate.len(),
                inequality_rows: report.inequality.len(),
                segments_excluded: report.segments_excluded,
            },
        )?;
        Ok(report)
    }

    /// Refresh aggregates without ingesting, under its own run id.
    pub fn aggregate_only(&self) -> EtlResult<BatchReport> {
        let run_id = format!("aggregate-{}", uuid::Uuid::new_v4());
        self.store.insert_run(&run_id, env!("CARGO_PKG_VERSION"))?;
        let aggregates = self.refresh_aggregates(&run_id)?;
        self.store.finish_run(&run_id, 0, 0, 0)?;
        Ok(BatchReport { run_id, files: Vec::new(), aggregates: Some(aggregates) })
    }

    fn record(&self, run_id: &str, source_file: Option<&str>, event: &EtlEvent) -> EtlResult<()> {
        let entry = EventLogEntry::new(run_id, source_file, event)?;
        self.store.append_event(&entry)
    }
}

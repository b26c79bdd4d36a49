//! Store methods for ingest bookkeeping: runs and per-file outcomes.

use super::SurveyStore;
use crate::error::EtlResult;
use rusqlite::params;

/// One `ingest_file_log` row.
#[derive(Debug, Clone, PartialEq)]
pub struct FileLogRow {
    pub source_file:  String,
    pub segment_type: String,
    pub status:       String,
    pub facts_loaded: i64,
    pub rows_skipped: i64,
    pub error:        Option<String>,
}

impl SurveyStore {
    pub fn insert_run(&self, run_id: &str, version: &str) -> EtlResult<()> {
        self.conn.execute(
            "INSERT INTO ingest_run (run_id, version, started_at) VALUES (?1, ?2, ?3)",
            params![run_id, version, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn finish_run(
        &self,
        run_id: &str,
        loaded: usize,
        skipped: usize,
        failed: usize,
    ) -> EtlResult<()> {
        self.conn.execute(
            "UPDATE ingest_run
             SET finished_at = ?1, files_loaded = ?2, files_skipped = ?3, files_failed = ?4
             WHERE run_id = ?5",
            params![
                chrono::Utc::now().to_rfc3339(),
                loaded as i64,
                skipped as i64,
                failed as i64,
                run_id
            ],
        )?;
        Ok(())
    }

    pub fn insert_file_log(&self, run_id: &str, row: &FileLogRow) -> EtlResult<()> {
        self.conn.execute(
            "INSERT INTO ingest_file_log (
                run_id, source_file, segment_type, status,
                facts_loaded, rows_skipped, error, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run_id,
                &row.source_file,
                &row.segment_type,
                &row.status,
                row.facts_loaded,
                row.rows_skipped,
                &row.error,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn file_log_for_run(&self, run_id: &str) -> EtlResult<Vec<FileLogRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_file, segment_type, status, facts_loaded, rows_skipped, error
             FROM ingest_file_log WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(FileLogRow {
                source_file:  row.get(0)?,
                segment_type: row.get(1)?,
                status:       row.get(2)?,
                facts_loaded: row.get(3)?,
                rows_skipped: row.get(4)?,
                error:        row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! Pipeline stages call store methods; they never execute SQL directly.

use crate::{
    error::{EtlError, EtlResult},
    event::EventLogEntry,
};
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

mod aggregate;
mod ingest;
mod segment;

pub use ingest::FileLogRow;
pub use segment::StoredFact;

pub struct SurveyStore {
    conn: Connection,
}

impl SurveyStore {
    pub fn open(path: &str) -> EtlResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EtlResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order. Safe to call on every start.
    pub fn migrate(&self) -> EtlResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_segments.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_aggregates.sql"))?;
        Ok(())
    }

    /// Run `f` inside one transaction. Any error rolls everything back.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> EtlResult<T>) -> EtlResult<T> {
        let tx = self.conn.unchecked_transaction()?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    /// Explicit reset: clears facts, dimensions and both derived views.
    /// Ingest bookkeeping is kept.
    pub fn reset_all(&self) -> EtlResult<()> {
        self.conn.execute_batch(
            "DELETE FROM burn_rate;
             DELETE FROM inequality;
             DELETE FROM fact_segment_expenditure;
             DELETE FROM dim_segment;",
        )?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> EtlResult<()> {
        self.conn.execute(
            "INSERT INTO ingest_event (run_id, source_file, event_type, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.run_id, entry.source_file, entry.event_type, entry.payload],
        )?;
        Ok(())
    }

    pub fn events_for_run(&self, run_id: &str) -> EtlResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, source_file, event_type, payload
             FROM ingest_event WHERE run_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(EventLogEntry {
                    id:          Some(row.get(0)?),
                    run_id:      row.get(1)?,
                    source_file: row.get(2)?,
                    event_type:  row.get(3)?,
                    payload:     row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

// ── Decimal columns ────────────────────────────────────────────

fn decimal_to_sql(value: &Decimal) -> String {
    value.normalize().to_string()
}

fn decimal_from_row(row: &Row<'_>, idx: usize, column: &'static str) -> EtlResult<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text).map_err(|_| EtlError::CorruptColumn { column, value: text })
}

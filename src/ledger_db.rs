use rusqlite::{Connection, params};
use std::path::Path;
use tracing::info;

use crate::reconcile::{LedgerRow, Month, Period};

/// year, month, consultant, parts, services, rate
type RawRow = (i32, u32, String, i64, i64, f64);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("ledger database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cannot create ledger directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger row has invalid month {0}")]
    BadMonth(u32),
}

/// Audit entry written once per processing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub period: Period,
    pub roster_version: String,
    pub parts_resolved: usize,
    pub parts_skipped: usize,
    pub services_resolved: usize,
    pub services_skipped: usize,
}

/// Durable home of ledger rows. Keyed by (period, consultant); writes to an
/// existing key replace it.
pub trait LedgerStore {
    /// Insert or replace rows; returns how many were written.
    fn upsert(&self, rows: &[LedgerRow]) -> Result<usize, StoreError>;

    fn read_all(&self) -> Result<Vec<LedgerRow>, StoreError>;

    fn read_period(&self, period: Period) -> Result<Vec<LedgerRow>, StoreError>;

    fn record_run(&self, run: &RunRecord) -> Result<i64, StoreError>;
}

pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Open (or create) the ledger database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        // total and commission are stored for outside readers only
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ledger (
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                consultant TEXT NOT NULL,
                parts_cents INTEGER NOT NULL DEFAULT 0,
                services_cents INTEGER NOT NULL DEFAULT 0,
                total_cents INTEGER NOT NULL DEFAULT 0,
                commission_cents INTEGER NOT NULL DEFAULT 0,
                rate REAL NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (year, month, consultant)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                roster_version TEXT NOT NULL,
                parts_resolved INTEGER NOT NULL,
                parts_skipped INTEGER NOT NULL,
                services_resolved INTEGER NOT NULL,
                services_skipped INTEGER NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_runs_period ON runs(year, month)",
            [],
        )?;

        info!("Ledger database initialized");
        Ok(Self { conn })
    }

    /// Helper: rebuild a `LedgerRow` from the stored inputs; derived columns
    /// are never read back.
    fn to_row(
        (year, month, consultant, parts, services, rate): RawRow,
    ) -> Result<LedgerRow, StoreError> {
        let month = Month::from_number(month).ok_or(StoreError::BadMonth(month))?;
        Ok(LedgerRow::new(
            Period::new(year, month),
            consultant,
            parts,
            services,
            rate,
        ))
    }

    fn query_rows(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<LedgerRow>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let raw = stmt
            .query_map(params, |row| -> rusqlite::Result<RawRow> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(Self::to_row).collect()
    }

    /// Number of ledger rows and recorded runs.
    pub fn counts(&self) -> Result<(usize, usize), StoreError> {
        let rows: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM ledger", [], |row| row.get(0))?;
        let runs: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok((rows, runs))
    }
}

impl LedgerStore for SqliteLedger {
    fn upsert(&self, rows: &[LedgerRow]) -> Result<usize, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO ledger
                    (year, month, consultant, parts_cents, services_cents, total_cents, commission_cents, rate)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(year, month, consultant) DO UPDATE SET
                    parts_cents = excluded.parts_cents,
                    services_cents = excluded.services_cents,
                    total_cents = excluded.total_cents,
                    commission_cents = excluded.commission_cents,
                    rate = excluded.rate,
                    updated_at = CURRENT_TIMESTAMP",
            )?;
            for row in rows {
                let period = row.period();
                stmt.execute(params![
                    period.year,
                    period.month.number(),
                    row.consultant(),
                    row.parts_cents(),
                    row.services_cents(),
                    row.total_cents(),
                    row.commission_cents(),
                    row.rate(),
                ])?;
            }
        }
        tx.commit()?;
        info!(rows = rows.len(), "Ledger rows upserted");
        Ok(rows.len())
    }

    fn read_all(&self) -> Result<Vec<LedgerRow>, StoreError> {
        self.query_rows(
            "SELECT year, month, consultant, parts_cents, services_cents, rate
             FROM ledger
             ORDER BY year, month, total_cents DESC, consultant",
            [],
        )
    }

    fn read_period(&self, period: Period) -> Result<Vec<LedgerRow>, StoreError> {
        self.query_rows(
            "SELECT year, month, consultant, parts_cents, services_cents, rate
             FROM ledger
             WHERE year = ?1 AND month = ?2
             ORDER BY total_cents DESC, consultant",
            params![period.year, period.month.number()],
        )
    }

    fn record_run(&self, run: &RunRecord) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO runs
                (year, month, roster_version, parts_resolved, parts_skipped, services_resolved, services_skipped)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.period.year,
                run.period.month.number(),
                run.roster_version,
                run.parts_resolved,
                run.parts_skipped,
                run.services_resolved,
                run.services_skipped,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(run_id = id, period = %run.period, "Run recorded");
        Ok(id)
    }
}

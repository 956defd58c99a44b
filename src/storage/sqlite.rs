//! SQLite-backed storage.
//!
//! One connection behind a mutex; every call runs on the blocking pool via
//! `spawn_blocking` so rusqlite never stalls the async runtime. Money is
//! stored as REAL for easy querying from other tools.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use super::Storage;
use crate::models::{
    Invoice, InvoiceId, LogLevel, Property, RunCompletion, RunId, RunLogEntry, RunStatus,
    ScrapeRun, StatementDetail, StatementId,
};

const CURRENT_SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS scrape_runs (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at          TEXT NOT NULL,
    finished_at         TEXT,
    status              TEXT NOT NULL DEFAULT 'running',
    invoices_processed  INTEGER NOT NULL DEFAULT 0,
    invoices_skipped    INTEGER NOT NULL DEFAULT 0,
    error_message       TEXT
);

CREATE TABLE IF NOT EXISTS scrape_logs (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id     INTEGER NOT NULL REFERENCES scrape_runs(id),
    timestamp  TEXT NOT NULL,
    level      TEXT NOT NULL,
    message    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS invoices (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    invoice_id        INTEGER UNIQUE NOT NULL,
    doc_type          TEXT,
    operator          TEXT,
    owner_number      TEXT,
    check_number      TEXT,
    invoice_date      TEXT,
    op_acct_month     TEXT,
    received_date     TEXT,
    status            TEXT,
    total_revenue     REAL,
    total_tax         REAL,
    total_deductions  REAL,
    total_amount      REAL,
    scraped_at        TEXT NOT NULL,
    run_id            INTEGER REFERENCES scrape_runs(id)
);

CREATE TABLE IF NOT EXISTS properties (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    invoice_id           INTEGER NOT NULL REFERENCES invoices(invoice_id),
    statement_id         INTEGER UNIQUE NOT NULL,
    cost_center          TEXT,
    description          TEXT,
    state                TEXT,
    county               TEXT,
    owner_share_revenue  REAL,
    tax                  REAL,
    deductions           REAL,
    total                REAL,
    scraped_at           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS statement_details (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    statement_id      INTEGER NOT NULL REFERENCES properties(statement_id),
    product_category  TEXT,
    code              TEXT,
    type_description  TEXT,
    production_date   TEXT,
    btu               REAL,
    property_volume   REAL,
    property_price    REAL,
    property_value    REAL,
    owner_pct         REAL,
    distribution_pct  REAL,
    owner_volume      REAL,
    owner_value       REAL
);

CREATE INDEX IF NOT EXISTS idx_scrape_logs_run ON scrape_logs(run_id);
CREATE INDEX IF NOT EXISTS idx_properties_invoice ON properties(invoice_id);
CREATE INDEX IF NOT EXISTS idx_statement_details_statement ON statement_details(statement_id);
"#;

pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (creating if needed) the database at `path` and bring its schema
    /// up to date.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("Failed to open in-memory database")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .context("Failed to set journal mode")?;
        if !journal_mode.eq_ignore_ascii_case("wal") && !journal_mode.eq_ignore_ascii_case("memory")
        {
            tracing::warn!(journal_mode, "SQLite did not enable WAL mode");
        }
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .context("Failed to configure database")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .context("Failed to create schema_version table")?;

        let current_version: i64 = conn
            .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .context("Failed to read schema version")?
            .unwrap_or(0);
        run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| anyhow!("database connection lock poisoned"))?;
            f(&mut conn)
        })
        .await
        .context("Database task panicked")?
    }
}

fn run_migrations(conn: &Connection, from_version: i64) -> Result<()> {
    if from_version > CURRENT_SCHEMA_VERSION {
        anyhow::bail!(
            "Database schema version {from_version} is newer than supported version \
             {CURRENT_SCHEMA_VERSION}. Please upgrade royaltybook."
        );
    }
    if from_version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    if from_version < 1 {
        conn.execute_batch(SCHEMA_V1)
            .context("Failed to apply schema v1")?;
    }

    conn.execute(
        "INSERT INTO schema_version (id, version) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET version = excluded.version",
        params![CURRENT_SCHEMA_VERSION],
    )
    .context("Failed to record schema version")?;
    tracing::debug!(from_version, to_version = CURRENT_SCHEMA_VERSION, "Database migrated");
    Ok(())
}

fn to_real(value: Option<Decimal>) -> Option<f64> {
    value.and_then(|d| d.to_f64())
}

fn from_real(value: Option<f64>) -> Option<Decimal> {
    value.and_then(Decimal::from_f64)
}

fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<(ScrapeRun, String)> {
    let status: String = row.get(3)?;
    let run = ScrapeRun {
        id: RunId::new(row.get(0)?),
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        status: RunStatus::Running,
        invoices_processed: row.get(4)?,
        invoices_skipped: row.get(5)?,
        error_message: row.get(6)?,
    };
    Ok((run, status))
}

fn with_status((mut run, status): (ScrapeRun, String)) -> Result<ScrapeRun> {
    run.status = status.parse()?;
    Ok(run)
}

const RUN_COLUMNS: &str = "id, started_at, finished_at, status, invoices_processed, \
                           invoices_skipped, error_message";

const INVOICE_COLUMNS: &str = "invoice_id, doc_type, operator, owner_number, check_number, \
                               invoice_date, op_acct_month, received_date, status, \
                               total_revenue, total_tax, total_deductions, total_amount";

fn invoice_from_row(row: &Row<'_>) -> rusqlite::Result<Invoice> {
    Ok(Invoice {
        invoice_id: InvoiceId::new(row.get(0)?),
        doc_type: text(row, 1)?,
        operator: text(row, 2)?,
        owner_number: text(row, 3)?,
        check_number: text(row, 4)?,
        invoice_date: text(row, 5)?,
        accounting_month: text(row, 6)?,
        received_date: text(row, 7)?,
        status: text(row, 8)?,
        total_revenue: from_real(row.get(9)?),
        total_tax: from_real(row.get(10)?),
        total_deductions: from_real(row.get(11)?),
        total_amount: from_real(row.get(12)?),
    })
}

#[async_trait::async_trait]
impl Storage for SqliteStorage {
    async fn create_run(&self, started_at: DateTime<Utc>) -> Result<RunId> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO scrape_runs (started_at, status) VALUES (?1, ?2)",
                params![started_at, RunStatus::Running.as_str()],
            )
            .context("Failed to create scrape run")?;
            Ok(RunId::new(conn.last_insert_rowid()))
        })
        .await
    }

    async fn finish_run(
        &self,
        run_id: RunId,
        completion: &RunCompletion,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let completion = completion.clone();
        self.with_conn(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE scrape_runs
                     SET finished_at = ?1, status = ?2, invoices_processed = ?3,
                         invoices_skipped = ?4, error_message = ?5
                     WHERE id = ?6",
                    params![
                        finished_at,
                        completion.status.as_str(),
                        completion.invoices_processed,
                        completion.invoices_skipped,
                        completion.error_message,
                        run_id.get(),
                    ],
                )
                .context("Failed to finish scrape run")?;
            if updated == 0 {
                anyhow::bail!("Scrape run {run_id} does not exist");
            }
            Ok(())
        })
        .await
    }

    async fn get_run(&self, run_id: RunId) -> Result<Option<ScrapeRun>> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {RUN_COLUMNS} FROM scrape_runs WHERE id = ?1"),
                params![run_id.get()],
                run_from_row,
            )
            .optional()
            .context("Failed to load scrape run")?
            .map(with_status)
            .transpose()
        })
        .await
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<ScrapeRun>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RUN_COLUMNS} FROM scrape_runs ORDER BY id DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map(params![limit], run_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to list scrape runs")?;
            rows.into_iter().map(with_status).collect()
        })
        .await
    }

    async fn append_log(&self, entry: &RunLogEntry) -> Result<()> {
        let entry = entry.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO scrape_logs (run_id, timestamp, level, message)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.run_id.get(),
                    entry.timestamp,
                    entry.level.as_str(),
                    entry.message,
                ],
            )
            .context("Failed to append run log")?;
            Ok(())
        })
        .await
    }

    async fn list_logs(&self, run_id: RunId) -> Result<Vec<RunLogEntry>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, level, message FROM scrape_logs
                 WHERE run_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![run_id.get()], |row| {
                    Ok((
                        row.get::<_, DateTime<Utc>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to list run logs")?;
            rows.into_iter()
                .map(|(timestamp, level, message)| {
                    Ok(RunLogEntry {
                        run_id,
                        timestamp,
                        level: level.parse::<LogLevel>()?,
                        message,
                    })
                })
                .collect()
        })
        .await
    }

    async fn invoice_exists(&self, invoice_id: InvoiceId) -> Result<bool> {
        self.with_conn(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM invoices WHERE invoice_id = ?1",
                    params![invoice_id.get()],
                    |row| row.get(0),
                )
                .optional()
                .context("Failed to look up invoice")?;
            Ok(found.is_some())
        })
        .await
    }

    async fn insert_invoice(
        &self,
        invoice: &Invoice,
        run_id: RunId,
        scraped_at: DateTime<Utc>,
    ) -> Result<bool> {
        let inv = invoice.clone();
        self.with_conn(move |conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO invoices (
                        invoice_id, doc_type, operator, owner_number, check_number,
                        invoice_date, op_acct_month, received_date, status,
                        total_revenue, total_tax, total_deductions, total_amount,
                        scraped_at, run_id
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        inv.invoice_id.get(),
                        inv.doc_type,
                        inv.operator,
                        inv.owner_number,
                        inv.check_number,
                        inv.invoice_date,
                        inv.accounting_month,
                        inv.received_date,
                        inv.status,
                        to_real(inv.total_revenue),
                        to_real(inv.total_tax),
                        to_real(inv.total_deductions),
                        to_real(inv.total_amount),
                        scraped_at,
                        run_id.get(),
                    ],
                )
                .with_context(|| format!("Failed to insert invoice {}", inv.invoice_id))?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn get_invoice(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = ?1"),
                params![invoice_id.get()],
                invoice_from_row,
            )
            .optional()
            .context("Failed to load invoice")
        })
        .await
    }

    async fn insert_property(
        &self,
        property: &Property,
        scraped_at: DateTime<Utc>,
    ) -> Result<bool> {
        let p = property.clone();
        self.with_conn(move |conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO properties (
                        invoice_id, statement_id, cost_center, description, state, county,
                        owner_share_revenue, tax, deductions, total, scraped_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        p.invoice_id.get(),
                        p.statement_id.get(),
                        p.cost_center,
                        p.description,
                        p.state,
                        p.county,
                        to_real(p.owner_share_revenue),
                        to_real(p.tax),
                        to_real(p.deductions),
                        to_real(p.total),
                        scraped_at,
                    ],
                )
                .with_context(|| format!("Failed to insert property {}", p.statement_id))?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn list_properties(&self, invoice_id: InvoiceId) -> Result<Vec<Property>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT statement_id, cost_center, description, state, county,
                        owner_share_revenue, tax, deductions, total
                 FROM properties WHERE invoice_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![invoice_id.get()], |row| {
                    Ok(Property {
                        statement_id: StatementId::new(row.get(0)?),
                        invoice_id,
                        cost_center: text(row, 1)?,
                        description: text(row, 2)?,
                        state: text(row, 3)?,
                        county: text(row, 4)?,
                        owner_share_revenue: from_real(row.get(5)?),
                        tax: from_real(row.get(6)?),
                        deductions: from_real(row.get(7)?),
                        total: from_real(row.get(8)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to list properties")?;
            Ok(rows)
        })
        .await
    }

    async fn insert_statement_detail(&self, detail: &StatementDetail) -> Result<()> {
        let d = detail.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO statement_details (
                    statement_id, product_category, code, type_description, production_date,
                    btu, property_volume, property_price, property_value,
                    owner_pct, distribution_pct, owner_volume, owner_value
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    d.statement_id.get(),
                    d.product_category,
                    d.code,
                    d.type_description,
                    d.production_date,
                    to_real(d.btu),
                    to_real(d.property_volume),
                    to_real(d.property_price),
                    to_real(d.property_value),
                    to_real(d.owner_pct),
                    to_real(d.distribution_pct),
                    to_real(d.owner_volume),
                    to_real(d.owner_value),
                ],
            )
            .with_context(|| format!("Failed to insert detail for statement {}", d.statement_id))?;
            Ok(())
        })
        .await
    }

    async fn list_statement_details(
        &self,
        statement_id: StatementId,
    ) -> Result<Vec<StatementDetail>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT product_category, code, type_description, production_date,
                        btu, property_volume, property_price, property_value,
                        owner_pct, distribution_pct, owner_volume, owner_value
                 FROM statement_details WHERE statement_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![statement_id.get()], |row| {
                    Ok(StatementDetail {
                        statement_id,
                        product_category: text(row, 0)?,
                        code: text(row, 1)?,
                        type_description: text(row, 2)?,
                        production_date: text(row, 3)?,
                        btu: from_real(row.get(4)?),
                        property_volume: from_real(row.get(5)?),
                        property_price: from_real(row.get(6)?),
                        property_value: from_real(row.get(7)?),
                        owner_pct: from_real(row.get(8)?),
                        distribution_pct: from_real(row.get(9)?),
                        owner_volume: from_real(row.get(10)?),
                        owner_value: from_real(row.get(11)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to list statement details")?;
            Ok(rows)
        })
        .await
    }
}

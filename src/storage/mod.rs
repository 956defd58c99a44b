//! Persistence for scraped invoices and run bookkeeping.

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{
    Invoice, InvoiceId, Property, RunCompletion, RunId, RunLogEntry, ScrapeRun, StatementDetail,
    StatementId,
};

/// Storage trait for the scraped ledger.
///
/// Invoices are keyed by portal invoice id and properties by statement id;
/// inserting either twice is a no-op reported as `Ok(false)`. A property must
/// reference a stored invoice and a statement detail a stored property.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    // Runs
    async fn create_run(&self, started_at: DateTime<Utc>) -> Result<RunId>;
    async fn finish_run(
        &self,
        run_id: RunId,
        completion: &RunCompletion,
        finished_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn get_run(&self, run_id: RunId) -> Result<Option<ScrapeRun>>;
    /// Most recent runs first.
    async fn list_runs(&self, limit: usize) -> Result<Vec<ScrapeRun>>;

    // Run logs
    async fn append_log(&self, entry: &RunLogEntry) -> Result<()>;
    async fn list_logs(&self, run_id: RunId) -> Result<Vec<RunLogEntry>>;

    // Invoices
    async fn invoice_exists(&self, invoice_id: InvoiceId) -> Result<bool>;
    async fn insert_invoice(
        &self,
        invoice: &Invoice,
        run_id: RunId,
        scraped_at: DateTime<Utc>,
    ) -> Result<bool>;
    async fn get_invoice(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>>;

    // Properties
    async fn insert_property(&self, property: &Property, scraped_at: DateTime<Utc>)
        -> Result<bool>;
    async fn list_properties(&self, invoice_id: InvoiceId) -> Result<Vec<Property>>;

    // Statement details
    async fn insert_statement_detail(&self, detail: &StatementDetail) -> Result<()>;
    async fn list_statement_details(&self, statement_id: StatementId)
        -> Result<Vec<StatementDetail>>;
}

//! In-memory storage implementation for testing.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::models::{
    Invoice, InvoiceId, Property, RunCompletion, RunId, RunLogEntry, RunStatus, ScrapeRun,
    StatementDetail, StatementId,
};

use super::Storage;

#[derive(Default)]
struct Tables {
    runs: Vec<ScrapeRun>,
    logs: Vec<RunLogEntry>,
    invoices: Vec<Invoice>,
    properties: Vec<Property>,
    details: HashMap<StatementId, Vec<StatementDetail>>,
}

/// In-memory storage for testing purposes.
///
/// Enforces the same key uniqueness and references as the SQLite schema.
#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an invoice as if an earlier run had stored it.
    pub async fn seed_invoice(&self, invoice: Invoice) {
        let mut tables = self.tables.lock().await;
        if !tables
            .invoices
            .iter()
            .any(|i| i.invoice_id == invoice.invoice_id)
        {
            tables.invoices.push(invoice);
        }
    }

    /// Every stored invoice, in insertion order.
    pub async fn invoices(&self) -> Vec<Invoice> {
        self.tables.lock().await.invoices.clone()
    }

    pub async fn detail_count(&self) -> usize {
        self.tables.lock().await.details.values().map(Vec::len).sum()
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn create_run(&self, started_at: DateTime<Utc>) -> Result<RunId> {
        let mut tables = self.tables.lock().await;
        let id = RunId::new(tables.runs.len() as i64 + 1);
        tables.runs.push(ScrapeRun {
            id,
            started_at,
            finished_at: None,
            status: RunStatus::Running,
            invoices_processed: 0,
            invoices_skipped: 0,
            error_message: None,
        });
        Ok(id)
    }

    async fn finish_run(
        &self,
        run_id: RunId,
        completion: &RunCompletion,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let Some(run) = tables.runs.iter_mut().find(|r| r.id == run_id) else {
            anyhow::bail!("Scrape run {run_id} does not exist");
        };
        run.finished_at = Some(finished_at);
        run.status = completion.status;
        run.invoices_processed = completion.invoices_processed;
        run.invoices_skipped = completion.invoices_skipped;
        run.error_message = completion.error_message.clone();
        Ok(())
    }

    async fn get_run(&self, run_id: RunId) -> Result<Option<ScrapeRun>> {
        let tables = self.tables.lock().await;
        Ok(tables.runs.iter().find(|r| r.id == run_id).cloned())
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<ScrapeRun>> {
        let tables = self.tables.lock().await;
        Ok(tables.runs.iter().rev().take(limit).cloned().collect())
    }

    async fn append_log(&self, entry: &RunLogEntry) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if !tables.runs.iter().any(|r| r.id == entry.run_id) {
            anyhow::bail!("Scrape run {} does not exist", entry.run_id);
        }
        tables.logs.push(entry.clone());
        Ok(())
    }

    async fn list_logs(&self, run_id: RunId) -> Result<Vec<RunLogEntry>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .logs
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn invoice_exists(&self, invoice_id: InvoiceId) -> Result<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.invoices.iter().any(|i| i.invoice_id == invoice_id))
    }

    async fn insert_invoice(
        &self,
        invoice: &Invoice,
        _run_id: RunId,
        _scraped_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if tables
            .invoices
            .iter()
            .any(|i| i.invoice_id == invoice.invoice_id)
        {
            return Ok(false);
        }
        tables.invoices.push(invoice.clone());
        Ok(true)
    }

    async fn get_invoice(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .invoices
            .iter()
            .find(|i| i.invoice_id == invoice_id)
            .cloned())
    }

    async fn insert_property(
        &self,
        property: &Property,
        _scraped_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if !tables
            .invoices
            .iter()
            .any(|i| i.invoice_id == property.invoice_id)
        {
            anyhow::bail!(
                "Property {} references unknown invoice {}",
                property.statement_id,
                property.invoice_id
            );
        }
        if tables
            .properties
            .iter()
            .any(|p| p.statement_id == property.statement_id)
        {
            return Ok(false);
        }
        tables.properties.push(property.clone());
        Ok(true)
    }

    async fn list_properties(&self, invoice_id: InvoiceId) -> Result<Vec<Property>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .properties
            .iter()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn insert_statement_detail(&self, detail: &StatementDetail) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if !tables
            .properties
            .iter()
            .any(|p| p.statement_id == detail.statement_id)
        {
            anyhow::bail!(
                "Statement detail references unknown statement {}",
                detail.statement_id
            );
        }
        tables
            .details
            .entry(detail.statement_id)
            .or_default()
            .push(detail.clone());
        Ok(())
    }

    async fn list_statement_details(
        &self,
        statement_id: StatementId,
    ) -> Result<Vec<StatementDetail>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .details
            .get(&statement_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_log_requires_existing_run() {
        let storage = MemoryStorage::new();
        let entry = RunLogEntry {
            run_id: RunId::new(1),
            timestamp: now(),
            level: crate::models::LogLevel::Info,
            message: "hello".to_string(),
        };
        assert!(storage.append_log(&entry).await.is_err());

        storage.create_run(now()).await.unwrap();
        storage.append_log(&entry).await.unwrap();
        assert_eq!(storage.list_logs(RunId::new(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_seeded_invoice_counts_as_existing() {
        let storage = MemoryStorage::new();
        storage.seed_invoice(Invoice::new(InvoiceId::new(5))).await;
        assert!(storage.invoice_exists(InvoiceId::new(5)).await.unwrap());
        assert!(!storage
            .insert_invoice(&Invoice::new(InvoiceId::new(5)), RunId::new(1), now())
            .await
            .unwrap());
    }
}

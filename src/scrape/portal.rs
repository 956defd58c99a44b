//! Page navigation inside the authenticated portal.

use anyhow::{Context, Result};

use crate::browser::{find_by_text, settle, Driver, Element};
use crate::config::{PortalConfig, TimeoutConfig};
use crate::models::{InvoiceId, StatementId};

use super::selectors;

pub fn invoice_summary_url(portal: &PortalConfig, invoice_id: InvoiceId) -> String {
    format!(
        "{}/Invoice/InvoiceSummary.aspx?InvoiceId={invoice_id}&Context=Inbound",
        portal.base_url.trim_end_matches('/')
    )
}

pub fn statement_url(portal: &PortalConfig, statement_id: StatementId) -> String {
    format!(
        "{}/Statement/StatementSummary.aspx?StatementId={statement_id}&Context=Inbound",
        portal.base_url.trim_end_matches('/')
    )
}

pub struct Portal<'a, D: Driver> {
    driver: &'a D,
    config: &'a PortalConfig,
    timeouts: &'a TimeoutConfig,
}

impl<'a, D: Driver> Portal<'a, D> {
    pub fn new(driver: &'a D, config: &'a PortalConfig, timeouts: &'a TimeoutConfig) -> Self {
        Self {
            driver,
            config,
            timeouts,
        }
    }

    /// Open the dashboard and switch to the invoice tab.
    pub async fn navigate_to_invoices(&self) -> Result<()> {
        self.driver
            .goto(&self.config.dashboard_url(), self.timeouts.navigation)
            .await?;
        settle(self.timeouts.settle).await;

        let label = self.config.invoices_tab.as_str();
        let tab = find_by_text(self.driver, selectors::TAB, |text| text == label)
            .await?
            .with_context(|| format!("Dashboard tab {label:?} not found"))?;
        tab.click().await?;
        settle(self.timeouts.settle).await;
        Ok(())
    }

    pub async fn navigate_to_invoice_summary(&self, invoice_id: InvoiceId) -> Result<()> {
        self.open_detail(&invoice_summary_url(self.config, invoice_id))
            .await
    }

    pub async fn navigate_to_statement(&self, statement_id: StatementId) -> Result<()> {
        self.open_detail(&statement_url(self.config, statement_id))
            .await
    }

    async fn open_detail(&self, url: &str) -> Result<()> {
        self.driver.goto(url, self.timeouts.navigation).await?;
        settle(self.timeouts.page_delay).await;
        Ok(())
    }
}

//! Invoice list extraction from the dashboard's paginated grid.
//!
//! The dashboard renders several AG Grid instances. The invoice grid is the
//! one whose rows carry a status column. Rows are read by their stable
//! `col-id` attributes, never by position.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

use crate::browser::{settle, Driver, Element};
use crate::config::{PortalConfig, TimeoutConfig};
use crate::models::{Invoice, InvoiceId};

use super::numeric::parse_money;
use super::selectors;

/// Grid columns read from each row.
pub mod columns {
    pub const DOC_TYPE: &str = "dataSource";
    pub const OPERATOR: &str = "operatorName";
    pub const OWNER_NUMBER: &str = "ownerNumber";
    /// Check number and invoice date, one per line.
    pub const INVOICE: &str = "invoice";
    /// Accounting month and received date, one per line.
    pub const ACCOUNTING: &str = "opAccountingMonth";
    pub const STATUS: &str = "status";
    pub const TOTAL: &str = "original";

    pub const ALL: &[&str] = &[
        DOC_TYPE,
        OPERATOR,
        OWNER_NUMBER,
        INVOICE,
        ACCOUNTING,
        STATUS,
        TOTAL,
    ];
}

/// Text snapshot of one rendered grid row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGridRow {
    pub row_id: Option<String>,
    /// Cell text keyed by column id. Missing columns are absent.
    pub cells: HashMap<String, String>,
}

impl RawGridRow {
    fn cell(&self, col_id: &str) -> &str {
        self.cells.get(col_id).map(String::as_str).unwrap_or("")
    }
}

/// Turn a row snapshot into an invoice.
///
/// Returns `None` for rows whose id is missing or not all digits (group
/// headers, placeholders, loading rows).
pub fn parse_grid_row(row: &RawGridRow) -> Option<Invoice> {
    let invoice_id: InvoiceId = row.row_id.as_deref()?.parse().ok()?;

    let (check_number, invoice_date) = split_pair(row.cell(columns::INVOICE));
    let (accounting_month, received_date) = split_pair(row.cell(columns::ACCOUNTING));

    let mut invoice = Invoice::new(invoice_id);
    invoice.doc_type = row.cell(columns::DOC_TYPE).trim().to_string();
    invoice.operator = row.cell(columns::OPERATOR).trim().to_string();
    invoice.owner_number = row.cell(columns::OWNER_NUMBER).trim().to_string();
    invoice.check_number = check_number;
    invoice.invoice_date = invoice_date;
    invoice.accounting_month = accounting_month;
    invoice.received_date = received_date;
    invoice.status = row.cell(columns::STATUS).trim().to_string();
    invoice.total_amount = parse_money(row.cell(columns::TOTAL));
    Some(invoice)
}

/// Split a two-line cell. A single line yields an empty second value.
pub fn split_pair(text: &str) -> (String, String) {
    let mut lines = text
        .trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty());
    let first = lines.next().unwrap_or_default().to_string();
    let second = lines.next().unwrap_or_default().to_string();
    (first, second)
}

/// Where the pagination widget says we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationState {
    pub current: u32,
    pub total: u32,
}

impl PaginationState {
    pub fn next_page(self) -> Option<u32> {
        (self.current < self.total).then_some(self.current + 1)
    }
}

/// Total page count from the widget text, e.g. `"1 to 20 of 105\nPage of 6"`.
pub fn parse_total_pages(text: &str) -> Option<u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"of\s+(\d+)\s*$").expect("valid regex"));
    re.captures(text.trim_end())?.get(1)?.as_str().parse().ok()
}

/// Reads every page of the invoice grid.
pub struct ListExtractor<'a, D: Driver> {
    driver: &'a D,
    portal: &'a PortalConfig,
    timeouts: &'a TimeoutConfig,
}

impl<'a, D: Driver> ListExtractor<'a, D> {
    pub fn new(driver: &'a D, portal: &'a PortalConfig, timeouts: &'a TimeoutConfig) -> Self {
        Self {
            driver,
            portal,
            timeouts,
        }
    }

    /// Every invoice across all pages, in page order.
    ///
    /// Returns an empty list (not an error) when the grid never renders a
    /// row within the grid timeout.
    pub async fn extract_all(&self) -> Result<Vec<Invoice>> {
        let fingerprint = selectors::grid_row_with_column(&self.portal.status_column);
        if self
            .driver
            .wait_for_visible(&fingerprint, self.timeouts.grid)
            .await?
            .is_none()
        {
            tracing::info!("No invoice rows appeared; treating the list as empty");
            return Ok(Vec::new());
        }

        let mut invoices = Vec::new();
        let mut seen = HashSet::new();
        loop {
            let Some(container) = self.locate_grid().await? else {
                tracing::warn!("Invoice grid disappeared while paging");
                break;
            };
            let page = self.read_page(&container).await?;
            tracing::debug!(rows = page.len(), "Read grid page");
            invoices.extend(page.into_iter().filter(|i| seen.insert(i.invoice_id)));

            let state = match self.pagination().await {
                Ok(Some(state)) => state,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Could not read pagination, stopping: {e:#}");
                    break;
                }
            };
            let Some(next) = state.next_page() else {
                break;
            };
            if let Err(e) = self.advance_to(next).await {
                tracing::warn!(page = next, "Could not advance pagination, stopping: {e:#}");
                break;
            }

            let reached = self.pagination().await.ok().flatten().map(|s| s.current);
            if reached != Some(next) {
                tracing::warn!(page = next, ?reached, "Pagination did not advance, stopping");
                break;
            }
        }

        Ok(invoices)
    }

    /// The grid body whose rows have a status column.
    async fn locate_grid(&self) -> Result<Option<D::Element>> {
        let fingerprint = selectors::grid_row_with_column(&self.portal.status_column);
        for container in self.driver.query_all(selectors::GRID_CONTAINER).await? {
            if !container.query_all(&fingerprint).await?.is_empty() {
                return Ok(Some(container));
            }
        }
        Ok(None)
    }

    async fn read_page(&self, container: &D::Element) -> Result<Vec<Invoice>> {
        let mut invoices = Vec::new();
        for row in container.query_all(selectors::GRID_ROW).await? {
            match read_row(&row).await {
                Ok(raw) => match parse_grid_row(&raw) {
                    Some(invoice) => invoices.push(invoice),
                    None => tracing::debug!(row_id = ?raw.row_id, "Skipping non-invoice row"),
                },
                Err(e) => tracing::warn!("Skipping unreadable grid row: {e:#}"),
            }
        }
        Ok(invoices)
    }

    /// Current position from the visible pagination widget, if any.
    pub async fn pagination(&self) -> Result<Option<PaginationState>> {
        let Some(widget) = self.visible_pagination().await? else {
            return Ok(None);
        };
        let Some(input) = widget
            .query_all(selectors::PAGE_INPUT)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };

        let current = input.value().await?.trim().parse::<u32>().ok();
        let total = parse_total_pages(&widget.text().await?);
        Ok(current
            .zip(total)
            .map(|(current, total)| PaginationState { current, total }))
    }

    async fn visible_pagination(&self) -> Result<Option<D::Element>> {
        for widget in self.driver.query_all(selectors::PAGINATION).await? {
            if widget.is_visible().await? {
                return Ok(Some(widget));
            }
        }
        Ok(None)
    }

    async fn advance_to(&self, page: u32) -> Result<()> {
        let widget = self
            .visible_pagination()
            .await?
            .ok_or_else(|| anyhow::anyhow!("Pagination widget not visible"))?;
        let input = widget
            .query_all(selectors::PAGE_INPUT)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Page number input not found"))?;

        tracing::info!(page, "Advancing invoice grid");
        input.click().await?;
        input.fill(&page.to_string()).await?;
        input.press("Enter").await?;
        settle(self.timeouts.grid_page_settle).await;
        Ok(())
    }
}

async fn read_row<E: Element>(row: &E) -> Result<RawGridRow> {
    let row_id = row.attribute(selectors::GRID_ROW_ID_ATTR).await?;
    let mut cells = HashMap::new();
    for col_id in columns::ALL {
        if let Some(cell) = row
            .query_all(&selectors::grid_cell(col_id))
            .await?
            .into_iter()
            .next()
        {
            cells.insert((*col_id).to_string(), cell.text().await?);
        }
    }
    Ok(RawGridRow { row_id, cells })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn row(row_id: Option<&str>, cells: &[(&str, &str)]) -> RawGridRow {
        RawGridRow {
            row_id: row_id.map(String::from),
            cells: cells
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_parse_full_row() {
        let raw = row(
            Some("9876543"),
            &[
                ("dataSource", "Revenue"),
                ("operatorName", " Devon Energy "),
                ("ownerNumber", "000123"),
                ("invoice", "CHK-4410\n01/15/2025"),
                ("opAccountingMonth", "12/2024\n01/20/2025"),
                ("status", "Paid"),
                ("original", "$5,726.28"),
            ],
        );

        let invoice = parse_grid_row(&raw).unwrap();
        assert_eq!(invoice.invoice_id, InvoiceId::new(9876543));
        assert_eq!(invoice.operator, "Devon Energy");
        assert_eq!(invoice.check_number, "CHK-4410");
        assert_eq!(invoice.invoice_date, "01/15/2025");
        assert_eq!(invoice.accounting_month, "12/2024");
        assert_eq!(invoice.received_date, "01/20/2025");
        assert_eq!(invoice.status, "Paid");
        assert_eq!(invoice.total_amount, Some(Decimal::from_str("5726.28").unwrap()));
        assert_eq!(invoice.total_revenue, None);
    }

    #[test]
    fn test_non_numeric_or_missing_row_id_is_skipped() {
        assert!(parse_grid_row(&row(Some("group-Devon"), &[])).is_none());
        assert!(parse_grid_row(&row(Some(""), &[])).is_none());
        assert!(parse_grid_row(&row(None, &[])).is_none());
    }

    #[test]
    fn test_missing_cells_are_blank() {
        let invoice = parse_grid_row(&row(Some("42"), &[])).unwrap();
        assert_eq!(invoice.check_number, "");
        assert_eq!(invoice.received_date, "");
        assert_eq!(invoice.total_amount, None);
    }

    #[test]
    fn test_split_pair_single_line() {
        assert_eq!(split_pair("CHK-1"), ("CHK-1".to_string(), String::new()));
        assert_eq!(
            split_pair("  a \r\n\n b "),
            ("a".to_string(), "b".to_string())
        );
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(parse_total_pages("1 to 20 of 105\nPage  of 6"), Some(6));
        assert_eq!(parse_total_pages("Page of 1 \n"), Some(1));
        assert_eq!(parse_total_pages("No rows"), None);
    }

    #[test]
    fn test_next_page() {
        assert_eq!(PaginationState { current: 1, total: 3 }.next_page(), Some(2));
        assert_eq!(PaginationState { current: 3, total: 3 }.next_page(), None);
    }
}

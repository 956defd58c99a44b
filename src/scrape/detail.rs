//! Invoice summary and statement detail extraction.
//!
//! Pages are first reduced to plain text snapshots ([`RawRow`], [`RawTable`])
//! so all parsing below is pure and testable without a browser.

use std::collections::HashSet;
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;
use tokio::time::Instant;

use crate::browser::{settle, texts, Driver, Element};
use crate::config::{ExtractionConfig, TimeoutConfig};
use crate::models::{InvoiceFinancials, InvoiceId, Property, StatementDetail, StatementId};

use super::numeric::{parse_money, parse_percent};
use super::selectors;

/// Trimmed cell texts of one table row, plus any statement links it holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub cells: Vec<String>,
    pub links: Vec<String>,
}

impl RawRow {
    pub fn new<S: Into<String>>(cells: impl IntoIterator<Item = S>) -> Self {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
            links: Vec::new(),
        }
    }

    pub fn with_link(mut self, href: impl Into<String>) -> Self {
        self.links.push(href.into());
        self
    }

    fn text(&self) -> String {
        self.cells.join("\t")
    }
}

/// One table: its full text and its rows in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub text: String,
    pub rows: Vec<RawRow>,
}

/// Everything read from an invoice summary page.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceSummary {
    pub financials: InvoiceFinancials,
    pub properties: Vec<Property>,
}

// ---------------------------------------------------------------------------
// Invoice summary
// ---------------------------------------------------------------------------

/// Header values from two-cell `label | value` rows.
pub fn parse_financials(rows: &[RawRow]) -> InvoiceFinancials {
    let mut financials = InvoiceFinancials::default();
    for row in rows {
        let [label, value] = row.cells.as_slice() else {
            continue;
        };
        match label.trim() {
            "Check Number" => financials.check_number = Some(value.trim().to_string()),
            "Revenue" => financials.revenue = parse_money(value),
            "Tax" => financials.tax = parse_money(value),
            "Deductions" => financials.deductions = parse_money(value),
            "Total" => financials.total = parse_money(value),
            _ => {}
        }
    }
    financials
}

/// Statement id from a link like `...StatementSummary.aspx?StatementId=123&...`.
pub fn extract_statement_id(href: &str) -> Option<StatementId> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"StatementId=(\d+)").expect("valid regex"));
    re.captures(href)?.get(1)?.as_str().parse().ok()
}

fn is_cost_center(cell: &str) -> bool {
    cell.len() >= 6 && cell.bytes().all(|b| b.is_ascii_digit())
}

/// A property from a row that links to its statement.
///
/// Columns are located relative to the first cell of six or more digits
/// (the cost center), so leading decorative cells do not shift fields.
pub fn parse_property_row(row: &RawRow, invoice_id: InvoiceId) -> Option<Property> {
    let statement_id = row.links.iter().find_map(|href| extract_statement_id(href))?;
    let anchor = row.cells.iter().position(|cell| is_cost_center(cell))?;
    let at = |offset: usize| {
        row.cells
            .get(anchor + offset)
            .map(String::as_str)
            .unwrap_or("")
    };

    Some(Property {
        statement_id,
        invoice_id,
        cost_center: at(0).to_string(),
        description: at(1).to_string(),
        state: at(2).to_string(),
        county: at(3).to_string(),
        owner_share_revenue: parse_money(at(4)),
        tax: parse_money(at(5)),
        deductions: parse_money(at(6)),
        total: parse_money(at(7)),
    })
}

/// Properties in page order, each statement at most once.
pub fn parse_properties(rows: &[RawRow], invoice_id: InvoiceId) -> Vec<Property> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|row| !row.links.is_empty())
        .filter_map(|row| parse_property_row(row, invoice_id))
        .filter(|property| seen.insert(property.statement_id))
        .collect()
}

// ---------------------------------------------------------------------------
// Statement details
// ---------------------------------------------------------------------------

/// A way of picking the line-item table out of a statement page.
pub trait TableLocator: Send + Sync {
    fn name(&self) -> &str;

    fn locate<'t>(&self, tables: &'t [RawTable]) -> Option<&'t RawTable>;
}

/// The last table containing a cell that is exactly a known category header.
pub struct CategoryHeaderLocator {
    categories: HashSet<String>,
}

impl CategoryHeaderLocator {
    pub fn new(categories: impl IntoIterator<Item = String>) -> Self {
        Self {
            categories: categories.into_iter().collect(),
        }
    }
}

impl TableLocator for CategoryHeaderLocator {
    fn name(&self) -> &str {
        "category-header"
    }

    fn locate<'t>(&self, tables: &'t [RawTable]) -> Option<&'t RawTable> {
        tables.iter().rev().find(|table| {
            table
                .rows
                .iter()
                .flat_map(|row| row.cells.iter())
                .any(|cell| self.categories.contains(cell.trim()))
        })
    }
}

/// The last reasonably large table whose text has every header marker.
pub struct HeaderTextLocator {
    markers: Vec<String>,
    min_rows: usize,
}

impl HeaderTextLocator {
    pub fn new(markers: Vec<String>) -> Self {
        Self {
            markers,
            min_rows: 6,
        }
    }
}

impl TableLocator for HeaderTextLocator {
    fn name(&self) -> &str {
        "header-text"
    }

    fn locate<'t>(&self, tables: &'t [RawTable]) -> Option<&'t RawTable> {
        tables.iter().rev().find(|table| {
            table.rows.len() >= self.min_rows
                && self.markers.iter().all(|marker| table.text.contains(marker.as_str()))
        })
    }
}

/// Ordered list of table locators; the first match wins.
pub struct StatementTableFinder {
    locators: Vec<Box<dyn TableLocator>>,
}

impl StatementTableFinder {
    pub fn new() -> Self {
        Self {
            locators: Vec::new(),
        }
    }

    /// Category headers first, header-text markers as the fallback.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new()
            .with_locator(CategoryHeaderLocator::new(config.category_headers.clone()))
            .with_locator(HeaderTextLocator::new(config.detail_header_markers.clone()))
    }

    pub fn with_locator(mut self, locator: impl TableLocator + 'static) -> Self {
        self.locators.push(Box::new(locator));
        self
    }

    /// Match by the first locator only.
    pub fn locate_preferred<'t>(&self, tables: &'t [RawTable]) -> Option<&'t RawTable> {
        self.locators.first()?.locate(tables)
    }

    pub fn locate<'t>(&self, tables: &'t [RawTable]) -> Option<(&str, &'t RawTable)> {
        self.locators
            .iter()
            .find_map(|locator| locator.locate(tables).map(|table| (locator.name(), table)))
    }
}

impl Default for StatementTableFinder {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

/// A line item before it is attached to a statement and category.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub code: String,
    pub type_description: String,
    pub production_date: String,
    pub btu: Option<rust_decimal::Decimal>,
    pub property_volume: Option<rust_decimal::Decimal>,
    pub property_price: Option<rust_decimal::Decimal>,
    pub property_value: Option<rust_decimal::Decimal>,
    pub owner_pct: Option<rust_decimal::Decimal>,
    pub distribution_pct: Option<rust_decimal::Decimal>,
    pub owner_volume: Option<rust_decimal::Decimal>,
    pub owner_value: Option<rust_decimal::Decimal>,
}

/// What a statement table row turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementRow {
    /// Sets the product category for the rows after it.
    Category(String),
    Item(LineItem),
    Total,
    Noise,
}

const MIN_ITEM_CELLS: usize = 11;

fn is_line_code(cell: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\w+\.\w+$").expect("valid regex"))
        .is_match(cell)
}

/// At least one cased character and no lower-case ones.
fn is_upper(text: &str) -> bool {
    text.chars().any(|c| c.is_uppercase()) && !text.chars().any(|c| c.is_lowercase())
}

pub fn classify_row(row: &RawRow) -> StatementRow {
    let Some(first) = row.cells.first() else {
        return StatementRow::Noise;
    };

    let text = row.text();
    if (text.contains("Code") && text.contains("Type Desc"))
        || text.contains("Show Subtext")
        || text.contains("Details")
    {
        return StatementRow::Noise;
    }

    let first = first.trim();
    if row.cells.len() == 1 {
        if !first.is_empty() && is_upper(first) && !first.starts_with("Total") {
            return StatementRow::Category(first.to_string());
        }
        return StatementRow::Noise;
    }

    if first.starts_with("Total for") || first == "Total" {
        return StatementRow::Total;
    }
    if row.cells.len() < MIN_ITEM_CELLS || !is_line_code(first) {
        return StatementRow::Noise;
    }

    let cell = |i: usize| row.cells[i].trim();
    StatementRow::Item(LineItem {
        code: first.to_string(),
        type_description: cell(1).to_string(),
        production_date: cell(2).to_string(),
        btu: parse_money(cell(3)),
        property_volume: parse_money(cell(4)),
        property_price: parse_money(cell(5)),
        property_value: parse_money(cell(6)),
        owner_pct: parse_percent(cell(7)),
        distribution_pct: parse_percent(cell(8)),
        owner_volume: parse_money(cell(9)),
        owner_value: parse_money(cell(10)),
    })
}

/// Line items in table order, each tagged with the most recent category
/// header above it (empty before the first header).
pub fn parse_statement_rows(rows: &[RawRow], statement_id: StatementId) -> Vec<StatementDetail> {
    let mut category = String::new();
    let mut details = Vec::new();
    for row in rows {
        match classify_row(row) {
            StatementRow::Category(name) => category = name,
            StatementRow::Item(item) => details.push(StatementDetail {
                statement_id,
                product_category: category.clone(),
                code: item.code,
                type_description: item.type_description,
                production_date: item.production_date,
                btu: item.btu,
                property_volume: item.property_volume,
                property_price: item.property_price,
                property_value: item.property_value,
                owner_pct: item.owner_pct,
                distribution_pct: item.distribution_pct,
                owner_volume: item.owner_volume,
                owner_value: item.owner_value,
            }),
            StatementRow::Total | StatementRow::Noise => {}
        }
    }
    details
}

// ---------------------------------------------------------------------------
// Browser side
// ---------------------------------------------------------------------------

/// Reads invoice summary and statement pages from the current tab.
pub struct DetailExtractor<'a, D: Driver> {
    driver: &'a D,
    timeouts: &'a TimeoutConfig,
    tables: &'a StatementTableFinder,
}

impl<'a, D: Driver> DetailExtractor<'a, D> {
    pub fn new(driver: &'a D, timeouts: &'a TimeoutConfig, tables: &'a StatementTableFinder) -> Self {
        Self {
            driver,
            timeouts,
            tables,
        }
    }

    /// Financial header and property list of the loaded invoice summary page.
    pub async fn invoice_summary(&self, invoice_id: InvoiceId) -> Result<InvoiceSummary> {
        let rows = self.snapshot_rows().await?;
        let properties = parse_properties(&rows, invoice_id);
        tracing::debug!(%invoice_id, properties = properties.len(), "Parsed invoice summary");
        Ok(InvoiceSummary {
            financials: parse_financials(&rows),
            properties,
        })
    }

    /// Line items of the loaded statement page. An unrecognized layout
    /// yields an empty list.
    pub async fn statement_details(&self, statement_id: StatementId) -> Result<Vec<StatementDetail>> {
        if self
            .driver
            .wait_for_visible(selectors::TABLE, self.timeouts.load)
            .await?
            .is_none()
        {
            tracing::warn!(%statement_id, "Statement page has no tables");
            return Ok(Vec::new());
        }

        let tables = self.wait_for_preferred_table().await?;
        let Some((strategy, table)) = self.tables.locate(&tables) else {
            tracing::warn!(%statement_id, tables = tables.len(), "No statement detail table found");
            return Ok(Vec::new());
        };
        tracing::debug!(%statement_id, strategy, rows = table.rows.len(), "Located detail table");
        Ok(parse_statement_rows(&table.rows, statement_id))
    }

    /// Re-read the page's tables until the first locator matches or the load
    /// timeout runs out, so a layout table that renders early does not win
    /// over a detail table that is still loading.
    async fn wait_for_preferred_table(&self) -> Result<Vec<RawTable>> {
        let deadline = Instant::now() + self.timeouts.load;
        loop {
            let tables = self.snapshot_tables().await?;
            if self.tables.locate_preferred(&tables).is_some() {
                return Ok(tables);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.timeouts.poll_interval.is_zero() {
                return Ok(tables);
            }
            settle(self.timeouts.poll_interval.min(remaining)).await;
        }
    }

    async fn snapshot_rows(&self) -> Result<Vec<RawRow>> {
        let mut rows = Vec::new();
        for tr in self.driver.query_all(selectors::TABLE_ROW).await? {
            rows.push(read_row(&tr, true).await?);
        }
        Ok(rows)
    }

    async fn snapshot_tables(&self) -> Result<Vec<RawTable>> {
        let mut tables = Vec::new();
        for table in self.driver.query_all(selectors::TABLE).await? {
            let mut rows = Vec::new();
            for tr in table.query_all(selectors::TABLE_ROW).await? {
                rows.push(read_row(&tr, false).await?);
            }
            tables.push(RawTable {
                text: table.text().await?,
                rows,
            });
        }
        Ok(tables)
    }
}

async fn read_row<E: Element>(tr: &E, with_links: bool) -> Result<RawRow> {
    let cells = texts(&tr.query_all(selectors::TABLE_CELL).await?).await?;
    let mut links = Vec::new();
    if with_links {
        for link in tr.query_all(selectors::STATEMENT_LINK).await? {
            if let Some(href) = link.attribute("href").await? {
                links.push(href);
            }
        }
    }
    Ok(RawRow { cells, links })
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::InvoiceId;

/// One royalty invoice (check) as listed by the portal.
///
/// Date-like fields are kept as the portal renders them; normalizing them is
/// left to whoever reads the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: InvoiceId,
    pub doc_type: String,
    pub operator: String,
    pub owner_number: String,
    pub check_number: String,
    pub invoice_date: String,
    pub accounting_month: String,
    pub received_date: String,
    pub status: String,
    pub total_revenue: Option<Decimal>,
    pub total_tax: Option<Decimal>,
    pub total_deductions: Option<Decimal>,
    pub total_amount: Option<Decimal>,
}

impl Invoice {
    /// An invoice with nothing but its id filled in.
    pub fn new(invoice_id: InvoiceId) -> Self {
        Self {
            invoice_id,
            doc_type: String::new(),
            operator: String::new(),
            owner_number: String::new(),
            check_number: String::new(),
            invoice_date: String::new(),
            accounting_month: String::new(),
            received_date: String::new(),
            status: String::new(),
            total_revenue: None,
            total_tax: None,
            total_deductions: None,
            total_amount: None,
        }
    }

    /// Overlay values read from the invoice summary page.
    ///
    /// Summary values win whenever they are present; a missing or empty
    /// summary value leaves the grid value in place.
    pub fn merge_financials(&mut self, financials: &InvoiceFinancials) {
        if let Some(check_number) = financials
            .check_number
            .as_deref()
            .filter(|c| !c.trim().is_empty())
        {
            self.check_number = check_number.to_string();
        }
        if financials.revenue.is_some() {
            self.total_revenue = financials.revenue;
        }
        if financials.tax.is_some() {
            self.total_tax = financials.tax;
        }
        if financials.deductions.is_some() {
            self.total_deductions = financials.deductions;
        }
        if financials.total.is_some() {
            self.total_amount = financials.total;
        }
    }
}

/// Labeled header values from an invoice summary page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceFinancials {
    pub check_number: Option<String>,
    pub revenue: Option<Decimal>,
    pub tax: Option<Decimal>,
    pub deductions: Option<Decimal>,
    pub total: Option<Decimal>,
}

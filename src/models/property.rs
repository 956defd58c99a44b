use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{InvoiceId, StatementId};

/// A leased interest (well) paid on an invoice.
///
/// Identified by the statement id the portal links it to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub statement_id: StatementId,
    pub invoice_id: InvoiceId,
    pub cost_center: String,
    pub description: String,
    pub state: String,
    pub county: String,
    pub owner_share_revenue: Option<Decimal>,
    pub tax: Option<Decimal>,
    pub deductions: Option<Decimal>,
    pub total: Option<Decimal>,
}

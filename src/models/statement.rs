use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::StatementId;

/// One product line of a property's production statement.
///
/// Line items carry no portal identity. Storing the same statement twice
/// appends duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementDetail {
    pub statement_id: StatementId,
    /// Category header the line sits under (e.g. "RESIDUE GAS"); empty if none preceded it.
    pub product_category: String,
    pub code: String,
    pub type_description: String,
    /// Production period as rendered ("Jan 26"); not normalized.
    pub production_date: String,
    pub btu: Option<Decimal>,
    pub property_volume: Option<Decimal>,
    pub property_price: Option<Decimal>,
    pub property_value: Option<Decimal>,
    pub owner_pct: Option<Decimal>,
    pub distribution_pct: Option<Decimal>,
    pub owner_volume: Option<Decimal>,
    pub owner_value: Option<Decimal>,
}

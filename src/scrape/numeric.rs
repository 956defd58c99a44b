//! Money and percentage cells as the portal renders them.
//!
//! Both parsers are total: anything that is not a number yields `None`, never
//! an error, and blank cells are "no value" rather than zero.

use std::str::FromStr;

use rust_decimal::Decimal;

/// Parse a money cell like `"$5,726.28"` or `"(155.13)"`.
///
/// A leading currency symbol and thousands separators are stripped. A value
/// wrapped in parentheses is negative (accounting notation).
pub fn parse_money(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    match cleaned
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(inner) => parse_plain(inner).map(|d| -d),
        None => parse_plain(cleaned),
    }
}

/// Parse a percentage cell like `"6.25000000 %"`.
pub fn parse_percent(text: &str) -> Option<Decimal> {
    let cleaned = text.trim().replace('%', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    parse_plain(cleaned)
}

fn parse_plain(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

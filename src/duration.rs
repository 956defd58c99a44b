//! Human-readable timeouts like "1500ms", "30s", "5m".
//!
//! Scraper waits range from sub-second DOM probes to a multi-minute MFA
//! window, so milliseconds are a first-class unit here.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer, Serializer};

/// Suffixes ordered so that "ms" is tried before "m" and "s".
const UNITS: [(&str, u64); 4] = [("ms", 1), ("s", 1_000), ("m", 60_000), ("h", 3_600_000)];

/// Parse a duration string like "250ms", "2s", "5m" or "1h".
///
/// Case-insensitive, surrounding whitespace is ignored, and the number must be
/// a non-negative integer.
///
/// ```
/// use royaltybook::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("1500ms").unwrap(), Duration::from_millis(1500));
/// assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let (num, millis_per_unit) = UNITS
        .iter()
        .find_map(|(suffix, factor)| s.strip_suffix(suffix).map(|n| (n, *factor)))
        .context("Duration must end with ms, s, m, or h")?;

    let num: u64 = num
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in duration {s:?}"))?;
    let millis = num
        .checked_mul(millis_per_unit)
        .context("Duration is too large")?;

    Ok(Duration::from_millis(millis))
}

/// Format a duration using the largest unit that divides it evenly.
///
/// ```
/// use royaltybook::duration::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(300)), "5m");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
/// ```
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis() as u64;
    if millis == 0 {
        return "0s".to_string();
    }
    UNITS
        .iter()
        .rev()
        .find(|(_, factor)| millis % factor == 0)
        .map(|(suffix, factor)| format!("{}{suffix}", millis / factor))
        .unwrap_or_else(|| format!("{millis}ms"))
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

/// Serde serializer producing the same strings `deserialize_duration` accepts.
pub fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}

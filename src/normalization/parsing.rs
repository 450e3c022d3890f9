//! Parsing helpers for provider field values.
//!
//! The provider marks unavailable values with sentinel strings; every helper
//! here maps those to `None`, never to zero.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

/// Provider markers for "no value".
pub const SENTINELS: [&str; 3] = ["noData", "noDataInRange", "checkDayBefore"];

pub fn is_sentinel(s: &str) -> bool {
    SENTINELS.contains(&s.trim())
}

/// Non-empty, non-sentinel string content of a field.
pub fn field_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() || is_sentinel(&text) {
        None
    } else {
        Some(text)
    }
}

const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a device timestamp.
///
/// Accepts RFC 3339 (including a trailing `Z`) and the provider's zone-less
/// `2024-08-30T12:30:45.000` form, which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() || is_sentinel(raw) {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    warn!("Failed to parse timestamp: {}", raw);
    None
}

pub fn parse_timestamp_field(value: Option<&Value>) -> Option<DateTime<Utc>> {
    field_text(value).and_then(|s| parse_timestamp(&s))
}

/// Parse a "value unit" string such as `"111214 km"` or `"12.4 V"`.
///
/// Takes the first whitespace-delimited token and strips thousands separators.
pub fn parse_unit_value(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() || is_sentinel(raw) {
        return None;
    }
    let numeric = raw.split_whitespace().next()?.replace(',', "");
    match Decimal::from_str(&numeric).or_else(|_| Decimal::from_scientific(&numeric)) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Failed to parse unit value: {}", raw);
            None
        }
    }
}

pub fn parse_unit_field(value: Option<&Value>) -> Option<Decimal> {
    field_text(value).and_then(|s| parse_unit_value(&s))
}

/// Parse an `H:MM:SS` duration into seconds. `"0:00:00"` is zero, not an error.
pub fn parse_duration(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || is_sentinel(raw) {
        return None;
    }
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 3 {
        warn!("Failed to parse duration: {}", raw);
        return None;
    }
    let mut numbers = [0u64; 3];
    for (slot, part) in numbers.iter_mut().zip(parts) {
        match part.trim().parse::<u64>() {
            Ok(n) => *slot = n,
            Err(_) => {
                warn!("Failed to parse duration: {}", raw);
                return None;
            }
        }
    }
    let [hours, minutes, seconds] = numbers;
    Some(hours * 3600 + minutes * 60 + seconds)
}

/// Plain decimal from a JSON number or numeric string (coordinates, counts).
pub fn parse_decimal_field(value: Option<&Value>) -> Option<Decimal> {
    let text = field_text(value)?;
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

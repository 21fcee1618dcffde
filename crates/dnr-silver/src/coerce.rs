//! Value coercion for silver columns.
//!
//! Every function takes a trimmed, non-empty source value and returns `None`
//! when it cannot be read as the target type. Callers store NULL and count
//! the miss; nothing here fails.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use dnr_core::FieldType;
use dnr_db::SqlValue;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Coerce `raw` to the SQL value stored for `ty`
pub fn coerce(ty: FieldType, raw: &str) -> Option<SqlValue> {
    match ty {
        FieldType::Text => Some(SqlValue::from(raw)),
        FieldType::Email => normalize_email(raw).map(SqlValue::Text),
        FieldType::Phone => normalize_phone(raw).map(SqlValue::Text),
        FieldType::Date => parse_date(raw)
            .map(|d| SqlValue::Text(d.format("%Y-%m-%d").to_string())),
        FieldType::Timestamp => parse_timestamp(raw)
            .map(|ts| SqlValue::Text(ts.format("%Y-%m-%d %H:%M:%S").to_string())),
        FieldType::Amount => parse_amount(raw).map(|a| SqlValue::Text(format!("{a:.2}"))),
        FieldType::Bool => parse_bool(raw).map(SqlValue::Bool),
    }
}

/// Lower-cased, trimmed email with a local part and a dotted domain
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim();
    let email = email.strip_prefix("mailto:").unwrap_or(email).to_lowercase();
    let (local, domain) = email.split_once('@')?;
    let valid = !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace);
    valid.then_some(email)
}

/// Digits of a phone number, extension removed
pub fn normalize_phone(raw: &str) -> Option<String> {
    let lower = raw.to_lowercase();
    let number = ["ext", "x", "#"]
        .iter()
        .filter_map(|marker| lower.find(marker))
        .min()
        .map_or(lower.as_str(), |at| &lower[..at]);
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| parse_timestamp(raw).map(|ts| ts.date()))
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Amounts at or above this magnitude do not fit `DECIMAL(18,2)`
pub const MAX_AMOUNT: f64 = 1e16;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₹', '¢', '₩', '₽', '₪', '₱'];
const SEPARATORS: &[char] = &[',', ' ', '\u{a0}', '\''];

/// Currency amount: symbols, a three-letter ISO code and digit separators
/// dropped, `(12.50)` and a trailing minus read as negative. Any other
/// letter, exponent notation included, makes the value unreadable.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let mut text = strip_currency_code(raw.trim());
    let mut negative = false;
    if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        negative = true;
        text = strip_currency_code(inner.trim());
    }
    if let Some(inner) = text.strip_suffix('-') {
        negative = !negative;
        text = inner;
    }

    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '0'..='9' | '.' => cleaned.push(c),
            '-' if cleaned.is_empty() => cleaned.push(c),
            c if CURRENCY_SYMBOLS.contains(&c) || SEPARATORS.contains(&c) => {}
            _ => return None,
        }
    }
    if cleaned.is_empty() {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() || value.abs() >= MAX_AMOUNT {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Drop a leading or trailing uppercase currency code such as `USD`
fn strip_currency_code(text: &str) -> &str {
    let is_code = |s: &str| s.len() == 3 && s.bytes().all(|b| b.is_ascii_uppercase());
    if text.len() > 3 {
        if let (Some(head), Some(rest)) = (text.get(..3), text.get(3..)) {
            if is_code(head) {
                return rest.trim_start();
            }
        }
        if let (Some(rest), Some(tail)) = (text.get(..text.len() - 3), text.get(text.len() - 3..)) {
            if is_code(tail) {
                return rest.trim_end();
            }
        }
    }
    text
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "checked" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "unchecked" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "coerce_test.rs"]
mod tests;

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const DATETIME_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single non-missing cell. Missing cells are `None` in a column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
    Boolean(bool),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Number(f) => format_number(*f),
            Value::DateTime(dt) => format_datetime(dt),
            Value::Boolean(b) => b.to_string(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            Value::Boolean(_) => 0,
            Value::Number(_) => 1,
            Value::DateTime(_) => 2,
            Value::Text(_) => 3,
        }
    }
}

// Numbers compare by bit pattern with -0.0 folded onto 0.0 so that distinct
// counting and hashing agree.
fn number_key(value: f64) -> u64 {
    if value == 0.0 { 0 } else { value.to_bits() }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => number_key(*a) == number_key(*b),
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.variant_rank().hash(state);
        match self {
            Value::Text(s) => s.hash(state),
            Value::Number(f) => number_key(*f).hash(state),
            Value::DateTime(dt) => dt.hash(state),
            Value::Boolean(b) => b.hash(state),
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

pub fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.and_utc().timestamp_subsec_nanos() == 0 {
        dt.format(DATETIME_DISPLAY_FORMAT).to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()
    }
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Parses a date, a naive date-time or an RFC 3339 timestamp (converted to
/// UTC) into the canonical datetime representation.
pub fn parse_temporal(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(dt) = parse_naive_datetime(trimmed) {
        return Some(dt);
    }
    if let Some(date) = parse_naive_date(trimmed) {
        return date.and_hms_opt(0, 0, 0);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.naive_utc())
}

/// Parses a finite number. Thousands separators are not accepted.
pub fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
}

pub fn is_placeholder_token(value: &str) -> bool {
    let lowered = value.trim().to_ascii_lowercase();
    let stripped = lowered.trim_start_matches('#');
    matches!(
        stripped,
        "na" | "n/a" | "n.a." | "nan" | "null" | "none" | "missing"
    )
}

/// Turns a raw field into a cell: empty fields and placeholder tokens become
/// missing.
pub fn parse_raw_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_placeholder_token(trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Lowercase, underscore-delimited identifier with runs collapsed and no
/// leading or trailing underscores.
pub fn clean_column_name(name: &str) -> String {
    let replaced = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect::<String>();
    let mut cleaned = String::with_capacity(replaced.len());
    for ch in replaced.trim_matches('_').chars() {
        if ch == '_' && cleaned.ends_with('_') {
            continue;
        }
        cleaned.push(ch);
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn clean_column_name_replaces_and_collapses() {
        assert_eq!(clean_column_name("Order ID"), "order_id");
        assert_eq!(clean_column_name("$Percent%"), "percent");
        assert_eq!(clean_column_name("  Unit -- Price (USD) "), "unit_price_usd");
        assert_eq!(clean_column_name("%%%"), "");
        assert_eq!(clean_column_name("Größe"), "gr_e");
    }

    #[test]
    fn clean_column_name_is_stable_on_clean_input() {
        for name in ["order_id", "a1_b2", "x"] {
            assert_eq!(clean_column_name(name), name);
        }
    }

    #[test]
    fn parse_temporal_supports_dates_datetimes_and_offsets() {
        let midnight = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_temporal("2024-05-06"), Some(midnight));
        assert_eq!(parse_temporal("2024/05/06"), Some(midnight));
        let afternoon = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        assert_eq!(parse_temporal("2024-05-06T14:30:00"), Some(afternoon));
        assert_eq!(parse_temporal("2024-05-06 14:30"), Some(afternoon));
        assert_eq!(parse_temporal("2024-05-06T16:30:00+02:00"), Some(afternoon));
        assert_eq!(parse_temporal("not a date"), None);
        assert_eq!(parse_temporal("42"), None);
    }

    #[test]
    fn parse_number_rejects_non_finite() {
        assert_eq!(parse_number(" 3.5 "), Some(3.5));
        assert_eq!(parse_number("-2"), Some(-2.0));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("1,000"), None);
    }

    #[test]
    fn placeholders_become_missing() {
        assert_eq!(parse_raw_cell("  "), None);
        assert_eq!(parse_raw_cell("N/A"), None);
        assert_eq!(parse_raw_cell("#N/A"), None);
        assert_eq!(parse_raw_cell("null"), None);
        assert_eq!(parse_raw_cell(" value "), Some("value".to_string()));
    }

    #[test]
    fn numbers_hash_consistently_with_equality() {
        let mut seen = HashSet::new();
        seen.insert(Value::Number(0.0));
        seen.insert(Value::Number(-0.0));
        seen.insert(Value::Number(1.5));
        seen.insert(Value::Text("1.5".into()));
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn display_renders_canonical_forms() {
        assert_eq!(Value::Number(3.0).as_display(), "3");
        assert_eq!(Value::Number(2.25).as_display(), "2.25");
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(Value::DateTime(dt).as_display(), "2024-01-02 03:04:05");
    }

    #[test]
    fn ordering_groups_variants() {
        let mut values = vec![
            Value::Text("b".into()),
            Value::Number(2.0),
            Value::Text("a".into()),
            Value::Number(-1.0),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Number(-1.0),
                Value::Number(2.0),
                Value::Text("a".into()),
                Value::Text("b".into()),
            ]
        );
    }
}

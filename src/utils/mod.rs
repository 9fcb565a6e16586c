use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

/// A chain of object keys walked from a JSON node.
pub type FieldPath = &'static [&'static str];

/// Canonical timestamp layout used for correlation keys and `lastSeen`.
const CANONICAL_TS: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Layouts seen in upstream feeds that RFC 3339 parsing rejects.
const LOOSE_TS_LAYOUTS: [&str; 5] = [
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
];

fn walk<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |node, key| node.get(*key))
}

/// Resolve a field by trying each alias path in priority order.
///
/// The first path that reaches a non-null value wins. An empty path resolves
/// to `value` itself.
pub fn resolve<'a>(value: &'a Value, paths: &[FieldPath]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| walk(value, path))
        .find(|found| !found.is_null())
}

/// Like [`resolve`], but only accepts values that read as a non-blank string.
pub fn resolve_str(value: &Value, paths: &[FieldPath]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| walk(value, path))
        .find_map(value_to_string)
}

/// Like [`resolve`], but only accepts values that read as a finite number.
pub fn resolve_f64(value: &Value, paths: &[FieldPath]) -> Option<f64> {
    paths
        .iter()
        .filter_map(|path| walk(value, path))
        .find_map(value_to_f64)
}

/// Like [`resolve`], but only accepts booleans (or their string spelling).
pub fn resolve_bool(value: &Value, paths: &[FieldPath]) -> Option<bool> {
    paths
        .iter()
        .filter_map(|path| walk(value, path))
        .find_map(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        })
}

/// Trimmed string form of a scalar; blank strings and non-scalars yield `None`.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric reading of a value: numbers, numeric strings, or an object
/// carrying `value` / `displayValue`.
pub fn value_to_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Object(_) => resolve_f64(value, &[&["value"], &["displayValue"]]),
        _ => None,
    };
    parsed.filter(|x| x.is_finite())
}

/// Lower-case and collapse internal whitespace.
pub fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalise an `away@home` matchup so both sides compare key-wise.
pub fn normalize_matchup(raw: &str) -> String {
    match raw.split_once('@') {
        Some((away, home)) => format!("{}@{}", normalize_key(away), normalize_key(home)),
        None => normalize_key(raw),
    }
}

/// Bring an ISO-like timestamp into `YYYY-MM-DDTHH:MM:SSZ` (UTC).
///
/// Unparseable input is returned trimmed but otherwise untouched.
pub fn canonical_timestamp(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.with_timezone(&Utc).format(CANONICAL_TS).to_string();
    }

    LOOSE_TS_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(trimmed, layout).ok())
        .map(|naive| naive.and_utc().format(CANONICAL_TS).to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Round to a fixed number of decimal places, never yielding `-0.0`.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor + 0.0
}

/// `count / denominator` as a percentage rounded to 2 places; `None` when the
/// denominator is zero.
pub fn rate_pct(count: u32, denominator: u32) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    Some(round_to(count as f64 / denominator as f64 * 100.0, 2))
}

fn strip_team_suffixes(s: &str) -> String {
    s.to_lowercase()
        .replace(" fc", "")
        .replace("fc ", "")
        .replace("afc ", "")
        .replace(" afc", "")
        .replace(" sc", "")
        .replace('.', "")
        .replace('-', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fuzzy team-name match: normalises common suffixes, then requires a
/// normalised Levenshtein similarity of at least 0.9.
pub fn team_names_match(a: &str, b: &str) -> bool {
    let a = strip_team_suffixes(a);
    let b = strip_team_suffixes(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || strsim::normalized_levenshtein(&a, &b) >= 0.9
}

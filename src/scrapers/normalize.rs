//! Field-level normalization of loosely typed source values.
//!
//! Every function here is total: a value that cannot be understood comes
//! back as `None` (or an empty collection), never as an error.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Epoch values above this are milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 10_000_000_000;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digits regex"));
static ISO_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("iso regex"));
static MONEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(crores?|cr|lakhs?|lacs?|l|k)?\b").expect("money regex")
});
static BHK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:(?:^|[^\d.])(\d+)(?:\.\d+)?\s*bhk|bhk\s*(\d+))").expect("bhk regex")
});
static BARE_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+)\s*$").expect("int regex"));
static SQFT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d[\d,]*)\s*(?:sq\.?\s*ft|sqft|sft|square\s+feet)").expect("sqft regex")
});

fn first_digit_run(s: &str) -> Option<i64> {
    DIGITS.find(s).and_then(|m| m.as_str().parse().ok())
}

/// Trimmed, non-empty text from a string or number.
pub fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse rupee amounts: "35000", "35,000", "₹35k/month", "1.5 lakhs", "2 cr."
pub fn parse_money(raw: &str) -> Option<i64> {
    let cleaned = raw.replace([',', '₹'], "").trim().to_lowercase();
    if cleaned.is_empty() {
        return None;
    }

    let Some(caps) = MONEY.captures(&cleaned) else {
        return first_digit_run(&cleaned);
    };

    let multiplier = match caps.get(2).map(|m| m.as_str()) {
        Some("k") => 1_000.0,
        Some("l" | "lakh" | "lakhs" | "lac" | "lacs") => 100_000.0,
        Some("cr" | "crore" | "crores") => 10_000_000.0,
        _ => 1.0,
    };

    match caps[1].parse::<f64>() {
        Ok(n) if (n * multiplier).is_finite() && n * multiplier < i64::MAX as f64 => {
            Some((n * multiplier).round() as i64)
        }
        _ => first_digit_run(&cleaned),
    }
}

/// Money from a JSON number or string.
pub fn money(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => parse_money(s),
        _ => None,
    }
}

/// Leading integer of a number-ish value ("750 sqft" -> 750).
pub fn leading_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => first_digit_run(&s.replace(',', "")),
        _ => None,
    }
}

/// Bedroom count from `2`, `2.0`, `"2"`, `"2 BHK flat"`, `"2.5 BHK"` or `"BHK2"`.
pub fn bhk(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => {
            if let Some(caps) = BHK.captures(s) {
                return caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .and_then(|m| m.as_str().parse().ok());
            }
            BARE_INT.captures(s).and_then(|c| c[1].parse().ok())
        }
        _ => None,
    }
}

/// Carpet area mentioned in free text, e.g. "spacious 1,150 sq ft flat".
pub fn carpet_from_text(s: &str) -> Option<i64> {
    SQFT.captures(s)
        .and_then(|caps| caps[1].replace(',', "").parse().ok())
}

fn from_epoch(n: i64) -> Option<DateTime<Utc>> {
    if n > EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}

fn parse_iso_like(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_relative(low: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if low.contains("just now") || low.contains("today") {
        return Some(now);
    }
    if low.contains("yesterday") {
        return Some(now - Duration::days(1));
    }

    let n = first_digit_run(low).unwrap_or(1);
    let delta = if low.contains("minute") || low.contains("min ") || low.ends_with("min") {
        Duration::try_minutes(n)?
    } else if low.contains("hour") || low.contains("hrs") {
        Duration::try_hours(n)?
    } else if low.contains("week") {
        Duration::try_weeks(n)?
    } else if low.contains("month") {
        Duration::try_days(n.checked_mul(30)?)?
    } else if low.contains("day") {
        Duration::try_days(n)?
    } else {
        return None;
    };
    now.checked_sub_signed(delta)
}

/// Resolve a posting time from epoch seconds/millis, ISO-8601-ish text or
/// relative phrases ("3 hours ago", "yesterday").
pub fn parse_timestamp_str(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse().ok().and_then(from_epoch);
    }
    if ISO_LIKE.is_match(s) {
        if let Some(dt) = parse_iso_like(s) {
            return Some(dt);
        }
    }
    parse_relative(&s.to_lowercase(), now)
}

pub fn timestamp(value: &Value, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .and_then(from_epoch),
        Value::String(s) => parse_timestamp_str(s, now),
        _ => None,
    }
}

/// `"semi_furnished"` -> `"Semi Furnished"`
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_alpha = false;
    for c in raw.replace('_', " ").chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out.trim().to_string()
}

/// Free-text enumerations (furnishing, property type).
pub fn label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(title_case(s)),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Amenities from a list of names or a `{name: present}` map.
pub fn amenities(value: &Value) -> Vec<String> {
    let names: Vec<&str> = match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| truthy(v))
            .map(|(k, _)| k.as_str())
            .collect(),
        _ => Vec::new(),
    };

    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim().to_lowercase();
        if !name.is_empty() && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

pub fn coordinate(value: &Value) -> Option<f64> {
    let f = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    f.is_finite().then_some(f)
}

/// Tri-state flag; anything unrecognised is unknown.
pub fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn money_variants() {
        let cases = [
            ("1 lakh", 100_000),
            ("2 lakhs", 200_000),
            ("3 lacs", 300_000),
            ("4 lac", 400_000),
            ("1.5L", 150_000),
            ("0.5 crore", 5_000_000),
            ("1 crore", 10_000_000),
            ("3 crores", 30_000_000),
            ("1.2 cr", 12_000_000),
            ("5 cr.", 50_000_000),
            ("25k", 25_000),
            ("35k/month", 35_000),
            ("35000", 35_000),
            ("₹ 35,000", 35_000),
            ("Rs. 1,20,000 per month", 120_000),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_money(input), Some(expected), "{input}");
        }
    }

    #[test]
    fn money_absent() {
        assert_eq!(parse_money(""), None);
        assert_eq!(parse_money("negotiable"), None);
        assert_eq!(money(&Value::Null), None);
        assert_eq!(money(&json!(true)), None);
        assert_eq!(money(&json!(42000)), Some(42_000));
        assert_eq!(money(&json!("35k")), Some(35_000));
    }

    #[test]
    fn epoch_seconds_and_millis() {
        let secs = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(timestamp(&json!(1_704_067_200), now()), Some(secs));
        assert_eq!(timestamp(&json!(1_704_067_200_000_i64), now()), Some(secs));
        assert_eq!(timestamp(&json!("1704067200000"), now()), Some(secs));
    }

    #[test]
    fn iso_strings() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap();
        assert_eq!(timestamp(&json!("2024-01-01T10:30:00Z"), now()), Some(expected));
        assert_eq!(timestamp(&json!("2024-01-01T16:00:00+05:30"), now()), Some(expected));
        assert_eq!(timestamp(&json!("2024-01-01T10:30:00"), now()), Some(expected));
        assert_eq!(timestamp(&json!("2024-01-01 10:30:00.250"), now()).map(|d| d.timestamp()), Some(expected.timestamp()));
        assert_eq!(
            timestamp(&json!("2024-01-01"), now()),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn relative_phrases() {
        assert_eq!(timestamp(&json!("Posted 3 hours ago"), now()), Some(now() - Duration::hours(3)));
        assert_eq!(timestamp(&json!("45 minutes ago"), now()), Some(now() - Duration::minutes(45)));
        assert_eq!(timestamp(&json!("2 days ago"), now()), Some(now() - Duration::days(2)));
        assert_eq!(timestamp(&json!("Posted today"), now()), Some(now()));
        assert_eq!(timestamp(&json!("yesterday"), now()), Some(now() - Duration::days(1)));
    }

    #[test]
    fn unrecognised_timestamps_are_absent() {
        assert_eq!(timestamp(&json!("whenever"), now()), None);
        assert_eq!(timestamp(&json!(""), now()), None);
        assert_eq!(timestamp(&json!({"at": 1}), now()), None);
    }

    #[test]
    fn bhk_patterns() {
        assert_eq!(bhk(&json!("2 BHK flat")), Some(2));
        assert_eq!(bhk(&json!("3BHK")), Some(3));
        assert_eq!(bhk(&json!("BHK1")), Some(1));
        assert_eq!(bhk(&json!(" 4 ")), Some(4));
        assert_eq!(bhk(&json!(2)), Some(2));
        assert_eq!(bhk(&json!("studio")), None);
        assert_eq!(bhk(&json!("RK1 near 2 parks")), None);
        assert_eq!(bhk(&json!("2.5 BHK")), Some(2));
        assert_eq!(bhk(&json!("Spacious 1.5BHK")), Some(1));
        assert_eq!(bhk(&json!(2.0)), Some(2));
        assert_eq!(bhk(&json!(2.5)), None);
    }

    #[test]
    fn labels_are_title_cased() {
        assert_eq!(label(&json!("semi_furnished")), Some("Semi Furnished".to_string()));
        assert_eq!(label(&json!("APARTMENT")), Some("Apartment".to_string()));
        assert_eq!(label(&json!("Semi-Furnished")), Some("Semi-Furnished".to_string()));
        assert_eq!(label(&json!(3)), None);
    }

    #[test]
    fn amenities_from_list_or_map() {
        assert_eq!(
            amenities(&json!([" Lift", "GYM", "lift", ""])),
            vec!["lift".to_string(), "gym".to_string()]
        );
        assert_eq!(
            amenities(&json!({"Gym": true, "Pool": false, "Lift": 1})),
            vec!["gym".to_string(), "lift".to_string()]
        );
        assert!(amenities(&json!("lift")).is_empty());
    }

    #[test]
    fn coordinates_never_error() {
        assert_eq!(coordinate(&json!("12.34")), Some(12.34));
        assert_eq!(coordinate(&json!(77.6)), Some(77.6));
        assert_eq!(coordinate(&json!("not-a-num")), None);
        assert_eq!(coordinate(&json!("")), None);
        assert_eq!(coordinate(&json!("NaN")), None);
    }

    #[test]
    fn carpet_in_text() {
        assert_eq!(carpet_from_text("Spacious 1,150 sq ft flat"), Some(1150));
        assert_eq!(carpet_from_text("650sqft near metro"), Some(650));
        assert_eq!(carpet_from_text("3rd floor"), None);
    }
}

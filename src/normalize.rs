//! Field normalization for schedule cells.
//!
//! Three directions, kept as separate pure functions:
//! - parse (raw cell text -> canonical storage string)
//! - display (canonical string -> label shown to users)
//! - sort key (canonical string -> comparable value)

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Date formats tried first, in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Datetime formats tried right after [`DATE_FORMATS`].
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S"];

/// Permissive fallback when none of the primary formats match.
const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];
const FALLBACK_DATE_FORMATS: &[&str] = &["%Y年%m月%d日", "%Y.%m.%d", "%Y%m%d"];

/// Textual stand-ins for a missing value left behind by spreadsheet tooling.
pub const NULL_LITERALS: &[&str] = &["nan", "NaN", "NaT", "None", "null"];

/// Values blanked when formatting a stored record for display.
const DISPLAY_NULLS: &[&str] = &["nan", "NaT", "None"];

/// 12-hour clock forms, tried on values ending in AM/PM.
const MERIDIEM_FORMATS: &[&str] = &["%I:%M %p", "%I:%M:%S %p", "%I:%M%p", "%I:%M:%S%p"];

/// Weekday symbols, Monday first.
const WEEKDAY_KANJI: [char; 7] = ['月', '火', '水', '木', '金', '土', '日'];

/// True for empty strings and textual null markers.
pub fn is_null_like(value: &str) -> bool {
    value.is_empty() || NULL_LITERALS.contains(&value)
}

/// True for values the display layer shows as empty.
pub fn is_display_null(value: &str) -> bool {
    value.is_empty() || DISPLAY_NULLS.contains(&value)
}

// ---------------------------------------------------------------------------
// Parse direction
// ---------------------------------------------------------------------------

/// Parse a date-like value into a calendar date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if is_null_like(s) {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    permissive_date(s)
}

fn permissive_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in FALLBACK_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    FALLBACK_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parse a time-like value into hour and minute, dropping seconds.
///
/// Accepts `H:M`, `H:M:S`, `H:M:S.fff` (spaces around `:` allowed), 12-hour
/// `H:M AM`/`H:M PM`, and full datetimes (the time of day is taken).
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let s = raw.trim();
    if is_null_like(s) {
        return None;
    }

    if s.contains('-') || s.contains('/') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return NaiveTime::from_hms_opt(dt.hour(), dt.minute(), 0);
        }
        return DATETIME_FORMATS
            .iter()
            .chain(FALLBACK_DATETIME_FORMATS)
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .and_then(|dt| NaiveTime::from_hms_opt(dt.hour(), dt.minute(), 0));
    }

    let compact = s.split(':').map(str::trim).collect::<Vec<_>>().join(":");
    if has_meridiem(&compact) {
        return MERIDIEM_FORMATS
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(&compact, fmt).ok())
            .and_then(|t| NaiveTime::from_hms_opt(t.hour(), t.minute(), 0));
    }

    hour_minute(&compact).and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0))
}

fn has_meridiem(s: &str) -> bool {
    let upper = s.to_ascii_uppercase();
    upper.ends_with("AM") || upper.ends_with("PM")
}

/// Split `H:M[:S][.fff]` into hour and minute.
fn hour_minute(s: &str) -> Option<(u32, u32)> {
    let without_fraction = s.split('.').next().unwrap_or(s);
    let mut parts = without_fraction.split(':');
    let hour = parts.next()?.trim().parse::<u32>().ok()?;
    let minute = parts.next()?.trim().parse::<u32>().ok()?;
    Some((hour, minute))
}

/// Canonical storage form of a date cell: `YYYY-MM-DD`, or "" when unparsable.
pub fn canonical_date(raw: &str) -> String {
    parse_date(raw)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Canonical storage form of a time cell: `HH:MM`, or "" when unparsable.
pub fn canonical_time(raw: &str) -> String {
    parse_time(raw)
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default()
}

/// Free-text rule: full-width spaces become ASCII spaces, line breaks are
/// removed, and the result is trimmed.
pub fn clean_text(raw: &str) -> String {
    raw.replace('\u{3000}', " ")
        .replace(['\r', '\n'], "")
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// Display direction
// ---------------------------------------------------------------------------

/// `2024-06-15` -> `6月15日(土)`. Unparsable input is returned unchanged.
pub fn display_date(canonical: &str) -> String {
    if canonical.is_empty() {
        return String::new();
    }
    match parse_date(canonical) {
        Some(d) => format!(
            "{}月{}日({})",
            d.month(),
            d.day(),
            WEEKDAY_KANJI[d.weekday().num_days_from_monday() as usize]
        ),
        None => canonical.to_string(),
    }
}

/// Re-derive zero-padded `HH:MM`, tolerating a fractional-seconds suffix.
/// Values that do not look like a time are returned unchanged.
pub fn display_time(canonical: &str) -> String {
    if is_null_like(canonical) {
        return String::new();
    }
    if !canonical.contains(':') {
        return canonical.to_string();
    }
    match hour_minute(canonical) {
        Some((h, m)) => format!("{:02}:{:02}", h, m),
        None => canonical.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Sort-key direction
// ---------------------------------------------------------------------------

/// Comparable date, or `None` when the date is absent or unparsable.
pub fn date_sort_key(canonical: &str) -> Option<NaiveDate> {
    parse_date(canonical)
}

/// Comparable time of day. Absent or unparsable times sort as 23:59.
pub fn time_sort_key(canonical: &str) -> NaiveTime {
    parse_time(canonical).unwrap_or_else(|| {
        // Timeless entries go last within their day
        NaiveTime::from_hms_opt(23, 59, 0).expect("23:59 is a valid time")
    })
}

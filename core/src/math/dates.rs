//! Best-effort parsing of timestamp labels for chronological column ordering.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::cmp::Ordering;

/// Year assumed for labels such as "2-Jan" that carry no year.
const YEARLESS_DEFAULT: i32 = 2001;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y%m%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%d-%B-%Y",
    "%d %B %Y",
    "%b %d %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%B %d, %Y",
];

const YEARLESS_FORMATS: &[&str] = &["%d-%b-%Y", "%d %b %Y", "%b %d %Y", "%d-%B-%Y", "%B %d %Y"];

/// Parses a timestamp label into a date-time, trying the common layouts
/// seen in uploaded spreadsheets.
pub fn parse_label(label: &str) -> Option<NaiveDateTime> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(label) {
        return Some(parsed.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(label, format) {
            return Some(parsed);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(label, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    let with_year = format!("{label} {YEARLESS_DEFAULT}");
    let with_dash_year = format!("{label}-{YEARLESS_DEFAULT}");
    for format in YEARLESS_FORMATS {
        for candidate in [&with_year, &with_dash_year] {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
                return date.and_hms_opt(0, 0, 0);
            }
        }
    }
    None
}

/// Chronological ordering of two labels; unparseable labels sort last and
/// compare equal to each other so a stable sort keeps their input order.
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    match (parse_label(a), parse_label(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

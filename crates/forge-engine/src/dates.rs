//! ISO 8601 date/time normalization with partial-precision preservation.
//!
//! Collected dates arrive in whatever shape the EDC exported. Conversion
//! keeps whatever precision the value carries: `2003-12` stays `2003-12`,
//! it is never padded out to a fabricated day.

use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// Precision detected in a raw date/time string.
#[derive(Debug, Clone, PartialEq)]
pub enum DatePrecision {
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    YearMonth { year: i32, month: u32 },
    Year(i32),
    /// Already valid ISO 8601, kept verbatim.
    Iso8601(String),
    /// Unparseable, kept verbatim so the defect stays visible downstream.
    Unknown(String),
}

impl DatePrecision {
    pub fn to_iso8601(&self) -> String {
        match self {
            Self::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::YearMonth { year, month } => format!("{year:04}-{month:02}"),
            Self::Year(year) => format!("{year:04}"),
            Self::Iso8601(s) | Self::Unknown(s) => s.clone(),
        }
    }

    /// The full calendar date, when the value carries one.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::DateTime(dt) => Some(dt.date()),
            Self::Date(d) => Some(*d),
            Self::Iso8601(s) => parse_full_date(s),
            _ => None,
        }
    }
}

/// Detect the precision of a raw date/time string.
pub fn parse_precision(value: &str) -> DatePrecision {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return DatePrecision::Unknown(String::new());
    }
    if is_valid_iso8601(trimmed) {
        return DatePrecision::Iso8601(trimmed.to_string());
    }
    if let Some(dt) = try_parse_datetime(trimmed) {
        return DatePrecision::DateTime(dt);
    }
    if let Some(d) = try_parse_date(trimmed) {
        return DatePrecision::Date(d);
    }
    if let Some(partial) = try_parse_partial(trimmed) {
        return partial;
    }
    DatePrecision::Unknown(trimmed.to_string())
}

/// Convert a raw value to ISO 8601, preserving precision. Unparseable
/// values pass through unchanged so format rules can flag them.
pub fn to_iso8601(value: &str) -> String {
    parse_precision(value).to_iso8601()
}

/// The full calendar date of a value, or `None` for partial or missing
/// precision. Study-day and epoch derivations refuse partial dates.
pub fn full_date(value: &str) -> Option<NaiveDate> {
    parse_precision(value).date()
}

fn parse_full_date(iso: &str) -> Option<NaiveDate> {
    let date_part = iso.split('T').next().unwrap_or(iso);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Byte-wise shape check for ISO 8601 at any supported precision: year,
/// year-month, full date, or date plus `T HH:MM[:SS]`.
pub fn is_valid_iso8601(value: &str) -> bool {
    let bytes = value.as_bytes();
    let digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);

    if bytes.len() < 4 || !digits(0..4) {
        return false;
    }
    match bytes.len() {
        4 => true,
        7 => bytes[4] == b'-' && digits(5..7),
        10 => bytes[4] == b'-' && digits(5..7) && bytes[7] == b'-' && digits(8..10),
        16.. => {
            bytes[4] == b'-'
                && digits(5..7)
                && bytes[7] == b'-'
                && digits(8..10)
                && bytes[10] == b'T'
                && digits(11..13)
                && bytes[13] == b':'
                && digits(14..16)
                && (bytes.len() == 16
                    || (bytes.len() >= 19 && bytes[16] == b':' && digits(17..19)))
        }
        _ => false,
    }
}

fn try_parse_datetime(value: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%d-%b-%Y %H:%M:%S",
        "%d-%b-%Y %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

fn try_parse_date(value: &str) -> Option<NaiveDate> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d-%b-%Y",
        "%d-%B-%Y",
        "%m/%d/%Y",
        "%d.%m.%Y",
        "%Y%m%d",
        "%b %d, %Y",
        "%d %b %Y",
        "%d %B %Y",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

fn try_parse_partial(value: &str) -> Option<DatePrecision> {
    if value.len() == 7 && value.is_ascii() && value.as_bytes()[4] == b'-' {
        if let (Ok(year), Ok(month)) = (value[0..4].parse::<i32>(), value[5..7].parse::<u32>()) {
            if (1..=12).contains(&month) {
                return Some(DatePrecision::YearMonth { year, month });
            }
        }
    }
    if value.len() == 4 {
        if let Ok(year) = value.parse::<i32>() {
            if (1900..=2100).contains(&year) {
                return Some(DatePrecision::Year(year));
            }
        }
    }
    // Textual month-year forms like "Jan 2024".
    for fmt in ["%b %Y", "%B %Y", "%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(&format!("{value} 01"), &format!("{fmt} %d")) {
            return Some(DatePrecision::YearMonth {
                year: d.year(),
                month: d.month(),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_values_pass_through() {
        assert_eq!(to_iso8601("2024"), "2024");
        assert_eq!(to_iso8601("2024-01"), "2024-01");
        assert_eq!(to_iso8601("2024-01-15"), "2024-01-15");
        assert_eq!(to_iso8601("2024-01-15T10:30"), "2024-01-15T10:30");
        assert_eq!(to_iso8601("2024-01-15T10:30:45"), "2024-01-15T10:30:45");
    }

    #[test]
    fn common_edc_formats_convert() {
        assert_eq!(to_iso8601("01/15/2024"), "2024-01-15");
        assert_eq!(to_iso8601("15-Jan-2024"), "2024-01-15");
        assert_eq!(to_iso8601("20240115"), "2024-01-15");
        assert_eq!(to_iso8601("Jan 2024"), "2024-01");
    }

    #[test]
    fn unparseable_values_are_preserved() {
        assert_eq!(to_iso8601("not a date"), "not a date");
        assert_eq!(to_iso8601(""), "");
    }

    #[test]
    fn full_date_rejects_partial_precision() {
        assert!(full_date("2024-01-15").is_some());
        assert!(full_date("2024-01-15T08:00:00").is_some());
        assert!(full_date("2024-01").is_none());
        assert!(full_date("2024").is_none());
        assert!(full_date("garbage").is_none());
    }
}

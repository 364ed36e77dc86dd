//! Pure cross-table derivation functions.
//!
//! Each of these is a plain function over already-parsed inputs so the
//! boundary behavior (Day 0, epoch edges, missing components) is testable
//! without a frame in sight.

use chrono::NaiveDate;

use forge_model::is_blank;

use crate::context::ElementWindow;

/// Join subject-identifier components on a dash after trimming.
///
/// A blank or missing-sentinel component is an error, never a silent null:
/// a malformed unique subject id poisons every cross-domain join downstream.
pub fn build_usubjid(study: &str, site: &str, subject: &str) -> Result<String, String> {
    let mut parts = Vec::with_capacity(3);
    for (name, value) in [("study", study), ("site", site), ("subject", subject)] {
        let trimmed = value.trim();
        if is_blank(trimmed) {
            return Err(format!("{name} component is missing"));
        }
        parts.push(trimmed);
    }
    Ok(parts.join("-"))
}

/// Relative study day with no Day 0.
///
/// On or after the reference date the day is `diff + 1`, before it the day
/// is `diff`; the reference date itself is Day 1.
pub fn study_day(event: NaiveDate, reference: NaiveDate) -> i64 {
    let diff = (event - reference).num_days();
    if event >= reference { diff + 1 } else { diff }
}

/// First element window containing `date`, by start order. Boundary dates
/// are included; a missing end means open-ended.
pub fn assign_epoch(date: NaiveDate, windows: &[ElementWindow]) -> Option<&str> {
    windows
        .iter()
        .find(|w| w.start <= date && w.end.is_none_or(|end| date <= end))
        .map(|w| w.epoch.as_str())
}

/// Normalize a collected yes/no answer to Y or N.
pub fn yes_no(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_uppercase().as_str() {
        "Y" | "YES" | "TRUE" | "1" => Some("Y"),
        "N" | "NO" | "FALSE" | "0" => Some("N"),
        _ => None,
    }
}

/// Whether a checkbox export value means "checked".
pub fn checkbox_checked(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_uppercase().as_str(),
        "1" | "Y" | "YES" | "TRUE" | "X" | "CHECKED"
    )
}

/// Controlled race term inferred from a checkbox column name.
pub fn race_for_column(column: &str) -> Option<&'static str> {
    let upper = column.to_ascii_uppercase();
    // INDIAN before AFRICAN AMERICAN: both contain "AMERICAN".
    if upper.contains("INDIAN") || upper.contains("ALASKA") || upper.contains("AMIND") {
        Some("AMERICAN INDIAN OR ALASKA NATIVE")
    } else if upper.contains("HAWAII") || upper.contains("PACIFIC") {
        Some("NATIVE HAWAIIAN OR OTHER PACIFIC ISLANDER")
    } else if upper.contains("BLACK") || upper.contains("AFRICAN") {
        Some("BLACK OR AFRICAN AMERICAN")
    } else if upper.contains("WHITE") || upper.contains("CAUCASIAN") {
        Some("WHITE")
    } else if upper.contains("ASIAN") {
        Some("ASIAN")
    } else if upper.contains("OTHER") {
        Some("OTHER")
    } else if upper.contains("UNKNOWN") {
        Some("UNKNOWN")
    } else if upper.contains("NOTREP") || upper.contains("NOT_REPORTED") {
        Some("NOT REPORTED")
    } else {
        None
    }
}

/// Collapse the set of checked race terms to a single value: one term
/// stands alone, more than one is MULTIPLE, none is null.
pub fn race_from_checked(terms: &[&str]) -> Option<String> {
    match terms {
        [] => None,
        [only] => Some((*only).to_string()),
        _ => Some("MULTIPLE".to_string()),
    }
}

/// Standardized numeric result: the original parsed as a number.
pub fn standardized_numeric(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Normal-range indicator against inclusive bounds. Null when the result
/// or either needed bound is missing.
pub fn range_indicator(value: Option<f64>, low: Option<f64>, high: Option<f64>) -> Option<&'static str> {
    let value = value?;
    let low = low?;
    let high = high?;
    if value < low {
        Some("LOW")
    } else if value > high {
        Some("HIGH")
    } else {
        Some("NORMAL")
    }
}

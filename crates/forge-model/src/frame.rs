//! Small helpers for working with polars frames as string-typed tables.
//!
//! Raw EDC exports are read as string columns; these helpers centralize the
//! conversions so the rest of the pipeline never formats `AnyValue`s by hand.

use polars::prelude::{AnyValue, Column, DataFrame, DataType};

/// Render a cell as the string the pipeline treats as its value.
///
/// Nulls become the empty string. Quoted string renderings from polars are
/// unwrapped; everything else uses the display form.
pub fn any_to_string(value: &AnyValue) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(s) => (*s).to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        other => other.to_string(),
    }
}

/// Whether a cell value counts as missing for mapping purposes.
///
/// Blank strings and the placeholder tokens pandas-style exports write for
/// missing values are all treated as absent.
pub fn is_blank(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("nat")
}

/// Materialize a column as one string per row, nulls as empty strings.
///
/// Non-string columns are rendered through their display form so numeric
/// source columns still participate in string-based derivations.
pub fn string_values(df: &DataFrame, name: &str) -> Option<Vec<String>> {
    let column = df.column(name).ok()?;
    Some(column_strings(column))
}

fn column_strings(column: &Column) -> Vec<String> {
    if column.dtype() == &DataType::String {
        if let Ok(ca) = column.str() {
            return ca
                .into_iter()
                .map(|v| v.unwrap_or_default().to_string())
                .collect();
        }
    }
    let series = column.as_materialized_series();
    (0..series.len())
        .map(|idx| any_to_string(&series.get(idx).unwrap_or(AnyValue::Null)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::Column;

    #[test]
    fn blank_detection_covers_placeholders() {
        assert!(is_blank(""));
        assert!(is_blank("  "));
        assert!(is_blank("NaN"));
        assert!(is_blank("None"));
        assert!(is_blank("NULL"));
        assert!(is_blank("NaT"));
        assert!(!is_blank("0"));
        assert!(!is_blank("N/A extra"));
    }

    #[test]
    fn string_values_renders_nulls_as_empty() {
        let df = DataFrame::new(vec![Column::new(
            "AETERM".into(),
            vec![Some("HEADACHE"), None, Some("NAUSEA")],
        )])
        .expect("frame");
        let values = string_values(&df, "AETERM").expect("column");
        assert_eq!(values, vec!["HEADACHE", "", "NAUSEA"]);
        assert!(string_values(&df, "MISSING").is_none());
    }

    #[test]
    fn numeric_columns_render_through_display() {
        let df = DataFrame::new(vec![Column::new("VSORRES".into(), vec![120i64, 80])])
            .expect("frame");
        let values = string_values(&df, "VSORRES").expect("column");
        assert_eq!(values, vec!["120", "80"]);
    }
}

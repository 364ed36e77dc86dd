//! Wide-to-tall restructuring for findings domains.
//!
//! One raw row carrying several measurements becomes one output row per
//! measurement. Value columns missing from the source are skipped, and rows
//! whose result is blank are dropped.

use polars::prelude::{Column, DataFrame};
use tracing::debug;

use forge_model::{is_blank, string_values, CaseInsensitiveLookup, TransposeSpec};

use crate::error::Result;

pub fn apply(spec: &TransposeSpec, frame: &DataFrame) -> Result<DataFrame> {
    let lookup = CaseInsensitiveLookup::new(
        frame
            .get_column_names()
            .iter()
            .map(|s| s.as_str().to_string()),
    );
    let nrows = frame.height();

    let id_columns: Vec<(String, Vec<String>)> = spec
        .id_columns
        .iter()
        .filter_map(|name| {
            let actual = lookup.get(name)?;
            let values = string_values(frame, actual)?;
            Some((name.clone(), values))
        })
        .collect();

    let mut id_out: Vec<Vec<Option<String>>> = vec![Vec::new(); id_columns.len()];
    let mut testcd = Vec::new();
    let mut test = Vec::new();
    let mut result = Vec::new();
    let mut unit = Vec::new();

    for value_column in &spec.value_columns {
        let Some(actual) = lookup.get(value_column) else {
            debug!(column = %value_column, "value column absent, skipping");
            continue;
        };
        let Some(values) = string_values(frame, actual) else {
            continue;
        };
        let code = spec.testcd_map.get(value_column).cloned();
        let label = spec.test_map.get(value_column).cloned();
        let unit_value = spec.unit_map.get(value_column).cloned();

        for row in 0..nrows {
            let raw = values.get(row).map_or("", String::as_str).trim();
            if is_blank(raw) {
                continue;
            }
            for (out, (_, source)) in id_out.iter_mut().zip(&id_columns) {
                let v = source.get(row).map_or("", String::as_str).trim();
                out.push(if is_blank(v) { None } else { Some(v.to_string()) });
            }
            testcd.push(code.clone());
            test.push(label.clone());
            result.push(Some(raw.to_string()));
            unit.push(unit_value.clone());
        }
    }

    let mut columns: Vec<Column> = id_columns
        .iter()
        .zip(id_out)
        .map(|((name, _), values)| Column::new(name.as_str().into(), values))
        .collect();
    columns.push(Column::new(spec.testcd_var.as_str().into(), testcd));
    columns.push(Column::new(spec.test_var.as_str().into(), test));
    columns.push(Column::new(spec.result_var.as_str().into(), result));
    if let Some(unit_var) = &spec.unit_var {
        columns.push(Column::new(unit_var.as_str().into(), unit));
    }

    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn vitals_spec() -> TransposeSpec {
        TransposeSpec {
            id_columns: vec!["SUBJID".to_string(), "VISIT".to_string()],
            value_columns: vec![
                "SYSBP".to_string(),
                "DIABP".to_string(),
                "PULSE".to_string(),
            ],
            testcd_map: BTreeMap::from([
                ("SYSBP".to_string(), "SYSBP".to_string()),
                ("DIABP".to_string(), "DIABP".to_string()),
                ("PULSE".to_string(), "PULSE".to_string()),
            ]),
            test_map: BTreeMap::from([
                ("SYSBP".to_string(), "Systolic Blood Pressure".to_string()),
                ("DIABP".to_string(), "Diastolic Blood Pressure".to_string()),
                ("PULSE".to_string(), "Pulse Rate".to_string()),
            ]),
            unit_map: BTreeMap::from([
                ("SYSBP".to_string(), "mmHg".to_string()),
                ("DIABP".to_string(), "mmHg".to_string()),
            ]),
            testcd_var: "VSTESTCD".to_string(),
            test_var: "VSTEST".to_string(),
            result_var: "VSORRES".to_string(),
            unit_var: Some("VSORRESU".to_string()),
        }
    }

    fn vitals_frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new("SubjId".into(), vec!["1001", "1002"]),
            Column::new("Visit".into(), vec!["WEEK 1", "WEEK 1"]),
            Column::new("SysBp".into(), vec!["120", "135"]),
            Column::new("DiaBp".into(), vec!["80", ""]),
        ])
        .expect("frame")
    }

    #[test]
    fn unpivots_one_row_per_populated_measurement() {
        let out = apply(&vitals_spec(), &vitals_frame()).expect("transpose");
        // 2 systolic + 1 diastolic; the blank DIABP and the absent PULSE
        // column produce nothing.
        assert_eq!(out.height(), 3);
        let codes = string_values(&out, "VSTESTCD").expect("codes");
        assert_eq!(codes, vec!["SYSBP", "SYSBP", "DIABP"]);
        let units = string_values(&out, "VSORRESU").expect("units");
        assert_eq!(units, vec!["mmHg", "mmHg", "mmHg"]);
    }

    #[test]
    fn id_columns_carry_over_case_insensitively() {
        let out = apply(&vitals_spec(), &vitals_frame()).expect("transpose");
        let subjects = string_values(&out, "SUBJID").expect("ids");
        assert_eq!(subjects, vec!["1001", "1002", "1001"]);
    }

    #[test]
    fn empty_source_produces_empty_shape() {
        let frame = DataFrame::new(vec![
            Column::new("SubjId".into(), Vec::<String>::new()),
            Column::new("Visit".into(), Vec::<String>::new()),
            Column::new("SysBp".into(), Vec::<String>::new()),
        ])
        .expect("frame");
        let out = apply(&vitals_spec(), &frame).expect("transpose");
        assert_eq!(out.height(), 0);
        assert!(out.column("VSTESTCD").is_ok());
        assert!(out.column("VSORRES").is_ok());
    }
}

//! Transport-format size limits, checked early so the writer's own
//! validation never has to reject a dataset late in the run.

use forge_model::{Finding, RuleCategory, Severity};
use polars::prelude::DataType;

use crate::rule::{column_text, ConformanceRule, RuleContext};

const MAX_NAME_LEN: usize = 8;
const MAX_LABEL_LEN: usize = 40;
const MAX_VALUE_BYTES: usize = 200;

/// Split threshold downstream tooling applies to transport files.
const DATASET_SIZE_NOTICE_BYTES: usize = 1024 * 1024 * 1024;

/// LIM001: variable names and declared labels within transport limits.
pub struct NameAndLabelLength;

impl ConformanceRule for NameAndLabelLength {
    fn id(&self) -> &'static str {
        "LIM001"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Limit
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        let mut findings = Vec::new();
        for name in ctx.frame.get_column_names() {
            if name.len() > MAX_NAME_LEN {
                findings.push(
                    Finding::new(
                        self.id(),
                        self.category(),
                        Severity::Error,
                        ctx.domain,
                        format!("variable name {name} exceeds {MAX_NAME_LEN} characters"),
                    )
                    .with_variable(name.as_str()),
                );
            }
        }
        if let Some(spec) = ctx.spec {
            for mapping in &spec.variables {
                if mapping.label.len() > MAX_LABEL_LEN {
                    findings.push(
                        Finding::new(
                            self.id(),
                            self.category(),
                            Severity::Error,
                            ctx.domain,
                            format!(
                                "label of {} is {} characters, limit is {MAX_LABEL_LEN}",
                                mapping.target,
                                mapping.label.len()
                            ),
                        )
                        .with_variable(&mapping.target),
                    );
                }
            }
        }
        Ok(findings)
    }
}

/// LIM002: character values within the 200-byte transport cell limit.
pub struct ValueByteLength;

impl ConformanceRule for ValueByteLength {
    fn id(&self) -> &'static str {
        "LIM002"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Limit
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        let mut findings = Vec::new();
        for column in ctx.frame.get_columns() {
            if !matches!(column.dtype(), DataType::String) {
                continue;
            }
            let name = column.name().as_str();
            let Some(values) = column_text(ctx.frame, name) else {
                continue;
            };
            let rows: Vec<usize> = values
                .iter()
                .enumerate()
                .filter(|(_, v)| v.len() > MAX_VALUE_BYTES)
                .map(|(i, _)| i)
                .collect();
            if rows.is_empty() {
                continue;
            }
            findings.push(
                Finding::new(
                    self.id(),
                    self.category(),
                    Severity::Error,
                    ctx.domain,
                    format!(
                        "{} value(s) in {name} exceed {MAX_VALUE_BYTES} bytes",
                        rows.len()
                    ),
                )
                .with_variable(name)
                .with_rows(rows),
            );
        }
        Ok(findings)
    }
}

/// LIM003: datasets large enough to need splitting get a notice.
pub struct DatasetSize;

impl ConformanceRule for DatasetSize {
    fn id(&self) -> &'static str {
        "LIM003"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Limit
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        // Rough transport estimate: 8 bytes per numeric cell, declared or
        // maximal width per text cell.
        let mut row_bytes = 0usize;
        for column in ctx.frame.get_columns() {
            row_bytes += if matches!(column.dtype(), DataType::String) {
                column_text(ctx.frame, column.name().as_str())
                    .map(|values| values.iter().map(String::len).max().unwrap_or(1))
                    .unwrap_or(1)
                    .min(MAX_VALUE_BYTES)
            } else {
                8
            };
        }
        let estimate = row_bytes.saturating_mul(ctx.frame.height());
        if estimate <= DATASET_SIZE_NOTICE_BYTES {
            return Ok(Vec::new());
        }
        Ok(vec![Finding::new(
            self.id(),
            self.category(),
            Severity::Notice,
            ctx.domain,
            format!(
                "estimated transport size {} MB exceeds the {} MB split threshold",
                estimate / (1024 * 1024),
                DATASET_SIZE_NOTICE_BYTES / (1024 * 1024)
            ),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::{Column, DataFrame};
    use std::collections::BTreeMap;

    use forge_standards::ReferenceData;

    #[test]
    fn long_names_and_values_are_errors() {
        let refs = ReferenceData::builtin().expect("refs");
        let tables = BTreeMap::new();
        let frame = DataFrame::new(vec![
            Column::new("TOOLONGNAME".into(), vec!["ok"]),
            Column::new("AETERM".into(), vec!["x".repeat(201)]),
        ])
        .expect("frame");
        let ctx = RuleContext {
            domain: "AE",
            frame: &frame,
            spec: None,
            refs: &refs,
            tables: &tables,
        };

        let names = NameAndLabelLength.evaluate(&ctx).expect("evaluate");
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].variable.as_deref(), Some("TOOLONGNAME"));

        let values = ValueByteLength.evaluate(&ctx).expect("evaluate");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].variable.as_deref(), Some("AETERM"));
    }
}

//! Presence checks: variables that must exist and values that must be
//! populated.

use forge_model::{is_blank, Finding, FixAction, FixKind, PatternKind, RuleCategory, Severity};

use crate::rule::{column_text, has_column, ConformanceRule, RuleContext};

/// PRES001: every Required variable of the domain must exist as a column.
pub struct RequiredVariablePresence;

impl ConformanceRule for RequiredVariablePresence {
    fn id(&self) -> &'static str {
        "PRES001"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Presence
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        let Some(domain_spec) = ctx.refs.domain(ctx.domain) else {
            return Ok(Vec::new());
        };
        Ok(domain_spec
            .required_variables()
            .filter(|def| !has_column(ctx.frame, &def.name))
            .map(|def| {
                Finding::new(
                    self.id(),
                    self.category(),
                    Severity::Error,
                    ctx.domain,
                    format!("required variable {} is missing", def.name),
                )
                .with_variable(&def.name)
            })
            .collect())
    }
}

/// PRES002: Expected variables should exist; absence is a warning.
pub struct ExpectedVariablePresence;

impl ConformanceRule for ExpectedVariablePresence {
    fn id(&self) -> &'static str {
        "PRES002"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Presence
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        let Some(domain_spec) = ctx.refs.domain(ctx.domain) else {
            return Ok(Vec::new());
        };
        Ok(domain_spec
            .expected_variables()
            .filter(|def| !has_column(ctx.frame, &def.name))
            .map(|def| {
                Finding::new(
                    self.id(),
                    self.category(),
                    Severity::Warning,
                    ctx.domain,
                    format!("expected variable {} is missing", def.name),
                )
                .with_variable(&def.name)
            })
            .collect())
    }
}

/// PRES003: an empty dataset is worth a warning on its own; whether it
/// blocks the submission is a submission-level question.
pub struct NonEmptyDataset;

impl ConformanceRule for NonEmptyDataset {
    fn id(&self) -> &'static str {
        "PRES003"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Presence
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        if ctx.frame.height() > 0 {
            return Ok(Vec::new());
        }
        Ok(vec![Finding::new(
            self.id(),
            self.category(),
            Severity::Warning,
            ctx.domain,
            "dataset contains no records",
        )])
    }
}

/// PRES004: a missing constant column (DOMAIN, or STUDYID when the mapping
/// spec assigns one) can be added mechanically.
pub struct MissingConstantColumn;

impl ConformanceRule for MissingConstantColumn {
    fn id(&self) -> &'static str {
        "PRES004"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Presence
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        // SUPP-- and RELREC carry RDOMAIN instead of DOMAIN.
        let upper = ctx.domain.to_uppercase();
        let carries_domain = !upper.starts_with("SUPP") && upper != "RELREC";

        let mut findings = Vec::new();
        if carries_domain && !has_column(ctx.frame, "DOMAIN") {
            findings.push(self.fix_finding(ctx, "DOMAIN", upper.clone()));
        }
        if !has_column(ctx.frame, "STUDYID") {
            let assigned = ctx.spec.and_then(|spec| {
                spec.variable("STUDYID").and_then(|m| {
                    (m.pattern == PatternKind::Assign).then(|| m.value.clone()).flatten()
                })
            });
            if let Some(value) = assigned {
                findings.push(self.fix_finding(ctx, "STUDYID", value));
            }
        }
        Ok(findings)
    }
}

impl MissingConstantColumn {
    fn fix_finding(&self, ctx: &RuleContext<'_>, column: &str, value: String) -> Finding {
        Finding::new(
            self.id(),
            self.category(),
            Severity::Warning,
            ctx.domain,
            format!("constant column {column} is missing and can be filled with {value:?}"),
        )
        .with_variable(column)
        .with_fix(FixAction {
            kind: FixKind::AddColumn,
            column: column.to_string(),
            new_value: value,
            rows: Vec::new(),
        })
    }
}

/// PRES005: Required variables must be populated on every row.
pub struct RequiredValueCompleteness;

impl ConformanceRule for RequiredValueCompleteness {
    fn id(&self) -> &'static str {
        "PRES005"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Presence
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        let Some(domain_spec) = ctx.refs.domain(ctx.domain) else {
            return Ok(Vec::new());
        };
        let mut findings = Vec::new();
        for def in domain_spec.required_variables() {
            let Some(values) = column_text(ctx.frame, &def.name) else {
                continue; // absence is PRES001's finding
            };
            let rows: Vec<usize> = values
                .iter()
                .enumerate()
                .filter(|(_, v)| is_blank(v))
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
                    format!("required variable {} is blank on {} row(s)", def.name, rows.len()),
                )
                .with_variable(&def.name)
                .with_rows(rows),
            );
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::{Column, DataFrame};
    use std::collections::BTreeMap;

    use forge_standards::ReferenceData;

    #[test]
    fn missing_required_variable_is_reported() {
        let refs = ReferenceData::builtin().expect("refs");
        let tables = BTreeMap::new();
        let frame = DataFrame::new(vec![Column::new(
            "USUBJID".into(),
            vec!["S-01-1001"],
        )])
        .expect("frame");
        let ctx = RuleContext {
            domain: "AE",
            frame: &frame,
            spec: None,
            refs: &refs,
            tables: &tables,
        };

        let findings = RequiredVariablePresence.evaluate(&ctx).expect("evaluate");
        assert!(findings.iter().any(|f| f.variable.as_deref() == Some("AETERM")));
        assert!(findings.iter().all(|f| f.severity == Severity::Error));
    }

    #[test]
    fn missing_domain_column_is_mechanically_fixable() {
        let refs = ReferenceData::builtin().expect("refs");
        let tables = BTreeMap::new();
        let frame = DataFrame::new(vec![Column::new(
            "USUBJID".into(),
            vec!["S-01-1001"],
        )])
        .expect("frame");
        let ctx = RuleContext {
            domain: "AE",
            frame: &frame,
            spec: None,
            refs: &refs,
            tables: &tables,
        };

        let findings = MissingConstantColumn.evaluate(&ctx).expect("evaluate");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].is_auto_fixable());
        let fix = findings[0].fix.as_ref().expect("fix");
        assert_eq!(fix.kind, FixKind::AddColumn);
        assert_eq!(fix.new_value, "AE");
    }

    #[test]
    fn blank_required_values_are_counted() {
        let refs = ReferenceData::builtin().expect("refs");
        let tables = BTreeMap::new();
        let frame = DataFrame::new(vec![
            Column::new("AETERM".into(), vec!["HEADACHE", "", "NAUSEA"]),
        ])
        .expect("frame");
        let ctx = RuleContext {
            domain: "AE",
            frame: &frame,
            spec: None,
            refs: &refs,
            tables: &tables,
        };

        let findings = RequiredValueCompleteness.evaluate(&ctx).expect("evaluate");
        let aeterm = findings
            .iter()
            .find(|f| f.variable.as_deref() == Some("AETERM"))
            .expect("AETERM finding");
        assert_eq!(aeterm.rows, vec![1]);
    }
}

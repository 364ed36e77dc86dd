//! Controlled-terminology conformance.

use std::collections::BTreeMap;

use forge_model::{Finding, FixAction, FixKind, RuleCategory, Severity};

use crate::rule::{column_text, populated_rows, ConformanceRule, RuleContext};

/// TERM001: values of codelist-governed variables must be submission values
/// of their codelist. Non-extensible codelists raise errors, extensible
/// ones warnings. Values resolvable through a synonym or case difference
/// carry the corrected value in the message.
pub struct CodelistConformance;

impl ConformanceRule for CodelistConformance {
    fn id(&self) -> &'static str {
        "TERM001"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Terminology
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        let Some(domain_spec) = ctx.refs.domain(ctx.domain) else {
            return Ok(Vec::new());
        };
        let mut findings = Vec::new();

        for def in &domain_spec.variables {
            let Some(codelist) = ctx.refs.codelist_for(ctx.domain, &def.name) else {
                continue;
            };
            let Some(values) = column_text(ctx.frame, &def.name) else {
                continue;
            };

            // Distinct offending values, each with its rows.
            let mut offending: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
            for (row, value) in populated_rows(&values) {
                if !codelist.contains(value) {
                    offending.entry(value).or_default().push(row);
                }
            }

            for (value, rows) in offending {
                let severity = if codelist.extensible {
                    Severity::Warning
                } else {
                    Severity::Error
                };
                let message = match codelist.resolve(value) {
                    Some(term) => format!(
                        "{} value {value:?} is not the submission value of codelist {} (expected {term:?})",
                        def.name, codelist.code
                    ),
                    None => format!(
                        "{} value {value:?} is not in codelist {} ({})",
                        def.name, codelist.code, codelist.name
                    ),
                };
                findings.push(
                    Finding::new(self.id(), self.category(), severity, ctx.domain, message)
                        .with_variable(&def.name)
                        .with_value(value)
                        .with_rows(rows),
                );
            }
        }
        Ok(findings)
    }
}

/// TERM002: the DOMAIN column must hold the dataset's own domain code on
/// every row. Mechanically fixable.
pub struct DomainValueConformance;

impl ConformanceRule for DomainValueConformance {
    fn id(&self) -> &'static str {
        "TERM002"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Terminology
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        let Some(values) = column_text(ctx.frame, "DOMAIN") else {
            return Ok(Vec::new());
        };
        let expected = ctx.domain.to_uppercase();
        let rows: Vec<usize> = values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.eq_ignore_ascii_case(&expected))
            .map(|(i, _)| i)
            .collect();
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Finding::new(
            self.id(),
            self.category(),
            Severity::Error,
            ctx.domain,
            format!("DOMAIN must be {expected} on every row ({} mismatched)", rows.len()),
        )
        .with_variable("DOMAIN")
        .with_fix(FixAction {
            kind: FixKind::ReplaceValue,
            column: "DOMAIN".to_string(),
            new_value: expected,
            rows: rows.clone(),
        })
        .with_rows(rows)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::{Column, DataFrame};
    use std::collections::BTreeMap;

    use forge_standards::ReferenceData;

    fn ctx<'a>(
        domain: &'a str,
        frame: &'a DataFrame,
        refs: &'a ReferenceData,
        tables: &'a BTreeMap<String, DataFrame>,
    ) -> RuleContext<'a> {
        RuleContext {
            domain,
            frame,
            spec: None,
            refs,
            tables,
        }
    }

    #[test]
    fn non_extensible_codelist_violation_is_an_error() {
        let refs = ReferenceData::builtin().expect("refs");
        let tables = BTreeMap::new();
        let frame = DataFrame::new(vec![Column::new(
            "SEX".into(),
            vec!["M", "Male", "F", "X"],
        )])
        .expect("frame");

        let findings = CodelistConformance
            .evaluate(&ctx("DM", &frame, &refs, &tables))
            .expect("evaluate");
        // "Male" resolves through a synonym, "X" does not; both are flagged.
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.severity == Severity::Error));
        let resolvable = findings
            .iter()
            .find(|f| f.value.as_deref() == Some("Male"))
            .expect("Male finding");
        assert!(resolvable.message.contains("expected \"M\""));
    }

    #[test]
    fn domain_value_mismatch_carries_an_automatic_fix() {
        let refs = ReferenceData::builtin().expect("refs");
        let tables = BTreeMap::new();
        let frame = DataFrame::new(vec![Column::new(
            "DOMAIN".into(),
            vec!["AE", "ae", "VS"],
        )])
        .expect("frame");

        let findings = DomainValueConformance
            .evaluate(&ctx("AE", &frame, &refs, &tables))
            .expect("evaluate");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rows, vec![2]);
        assert!(findings[0].is_auto_fixable());
    }
}

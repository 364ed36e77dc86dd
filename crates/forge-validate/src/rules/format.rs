//! Format conformance: date shapes, character sets, names, ordering.

use forge_engine::dates::is_valid_iso8601;
use forge_model::{Finding, RuleCategory, Severity};
use polars::prelude::DataType;

use crate::rule::{column_text, populated_rows, ConformanceRule, RuleContext};

/// FMT001: every populated --DTC value must be ISO 8601 at some supported
/// precision.
pub struct DateFormatConformance;

impl ConformanceRule for DateFormatConformance {
    fn id(&self) -> &'static str {
        "FMT001"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Format
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        let mut findings = Vec::new();
        let date_columns: Vec<String> = ctx
            .frame
            .get_column_names()
            .iter()
            .filter(|name| name.as_str().to_uppercase().ends_with("DTC"))
            .map(|name| name.as_str().to_string())
            .collect();

        for name in date_columns {
            let Some(values) = column_text(ctx.frame, &name) else {
                continue;
            };
            let mut rows = Vec::new();
            let mut sample = None;
            for (row, value) in populated_rows(&values) {
                if !is_valid_iso8601(value) {
                    rows.push(row);
                    sample.get_or_insert_with(|| value.to_string());
                }
            }
            if rows.is_empty() {
                continue;
            }
            let mut finding = Finding::new(
                self.id(),
                self.category(),
                Severity::Error,
                ctx.domain,
                format!("{} value(s) in {name} are not ISO 8601", rows.len()),
            )
            .with_variable(&name)
            .with_rows(rows);
            if let Some(sample) = sample {
                finding = finding.with_value(sample);
            }
            findings.push(finding);
        }
        Ok(findings)
    }
}

/// FMT002: character data must be pure ASCII.
pub struct AsciiOnly;

impl ConformanceRule for AsciiOnly {
    fn id(&self) -> &'static str {
        "FMT002"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Format
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
                .filter(|(_, v)| !v.is_ascii())
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
                    format!("{} value(s) in {name} contain non-ASCII characters", rows.len()),
                )
                .with_variable(name)
                .with_rows(rows),
            );
        }
        Ok(findings)
    }
}

/// FMT003: the domain code must be usable as a transport file name.
pub struct FileNameEligibleDomain;

impl ConformanceRule for FileNameEligibleDomain {
    fn id(&self) -> &'static str {
        "FMT003"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Format
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        let code = ctx.domain;
        let valid = !code.is_empty()
            && code.len() <= 8
            && code.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && code.chars().all(|c| c.is_ascii_alphanumeric());
        if valid {
            return Ok(Vec::new());
        }
        Ok(vec![Finding::new(
            self.id(),
            self.category(),
            Severity::Error,
            ctx.domain,
            format!("domain code {code:?} cannot form a valid transport file name"),
        )])
    }
}

/// FMT004: standard variables must appear in the canonical reference order.
pub struct VariableOrdering;

impl ConformanceRule for VariableOrdering {
    fn id(&self) -> &'static str {
        "FMT004"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Format
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        let Some(domain_spec) = ctx.refs.domain(ctx.domain) else {
            return Ok(Vec::new());
        };
        let reference_order = |name: &str| -> Option<u32> {
            domain_spec.variable(name).map(|def| def.order)
        };

        let mut last: Option<(String, u32)> = None;
        for name in ctx.frame.get_column_names() {
            let Some(order) = reference_order(name.as_str()) else {
                continue; // non-standard variables are SUPP territory, not ordering
            };
            if let Some((prev_name, prev_order)) = &last {
                if order < *prev_order {
                    return Ok(vec![Finding::new(
                        self.id(),
                        self.category(),
                        Severity::Warning,
                        ctx.domain,
                        format!(
                            "variable {} appears after {} but precedes it in the reference order",
                            name, prev_name
                        ),
                    )
                    .with_variable(name.as_str())]);
                }
            }
            last = Some((name.as_str().to_string(), order));
        }
        Ok(Vec::new())
    }
}

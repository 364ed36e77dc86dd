//! The auto-fix loop: validate, apply mechanical fixes, re-validate until
//! no mechanically fixable findings remain.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use polars::prelude::{Column, DataFrame};
use serde::Serialize;
use tracing::{debug, info};

use forge_model::{Finding, FixAction, FixKind, MappingSpec};
use forge_standards::ReferenceData;

use crate::error::Result;
use crate::report::ValidationReport;
use crate::validator::Validator;

/// Rules whose fixes the loop may apply without a reviewer. Everything else
/// is NEEDS_HUMAN regardless of any attached fix; subject-identifier
/// defects in particular must never be patched mechanically.
pub const AUTO_FIX_RULES: &[&str] = &["PRES004", "TERM002"];

/// Audit record of one applied fix.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedFix {
    pub rule_id: String,
    pub domain: String,
    pub variable: Option<String>,
    pub kind: FixKind,
    pub column: String,
    pub new_value: String,
    pub rows_affected: usize,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct FixLoopResult {
    pub iterations_run: u32,
    /// True when the loop stopped because nothing fixable remained, false
    /// when it hit the iteration bound.
    pub converged: bool,
    pub total_fixed: usize,
    pub remaining_issues: usize,
    pub needs_human_issues: usize,
    pub fix_actions: Vec<AppliedFix>,
    pub final_report: ValidationReport,
}

fn is_loop_fixable(finding: &Finding) -> bool {
    finding.is_auto_fixable() && AUTO_FIX_RULES.contains(&finding.rule_id.as_str())
}

/// Run the loop over every dataset of the submission, mutating tables in
/// place. Convergence means no AUTO_FIXABLE findings remain; NEEDS_HUMAN
/// findings persist by design.
pub fn run(
    validator: &Validator,
    specs: &BTreeMap<String, MappingSpec>,
    tables: &mut BTreeMap<String, DataFrame>,
    refs: &ReferenceData,
    max_iterations: u32,
) -> Result<FixLoopResult> {
    let mut fix_actions = Vec::new();
    let mut iterations_run = 0;
    let mut converged = false;

    while iterations_run < max_iterations {
        iterations_run += 1;
        let findings = validate_all(validator, specs, tables, refs);
        let fixable: Vec<Finding> = findings.into_iter().filter(is_loop_fixable).collect();
        if fixable.is_empty() {
            converged = true;
            break;
        }
        debug!(
            iteration = iterations_run,
            fixable = fixable.len(),
            "applying mechanical fixes"
        );
        for finding in fixable {
            let Some(fix) = &finding.fix else { continue };
            let Some(frame) = lookup_mut(tables, &finding.domain) else {
                continue;
            };
            let rows_affected = apply_fix(frame, fix)?;
            fix_actions.push(AppliedFix {
                rule_id: finding.rule_id.clone(),
                domain: finding.domain.clone(),
                variable: finding.variable.clone(),
                kind: fix.kind,
                column: fix.column.clone(),
                new_value: fix.new_value.clone(),
                rows_affected,
                applied_at: Utc::now(),
            });
        }
    }

    // One final pass reflecting the fixed state. When the loop converged
    // the last in-loop pass already showed zero fixable findings, so this
    // pass cannot reintroduce any.
    let final_findings = validate_all(validator, specs, tables, refs);
    if !converged && !final_findings.iter().any(|f| is_loop_fixable(f)) {
        converged = true;
    }
    let needs_human_issues = final_findings
        .iter()
        .filter(|f| !f.waived && !is_loop_fixable(f))
        .count();
    let remaining_issues = final_findings.iter().filter(|f| !f.waived).count();
    let total_fixed = fix_actions.len();

    info!(
        iterations = iterations_run,
        converged,
        fixed = total_fixed,
        remaining = remaining_issues,
        "auto-fix loop finished"
    );

    Ok(FixLoopResult {
        iterations_run,
        converged,
        total_fixed,
        remaining_issues,
        needs_human_issues,
        fix_actions,
        final_report: ValidationReport::from_findings(final_findings),
    })
}

fn validate_all(
    validator: &Validator,
    specs: &BTreeMap<String, MappingSpec>,
    tables: &BTreeMap<String, DataFrame>,
    refs: &ReferenceData,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (domain, frame) in tables {
        let spec = specs
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(domain))
            .map(|(_, s)| s);
        findings.extend(validator.validate_table(domain, frame, spec, refs, tables));
    }
    findings
}

fn lookup_mut<'a>(
    tables: &'a mut BTreeMap<String, DataFrame>,
    domain: &str,
) -> Option<&'a mut DataFrame> {
    let key = tables
        .keys()
        .find(|k| k.eq_ignore_ascii_case(domain))?
        .clone();
    tables.get_mut(&key)
}

/// Apply one fix to a dataset, returning the number of rows touched.
fn apply_fix(frame: &mut DataFrame, fix: &FixAction) -> Result<usize> {
    match fix.kind {
        FixKind::AddColumn => {
            let height = frame.height();
            let values = vec![fix.new_value.clone(); height];
            frame.with_column(Column::new(fix.column.as_str().into(), values))?;
            Ok(height)
        }
        FixKind::ReplaceValue => {
            let actual = frame
                .get_column_names()
                .iter()
                .find(|c| c.as_str().eq_ignore_ascii_case(&fix.column))
                .map(|c| c.as_str().to_string());
            let Some(actual) = actual else { return Ok(0) };
            let Some(mut values) = forge_model::string_values(frame, &actual) else {
                return Ok(0);
            };
            let rows: Vec<usize> = if fix.rows.is_empty() {
                (0..values.len()).collect()
            } else {
                fix.rows.clone()
            };
            let mut touched = 0;
            for &row in &rows {
                if let Some(cell) = values.get_mut(row) {
                    *cell = fix.new_value.clone();
                    touched += 1;
                }
            }
            frame.with_column(Column::new(actual.as_str().into(), values))?;
            Ok(touched)
        }
        FixKind::NeedsHuman => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::Column;

    fn fixture() -> (BTreeMap<String, MappingSpec>, BTreeMap<String, DataFrame>) {
        // AE dataset missing its DOMAIN column and with one mismatched
        // DOMAIN row in VS.
        let ae = DataFrame::new(vec![
            Column::new("STUDYID".into(), vec!["S"]),
            Column::new("USUBJID".into(), vec!["S-01-1001"]),
            Column::new("AESEQ".into(), vec![Some(1.0f64)]),
            Column::new("AETERM".into(), vec!["HEADACHE"]),
        ])
        .expect("ae");
        let vs = DataFrame::new(vec![
            Column::new("STUDYID".into(), vec!["S", "S"]),
            Column::new("DOMAIN".into(), vec!["VS", "AE"]),
            Column::new("USUBJID".into(), vec!["S-01-1001", "S-01-1001"]),
        ])
        .expect("vs");
        let tables = BTreeMap::from([("AE".to_string(), ae), ("VS".to_string(), vs)]);
        (BTreeMap::new(), tables)
    }

    #[test]
    fn loop_fixes_domain_defects_and_converges() {
        let validator = Validator::new();
        let refs = ReferenceData::builtin().expect("refs");
        let (specs, mut tables) = fixture();

        let result = run(&validator, &specs, &mut tables, &refs, 5).expect("loop");
        assert!(result.converged);
        assert!(result.total_fixed >= 2, "fixed {}", result.total_fixed);
        assert!(result
            .fix_actions
            .iter()
            .any(|f| f.rule_id == "PRES004" && f.column == "DOMAIN"));
        assert!(result
            .fix_actions
            .iter()
            .any(|f| f.rule_id == "TERM002" && f.domain == "VS"));

        // The fixes landed in the data.
        let domains = forge_model::string_values(&tables["VS"], "DOMAIN").expect("DOMAIN");
        assert!(domains.iter().all(|d| d == "VS"));
        assert!(tables["AE"].column("DOMAIN").is_ok());
    }

    #[test]
    fn loop_is_idempotent_on_its_own_output() {
        let validator = Validator::new();
        let refs = ReferenceData::builtin().expect("refs");
        let (specs, mut tables) = fixture();

        run(&validator, &specs, &mut tables, &refs, 5).expect("first run");
        let second = run(&validator, &specs, &mut tables, &refs, 5).expect("second run");
        assert!(second.converged);
        assert_eq!(second.total_fixed, 0);
        assert_eq!(second.iterations_run, 1);
    }

    #[test]
    fn needs_human_findings_persist() {
        let validator = Validator::new();
        let refs = ReferenceData::builtin().expect("refs");
        let ae = DataFrame::new(vec![
            Column::new("USUBJID".into(), vec!["badid"]),
        ])
        .expect("ae");
        let mut tables = BTreeMap::from([("AE".to_string(), ae)]);

        let result = run(&validator, &BTreeMap::new(), &mut tables, &refs, 3).expect("loop");
        assert!(result.converged);
        assert!(result.needs_human_issues > 0);
        assert!(result
            .final_report
            .findings
            .iter()
            .any(|f| f.rule_id == "CONS002"));
    }
}

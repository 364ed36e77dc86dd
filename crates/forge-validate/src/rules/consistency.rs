//! Cross-column and cross-table consistency checks.

use std::collections::HashSet;

use forge_model::{is_blank, Finding, FixAction, FixKind, RuleCategory, Severity};

use crate::rule::{column_text, populated_rows, ConformanceRule, RuleContext};

/// CONS001: a supplemental dataset must reference its parent correctly.
/// Runs only for SUPP-- datasets.
pub struct SupplementalIntegrity;

impl ConformanceRule for SupplementalIntegrity {
    fn id(&self) -> &'static str {
        "CONS001"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Consistency
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        let upper = ctx.domain.to_uppercase();
        let Some(parent_code) = upper.strip_prefix("SUPP") else {
            return Ok(Vec::new());
        };
        let Some(parent) = ctx
            .tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(parent_code))
            .map(|(_, frame)| frame)
        else {
            return Ok(vec![Finding::new(
                self.id(),
                self.category(),
                Severity::Error,
                ctx.domain,
                format!("parent dataset {parent_code} is not part of the submission"),
            )]);
        };

        Ok(forge_engine::supp::check_integrity(ctx.frame, parent, parent_code)
            .into_iter()
            .map(|message| {
                Finding::new(self.id(), self.category(), Severity::Error, ctx.domain, message)
            })
            .collect())
    }
}

/// CONS002: subject identifiers must be present and structurally sound.
/// A defective identifier is never fixed mechanically.
pub struct SubjectIdentifierIntegrity;

impl ConformanceRule for SubjectIdentifierIntegrity {
    fn id(&self) -> &'static str {
        "CONS002"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Consistency
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        let Some(values) = column_text(ctx.frame, "USUBJID") else {
            return Ok(Vec::new());
        };
        let defective: Vec<usize> = values
            .iter()
            .enumerate()
            .filter(|(_, v)| is_blank(v) || v.split('-').count() < 3)
            .map(|(i, _)| i)
            .collect();
        if defective.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Finding::new(
            self.id(),
            self.category(),
            Severity::Error,
            ctx.domain,
            format!(
                "{} subject identifier(s) are blank or not of the form STUDY-SITE-SUBJECT",
                defective.len()
            ),
        )
        .with_variable("USUBJID")
        .with_fix(FixAction {
            kind: FixKind::NeedsHuman,
            column: "USUBJID".to_string(),
            new_value: String::new(),
            rows: defective.clone(),
        })
        .with_rows(defective)])
    }
}

/// CONS003: every subject appearing in a general-observation dataset must
/// exist in demographics.
pub struct CrossDomainSubjects;

impl ConformanceRule for CrossDomainSubjects {
    fn id(&self) -> &'static str {
        "CONS003"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Consistency
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        let upper = ctx.domain.to_uppercase();
        if upper == "DM" || upper == "TS" || upper == "RELREC" {
            return Ok(Vec::new());
        }
        let Some(dm) = ctx
            .tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("DM"))
            .map(|(_, frame)| frame)
        else {
            return Ok(Vec::new()); // absence of DM is a submission-level finding
        };
        let known: HashSet<String> = column_text(dm, "USUBJID")
            .unwrap_or_default()
            .into_iter()
            .collect();
        let Some(values) = column_text(ctx.frame, "USUBJID") else {
            return Ok(Vec::new());
        };

        let mut unknown: Vec<(usize, String)> = Vec::new();
        for (row, value) in populated_rows(&values) {
            if !known.contains(value) {
                unknown.push((row, value.to_string()));
            }
        }
        if unknown.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<usize> = unknown.iter().map(|(r, _)| *r).collect();
        Ok(vec![Finding::new(
            self.id(),
            self.category(),
            Severity::Error,
            ctx.domain,
            format!("{} record(s) reference subjects missing from DM", rows.len()),
        )
        .with_variable("USUBJID")
        .with_rows(rows)])
    }
}

/// CONS004: demographics should carry a meaningful planned-arm description.
/// ARM identical to ARMCD on every row usually means the description was
/// never mapped.
pub struct ArmConsistency;

impl ConformanceRule for ArmConsistency {
    fn id(&self) -> &'static str {
        "CONS004"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Consistency
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
        if !ctx.domain.eq_ignore_ascii_case("DM") || ctx.frame.height() == 0 {
            return Ok(Vec::new());
        }
        let arm = column_text(ctx.frame, "ARM");
        let armcd = column_text(ctx.frame, "ARMCD");
        let mut findings = Vec::new();

        match (&arm, &armcd) {
            (Some(arm), Some(armcd)) => {
                let populated: Vec<(&str, &str)> = arm
                    .iter()
                    .zip(armcd)
                    .filter(|(a, c)| !is_blank(a) && !is_blank(c))
                    .map(|(a, c)| (a.as_str(), c.as_str()))
                    .collect();
                if !populated.is_empty() && populated.iter().all(|(a, c)| a == c) {
                    findings.push(Finding::new(
                        self.id(),
                        self.category(),
                        Severity::Warning,
                        ctx.domain,
                        "ARM is identical to ARMCD on every row; the arm description looks unmapped",
                    ));
                }
            }
            (None, _) | (_, None) => {
                findings.push(Finding::new(
                    self.id(),
                    self.category(),
                    Severity::Warning,
                    ctx.domain,
                    "ARM or ARMCD is missing from demographics",
                ));
            }
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

    fn refs() -> ReferenceData {
        ReferenceData::builtin().expect("refs")
    }

    #[test]
    fn defective_subject_identifiers_need_a_human() {
        let refs = refs();
        let tables = BTreeMap::new();
        let frame = DataFrame::new(vec![Column::new(
            "USUBJID".into(),
            vec!["S-01-1001", "", "1001"],
        )])
        .expect("frame");
        let ctx = RuleContext {
            domain: "AE",
            frame: &frame,
            spec: None,
            refs: &refs,
            tables: &tables,
        };

        let findings = SubjectIdentifierIntegrity.evaluate(&ctx).expect("evaluate");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rows, vec![1, 2]);
        assert!(!findings[0].is_auto_fixable());
    }

    #[test]
    fn subjects_missing_from_dm_are_flagged() {
        let refs = refs();
        let dm = DataFrame::new(vec![Column::new(
            "USUBJID".into(),
            vec!["S-01-1001"],
        )])
        .expect("dm");
        let ae = DataFrame::new(vec![Column::new(
            "USUBJID".into(),
            vec!["S-01-1001", "S-01-9999"],
        )])
        .expect("ae");
        let tables = BTreeMap::from([("DM".to_string(), dm), ("AE".to_string(), ae)]);
        let ctx = RuleContext {
            domain: "AE",
            frame: &tables["AE"],
            spec: None,
            refs: &refs,
            tables: &tables,
        };

        let findings = CrossDomainSubjects.evaluate(&ctx).expect("evaluate");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rows, vec![1]);
    }

    #[test]
    fn arm_copying_armcd_is_suspicious() {
        let refs = refs();
        let tables = BTreeMap::new();
        let frame = DataFrame::new(vec![
            Column::new("ARM".into(), vec!["A1", "A2"]),
            Column::new("ARMCD".into(), vec!["A1", "A2"]),
        ])
        .expect("frame");
        let ctx = RuleContext {
            domain: "DM",
            frame: &frame,
            spec: None,
            refs: &refs,
            tables: &tables,
        };

        let findings = ArmConsistency.evaluate(&ctx).expect("evaluate");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("identical"));
    }
}

//! Whole-submission technical-rejection checks.
//!
//! These run once over the full dataset collection rather than per table;
//! each mirrors a condition a regulatory gateway rejects on before any
//! content review happens.

use std::collections::{BTreeMap, HashSet};

use polars::prelude::DataFrame;

use forge_model::{Finding, RuleCategory, Severity};

use crate::rule::{column_text, populated_rows};

/// What the packaging stage hands over for submission-level checks.
pub struct SubmissionInput<'a> {
    pub tables: &'a BTreeMap<String, DataFrame>,
    /// File names as they will land in the transport directory.
    pub file_names: &'a [String],
    /// Whether a define document accompanies the datasets.
    pub define_present: bool,
}

pub fn submission_checks(input: &SubmissionInput<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    let table = |code: &str| -> Option<&DataFrame> {
        input
            .tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(code))
            .map(|(_, frame)| frame)
    };

    // REJ001: demographics present and populated.
    match table("DM") {
        Some(dm) if dm.height() > 0 => {}
        Some(_) => findings.push(rejection("REJ001", "DM", "demographics dataset is empty")),
        None => findings.push(rejection("REJ001", "DM", "demographics dataset is missing")),
    }

    // REJ002: trial summary carries the study start date parameter.
    match table("TS") {
        Some(ts) => {
            let has_start = column_text(ts, "TSPARMCD")
                .is_some_and(|codes| codes.iter().any(|c| c.eq_ignore_ascii_case("SSTDTC")));
            if !has_start {
                findings.push(rejection(
                    "REJ002",
                    "TS",
                    "trial summary lacks the study start date parameter (SSTDTC)",
                ));
            }
        }
        None => findings.push(rejection("REJ002", "TS", "trial summary dataset is missing")),
    }

    // REJ003: a define document must accompany the datasets.
    if !input.define_present {
        findings.push(rejection(
            "REJ003",
            "SUBMISSION",
            "no define document found next to the datasets",
        ));
    }

    // REJ004: every subject anywhere must exist in demographics.
    if let Some(dm) = table("DM") {
        let known: HashSet<String> = column_text(dm, "USUBJID")
            .unwrap_or_default()
            .into_iter()
            .collect();
        for (name, frame) in input.tables {
            let upper = name.to_uppercase();
            if upper == "DM" || upper == "TS" || upper == "RELREC" {
                continue;
            }
            let Some(values) = column_text(frame, "USUBJID") else {
                continue;
            };
            let unknown = populated_rows(&values)
                .filter(|(_, v)| !known.contains(*v))
                .count();
            if unknown > 0 {
                findings.push(rejection(
                    "REJ004",
                    name,
                    format!("{unknown} record(s) reference subjects absent from DM"),
                ));
            }
        }
    }

    // REJ005: transport file names must be lowercase.
    for file in input.file_names {
        let base = file.rsplit('/').next().unwrap_or(file);
        if base.chars().any(|c| c.is_ascii_uppercase()) {
            findings.push(rejection(
                "REJ005",
                "SUBMISSION",
                format!("file name {base:?} must be lowercase"),
            ));
        }
    }

    findings
}

fn rejection(rule_id: &str, domain: &str, message: impl Into<String>) -> Finding {
    Finding::new(
        rule_id,
        RuleCategory::Submission,
        Severity::Error,
        domain,
        message,
    )
}

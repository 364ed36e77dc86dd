//! End-to-end validation over a small multi-domain submission.

use std::collections::BTreeMap;

use polars::prelude::{Column, DataFrame};

use forge_model::Severity;
use forge_standards::ReferenceData;
use forge_validate::{autofix, SubmissionInput, ValidationReport, Validator};

fn dm() -> DataFrame {
    DataFrame::new(vec![
        Column::new("STUDYID".into(), vec!["STUDY01", "STUDY01"]),
        Column::new("DOMAIN".into(), vec!["DM", "DM"]),
        Column::new("USUBJID".into(), vec!["STUDY01-01-1001", "STUDY01-01-1002"]),
        Column::new("SUBJID".into(), vec!["1001", "1002"]),
        Column::new("SITEID".into(), vec!["01", "01"]),
        Column::new("SEX".into(), vec!["M", "Female"]),
        Column::new("ARM".into(), vec!["Placebo", "Active 10 mg"]),
        Column::new("ARMCD".into(), vec!["PBO", "ACT10"]),
        Column::new("COUNTRY".into(), vec!["USA", "USA"]),
    ])
    .expect("dm")
}

fn ae() -> DataFrame {
    DataFrame::new(vec![
        Column::new("STUDYID".into(), vec!["STUDY01"]),
        Column::new("DOMAIN".into(), vec!["AE"]),
        Column::new("USUBJID".into(), vec!["STUDY01-01-1001"]),
        Column::new("AESEQ".into(), vec![Some(1.0f64)]),
        Column::new("AETERM".into(), vec!["HEADACHE"]),
        Column::new("AESTDTC".into(), vec!["2024-01-15"]),
    ])
    .expect("ae")
}

fn ts() -> DataFrame {
    DataFrame::new(vec![
        Column::new("STUDYID".into(), vec!["STUDY01"]),
        Column::new("DOMAIN".into(), vec!["TS"]),
        Column::new("TSSEQ".into(), vec![Some(1.0f64)]),
        Column::new("TSPARMCD".into(), vec!["SSTDTC"]),
        Column::new("TSPARM".into(), vec!["Study Start Date"]),
        Column::new("TSVAL".into(), vec!["2024-01-01"]),
    ])
    .expect("ts")
}

#[test]
fn clean_submission_has_no_terminology_or_rejection_errors() {
    let refs = ReferenceData::builtin().expect("refs");
    let validator = Validator::new();
    let tables = BTreeMap::from([
        ("DM".to_string(), dm()),
        ("AE".to_string(), ae()),
        ("TS".to_string(), ts()),
    ]);
    let files = vec!["dm.xpt".to_string(), "ae.xpt".to_string(), "ts.xpt".to_string()];

    let findings = validator.validate_submission(
        &tables,
        &BTreeMap::new(),
        &refs,
        &SubmissionInput {
            tables: &tables,
            file_names: &files,
            define_present: true,
        },
    );

    // "Female" is a synonym, so the sex value raises a terminology error.
    assert!(findings
        .iter()
        .any(|f| f.rule_id == "TERM001" && f.value.as_deref() == Some("Female")));
    // No submission-level rejections on the complete set.
    assert!(!findings.iter().any(|f| f.rule_id.starts_with("REJ")));
}

#[test]
fn fix_loop_leaves_a_ready_report_when_only_mechanical_defects_exist() {
    let refs = ReferenceData::builtin().expect("refs");
    let validator = Validator::new();

    // TS dataset whose DOMAIN column is wrong everywhere; mechanically
    // fixable, and TS has no subject-level requirements to trip over.
    let bad_ts = DataFrame::new(vec![
        Column::new("STUDYID".into(), vec!["STUDY01"]),
        Column::new("DOMAIN".into(), vec!["XX"]),
        Column::new("TSSEQ".into(), vec![Some(1.0f64)]),
        Column::new("TSPARMCD".into(), vec!["SSTDTC"]),
        Column::new("TSPARM".into(), vec!["Study Start Date"]),
        Column::new("TSVAL".into(), vec!["2024-01-01"]),
    ])
    .expect("ts");
    let mut tables = BTreeMap::from([("TS".to_string(), bad_ts)]);

    let result =
        autofix::run(&validator, &BTreeMap::new(), &mut tables, &refs, 5).expect("loop");
    assert!(result.converged);
    assert_eq!(result.total_fixed, 1);
    let domains = forge_model::string_values(&tables["TS"], "DOMAIN").expect("DOMAIN");
    assert_eq!(domains, vec!["TS"]);

    // Re-validating the fixed table finds no DOMAIN mismatch.
    assert!(!result
        .final_report
        .findings
        .iter()
        .any(|f| f.rule_id == "TERM002"));
}

#[test]
fn report_counts_only_unwaived_findings() {
    let refs = ReferenceData::builtin().expect("refs");
    let validator = Validator::new();
    let tables = BTreeMap::from([("AE".to_string(), ae())]);

    let findings = validator.validate_table("AE", &tables["AE"], None, &refs, &tables);
    let report = ValidationReport::from_findings(findings);
    assert_eq!(
        report.error_count,
        report
            .findings
            .iter()
            .filter(|f| !f.waived && f.severity == Severity::Error)
            .count()
    );
}

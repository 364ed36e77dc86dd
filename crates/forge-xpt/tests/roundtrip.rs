//! End-to-end transport file tests against real files on disk.

use std::path::Path;

use forge_xpt::{
    XptColumn, XptDataset, XptError, XptValue, read_xpt, validate_table, write_table,
};

fn demographics() -> XptDataset {
    let mut ds = XptDataset::with_columns(
        "DM",
        vec![
            XptColumn::character("STUDYID", 10).with_label("Study Identifier"),
            XptColumn::character("USUBJID", 20).with_label("Unique Subject Identifier"),
            XptColumn::numeric("AGE").with_label("Age"),
            XptColumn::character("SEX", 1).with_label("Sex"),
        ],
    )
    .with_label("Demographics");

    ds.add_row(vec![
        XptValue::character("STUDY01"),
        XptValue::character("STUDY01-001-1001"),
        XptValue::numeric(34.0),
        XptValue::character("F"),
    ]);
    ds.add_row(vec![
        XptValue::character("STUDY01"),
        XptValue::character("STUDY01-001-1002"),
        XptValue::numeric_missing(),
        XptValue::character("M"),
    ]);
    ds
}

#[test]
fn write_and_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dm.xpt");

    write_table(&path, &demographics()).unwrap();

    let read = read_xpt(&path).unwrap();
    assert_eq!(read.name, "DM");
    assert_eq!(read.label.as_deref(), Some("Demographics"));
    assert_eq!(read.num_rows(), 2);
    assert_eq!(read.columns.len(), 4);
    assert_eq!(read.rows[0][1], XptValue::character("STUDY01-001-1001"));
    assert_eq!(read.rows[0][2], XptValue::numeric(34.0));
    assert!(read.rows[1][2].is_missing());
}

#[test]
fn file_length_is_record_aligned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dm.xpt");
    write_table(&path, &demographics()).unwrap();

    let len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(len % 80, 0, "file length {len} not record aligned");
}

#[test]
fn invalid_dataset_creates_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.xpt");

    let dataset = XptDataset::with_columns(
        "AE",
        vec![XptColumn::character("AELONGNAME", 10)],
    );
    let err = write_table(&path, &dataset).unwrap_err();
    assert!(matches!(err, XptError::DatasetValidation { .. }));
    assert!(!path.exists(), "no file may exist after a validation failure");
}

#[test]
fn validation_reports_all_problems_at_once() {
    let mut numeric = XptColumn::numeric("AGE");
    numeric.length = 4;
    let dataset = XptDataset::with_columns(
        "DEMOGRAPHICS",
        vec![
            XptColumn::character("TOOLONGNAME1", 10),
            numeric,
        ],
    );
    match validate_table(&dataset) {
        Err(XptError::DatasetValidation { issues, .. }) => {
            assert!(issues.len() >= 3, "expected every issue listed: {issues:?}");
        }
        other => panic!("expected DatasetValidation, got {other:?}"),
    }
}

#[test]
fn empty_dataset_round_trips_with_zero_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ts.xpt");

    let ds = XptDataset::with_columns(
        "TS",
        vec![
            XptColumn::character("TSPARMCD", 8).with_label("Trial Summary Parameter Short Name"),
            XptColumn::character("TSVAL", 40).with_label("Parameter Value"),
        ],
    );
    write_table(&path, &ds).unwrap();

    let read = read_xpt(&path).unwrap();
    assert_eq!(read.num_rows(), 0);
    assert_eq!(read.columns.len(), 2);
}

#[test]
fn long_character_values_truncate_at_storage_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ae.xpt");

    let mut ds = XptDataset::with_columns(
        "AE",
        vec![XptColumn::character("AETERM", 5).with_label("Reported Term")],
    );
    ds.add_row(vec![XptValue::character("HEADACHE")]);

    // Truncation changes the stored value, but read-back verification
    // compares under storage semantics, so the write still succeeds.
    write_table(&path, &ds).unwrap();
    let read = read_xpt(&path).unwrap();
    assert_eq!(read.rows[0][0], XptValue::character("HEADA"));
}

#[test]
fn missing_file_is_a_distinct_error() {
    let err = read_xpt(Path::new("/nonexistent/never.xpt")).unwrap_err();
    assert!(matches!(err, XptError::FileNotFound { .. }));
}

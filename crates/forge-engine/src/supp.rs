//! Supplemental-qualifier generation with referential integrity back to the
//! parent domain.

use std::collections::HashSet;

use polars::prelude::{Column, DataFrame};
use tracing::debug;

use forge_model::{is_blank, string_values, CaseInsensitiveLookup, SuppVariable};

use crate::error::Result;

/// Column set of every supplemental dataset, in submission order.
pub const SUPP_COLUMNS: [&str; 10] = [
    "STUDYID", "RDOMAIN", "USUBJID", "IDVAR", "IDVARVAL", "QNAM", "QLABEL", "QVAL", "QORIG",
    "QEVAL",
];

/// Build the SUPP-- dataset for one finished parent domain.
///
/// One record per (row, qualifier) pair with a populated source value. A
/// parent that is empty or lacks the subject-id or sequence column yields an
/// empty dataset with the correct columns, never an error.
pub fn generate(
    parent: &DataFrame,
    domain: &str,
    study_id: &str,
    variables: &[SuppVariable],
) -> Result<DataFrame> {
    let domain = domain.to_uppercase();
    let lookup = CaseInsensitiveLookup::new(
        parent
            .get_column_names()
            .iter()
            .map(|s| s.as_str().to_string()),
    );
    let seq_name = format!("{domain}SEQ");

    let subjects = lookup.get("USUBJID").and_then(|c| string_values(parent, c));
    let sequences = lookup
        .get(&seq_name)
        .and_then(|c| string_values(parent, c));
    let (Some(subjects), Some(sequences)) = (subjects, sequences) else {
        debug!(
            domain = %domain,
            sequence = %seq_name,
            "parent lacks the subject-id or sequence column, empty supplemental output"
        );
        return empty_supp();
    };
    if parent.height() == 0 {
        return empty_supp();
    }

    let mut records: Vec<[Option<String>; 10]> = Vec::new();
    for variable in variables {
        let Some(actual) = lookup.get(&variable.source_column) else {
            debug!(
                qualifier = %variable.name,
                column = %variable.source_column,
                "qualifier source column absent in parent"
            );
            continue;
        };
        let Some(values) = string_values(parent, actual) else {
            continue;
        };
        for (row, value) in values.iter().enumerate() {
            let value = value.trim();
            if is_blank(value) {
                continue;
            }
            records.push([
                Some(study_id.to_string()),
                Some(domain.clone()),
                subjects.get(row).cloned(),
                Some(seq_name.clone()),
                sequences.get(row).map(|v| integer_text(v)),
                Some(variable.name.clone()),
                Some(variable.label.clone()),
                Some(value.to_string()),
                Some(variable.origin.as_str().to_string()),
                Some(variable.evaluator.clone()).filter(|e| !e.is_empty()),
            ]);
        }
    }

    let columns: Vec<Column> = SUPP_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values: Vec<Option<String>> =
                records.iter().map(|r| r[i].clone()).collect();
            Column::new((*name).into(), values)
        })
        .collect();
    Ok(DataFrame::new(columns)?)
}

fn empty_supp() -> Result<DataFrame> {
    let columns: Vec<Column> = SUPP_COLUMNS
        .iter()
        .map(|name| Column::new((*name).into(), Vec::<String>::new()))
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Sequence values travel as text; a numeric parent column stringifies as
/// "3.0", which must become "3" in IDVARVAL.
fn integer_text(value: &str) -> String {
    match value.trim().parse::<f64>() {
        Ok(n) if n.fract() == 0.0 => format!("{}", n as i64),
        _ => value.trim().to_string(),
    }
}

/// Re-verify a generated supplemental dataset against its parent.
///
/// Returns one message per violated condition: wrong domain reference,
/// wrong id-variable, orphaned id-values, duplicated qualifier triples.
pub fn check_integrity(supp: &DataFrame, parent: &DataFrame, domain: &str) -> Vec<String> {
    let domain = domain.to_uppercase();
    let seq_name = format!("{domain}SEQ");
    let mut issues = Vec::new();

    let column = |frame: &DataFrame, name: &str| -> Vec<String> {
        string_values(frame, name).unwrap_or_default()
    };

    let rdomain = column(supp, "RDOMAIN");
    let bad_domain = rdomain.iter().filter(|v| *v != &domain).count();
    if bad_domain > 0 {
        issues.push(format!(
            "{bad_domain} record(s) reference a domain other than {domain}"
        ));
    }

    let idvar = column(supp, "IDVAR");
    let bad_idvar = idvar.iter().filter(|v| *v != &seq_name).count();
    if bad_idvar > 0 {
        issues.push(format!("{bad_idvar} record(s) use an IDVAR other than {seq_name}"));
    }

    let parent_keys: HashSet<(String, String)> = {
        let subjects = column(parent, "USUBJID");
        let sequences = string_values(parent, &seq_name).unwrap_or_default();
        subjects
            .iter()
            .zip(&sequences)
            .map(|(s, q)| (s.clone(), integer_text(q)))
            .collect()
    };
    let subjects = column(supp, "USUBJID");
    let idvarvals = column(supp, "IDVARVAL");
    let orphans = subjects
        .iter()
        .zip(&idvarvals)
        .filter(|(s, v)| !parent_keys.contains(&((*s).clone(), (*v).clone())))
        .count();
    if orphans > 0 {
        issues.push(format!(
            "{orphans} record(s) reference a (USUBJID, {seq_name}) pair missing from the parent"
        ));
    }

    let qnames = column(supp, "QNAM");
    let mut seen = HashSet::new();
    let mut duplicates = 0usize;
    for ((subject, idval), qnam) in subjects.iter().zip(&idvarvals).zip(&qnames) {
        if !seen.insert((subject.clone(), idval.clone(), qnam.clone())) {
            duplicates += 1;
        }
    }
    if duplicates > 0 {
        issues.push(format!(
            "{duplicates} duplicated (USUBJID, IDVARVAL, QNAM) triple(s)"
        ));
    }

    issues
}

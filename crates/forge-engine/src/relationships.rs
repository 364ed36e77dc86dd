//! Related-records dataset.
//!
//! Cross-record linkage (AE to CM and the like) is deliberately not
//! inferred; the submission carries an empty RELREC with the correct
//! column set.

use polars::prelude::{Column, DataFrame};

use crate::error::Result;

pub const RELREC_COLUMNS: [&str; 7] = [
    "STUDYID", "RDOMAIN", "USUBJID", "IDVAR", "IDVARVAL", "RELTYPE", "RELID",
];

/// An empty, schema-correct related-records dataset.
pub fn empty_relrec() -> Result<DataFrame> {
    let columns: Vec<Column> = RELREC_COLUMNS
        .iter()
        .map(|name| Column::new((*name).into(), Vec::<String>::new()))
        .collect();
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relrec_is_empty_but_schema_correct() {
        let relrec = empty_relrec().expect("relrec");
        assert_eq!(relrec.height(), 0);
        let names: Vec<String> = relrec
            .get_column_names()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        assert_eq!(names, RELREC_COLUMNS);
    }
}

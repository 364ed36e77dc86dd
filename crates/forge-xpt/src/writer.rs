//! XPT writer with pre-write validation and read-back verification.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{Result, XptError};
use crate::float::{encode_missing, ieee_to_ibm};
use crate::header::{
    RECORD_LEN, build_dscrptr_header, build_library_header, build_library_info,
    build_library_modified, build_member_data, build_member_header, build_member_second,
    build_namestr, build_namestr_header, build_obs_header, format_header_datetime,
};
use crate::reader::read_xpt;
use crate::types::{NumericValue, XptColumn, XptDataset, XptType, XptValue};

/// Longest permitted character variable, per the transport format.
pub const MAX_CHAR_LENGTH: u16 = 200;

/// Writes a single-member SAS Transport V5 file.
pub struct XptWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> XptWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    pub fn write_dataset(mut self, dataset: &XptDataset) -> Result<()> {
        validate_table(dataset)?;

        let now = format_header_datetime(chrono::Utc::now().naive_utc());

        self.writer.write_all(&build_library_header())?;
        self.writer.write_all(&build_library_info(&now))?;
        self.writer.write_all(&build_library_modified(&now))?;

        self.writer.write_all(&build_member_header())?;
        self.writer.write_all(&build_dscrptr_header())?;
        let member_name = dataset.name.trim().to_uppercase();
        self.writer
            .write_all(&build_member_data(&member_name, &now))?;
        self.writer.write_all(&build_member_second(
            dataset.label.as_deref().unwrap_or(""),
            &now,
        ))?;

        self.writer
            .write_all(&build_namestr_header(dataset.columns.len()))?;
        self.write_namestr_records(&dataset.columns)?;

        self.writer.write_all(&build_obs_header())?;
        self.write_observations(dataset)?;

        self.writer.flush()?;
        Ok(())
    }

    fn write_namestr_records(&mut self, columns: &[XptColumn]) -> Result<()> {
        let mut record_writer = RecordWriter::new(&mut self.writer);
        let mut position = 0u32;
        for (idx, column) in columns.iter().enumerate() {
            // Variable names are uppercased on the way out.
            let mut column = column.clone();
            column.name = column.name.trim().to_uppercase();
            let namestr = build_namestr(&column, (idx + 1) as u16, position);
            record_writer.write_bytes(&namestr)?;
            position = position.saturating_add(u32::from(column.length));
        }
        record_writer.finish()
    }

    fn write_observations(&mut self, dataset: &XptDataset) -> Result<()> {
        let obs_len = dataset.observation_length();
        let mut record_writer = RecordWriter::new(&mut self.writer);

        for row in &dataset.rows {
            let mut obs = vec![b' '; obs_len];
            let mut pos = 0usize;
            for (value, column) in row.iter().zip(dataset.columns.iter()) {
                let bytes = encode_value(value, column);
                obs[pos..pos + bytes.len()].copy_from_slice(&bytes);
                pos += column.length as usize;
            }
            record_writer.write_bytes(&obs)?;
        }
        record_writer.finish()
    }
}

impl XptWriter<File> {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

/// Validate a dataset against the transport format's structural limits.
///
/// All problems are collected and reported together; callers get the full
/// picture in one pass and no file is touched.
pub fn validate_table(dataset: &XptDataset) -> Result<()> {
    let mut issues = Vec::new();

    let name = dataset.name.trim();
    if name.is_empty() || name.len() > 8 {
        issues.push(format!(
            "dataset name {:?} must be 1-8 characters",
            dataset.name
        ));
    } else if !name_is_valid(name, false) {
        issues.push(format!(
            "dataset name {:?} must start with a letter and be alphanumeric",
            dataset.name
        ));
    }
    if let Some(label) = &dataset.label {
        if label.len() > 40 {
            issues.push(format!("dataset label exceeds 40 characters: {label:?}"));
        }
    }
    if dataset.columns.is_empty() {
        issues.push("dataset has no columns".to_string());
    }

    let mut seen = std::collections::BTreeSet::new();
    for column in &dataset.columns {
        let col_name = column.name.trim().to_uppercase();
        if col_name.is_empty() || col_name.len() > 8 {
            issues.push(format!(
                "variable name {:?} must be 1-8 characters",
                column.name
            ));
        } else if !name_is_valid(&col_name, true) {
            issues.push(format!(
                "variable name {:?} must start with a letter and be alphanumeric",
                column.name
            ));
        }
        if !seen.insert(col_name) {
            issues.push(format!("duplicate variable name: {}", column.name));
        }
        match &column.label {
            None => issues.push(format!("variable {} has no label", column.name)),
            Some(label) if label.trim().is_empty() => {
                issues.push(format!("variable {} has no label", column.name));
            }
            Some(label) if label.len() > 40 => {
                issues.push(format!("label for {} exceeds 40 characters", column.name));
            }
            Some(_) => {}
        }
        match column.data_type {
            XptType::Char => {
                if column.length == 0 || column.length > MAX_CHAR_LENGTH {
                    issues.push(format!(
                        "character variable {} has length {}, allowed 1-{MAX_CHAR_LENGTH}",
                        column.name, column.length
                    ));
                }
            }
            XptType::Num => {
                if column.length != 8 {
                    issues.push(format!(
                        "numeric variable {} must have length 8, found {}",
                        column.name, column.length
                    ));
                }
            }
        }
    }

    for (idx, row) in dataset.rows.iter().enumerate() {
        if row.len() != dataset.columns.len() {
            issues.push(format!(
                "row {idx} has {} values, expected {}",
                row.len(),
                dataset.columns.len()
            ));
            continue;
        }
        for (value, column) in row.iter().zip(dataset.columns.iter()) {
            if let XptValue::Char(s) = value {
                if s.len() > usize::from(MAX_CHAR_LENGTH) {
                    issues.push(format!(
                        "row {idx} variable {} exceeds {MAX_CHAR_LENGTH} bytes",
                        column.name
                    ));
                }
                if !s.is_ascii() {
                    issues.push(format!(
                        "row {idx} variable {} contains non-ASCII characters",
                        column.name
                    ));
                }
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(XptError::DatasetValidation {
            name: dataset.name.clone(),
            issues,
        })
    }
}

/// Validate, write, and verify a dataset.
///
/// The written file is read back and compared against the input; a mismatch
/// surfaces as [`XptError::WriteIntegrity`] so a corrupt transport file is
/// never left behind silently.
pub fn write_table(path: &Path, dataset: &XptDataset) -> Result<()> {
    validate_table(dataset)?;
    XptWriter::create(path)?.write_dataset(dataset)?;

    let read_back = read_xpt(path)?;
    verify_round_trip(dataset, &read_back).map_err(|message| XptError::WriteIntegrity {
        name: dataset.name.clone(),
        message,
    })?;

    debug!(
        dataset = %dataset.name,
        rows = dataset.num_rows(),
        variables = dataset.columns.len(),
        "transport file verified"
    );
    Ok(())
}

fn verify_round_trip(written: &XptDataset, read: &XptDataset) -> std::result::Result<(), String> {
    if !read.name.eq_ignore_ascii_case(written.name.trim()) {
        return Err(format!("name mismatch: wrote {:?}, read {:?}", written.name, read.name));
    }
    if read.columns.len() != written.columns.len() {
        return Err(format!(
            "column count mismatch: wrote {}, read {}",
            written.columns.len(),
            read.columns.len()
        ));
    }
    for (w, r) in written.columns.iter().zip(read.columns.iter()) {
        if !r.name.eq_ignore_ascii_case(w.name.trim()) || r.data_type != w.data_type {
            return Err(format!("column mismatch: wrote {:?}, read {:?}", w, r));
        }
    }
    if read.rows.len() != written.rows.len() {
        return Err(format!(
            "row count mismatch: wrote {}, read {}",
            written.rows.len(),
            read.rows.len()
        ));
    }
    for (row_idx, (wrow, rrow)) in written.rows.iter().zip(read.rows.iter()).enumerate() {
        for ((wval, rval), column) in wrow.iter().zip(rrow.iter()).zip(written.columns.iter()) {
            if !values_equal(wval, rval, column) {
                return Err(format!(
                    "value mismatch at row {row_idx} variable {}: wrote {:?}, read {:?}",
                    column.name, wval, rval
                ));
            }
        }
    }
    Ok(())
}

/// Cell comparison under the format's storage semantics: character values
/// compare after truncation and trailing-space removal, numerics compare
/// through the IBM codec.
fn values_equal(written: &XptValue, read: &XptValue, column: &XptColumn) -> bool {
    match (written, read) {
        (XptValue::Char(w), XptValue::Char(r)) => {
            let stored: String = w.chars().take(column.length as usize).collect();
            stored.trim_end() == r.trim_end()
        }
        (XptValue::Num(w), XptValue::Num(r)) => match (w, r) {
            (NumericValue::Missing(a), NumericValue::Missing(b)) => a == b,
            (NumericValue::Value(a), NumericValue::Value(b)) => {
                crate::float::ibm_to_ieee(ieee_to_ibm(*a)) == *b
            }
            _ => false,
        },
        _ => false,
    }
}

fn name_is_valid(name: &str, allow_underscore: bool) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || (allow_underscore && c == '_'))
}

fn encode_value(value: &XptValue, column: &XptColumn) -> Vec<u8> {
    match (value, column.data_type) {
        (XptValue::Char(s), XptType::Char) => encode_char(s, column.length),
        (XptValue::Num(n), XptType::Num) => encode_numeric(n),
        (XptValue::Char(s), XptType::Num) => {
            let num = s
                .trim()
                .parse::<f64>()
                .map(NumericValue::Value)
                .unwrap_or(NumericValue::Missing(crate::types::MissingValue::Standard));
            encode_numeric(&num)
        }
        (XptValue::Num(n), XptType::Char) => {
            let text = n.value().map(|v| v.to_string()).unwrap_or_default();
            encode_char(&text, column.length)
        }
    }
}

fn encode_char(value: &str, length: u16) -> Vec<u8> {
    let len = length as usize;
    let mut out = Vec::with_capacity(len);
    for ch in value.chars().take(len) {
        out.push(if ch.is_ascii() { ch as u8 } else { b'?' });
    }
    out.resize(len, b' ');
    out
}

fn encode_numeric(value: &NumericValue) -> Vec<u8> {
    let bytes = match value {
        NumericValue::Missing(m) => encode_missing(*m),
        NumericValue::Value(v) if !v.is_finite() => {
            encode_missing(crate::types::MissingValue::Standard)
        }
        NumericValue::Value(v) => ieee_to_ibm(*v),
    };
    bytes.to_vec()
}

/// Accumulates bytes into space-padded 80-byte records.
struct RecordWriter<'a, W: Write> {
    writer: &'a mut W,
    record: [u8; RECORD_LEN],
    pos: usize,
}

impl<'a, W: Write> RecordWriter<'a, W> {
    fn new(writer: &'a mut W) -> Self {
        Self {
            writer,
            record: [b' '; RECORD_LEN],
            pos: 0,
        }
    }

    fn write_bytes(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let take = (RECORD_LEN - self.pos).min(bytes.len());
            self.record[self.pos..self.pos + take].copy_from_slice(&bytes[..take]);
            self.pos += take;
            bytes = &bytes[take..];
            if self.pos == RECORD_LEN {
                self.writer.write_all(&self.record)?;
                self.record = [b' '; RECORD_LEN];
                self.pos = 0;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.pos > 0 {
            for slot in &mut self.record[self.pos..] {
                *slot = b' ';
            }
            self.writer.write_all(&self.record)?;
            self.pos = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MissingValue;

    #[test]
    fn encode_char_pads_and_truncates() {
        assert_eq!(encode_char("hello", 8), b"hello   ");
        assert_eq!(encode_char("verylongstring", 5), b"veryl");
        assert_eq!(encode_char("\u{00b5}g", 4), b"?g  ");
    }

    #[test]
    fn encode_numeric_missing_sentinel() {
        let bytes = encode_numeric(&NumericValue::Missing(MissingValue::Standard));
        assert_eq!(bytes[0], 0x2e);
        assert!(bytes[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn validation_collects_every_issue() {
        let mut col = XptColumn::numeric("TOOLONGNAME");
        col.length = 4;
        let dataset = XptDataset::with_columns("WAYTOOLONGNAME", vec![col]);
        let err = validate_table(&dataset).unwrap_err();
        match err {
            XptError::DatasetValidation { issues, .. } => {
                // Long dataset name, long variable name, missing label,
                // bad numeric length.
                assert_eq!(issues.len(), 4, "{issues:?}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validation_rejects_wide_characters() {
        let dataset = XptDataset::with_columns(
            "VS",
            vec![XptColumn::character("VSORRES", 201).with_label("Result")],
        );
        assert!(validate_table(&dataset).is_err());

        let ok = XptDataset::with_columns(
            "VS",
            vec![XptColumn::character("VSORRES", 200).with_label("Result")],
        );
        assert!(validate_table(&ok).is_ok());
    }

    #[test]
    fn validation_rejects_bad_name_charset() {
        let dataset = XptDataset::with_columns(
            "1DM",
            vec![XptColumn::character("AE-TERM", 10).with_label("Term")],
        );
        match validate_table(&dataset).unwrap_err() {
            XptError::DatasetValidation { issues, .. } => {
                assert_eq!(issues.len(), 2, "{issues:?}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validation_rejects_non_ascii_values() {
        let mut dataset = XptDataset::with_columns(
            "VS",
            vec![XptColumn::character("VSORRESU", 10).with_label("Unit")],
        );
        dataset.add_row(vec![XptValue::character("\u{00b5}g")]);
        assert!(validate_table(&dataset).is_err());
    }

    #[test]
    fn validation_rejects_duplicate_names_case_insensitively() {
        let dataset = XptDataset::with_columns(
            "DM",
            vec![XptColumn::numeric("AGE"), XptColumn::numeric("age")],
        );
        assert!(validate_table(&dataset).is_err());
    }

    #[test]
    fn validation_rejects_ragged_rows() {
        let mut dataset = XptDataset::with_columns(
            "DM",
            vec![
                XptColumn::character("USUBJID", 10),
                XptColumn::numeric("AGE"),
            ],
        );
        dataset.add_row(vec![XptValue::character("S1")]);
        assert!(validate_table(&dataset).is_err());
    }

    #[test]
    fn record_writer_pads_final_record() {
        let mut output = Vec::new();
        {
            let mut writer = RecordWriter::new(&mut output);
            writer.write_bytes(&[b'A'; 100]).unwrap();
            writer.finish().unwrap();
        }
        assert_eq!(output.len(), 160);
        assert!(output[100..].iter().all(|&b| b == b' '));
    }
}

//! XPT reader, used both for ingesting transport files and for the
//! writer's read-back verification.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{Result, XptError};
use crate::float::{ibm_to_ieee, is_missing};
use crate::header::{
    RECORD_LEN, align_to_record, parse_dataset_label, parse_dataset_name, parse_namestr_len,
    parse_namestr_records, parse_variable_count, validate_dscrptr_header, validate_library_header,
    validate_member_header, validate_namestr_header, validate_obs_header,
};
use crate::types::{MissingValue, NumericValue, XptColumn, XptDataset, XptType, XptValue};

pub struct XptReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> XptReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the whole file and parse the first member.
    pub fn read_dataset(mut self) -> Result<XptDataset> {
        let mut data = Vec::new();
        self.reader.read_to_end(&mut data)?;
        parse_xpt_data(&data)
    }
}

impl XptReader<File> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                XptError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                XptError::Io(e)
            }
        })?;
        Ok(Self::new(file))
    }
}

pub fn read_xpt(path: &Path) -> Result<XptDataset> {
    XptReader::open(path)?.read_dataset()
}

fn parse_xpt_data(data: &[u8]) -> Result<XptDataset> {
    if data.len() < RECORD_LEN * 8 {
        return Err(XptError::invalid_format("file too small"));
    }
    if !data.len().is_multiple_of(RECORD_LEN) {
        return Err(XptError::invalid_format(
            "file length is not a multiple of 80",
        ));
    }

    let mut offset = 0usize;

    validate_library_header(read_record(data, offset)?)?;
    // Library info and modified records carry no structure we need.
    offset += RECORD_LEN * 3;

    let member_header = read_record(data, offset)?;
    validate_member_header(member_header)?;
    let namestr_len = parse_namestr_len(member_header)?;
    if namestr_len != crate::header::NAMESTR_LEN {
        return Err(XptError::invalid_format(format!(
            "unsupported NAMESTR length {namestr_len}"
        )));
    }
    offset += RECORD_LEN;

    validate_dscrptr_header(read_record(data, offset)?)?;
    offset += RECORD_LEN;

    let name = parse_dataset_name(read_record(data, offset)?)?;
    offset += RECORD_LEN;

    let label = parse_dataset_label(read_record(data, offset)?);
    offset += RECORD_LEN;

    let namestr_header = read_record(data, offset)?;
    validate_namestr_header(namestr_header)?;
    let var_count = parse_variable_count(namestr_header)?;
    offset += RECORD_LEN;

    let namestr_total = var_count * namestr_len;
    let namestr_data = data
        .get(offset..offset + namestr_total)
        .ok_or(XptError::RecordOutOfBounds { offset })?;
    let columns = parse_namestr_records(namestr_data, var_count)?;
    offset = align_to_record(offset + namestr_total);

    validate_obs_header(read_record(data, offset)?)?;
    offset += RECORD_LEN;

    let obs_len = columns.iter().map(|c| c.length as usize).sum();
    let rows = parse_observations(data, offset, obs_len, &columns)?;

    Ok(XptDataset {
        name,
        label,
        columns,
        rows,
    })
}

fn read_record(data: &[u8], offset: usize) -> Result<&[u8]> {
    data.get(offset..offset + RECORD_LEN)
        .ok_or(XptError::RecordOutOfBounds { offset })
}

fn parse_observations(
    data: &[u8],
    offset: usize,
    obs_len: usize,
    columns: &[XptColumn],
) -> Result<Vec<Vec<XptValue>>> {
    if obs_len == 0 || offset >= data.len() {
        return Ok(Vec::new());
    }

    let data_len = data.len() - offset;
    let mut rows_total = data_len / obs_len;
    let remainder = data_len % obs_len;

    // Anything after the last whole observation must be record padding.
    if remainder != 0 {
        let tail = &data[offset + rows_total * obs_len..];
        if tail.iter().any(|&b| b != b' ') {
            return Err(XptError::TrailingBytes);
        }
    }

    // Trailing all-space rows are padding, not observations.
    while rows_total > 0 {
        let start = offset + (rows_total - 1) * obs_len;
        if data[start..start + obs_len].iter().all(|&b| b == b' ') {
            rows_total -= 1;
        } else {
            break;
        }
    }

    let mut rows = Vec::with_capacity(rows_total);
    for row_idx in 0..rows_total {
        let start = offset + row_idx * obs_len;
        rows.push(parse_row(&data[start..start + obs_len], columns));
    }
    Ok(rows)
}

fn parse_row(row_bytes: &[u8], columns: &[XptColumn]) -> Vec<XptValue> {
    let mut values = Vec::with_capacity(columns.len());
    let mut pos = 0usize;
    for column in columns {
        let len = column.length as usize;
        let slice = &row_bytes[pos..pos + len];
        let value = match column.data_type {
            XptType::Char => XptValue::Char(
                String::from_utf8_lossy(slice).trim_end().to_string(),
            ),
            XptType::Num => XptValue::Num(decode_numeric(slice)),
        };
        values.push(value);
        pos += len;
    }
    values
}

fn decode_numeric(bytes: &[u8]) -> NumericValue {
    if bytes.is_empty() {
        return NumericValue::Missing(MissingValue::Standard);
    }
    if let Some(missing) = is_missing(bytes) {
        return NumericValue::Missing(missing);
    }
    let mut buf = [0u8; 8];
    let len = bytes.len().min(8);
    buf[..len].copy_from_slice(&bytes[..len]);
    NumericValue::Value(ibm_to_ieee(buf))
}

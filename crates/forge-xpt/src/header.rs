//! Header records of a SAS Transport V5 file.
//!
//! Every record is 80 bytes. A single-member file is laid out as:
//! library header, two library info records, member header, DSCRPTR
//! header, member data, member second record, NAMESTR header, one
//! 140-byte NAMESTR per variable (padded to a record boundary), the OBS
//! header, then observation data.

use chrono::NaiveDateTime;

use crate::error::{Result, XptError};
use crate::types::{XptColumn, XptType};

pub const RECORD_LEN: usize = 80;
pub const NAMESTR_LEN: usize = 140;

pub const LIBRARY_HEADER_PREFIX: &str = "HEADER RECORD*******LIBRARY HEADER RECORD!!!!!!!";
pub const MEMBER_HEADER_PREFIX: &str = "HEADER RECORD*******MEMBER  HEADER RECORD!!!!!!!";
pub const DSCRPTR_HEADER_PREFIX: &str = "HEADER RECORD*******DSCRPTR HEADER RECORD!!!!!!!";
pub const NAMESTR_HEADER_PREFIX: &str = "HEADER RECORD*******NAMESTR HEADER RECORD!!!!!!!";
pub const OBS_HEADER_PREFIX: &str = "HEADER RECORD*******OBS     HEADER RECORD!!!!!!!";

/// Format a timestamp the way SAS headers expect: `ddMMMyy:hh:mm:ss`.
pub fn format_header_datetime(dt: NaiveDateTime) -> String {
    let formatted = dt.format("%d%b%y:%H:%M:%S").to_string();
    formatted.to_uppercase()
}

fn build_fixed_header(prefix: &str) -> [u8; RECORD_LEN] {
    let mut record = [b' '; RECORD_LEN];
    let bytes = prefix.as_bytes();
    record[..bytes.len().min(48)].copy_from_slice(&bytes[..bytes.len().min(48)]);
    for slot in &mut record[48..78] {
        *slot = b'0';
    }
    record
}

fn expect_prefix(record: &[u8], prefix: &str, which: &'static str) -> Result<()> {
    if record.len() < RECORD_LEN {
        return Err(XptError::invalid_format("record too short"));
    }
    if !record.starts_with(prefix.as_bytes()) {
        return Err(XptError::MissingHeader(which));
    }
    Ok(())
}

pub fn validate_library_header(record: &[u8]) -> Result<()> {
    expect_prefix(record, LIBRARY_HEADER_PREFIX, "LIBRARY")
}

pub fn validate_member_header(record: &[u8]) -> Result<()> {
    expect_prefix(record, MEMBER_HEADER_PREFIX, "MEMBER")
}

pub fn validate_dscrptr_header(record: &[u8]) -> Result<()> {
    expect_prefix(record, DSCRPTR_HEADER_PREFIX, "DSCRPTR")
}

pub fn validate_namestr_header(record: &[u8]) -> Result<()> {
    expect_prefix(record, NAMESTR_HEADER_PREFIX, "NAMESTR")
}

pub fn validate_obs_header(record: &[u8]) -> Result<()> {
    expect_prefix(record, OBS_HEADER_PREFIX, "OBS")
}

pub fn build_library_header() -> [u8; RECORD_LEN] {
    build_fixed_header(LIBRARY_HEADER_PREFIX)
}

/// Library info record: SAS symbols, version, OS, created datetime.
pub fn build_library_info(created: &str) -> [u8; RECORD_LEN] {
    let mut record = [b' '; RECORD_LEN];
    write_string(&mut record, 0, "SAS", 8);
    write_string(&mut record, 8, "SAS", 8);
    write_string(&mut record, 16, "SASLIB", 8);
    write_string(&mut record, 24, "9.4", 8);
    write_string(&mut record, 32, "RUST", 8);
    write_string(&mut record, 64, created, 16);
    record
}

/// Second library record: modified datetime only.
pub fn build_library_modified(modified: &str) -> [u8; RECORD_LEN] {
    let mut record = [b' '; RECORD_LEN];
    write_string(&mut record, 0, modified, 16);
    record
}

/// Member header carries the observation header size and NAMESTR length.
pub fn build_member_header() -> [u8; RECORD_LEN] {
    let mut record = build_fixed_header(MEMBER_HEADER_PREFIX);
    write_string(&mut record, 64, "0160", 4);
    write_string(&mut record, 74, &format!("{NAMESTR_LEN:04}"), 4);
    record
}

pub fn build_dscrptr_header() -> [u8; RECORD_LEN] {
    build_fixed_header(DSCRPTR_HEADER_PREFIX)
}

/// Member data record: dataset name at offset 8.
pub fn build_member_data(name: &str, created: &str) -> [u8; RECORD_LEN] {
    let mut record = [b' '; RECORD_LEN];
    write_string(&mut record, 0, "SAS", 8);
    write_string(&mut record, 8, name, 8);
    write_string(&mut record, 16, "SASDATA", 8);
    write_string(&mut record, 24, "9.4", 8);
    write_string(&mut record, 32, "RUST", 8);
    write_string(&mut record, 64, created, 16);
    record
}

/// Member second record: modified datetime and dataset label.
pub fn build_member_second(label: &str, modified: &str) -> [u8; RECORD_LEN] {
    let mut record = [b' '; RECORD_LEN];
    write_string(&mut record, 0, modified, 16);
    write_string(&mut record, 32, label, 40);
    record
}

/// NAMESTR header carries the variable count at offset 54.
pub fn build_namestr_header(var_count: usize) -> [u8; RECORD_LEN] {
    let mut record = build_fixed_header(NAMESTR_HEADER_PREFIX);
    write_string(&mut record, 54, &format!("{var_count:04}"), 4);
    record
}

pub fn build_obs_header() -> [u8; RECORD_LEN] {
    build_fixed_header(OBS_HEADER_PREFIX)
}

pub fn parse_namestr_len(record: &[u8]) -> Result<usize> {
    if record.len() < 78 {
        return Err(XptError::invalid_format("member header too short"));
    }
    read_string(record, 74, 4)
        .trim()
        .parse()
        .map_err(|_| XptError::NumericParse {
            field: "NAMESTR length".to_string(),
        })
}

pub fn parse_variable_count(record: &[u8]) -> Result<usize> {
    if record.len() < 58 {
        return Err(XptError::invalid_format("namestr header too short"));
    }
    read_string(record, 54, 4)
        .trim()
        .parse()
        .map_err(|_| XptError::NumericParse {
            field: "variable count".to_string(),
        })
}

pub fn parse_dataset_name(record: &[u8]) -> Result<String> {
    if record.len() < 16 {
        return Err(XptError::invalid_format("member data too short"));
    }
    let name = read_string(record, 8, 8);
    if name.is_empty() {
        return Err(XptError::invalid_format("empty dataset name"));
    }
    Ok(name)
}

pub fn parse_dataset_label(record: &[u8]) -> Option<String> {
    if record.len() < 72 {
        return None;
    }
    let label = read_string(record, 32, 40);
    if label.is_empty() { None } else { Some(label) }
}

/// Build the 140-byte NAMESTR record for one variable.
///
/// All shorts and the position are big-endian.
pub fn build_namestr(column: &XptColumn, varnum: u16, position: u32) -> [u8; NAMESTR_LEN] {
    let mut buf = [0u8; NAMESTR_LEN];
    write_i16(&mut buf, 0, column.data_type.to_ntype());
    write_i16(&mut buf, 4, column.length as i16);
    write_i16(&mut buf, 6, varnum as i16);
    write_string(&mut buf, 8, &column.name, 8);
    write_string(&mut buf, 16, column.label.as_deref().unwrap_or(""), 40);
    // Format and informat fields stay blank; offset 56..84 is zeroed.
    write_string(&mut buf, 56, "", 8);
    write_string(&mut buf, 72, "", 8);
    write_i32(&mut buf, 84, position as i32);
    buf
}

pub fn parse_namestr(data: &[u8], index: usize) -> Result<XptColumn> {
    if data.len() < 88 {
        return Err(XptError::InvalidNamestr {
            index,
            message: format!("data too short: {} bytes", data.len()),
        });
    }

    let ntype = read_i16(data, 0);
    let data_type = XptType::from_ntype(ntype).ok_or_else(|| XptError::InvalidNamestr {
        index,
        message: format!("invalid ntype: {ntype}"),
    })?;

    let length = read_i16(data, 4) as u16;
    if length == 0 {
        return Err(XptError::InvalidNamestr {
            index,
            message: "variable length is zero".to_string(),
        });
    }

    let name = read_string(data, 8, 8);
    if name.is_empty() {
        return Err(XptError::InvalidNamestr {
            index,
            message: "empty variable name".to_string(),
        });
    }
    let label = read_string(data, 16, 40);

    Ok(XptColumn {
        name,
        label: if label.is_empty() { None } else { Some(label) },
        data_type,
        length,
    })
}

pub fn parse_namestr_records(data: &[u8], var_count: usize) -> Result<Vec<XptColumn>> {
    let mut columns = Vec::with_capacity(var_count);
    for idx in 0..var_count {
        let offset = idx * NAMESTR_LEN;
        let record = data
            .get(offset..offset + NAMESTR_LEN)
            .ok_or_else(|| XptError::InvalidNamestr {
                index: idx,
                message: "NAMESTR data out of bounds".to_string(),
            })?;
        columns.push(parse_namestr(record, idx)?);
    }
    Ok(columns)
}

/// Round a byte count up to the next 80-byte record boundary.
pub fn align_to_record(size: usize) -> usize {
    size.div_ceil(RECORD_LEN) * RECORD_LEN
}

fn read_i16(data: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([data[offset], data[offset + 1]])
}

fn read_string(data: &[u8], offset: usize, len: usize) -> String {
    data.get(offset..offset + len)
        .map(|slice| String::from_utf8_lossy(slice).trim_end().to_string())
        .unwrap_or_default()
}

fn write_i16(buf: &mut [u8], offset: usize, value: i16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

fn write_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

fn write_string(buf: &mut [u8], offset: usize, value: &str, len: usize) {
    for (i, ch) in value.chars().take(len).enumerate() {
        buf[offset + i] = if ch.is_ascii() { ch as u8 } else { b'?' };
    }
    for i in value.len()..len {
        buf[offset + i] = b' ';
    }
}

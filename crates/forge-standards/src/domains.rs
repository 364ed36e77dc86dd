//! Domain and variable metadata for the supported SDTM domains.
//!
//! Parsed once from the bundled metadata table; the pipeline receives the
//! result immutably and never reloads it.

use std::collections::BTreeMap;

use forge_model::VariableType;
use serde::Serialize;

use crate::error::{Result, StandardsError};

/// Core designation of a variable within its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Core {
    Required,
    Expected,
    Permissible,
}

impl Core {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "req" => Some(Self::Required),
            "exp" => Some(Self::Expected),
            "perm" => Some(Self::Permissible),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VariableDef {
    pub name: String,
    pub label: String,
    pub data_type: VariableType,
    pub core: Core,
    /// Codelist code governing the variable, when one applies.
    pub codelist: Option<String>,
    pub order: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainSpec {
    pub code: String,
    pub label: String,
    pub class: String,
    /// Variables in standard order.
    pub variables: Vec<VariableDef>,
}

impl DomainSpec {
    pub fn variable(&self, name: &str) -> Option<&VariableDef> {
        self.variables
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
    }

    pub fn required_variables(&self) -> impl Iterator<Item = &VariableDef> {
        self.variables.iter().filter(|v| v.core == Core::Required)
    }

    pub fn expected_variables(&self) -> impl Iterator<Item = &VariableDef> {
        self.variables.iter().filter(|v| v.core == Core::Expected)
    }

    /// Sort keys for the final dataset ordering.
    pub fn sort_keys(&self) -> &'static [&'static str] {
        sort_keys_for(&self.code)
    }
}

/// Domain code, label, and observation class for each supported domain.
const DOMAIN_INFO: &[(&str, &str, &str)] = &[
    ("DM", "Demographics", "Special Purpose"),
    ("AE", "Adverse Events", "Events"),
    ("VS", "Vital Signs", "Findings"),
    ("TS", "Trial Summary", "Trial Design"),
    ("SE", "Subject Elements", "Special Purpose"),
    ("SUPPQUAL", "Supplemental Qualifiers", "Relationship"),
    ("RELREC", "Related Records", "Relationship"),
];

/// Sort keys for a domain code, independent of a loaded [`DomainSpec`].
pub fn sort_keys_for(domain: &str) -> &'static [&'static str] {
    match domain.to_ascii_uppercase().as_str() {
        "DM" => &["STUDYID", "USUBJID"],
        "AE" => &["STUDYID", "USUBJID", "AESTDTC", "AETERM"],
        "VS" => &["STUDYID", "USUBJID", "VSTESTCD", "VISITNUM", "VSDTC"],
        "TS" => &["STUDYID", "TSPARMCD", "TSSEQ"],
        "SE" => &["STUDYID", "USUBJID", "SESTDTC"],
        "SUPPQUAL" => &["STUDYID", "RDOMAIN", "USUBJID", "IDVAR", "IDVARVAL", "QNAM"],
        "RELREC" => &["STUDYID", "RDOMAIN", "USUBJID", "IDVAR", "IDVARVAL", "RELID"],
        _ => &["STUDYID", "USUBJID"],
    }
}

fn header_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn get_string(row: &csv::StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| row.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn csv_error(message: impl ToString) -> StandardsError {
    StandardsError::Csv {
        table: "variables".to_string(),
        message: message.to_string(),
    }
}

/// Parse the bundled variable metadata into per-domain specs.
pub fn parse_domains(data: &str) -> Result<BTreeMap<String, DomainSpec>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data.as_bytes());
    let headers = reader.headers().map_err(csv_error)?.clone();

    let idx_domain = header_index(&headers, "Dataset Name");
    let idx_var = header_index(&headers, "Variable Name");
    let idx_label = header_index(&headers, "Variable Label");
    let idx_type = header_index(&headers, "Type");
    let idx_core = header_index(&headers, "Core");
    let idx_codelist = header_index(&headers, "Codelist Code");
    let idx_order = header_index(&headers, "Order");

    let mut domains: BTreeMap<String, DomainSpec> = BTreeMap::new();
    for (code, label, class) in DOMAIN_INFO {
        domains.insert(
            (*code).to_string(),
            DomainSpec {
                code: (*code).to_string(),
                label: (*label).to_string(),
                class: (*class).to_string(),
                variables: Vec::new(),
            },
        );
    }

    for row in reader.records() {
        let row = row.map_err(csv_error)?;
        let domain = get_string(&row, idx_domain)
            .ok_or_else(|| csv_error("missing Dataset Name"))?
            .to_ascii_uppercase();
        let name = get_string(&row, idx_var).ok_or_else(|| csv_error("missing Variable Name"))?;
        let core = get_string(&row, idx_core)
            .as_deref()
            .and_then(Core::parse)
            .ok_or_else(|| csv_error(format!("bad Core for {domain}.{name}")))?;
        let data_type = match get_string(&row, idx_type).as_deref() {
            Some("Num") | Some("num") => VariableType::Num,
            _ => VariableType::Char,
        };
        let order = get_string(&row, idx_order)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let spec = domains
            .get_mut(&domain)
            .ok_or_else(|| StandardsError::UnknownDomain(domain.clone()))?;
        spec.variables.push(VariableDef {
            name,
            label: get_string(&row, idx_label).unwrap_or_default(),
            data_type,
            core,
            codelist: get_string(&row, idx_codelist),
            order,
        });
    }

    for spec in domains.values_mut() {
        spec.variables.sort_by_key(|v| v.order);
    }
    Ok(domains)
}

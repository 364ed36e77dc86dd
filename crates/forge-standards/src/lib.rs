//! Bundled SDTM reference data: domain metadata and controlled terminology.
//!
//! Everything here is parsed once at startup via [`ReferenceData::builtin`]
//! and handed to the engine and validator by shared reference.

pub mod codelists;
pub mod domains;
pub mod error;

use std::collections::BTreeMap;

pub use codelists::{Codelist, CodelistRepo, Term};
pub use domains::{sort_keys_for, Core, DomainSpec, VariableDef};
pub use error::{Result, StandardsError};

const VARIABLES_CSV: &str = include_str!("../data/variables.csv");
const CODELISTS_CSV: &str = include_str!("../data/codelists.csv");

/// Immutable reference data shared across the pipeline.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    domains: BTreeMap<String, DomainSpec>,
    codelists: CodelistRepo,
}

impl ReferenceData {
    /// Load the bundled metadata tables.
    pub fn builtin() -> Result<Self> {
        Ok(Self {
            domains: domains::parse_domains(VARIABLES_CSV)?,
            codelists: codelists::parse_codelists(CODELISTS_CSV)?,
        })
    }

    pub fn domain(&self, code: &str) -> Option<&DomainSpec> {
        self.domains.get(&code.to_ascii_uppercase())
    }

    pub fn require_domain(&self, code: &str) -> Result<&DomainSpec> {
        self.domain(code)
            .ok_or_else(|| StandardsError::UnknownDomain(code.to_string()))
    }

    pub fn domains(&self) -> impl Iterator<Item = &DomainSpec> {
        self.domains.values()
    }

    pub fn codelists(&self) -> &CodelistRepo {
        &self.codelists
    }

    /// The codelist governing `domain.variable`, when the metadata names one.
    pub fn codelist_for(&self, domain: &str, variable: &str) -> Option<&Codelist> {
        let def = self.domain(domain)?.variable(variable)?;
        self.codelists.get(def.codelist.as_deref()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_loads_all_domains() {
        let refs = ReferenceData::builtin().expect("builtin");
        for code in ["DM", "AE", "VS", "TS", "SE", "SUPPQUAL", "RELREC"] {
            assert!(refs.domain(code).is_some(), "missing {code}");
        }
        assert!(!refs.codelists().is_empty());
    }

    #[test]
    fn codelist_for_resolves_through_metadata() {
        let refs = ReferenceData::builtin().expect("builtin");
        let sex = refs.codelist_for("DM", "SEX").expect("SEX codelist");
        assert_eq!(sex.code, "C66731");
        assert!(refs.codelist_for("DM", "STUDYID").is_none());
        assert!(refs.codelist_for("AE", "AESEV").is_some());
    }
}

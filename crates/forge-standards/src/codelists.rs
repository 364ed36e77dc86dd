//! Controlled terminology codelists bundled with the pipeline.
//!
//! Each codelist carries its submission values plus known raw-data synonyms
//! so LOOKUP_RECODE and the terminology rules resolve values the same way.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::error::{Result, StandardsError};

#[derive(Debug, Clone, Serialize)]
pub struct Term {
    /// The exact submission value expected in the output.
    pub submission_value: String,
    /// Raw-data spellings that recode to this term.
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Codelist {
    pub code: String,
    pub name: String,
    pub extensible: bool,
    pub terms: Vec<Term>,
    /// Uppercased submission value or synonym -> index into `terms`.
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Codelist {
    fn new(code: String, name: String, extensible: bool) -> Self {
        Self {
            code,
            name,
            extensible,
            terms: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn push_term(&mut self, term: Term) {
        let idx = self.terms.len();
        self.index
            .entry(term.submission_value.to_ascii_uppercase())
            .or_insert(idx);
        for synonym in &term.synonyms {
            self.index.entry(synonym.to_ascii_uppercase()).or_insert(idx);
        }
        self.terms.push(term);
    }

    /// Exact submission-value membership, the test the terminology rules use.
    pub fn contains(&self, value: &str) -> bool {
        self.terms.iter().any(|t| t.submission_value == value)
    }

    /// Resolve a raw value to its submission value, case-insensitively and
    /// through synonyms. `None` means the value is not in the codelist.
    pub fn resolve(&self, value: &str) -> Option<&str> {
        let key = value.trim().to_ascii_uppercase();
        self.index
            .get(&key)
            .map(|&idx| self.terms[idx].submission_value.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CodelistRepo {
    by_code: BTreeMap<String, Codelist>,
}

impl CodelistRepo {
    pub fn get(&self, code: &str) -> Option<&Codelist> {
        self.by_code.get(&code.to_ascii_uppercase())
    }

    pub fn require(&self, code: &str) -> Result<&Codelist> {
        self.get(code)
            .ok_or_else(|| StandardsError::UnknownCodelist(code.to_string()))
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
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
        table: "codelists".to_string(),
        message: message.to_string(),
    }
}

/// Parse the bundled terminology table into a repository.
pub fn parse_codelists(data: &str) -> Result<CodelistRepo> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data.as_bytes());
    let headers = reader.headers().map_err(csv_error)?.clone();

    let idx_code = header_index(&headers, "Codelist Code");
    let idx_name = header_index(&headers, "Codelist Name");
    let idx_extensible = header_index(&headers, "Extensible");
    let idx_value = header_index(&headers, "Submission Value");
    let idx_synonyms = header_index(&headers, "Synonyms");

    let mut by_code: BTreeMap<String, Codelist> = BTreeMap::new();
    for row in reader.records() {
        let row = row.map_err(csv_error)?;
        let code = get_string(&row, idx_code)
            .ok_or_else(|| csv_error("missing Codelist Code"))?
            .to_ascii_uppercase();
        let value =
            get_string(&row, idx_value).ok_or_else(|| csv_error("missing Submission Value"))?;
        let extensible = get_string(&row, idx_extensible)
            .is_some_and(|v| v.eq_ignore_ascii_case("yes"));

        let codelist = by_code.entry(code.clone()).or_insert_with(|| {
            Codelist::new(
                code,
                get_string(&row, idx_name).unwrap_or_default(),
                extensible,
            )
        });
        let synonyms = get_string(&row, idx_synonyms)
            .map(|s| {
                s.split(';')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        codelist.push_term(Term {
            submission_value: value,
            synonyms,
        });
    }

    Ok(CodelistRepo { by_code })
}

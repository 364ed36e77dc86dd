//! Declarative mapping specification executed by the engine.
//!
//! A [`MappingSpec`] describes how one SDTM domain dataset is produced from
//! raw source tables: one [`VariableMapping`] per target variable, each
//! tagged with a [`PatternKind`] that selects the column-production
//! strategy. The spec is JSON-serializable and immutable during execution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a target variable's column is produced.
///
/// The set is closed: the engine matches it exhaustively, so an unhandled
/// pattern kind is a compile error, not a runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternKind {
    /// Broadcast a constant value to every row.
    Assign,
    /// Copy a resolved source column.
    Direct,
    /// Copy a resolved source column under the target name.
    Rename,
    /// Apply a named format transform (date conversions etc.).
    Reformat,
    /// Extract a piece of a source value via the derivation mini-language.
    Split,
    /// Combine several inputs via a named derivation or concatenation.
    Combine,
    /// Compute via a named cross-table derivation.
    Derivation,
    /// Recode values through a codelist's preferred terms.
    LookupRecode,
    /// Wide-to-tall restructuring, handled once per table.
    Transpose,
}

/// Declared data type of a target variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    #[default]
    Char,
    Num,
}

/// One target variable of a [`MappingSpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableMapping {
    /// Target SDTM variable name (e.g. "AESTDTC").
    pub target: String,
    /// Target variable label.
    #[serde(default)]
    pub label: String,
    /// Declared data type.
    #[serde(default)]
    pub data_type: VariableType,
    /// Whether the variable is required in the output.
    #[serde(default)]
    pub required: bool,
    /// The column-production pattern.
    pub pattern: PatternKind,
    /// Source table name, when the pattern reads raw data.
    #[serde(default)]
    pub source_table: Option<String>,
    /// Source column name, when the pattern reads raw data.
    #[serde(default)]
    pub source_column: Option<String>,
    /// Constant value for ASSIGN.
    #[serde(default)]
    pub value: Option<String>,
    /// Derivation-rule text for SPLIT/COMBINE/DERIVATION/REFORMAT.
    #[serde(default)]
    pub derivation: Option<String>,
    /// Codelist code for LOOKUP_RECODE (e.g. "C66731").
    #[serde(default)]
    pub codelist: Option<String>,
    /// Display order within the output dataset.
    #[serde(default)]
    pub order: u32,
}

impl VariableMapping {
    /// True when this mapping is missing an input the pattern depends on.
    ///
    /// ASSIGN needs a constant value; DIRECT/RENAME need a source column.
    /// For a required variable this is a configuration defect; otherwise
    /// the engine degrades and records the problem.
    pub fn structural_defect(&self) -> Option<&'static str> {
        match self.pattern {
            PatternKind::Assign if self.value.is_none() => Some("ASSIGN without a constant value"),
            PatternKind::Direct | PatternKind::Rename if self.source_column.is_none() => {
                Some("DIRECT/RENAME without a source column")
            }
            _ => None,
        }
    }
}

/// Wide-to-tall restructuring declared for a findings domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransposeSpec {
    /// Columns repeated onto every unpivoted row (subject id, visit, ...).
    pub id_columns: Vec<String>,
    /// Source columns turned into one row each.
    pub value_columns: Vec<String>,
    /// Source column -> test code (e.g. "SYSBP").
    pub testcd_map: BTreeMap<String, String>,
    /// Source column -> test label.
    pub test_map: BTreeMap<String, String>,
    /// Source column -> unit, where one applies.
    #[serde(default)]
    pub unit_map: BTreeMap<String, String>,
    /// Target column receiving the test code.
    pub testcd_var: String,
    /// Target column receiving the test label.
    pub test_var: String,
    /// Target column receiving the original result.
    pub result_var: String,
    /// Target column receiving the unit.
    #[serde(default)]
    pub unit_var: Option<String>,
}

/// Origin of a supplemental-qualifier value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuppOrigin {
    Crf,
    Assigned,
    Derived,
    Protocol,
}

impl SuppOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crf => "CRF",
            Self::Assigned => "ASSIGNED",
            Self::Derived => "DERIVED",
            Self::Protocol => "PROTOCOL",
        }
    }
}

/// A non-standard variable routed to the supplemental dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppVariable {
    /// QNAM: qualifier name, at most 8 characters.
    pub name: String,
    /// QLABEL: qualifier label, at most 40 characters.
    pub label: String,
    /// Column of the parent output table holding the value.
    pub source_column: String,
    /// QORIG.
    pub origin: SuppOrigin,
    /// QEVAL: evaluator, blank for collected data.
    #[serde(default)]
    pub evaluator: String,
}

/// The full per-domain mapping specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingSpec {
    /// Target domain code (e.g. "AE").
    pub domain: String,
    /// Domain label (e.g. "Adverse Events").
    #[serde(default)]
    pub label: String,
    /// Observation class (Events, Findings, Interventions, Special Purpose).
    #[serde(default)]
    pub class: String,
    /// Ordered variable mappings.
    pub variables: Vec<VariableMapping>,
    /// Optional wide-to-tall restructuring, applied before the variables.
    #[serde(default)]
    pub transpose: Option<TransposeSpec>,
    /// Non-standard variables for the supplemental dataset.
    #[serde(default)]
    pub supp_variables: Vec<SuppVariable>,
}

impl MappingSpec {
    /// Variables in display order.
    pub fn ordered_variables(&self) -> Vec<&VariableMapping> {
        let mut vars: Vec<&VariableMapping> = self.variables.iter().collect();
        vars.sort_by_key(|v| v.order);
        vars
    }

    /// The domain's sequence variable name ("AESEQ" for "AE").
    pub fn seq_variable(&self) -> String {
        format!("{}SEQ", self.domain.to_uppercase())
    }

    pub fn variable(&self, target: &str) -> Option<&VariableMapping> {
        self.variables
            .iter()
            .find(|v| v.target.eq_ignore_ascii_case(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pattern: PatternKind) -> VariableMapping {
        VariableMapping {
            target: "AETERM".to_string(),
            label: String::new(),
            data_type: VariableType::Char,
            required: true,
            pattern,
            source_table: None,
            source_column: None,
            value: None,
            derivation: None,
            codelist: None,
            order: 1,
        }
    }

    #[test]
    fn assign_without_value_is_structural() {
        let m = mapping(PatternKind::Assign);
        assert!(m.structural_defect().is_some());

        let mut ok = mapping(PatternKind::Assign);
        ok.value = Some("AE".to_string());
        assert!(ok.structural_defect().is_none());
    }

    #[test]
    fn direct_without_source_is_structural() {
        let m = mapping(PatternKind::Direct);
        assert!(m.structural_defect().is_some());

        let mut ok = mapping(PatternKind::Rename);
        ok.source_column = Some("ADVERSE_EVENT".to_string());
        assert!(ok.structural_defect().is_none());
    }

    #[test]
    fn spec_round_trips_through_json() {
        let spec = MappingSpec {
            domain: "AE".to_string(),
            label: "Adverse Events".to_string(),
            class: "Events".to_string(),
            variables: vec![mapping(PatternKind::Direct)],
            transpose: None,
            supp_variables: vec![SuppVariable {
                name: "AESPID".to_string(),
                label: "Sponsor ID".to_string(),
                source_column: "SPID".to_string(),
                origin: SuppOrigin::Crf,
                evaluator: String::new(),
            }],
        };
        let json = serde_json::to_string(&spec).expect("serialize");
        let round: MappingSpec = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(round.domain, "AE");
        assert_eq!(round.seq_variable(), "AESEQ");
        assert_eq!(round.supp_variables[0].origin.as_str(), "CRF");
    }

    #[test]
    fn pattern_kind_uses_screaming_snake_case() {
        let json = serde_json::to_string(&PatternKind::LookupRecode).expect("serialize");
        assert_eq!(json, "\"LOOKUP_RECODE\"");
    }
}

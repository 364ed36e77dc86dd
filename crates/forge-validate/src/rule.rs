//! The conformance-rule contract and shared evaluation helpers.

use std::collections::BTreeMap;

use polars::prelude::DataFrame;

use forge_model::{is_blank, string_values, Finding, MappingSpec, RuleCategory};
use forge_standards::ReferenceData;

/// Everything a rule may look at while evaluating one dataset. Shared
/// read-only; rules are stateless.
pub struct RuleContext<'a> {
    /// Domain code of the dataset under validation.
    pub domain: &'a str,
    pub frame: &'a DataFrame,
    /// The mapping spec that produced the dataset, when available.
    pub spec: Option<&'a MappingSpec>,
    pub refs: &'a ReferenceData,
    /// Every dataset of the submission, for cross-table rules.
    pub tables: &'a BTreeMap<String, DataFrame>,
}

/// One pluggable conformance rule.
///
/// `evaluate` returns findings, never panics its way out of the engine: a
/// rule that cannot run reports `Err` and the engine converts that into a
/// WARNING finding naming the rule.
pub trait ConformanceRule: Send + Sync {
    fn id(&self) -> &'static str;
    fn category(&self) -> RuleCategory;
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String>;
}

/// Column values as trimmed text, `None` when the column is absent.
/// Lookup is case-insensitive.
pub(crate) fn column_text(frame: &DataFrame, name: &str) -> Option<Vec<String>> {
    let actual = frame
        .get_column_names()
        .iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(name))?
        .as_str()
        .to_string();
    string_values(frame, &actual).map(|values| {
        values
            .into_iter()
            .map(|v| v.trim().to_string())
            .collect()
    })
}

pub(crate) fn has_column(frame: &DataFrame, name: &str) -> bool {
    frame
        .get_column_names()
        .iter()
        .any(|c| c.as_str().eq_ignore_ascii_case(name))
}

/// Rows whose value is non-blank, paired with the value.
pub(crate) fn populated_rows(values: &[String]) -> impl Iterator<Item = (usize, &str)> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !is_blank(v))
        .map(|(i, v)| (i, v.as_str()))
}

//! Cross-table context and source-column resolution.
//!
//! The context is assembled once per run from the demographics and
//! subject-element outputs plus the study's visit schedule, then shared
//! read-only with every domain execution.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use polars::prelude::DataFrame;

use forge_model::CaseInsensitiveLookup;

/// One epoch window of a subject's planned elements.
#[derive(Debug, Clone)]
pub struct ElementWindow {
    pub epoch: String,
    pub start: NaiveDate,
    /// Absent end means the window is open-ended.
    pub end: Option<NaiveDate>,
}

/// A planned visit: raw label, number, and canonical name.
#[derive(Debug, Clone)]
pub struct VisitDef {
    pub number: f64,
    pub name: String,
}

/// Read-only lookups shared across domain executions.
#[derive(Debug, Clone, Default)]
pub struct CrossTableContext {
    pub study_id: String,
    reference_dates: HashMap<String, NaiveDate>,
    elements: HashMap<String, Vec<ElementWindow>>,
    visits: BTreeMap<String, VisitDef>,
    custom_aliases: HashMap<String, String>,
}

impl CrossTableContext {
    pub fn new(study_id: impl Into<String>) -> Self {
        Self {
            study_id: study_id.into(),
            ..Self::default()
        }
    }

    /// Per-subject reference start dates, keyed by unique subject id.
    #[must_use]
    pub fn with_reference_dates(mut self, dates: HashMap<String, NaiveDate>) -> Self {
        self.reference_dates = dates;
        self
    }

    /// Per-subject element windows, sorted by start on insertion.
    #[must_use]
    pub fn with_elements(mut self, mut elements: HashMap<String, Vec<ElementWindow>>) -> Self {
        for windows in elements.values_mut() {
            windows.sort_by_key(|w| w.start);
        }
        self.elements = elements;
        self
    }

    /// Visit schedule: raw label -> (number, canonical name). Matching is
    /// exact on the trimmed uppercase label.
    #[must_use]
    pub fn with_visit_schedule(mut self, schedule: impl IntoIterator<Item = (String, VisitDef)>) -> Self {
        self.visits = schedule
            .into_iter()
            .map(|(label, def)| (label.trim().to_uppercase(), def))
            .collect();
        self
    }

    /// Additional requested-name -> source-name overrides.
    #[must_use]
    pub fn with_custom_aliases(mut self, aliases: HashMap<String, String>) -> Self {
        self.custom_aliases = aliases
            .into_iter()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();
        self
    }

    pub fn reference_date(&self, usubjid: &str) -> Option<NaiveDate> {
        self.reference_dates.get(usubjid).copied()
    }

    pub fn element_windows(&self, usubjid: &str) -> &[ElementWindow] {
        self.elements.get(usubjid).map_or(&[], Vec::as_slice)
    }

    pub fn visit(&self, raw_label: &str) -> Option<&VisitDef> {
        self.visits.get(&raw_label.trim().to_uppercase())
    }

    pub fn custom_alias(&self, requested: &str) -> Option<&str> {
        self.custom_aliases
            .get(&requested.to_uppercase())
            .map(String::as_str)
    }

    pub fn has_visit_schedule(&self) -> bool {
        !self.visits.is_empty()
    }
}

/// Synonym groups for columns EDC systems name inconsistently. A requested
/// name in one group resolves to whichever sibling the source table has.
const ALIAS_GROUPS: &[&[&str]] = &[
    &["USUBJID", "SUBJID", "SUBJECT", "SUBJECT_ID", "PATNO", "PATIENT", "PTNO", "SCRNUM"],
    &["SITEID", "SITE", "SITENO", "SITE_ID", "CENTER", "CENTRE"],
    &["VISIT", "VISITNAME", "FOLDER", "FOLDERNAME", "INSTANCENAME"],
    &["VISITNUM", "VISITNO", "FOLDERSEQ"],
    &["SEX", "GENDER"],
    &["BRTHDTC", "BRTHDAT", "BIRTHDATE", "DOB"],
];

/// Resolves requested column names against one source table.
///
/// Resolution order: exact name, case-insensitive name, EDC alias group,
/// custom alias map. The result is always a column that exists in the
/// source table.
#[derive(Debug, Clone)]
pub struct ColumnResolver {
    lookup: CaseInsensitiveLookup,
}

impl ColumnResolver {
    pub fn new(df: &DataFrame) -> Self {
        Self {
            lookup: CaseInsensitiveLookup::new(
                df.get_column_names_owned()
                    .iter()
                    .map(|s| s.to_string()),
            ),
        }
    }

    pub fn resolve(&self, requested: &str, ctx: &CrossTableContext) -> Option<String> {
        if let Some(found) = self.lookup.get(requested) {
            return Some(found.to_string());
        }
        let upper = requested.to_uppercase();
        for group in ALIAS_GROUPS {
            if group.contains(&upper.as_str()) {
                for alias in *group {
                    if let Some(found) = self.lookup.get(alias) {
                        return Some(found.to_string());
                    }
                }
            }
        }
        if let Some(mapped) = ctx.custom_alias(requested) {
            if let Some(found) = self.lookup.get(mapped) {
                return Some(found.to_string());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::Column;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new("PatNo".into(), vec!["1001", "1002"]),
            Column::new("Center".into(), vec!["01", "01"]),
            Column::new("FolderName".into(), vec!["SCREENING", "WEEK 2"]),
        ])
        .expect("frame")
    }

    #[test]
    fn resolves_exact_and_case_insensitive() {
        let resolver = ColumnResolver::new(&frame());
        let ctx = CrossTableContext::new("STUDY01");
        assert_eq!(resolver.resolve("PatNo", &ctx).as_deref(), Some("PatNo"));
        assert_eq!(resolver.resolve("PATNO", &ctx).as_deref(), Some("PatNo"));
    }

    #[test]
    fn resolves_through_alias_groups() {
        let resolver = ColumnResolver::new(&frame());
        let ctx = CrossTableContext::new("STUDY01");
        assert_eq!(resolver.resolve("SUBJID", &ctx).as_deref(), Some("PatNo"));
        assert_eq!(resolver.resolve("SITEID", &ctx).as_deref(), Some("Center"));
        assert_eq!(
            resolver.resolve("VISIT", &ctx).as_deref(),
            Some("FolderName")
        );
        assert_eq!(resolver.resolve("AETERM", &ctx), None);
    }

    #[test]
    fn custom_aliases_come_last() {
        let resolver = ColumnResolver::new(&frame());
        let ctx = CrossTableContext::new("STUDY01").with_custom_aliases(HashMap::from([(
            "AETERM".to_string(),
            "PatNo".to_string(),
        )]));
        assert_eq!(resolver.resolve("AETERM", &ctx).as_deref(), Some("PatNo"));
    }

    #[test]
    fn visit_lookup_is_exact_on_normalized_label() {
        let ctx = CrossTableContext::new("STUDY01").with_visit_schedule([(
            "Week 2".to_string(),
            VisitDef {
                number: 2.0,
                name: "WEEK 2".to_string(),
            },
        )]);
        assert!(ctx.visit("week 2 ").is_some());
        assert!(ctx.visit("WEEK 3").is_none());
    }
}

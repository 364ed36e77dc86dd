//! The rule registry and per-dataset validation pass.

use std::collections::BTreeMap;

use polars::prelude::DataFrame;
use tracing::{debug, warn};

use forge_model::{Finding, MappingSpec, Severity, Whitelist};
use forge_standards::ReferenceData;

use crate::rule::{ConformanceRule, RuleContext};
use crate::rules::standard_rules;
use crate::submission::{submission_checks, SubmissionInput};

/// Owns the rule registry for the process lifetime. Rules are stateless, so
/// one validator serves every domain and every auto-fix iteration.
pub struct Validator {
    rules: Vec<Box<dyn ConformanceRule>>,
    whitelist: Whitelist,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: standard_rules(),
            whitelist: Whitelist::default(),
        }
    }

    /// Attach known-false-positive entries applied after every pass.
    #[must_use]
    pub fn with_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.whitelist = whitelist;
        self
    }

    /// Run every registered rule against one dataset.
    ///
    /// A rule that fails to run becomes a single WARNING finding naming the
    /// rule; it never aborts the pass.
    pub fn validate_table(
        &self,
        domain: &str,
        frame: &DataFrame,
        spec: Option<&MappingSpec>,
        refs: &ReferenceData,
        tables: &BTreeMap<String, DataFrame>,
    ) -> Vec<Finding> {
        let ctx = RuleContext {
            domain,
            frame,
            spec,
            refs,
            tables,
        };
        let mut findings = Vec::new();
        for rule in &self.rules {
            match rule.evaluate(&ctx) {
                Ok(mut result) => findings.append(&mut result),
                Err(message) => {
                    warn!(rule = rule.id(), domain, %message, "rule failed to run");
                    findings.push(Finding::new(
                        rule.id(),
                        rule.category(),
                        Severity::Warning,
                        domain,
                        format!("rule {} could not run: {message}", rule.id()),
                    ));
                }
            }
        }
        let waived = self.whitelist.apply(&mut findings);
        if waived > 0 {
            debug!(domain, waived, "findings waived by whitelist");
        }
        findings
    }

    /// Validate every dataset of a submission plus the submission-level
    /// rejection checks.
    pub fn validate_submission(
        &self,
        tables: &BTreeMap<String, DataFrame>,
        specs: &BTreeMap<String, MappingSpec>,
        refs: &ReferenceData,
        input: &SubmissionInput<'_>,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (domain, frame) in tables {
            let spec = specs
                .iter()
                .find(|(code, _)| code.eq_ignore_ascii_case(domain))
                .map(|(_, s)| s);
            findings.extend(self.validate_table(domain, frame, spec, refs, tables));
        }
        let mut rejection = submission_checks(input);
        self.whitelist.apply(&mut rejection);
        findings.extend(rejection);
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_model::{RuleCategory, WhitelistEntry};
    use polars::prelude::Column;

    struct AlwaysBroken;

    impl ConformanceRule for AlwaysBroken {
        fn id(&self) -> &'static str {
            "TEST999"
        }

        fn category(&self) -> RuleCategory {
            RuleCategory::Consistency
        }

        fn evaluate(&self, _ctx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
            Err("reference data unavailable".to_string())
        }
    }

    #[test]
    fn broken_rule_becomes_a_warning_finding() {
        let mut validator = Validator::new();
        validator.rules.push(Box::new(AlwaysBroken));
        let refs = ReferenceData::builtin().expect("refs");
        let tables = BTreeMap::new();
        let frame = DataFrame::new(vec![Column::new(
            "USUBJID".into(),
            vec!["S-01-1001"],
        )])
        .expect("frame");

        let findings = validator.validate_table("AE", &frame, None, &refs, &tables);
        let broken = findings
            .iter()
            .find(|f| f.rule_id == "TEST999")
            .expect("broken-rule finding");
        assert_eq!(broken.severity, Severity::Warning);
        assert!(broken.message.contains("could not run"));
    }

    #[test]
    fn whitelist_waives_matching_findings() {
        let whitelist = Whitelist {
            entries: vec![WhitelistEntry {
                rule_id: "PRES002".to_string(),
                domain: Some("AE".to_string()),
                variable: None,
                value: None,
                reason: "legacy study, expected variables reviewed".to_string(),
            }],
        };
        let validator = Validator::new().with_whitelist(whitelist);
        let refs = ReferenceData::builtin().expect("refs");
        let tables = BTreeMap::new();
        let frame = DataFrame::new(vec![Column::new(
            "USUBJID".into(),
            vec!["S-01-1001"],
        )])
        .expect("frame");

        let findings = validator.validate_table("AE", &frame, None, &refs, &tables);
        assert!(findings
            .iter()
            .filter(|f| f.rule_id == "PRES002")
            .all(|f| f.waived));
        assert!(findings
            .iter()
            .filter(|f| f.rule_id == "PRES001")
            .all(|f| !f.waived));
    }
}

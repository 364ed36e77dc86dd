//! Reviewer-approved waivers for known validation findings.
//!
//! A whitelist entry matches findings by rule id plus optional domain,
//! variable, and value scopes. An absent or `"*"` scope matches anything.
//! Matched findings are marked waived and excluded from blocking counts.

use crate::finding::Finding;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistEntry {
    /// Rule id the waiver applies to (e.g. "TERM001").
    pub rule_id: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub variable: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    /// Reviewer rationale, carried into the report.
    #[serde(default)]
    pub reason: String,
}

impl WhitelistEntry {
    pub fn matches(&self, finding: &Finding) -> bool {
        self.rule_id.eq_ignore_ascii_case(&finding.rule_id)
            && scope_matches(self.domain.as_deref(), Some(finding.domain.as_str()))
            && scope_matches(self.variable.as_deref(), finding.variable.as_deref())
            && scope_matches(self.value.as_deref(), finding.value.as_deref())
    }
}

fn scope_matches(scope: Option<&str>, actual: Option<&str>) -> bool {
    match scope {
        None => true,
        Some("*") => true,
        Some(expected) => actual.is_some_and(|a| a.eq_ignore_ascii_case(expected)),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Whitelist {
    #[serde(default)]
    pub entries: Vec<WhitelistEntry>,
}

impl Whitelist {
    /// The first entry matching `finding`, if any.
    pub fn matching_entry(&self, finding: &Finding) -> Option<&WhitelistEntry> {
        self.entries.iter().find(|entry| entry.matches(finding))
    }

    /// Mark every matched finding as waived. Returns the number waived.
    pub fn apply(&self, findings: &mut [Finding]) -> usize {
        let mut waived = 0;
        for finding in findings.iter_mut() {
            if !finding.waived && self.matching_entry(finding).is_some() {
                finding.waived = true;
                waived += 1;
            }
        }
        waived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{RuleCategory, Severity};

    fn finding() -> Finding {
        Finding::new(
            "TERM001",
            RuleCategory::Terminology,
            Severity::Error,
            "DM",
            "value not in codelist",
        )
        .with_variable("SEX")
        .with_value("UNKNOWN")
    }

    #[test]
    fn wildcard_and_absent_scopes_match() {
        let entry = WhitelistEntry {
            rule_id: "TERM001".to_string(),
            domain: Some("*".to_string()),
            variable: None,
            value: Some("unknown".to_string()),
            reason: "sponsor-confirmed".to_string(),
        };
        assert!(entry.matches(&finding()));
    }

    #[test]
    fn mismatched_scope_does_not_match() {
        let entry = WhitelistEntry {
            rule_id: "TERM001".to_string(),
            domain: Some("AE".to_string()),
            variable: None,
            value: None,
            reason: String::new(),
        };
        assert!(!entry.matches(&finding()));
    }

    #[test]
    fn apply_marks_findings_waived_once() {
        let whitelist = Whitelist {
            entries: vec![WhitelistEntry {
                rule_id: "TERM001".to_string(),
                domain: None,
                variable: None,
                value: None,
                reason: String::new(),
            }],
        };
        let mut findings = vec![finding(), finding()];
        assert_eq!(whitelist.apply(&mut findings), 2);
        assert!(findings.iter().all(|f| f.waived));
        assert_eq!(whitelist.apply(&mut findings), 0);
    }
}

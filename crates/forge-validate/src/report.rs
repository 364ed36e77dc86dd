//! Aggregated validation report, serializable for downstream tooling.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use forge_model::{Finding, Severity};

use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub generated_at: String,
    pub error_count: usize,
    pub warning_count: usize,
    pub notice_count: usize,
    pub info_count: usize,
    pub waived_count: usize,
    /// No unwaived ERROR findings remain.
    pub submission_ready: bool,
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn from_findings(mut findings: Vec<Finding>) -> Self {
        findings.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then_with(|| a.domain.cmp(&b.domain))
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });

        let active = |severity: Severity| {
            findings
                .iter()
                .filter(|f| !f.waived && f.severity == severity)
                .count()
        };
        let error_count = active(Severity::Error);
        Self {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            error_count,
            warning_count: active(Severity::Warning),
            notice_count: active(Severity::Notice),
            info_count: active(Severity::Info),
            waived_count: findings.iter().filter(|f| f.waived).count(),
            submission_ready: error_count == 0,
            findings,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_model::RuleCategory;

    #[test]
    fn waived_errors_do_not_block() {
        let mut error = Finding::new(
            "TERM001",
            RuleCategory::Terminology,
            Severity::Error,
            "DM",
            "bad value",
        );
        error.waived = true;
        let warning = Finding::new(
            "PRES002",
            RuleCategory::Presence,
            Severity::Warning,
            "DM",
            "missing expected variable",
        );

        let report = ValidationReport::from_findings(vec![error, warning]);
        assert_eq!(report.error_count, 0);
        assert_eq!(report.warning_count, 1);
        assert_eq!(report.waived_count, 1);
        assert!(report.submission_ready);
    }

    #[test]
    fn findings_sort_errors_first() {
        let warning = Finding::new(
            "PRES002",
            RuleCategory::Presence,
            Severity::Warning,
            "AE",
            "w",
        );
        let error = Finding::new(
            "PRES001",
            RuleCategory::Presence,
            Severity::Error,
            "VS",
            "e",
        );
        let report = ValidationReport::from_findings(vec![warning, error]);
        assert_eq!(report.findings[0].severity, Severity::Error);
        let json = report.to_json().expect("json");
        assert!(json.contains("\"submission_ready\": false"));
    }
}

//! Validation findings and the fix actions attached to them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a finding, ordered so that `Error` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
    Notice,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Notice => "NOTICE",
            Self::Info => "INFO",
        }
    }

    /// Whether this severity blocks submission output.
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Functional family a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Terminology,
    Presence,
    Consistency,
    Limit,
    Format,
    Submission,
}

impl RuleCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Terminology => "terminology",
            Self::Presence => "presence",
            Self::Consistency => "consistency",
            Self::Limit => "limit",
            Self::Format => "format",
            Self::Submission => "submission",
        }
    }
}

/// What an automatic fix would do, if one is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixKind {
    /// Replace each offending cell with a corrected value.
    ReplaceValue,
    /// Add a missing column filled with a constant.
    AddColumn,
    /// The rule knows the data is wrong but not how to correct it.
    NeedsHuman,
}

/// A concrete, machine-applicable correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixAction {
    pub kind: FixKind,
    /// Column the fix writes to.
    pub column: String,
    /// Replacement or fill value. Empty for `NeedsHuman`.
    #[serde(default)]
    pub new_value: String,
    /// Rows affected, when the fix is cell-scoped. Empty means whole column.
    #[serde(default)]
    pub rows: Vec<usize>,
}

impl FixAction {
    /// Whether the engine may apply this fix without a reviewer.
    pub fn is_automatic(&self) -> bool {
        !matches!(self.kind, FixKind::NeedsHuman)
    }
}

/// One validation finding against one dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Stable rule identifier (e.g. "TERM001").
    pub rule_id: String,
    pub category: RuleCategory,
    pub severity: Severity,
    /// Domain the finding was raised against.
    pub domain: String,
    /// Variable involved, when the rule is variable-scoped.
    #[serde(default)]
    pub variable: Option<String>,
    /// Zero-based row indices of the offending records.
    #[serde(default)]
    pub rows: Vec<usize>,
    /// Human-readable description.
    pub message: String,
    /// Offending value, when a single value is at fault.
    #[serde(default)]
    pub value: Option<String>,
    /// Attached correction, when the rule can propose one.
    #[serde(default)]
    pub fix: Option<FixAction>,
    /// Set when a whitelist entry downgraded or suppressed this finding.
    #[serde(default)]
    pub waived: bool,
}

impl Finding {
    pub fn new(
        rule_id: impl Into<String>,
        category: RuleCategory,
        severity: Severity,
        domain: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            category,
            severity,
            domain: domain.into(),
            variable: None,
            rows: Vec::new(),
            message: message.into(),
            value: None,
            fix: None,
            waived: false,
        }
    }

    #[must_use]
    pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }

    #[must_use]
    pub fn with_rows(mut self, rows: Vec<usize>) -> Self {
        self.rows = rows;
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_fix(mut self, fix: FixAction) -> Self {
        self.fix = Some(fix);
        self
    }

    /// Whether the auto-fix loop may act on this finding.
    pub fn is_auto_fixable(&self) -> bool {
        !self.waived && self.fix.as_ref().is_some_and(FixAction::is_automatic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_error_first() {
        let mut sevs = vec![
            Severity::Info,
            Severity::Error,
            Severity::Notice,
            Severity::Warning,
        ];
        sevs.sort();
        assert_eq!(
            sevs,
            vec![
                Severity::Error,
                Severity::Warning,
                Severity::Notice,
                Severity::Info
            ]
        );
    }

    #[test]
    fn needs_human_is_not_automatic() {
        let fix = FixAction {
            kind: FixKind::NeedsHuman,
            column: "AESEV".to_string(),
            new_value: String::new(),
            rows: vec![3],
        };
        assert!(!fix.is_automatic());

        let finding = Finding::new(
            "CONS002",
            RuleCategory::Consistency,
            Severity::Error,
            "AE",
            "start date after end date",
        )
        .with_fix(fix);
        assert!(!finding.is_auto_fixable());
    }

    #[test]
    fn waived_finding_is_never_fixable() {
        let finding = Finding::new(
            "TERM002",
            RuleCategory::Terminology,
            Severity::Warning,
            "DM",
            "case mismatch",
        )
        .with_fix(FixAction {
            kind: FixKind::ReplaceValue,
            column: "SEX".to_string(),
            new_value: "M".to_string(),
            rows: vec![0],
        });
        assert!(finding.is_auto_fixable());

        let mut waived = finding;
        waived.waived = true;
        assert!(!waived.is_auto_fixable());
    }
}

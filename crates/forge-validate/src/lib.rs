//! Layered conformance validation for generated submission datasets.
//!
//! A [`Validator`] owns an ordered registry of stateless rules, each
//! producing categorized [`forge_model::Finding`]s. The auto-fix loop in
//! [`autofix`] applies the small set of mechanically safe corrections and
//! re-validates until convergence.

pub mod autofix;
mod error;
pub mod report;
pub mod rule;
pub mod rules;
pub mod submission;
mod validator;

pub use autofix::{AppliedFix, FixLoopResult, AUTO_FIX_RULES};
pub use error::{Result, ValidateError};
pub use report::ValidationReport;
pub use rule::{ConformanceRule, RuleContext};
pub use submission::{submission_checks, SubmissionInput};
pub use validator::Validator;

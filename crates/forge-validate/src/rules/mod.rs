//! The built-in conformance rules, grouped by category.

pub mod consistency;
pub mod format;
pub mod limit;
pub mod presence;
pub mod terminology;

use crate::rule::ConformanceRule;

/// The standard registry, in evaluation order.
pub fn standard_rules() -> Vec<Box<dyn ConformanceRule>> {
    vec![
        Box::new(presence::RequiredVariablePresence),
        Box::new(presence::ExpectedVariablePresence),
        Box::new(presence::NonEmptyDataset),
        Box::new(presence::MissingConstantColumn),
        Box::new(presence::RequiredValueCompleteness),
        Box::new(terminology::CodelistConformance),
        Box::new(terminology::DomainValueConformance),
        Box::new(consistency::SupplementalIntegrity),
        Box::new(consistency::SubjectIdentifierIntegrity),
        Box::new(consistency::CrossDomainSubjects),
        Box::new(consistency::ArmConsistency),
        Box::new(limit::NameAndLabelLength),
        Box::new(limit::ValueByteLength),
        Box::new(limit::DatasetSize),
        Box::new(format::DateFormatConformance),
        Box::new(format::AsciiOnly),
        Box::new(format::FileNameEligibleDomain),
        Box::new(format::VariableOrdering),
    ]
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A required variable's mapping is missing an input the pattern needs.
    /// This is a configuration defect, not a data defect.
    #[error("structural defect in required variable {variable}: {reason}")]
    Structural { variable: String, reason: String },

    #[error("no source table available for domain {domain}")]
    NoSourceTable { domain: String },

    #[error("cannot parse derivation for {variable}: {reason}")]
    DerivationParse { variable: String, reason: String },

    #[error(transparent)]
    Standards(#[from] forge_standards::StandardsError),

    #[error(transparent)]
    Polars(#[from] polars::prelude::PolarsError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XptError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("invalid XPT format: {0}")]
    InvalidFormat(String),

    #[error("missing {0} header record")]
    MissingHeader(&'static str),

    #[error("invalid NAMESTR record {index}: {message}")]
    InvalidNamestr { index: usize, message: String },

    #[error("row has {actual} values, expected {expected}")]
    RowLengthMismatch { expected: usize, actual: usize },

    #[error("record out of bounds at offset {offset}")]
    RecordOutOfBounds { offset: usize },

    #[error("non-space trailing bytes after last observation")]
    TrailingBytes,

    #[error("cannot parse numeric field: {field}")]
    NumericParse { field: String },

    /// The dataset failed pre-write validation. All problems are reported
    /// together and no file is created.
    #[error("dataset {name} failed validation: {}", issues.join("; "))]
    DatasetValidation { name: String, issues: Vec<String> },

    /// The written file did not read back equal to what was written.
    #[error("write verification failed for {name}: {message}")]
    WriteIntegrity { name: String, message: String },
}

impl XptError {
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat(message.into())
    }
}

pub type Result<T> = std::result::Result<T, XptError>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StandardsError {
    #[error("csv error in {table}: {message}")]
    Csv { table: String, message: String },
    #[error("unknown domain: {0}")]
    UnknownDomain(String),
    #[error("unknown codelist: {0}")]
    UnknownCodelist(String),
}

pub type Result<T> = std::result::Result<T, StandardsError>;

//! Mapping-spec execution engine.
//!
//! Interprets a declarative [`forge_model::MappingSpec`] against raw source
//! tables: pattern dispatch per variable, a small derivation mini-language,
//! cross-table lookups (reference dates, element windows, visit schedule),
//! wide-to-tall transposition, and supplemental-qualifier generation.

pub mod context;
pub mod dates;
pub mod derivation;
pub mod derive;
mod error;
mod execute;
pub mod relationships;
pub mod supp;
pub mod transpose;

pub use context::{ColumnResolver, CrossTableContext, ElementWindow, VisitDef};
pub use error::{EngineError, Result};
pub use execute::{execute, ExecutionOutcome, ExecutionProblem, ProblemKind};

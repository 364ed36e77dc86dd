pub mod error;
pub mod finding;
pub mod frame;
pub mod lookup;
pub mod spec;
pub mod whitelist;

pub use error::{ModelError, Result};
pub use finding::{Finding, FixAction, FixKind, RuleCategory, Severity};
pub use frame::{any_to_string, is_blank, string_values};
pub use lookup::CaseInsensitiveLookup;
pub use spec::{
    MappingSpec, PatternKind, SuppOrigin, SuppVariable, TransposeSpec, VariableMapping,
    VariableType,
};
pub use whitelist::{Whitelist, WhitelistEntry};

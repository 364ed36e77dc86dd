//! SAS Transport (XPT) V5 reader and writer.
//!
//! Submission datasets leave the pipeline through [`write_table`], which
//! validates the dataset against the format's structural limits, writes the
//! file, then reads it back and compares every cell. A dataset that cannot
//! be represented faithfully is rejected before any file exists.
//!
//! ```no_run
//! use std::path::Path;
//! use forge_xpt::{XptColumn, XptDataset, XptValue, write_table};
//!
//! let mut ds = XptDataset::with_columns(
//!     "DM",
//!     vec![
//!         XptColumn::character("USUBJID", 20).with_label("Unique Subject Identifier"),
//!         XptColumn::numeric("AGE").with_label("Age"),
//!     ],
//! )
//! .with_label("Demographics");
//! ds.add_row(vec![XptValue::character("STUDY01-001"), XptValue::numeric(35.0)]);
//! write_table(Path::new("dm.xpt"), &ds).unwrap();
//! ```

mod error;
pub mod float;
pub mod header;
mod reader;
mod types;
mod writer;

pub use error::{Result, XptError};
pub use reader::{XptReader, read_xpt};
pub use types::{MissingValue, NumericValue, XptColumn, XptDataset, XptType, XptValue};
pub use writer::{MAX_CHAR_LENGTH, XptWriter, validate_table, write_table};

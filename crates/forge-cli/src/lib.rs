//! Command-line front end for the SDTM mapping pipeline.

pub mod cli;
pub mod logging;
pub mod pipeline;

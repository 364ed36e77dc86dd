//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};

use crate::logging::LogFormat;

#[derive(Debug, Parser)]
#[command(
    name = "sdtm-forge",
    version,
    about = "Map raw clinical data to SDTM datasets and write SAS transport files"
)]
pub struct Cli {
    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::default())]
    pub log_format: LogFormat,

    /// Mirror log output into a file.
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Allow row-level cell values (subject data) in log output.
    #[arg(long, global = true)]
    pub log_data: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a study end to end: execute specs, validate, auto-fix, write XPT.
    Study(StudyArgs),
    /// List the domains the built-in reference data covers.
    Domains,
}

#[derive(Debug, Args)]
pub struct StudyArgs {
    /// Folder containing the raw CSV tables.
    pub study_folder: PathBuf,

    /// Folder of per-domain mapping specifications (JSON).
    #[arg(long, value_name = "DIR")]
    pub specs: PathBuf,

    /// Output folder for XPT files and the validation report.
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Reviewed-findings whitelist (JSON).
    #[arg(long, value_name = "PATH")]
    pub whitelist: Option<PathBuf>,

    /// Upper bound on auto-fix iterations.
    #[arg(long, default_value_t = 5)]
    pub max_fix_iterations: u32,

    /// Execute and validate without writing any output files.
    #[arg(long)]
    pub dry_run: bool,

    /// Write datasets even when unwaived conformance errors remain.
    #[arg(long)]
    pub continue_on_errors: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn study_arguments_parse() {
        let cli = Cli::parse_from([
            "sdtm-forge",
            "study",
            "raw/",
            "--specs",
            "specs/",
            "--output",
            "out/",
            "--dry-run",
        ]);
        match cli.command {
            Command::Study(args) => {
                assert!(args.dry_run);
                assert_eq!(args.max_fix_iterations, 5);
                assert!(!args.continue_on_errors);
            }
            Command::Domains => panic!("expected study command"),
        }
    }
}

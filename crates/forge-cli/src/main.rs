//! SDTM Forge CLI.

use clap::Parser;

use forge_cli::cli::{Cli, Command, StudyArgs};
use forge_cli::logging::{init_logging, LogConfig};
use forge_cli::pipeline::{run_study, StudyConfig};

fn main() {
    let cli = Cli::parse();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error:#}");
        std::process::exit(1);
    }
    let exit_code = match cli.command {
        Command::Study(args) => match run_study(&study_config(&args)) {
            Ok(outcome) => {
                print_summary(&outcome);
                if outcome.report.submission_ready {
                    0
                } else {
                    1
                }
            }
            Err(error) => {
                eprintln!("error: {error:#}");
                1
            }
        },
        Command::Domains => match run_domains() {
            Ok(()) => 0,
            Err(error) => {
                eprintln!("error: {error:#}");
                1
            }
        },
    };
    std::process::exit(exit_code);
}

fn log_config_from_cli(cli: &Cli) -> LogConfig {
    LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        use_env_filter: !cli.verbosity.is_present(),
        format: cli.log_format,
        log_file: cli.log_file.clone(),
        log_data: cli.log_data,
    }
}

fn study_config(args: &StudyArgs) -> StudyConfig {
    StudyConfig {
        study_folder: args.study_folder.clone(),
        spec_folder: args.specs.clone(),
        output_dir: args.output.clone(),
        whitelist: args.whitelist.clone(),
        max_fix_iterations: args.max_fix_iterations,
        dry_run: args.dry_run,
        continue_on_errors: args.continue_on_errors,
    }
}

fn print_summary(outcome: &forge_cli::pipeline::StudyOutcome) {
    println!("datasets:         {}", outcome.datasets.join(", "));
    println!("files written:    {}", outcome.files_written.len());
    println!("mapping problems: {}", outcome.execution_problems);
    println!("fixes applied:    {}", outcome.fixes_applied);
    println!(
        "validation:       {} error(s), {} warning(s), {} waived",
        outcome.report.error_count, outcome.report.warning_count, outcome.report.waived_count
    );
    println!(
        "submission ready: {}",
        if outcome.report.submission_ready {
            "yes"
        } else {
            "no"
        }
    );
}

fn run_domains() -> anyhow::Result<()> {
    let refs = forge_standards::ReferenceData::builtin()?;
    for domain in refs.domains() {
        println!("{:<8} {:<16} {}", domain.code, domain.class, domain.label);
    }
    Ok(())
}

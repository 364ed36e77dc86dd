//! The end-to-end study pipeline.
//!
//! Stages: load mapping specs, ingest raw CSV tables, execute domains
//! (demographics first so later domains see reference dates, then subject
//! elements for epoch windows), derive supplemental datasets, run the
//! validation and auto-fix loop, and write transport files plus the
//! validation report.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use polars::prelude::{AnyValue, CsvReadOptions, DataFrame, DataType, SerReader};
use tracing::{debug, info, info_span, warn};

use forge_engine::dates::full_date;
use forge_engine::{execute, supp, CrossTableContext, ElementWindow, VisitDef};
use forge_model::{
    any_to_string, string_values, CaseInsensitiveLookup, MappingSpec, PatternKind, Whitelist,
};
use forge_standards::ReferenceData;
use forge_validate::{autofix, SubmissionInput, ValidationReport, Validator};
use forge_xpt::{write_table, XptColumn, XptDataset, XptValue};

/// Everything `run_study` needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct StudyConfig {
    pub study_folder: PathBuf,
    pub spec_folder: PathBuf,
    pub output_dir: PathBuf,
    pub whitelist: Option<PathBuf>,
    pub max_fix_iterations: u32,
    pub dry_run: bool,
    pub continue_on_errors: bool,
}

/// Summary of one pipeline run.
#[derive(Debug)]
pub struct StudyOutcome {
    /// Dataset names produced, in written order.
    pub datasets: Vec<String>,
    /// Paths of the transport files actually written.
    pub files_written: Vec<PathBuf>,
    pub execution_problems: usize,
    pub fixes_applied: usize,
    pub report: ValidationReport,
}

pub fn run_study(config: &StudyConfig) -> Result<StudyOutcome> {
    let refs = ReferenceData::builtin().context("load reference data")?;
    let specs = load_specs(&config.spec_folder)?;
    let raw = read_raw_tables(&config.study_folder)?;

    let study_id = study_identifier(&specs, &config.study_folder);
    let mut ctx = CrossTableContext::new(study_id.clone());
    if let Some(schedule) = visit_schedule(&raw) {
        ctx = ctx.with_visit_schedule(schedule);
    }

    let mut outputs: BTreeMap<String, DataFrame> = BTreeMap::new();
    let mut widths: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    let mut execution_problems = 0;

    for domain in execution_order(&specs) {
        let spec = &specs[&domain];
        let span = info_span!("execute", domain = %domain);
        let _guard = span.enter();

        let outcome = execute(spec, &raw, &ctx, &refs)
            .with_context(|| format!("execute mapping for {domain}"))?;
        for problem in &outcome.problems {
            warn!(
                variable = %problem.variable,
                kind = ?problem.kind,
                rows = problem.rows,
                "{}",
                problem.message
            );
        }
        execution_problems += outcome.problems.len();
        // Visit labels are collected data, so they go through the redaction
        // guard.
        for (label, rows) in &outcome.unmatched_visits {
            warn!(
                rows = *rows,
                visit = crate::logging::redact_value(label),
                "visit label missing from the schedule"
            );
        }
        info!(rows = outcome.frame.height(), "domain executed");

        // Later domains derive study days and epochs from these.
        if domain == "DM" {
            ctx = ctx.with_reference_dates(reference_dates(&outcome.frame));
        } else if domain == "SE" {
            ctx = ctx.with_elements(element_windows(&outcome.frame));
        }

        widths.insert(domain.clone(), outcome.column_widths);
        outputs.insert(domain, outcome.frame);
    }

    for (domain, spec) in &specs {
        if spec.supp_variables.is_empty() {
            continue;
        }
        let Some(parent) = outputs.get(domain) else {
            continue;
        };
        let frame = supp::generate(parent, domain, &study_id, &spec.supp_variables)
            .with_context(|| format!("generate supplemental qualifiers for {domain}"))?;
        if frame.height() > 0 {
            debug!(domain = %domain, rows = frame.height(), "supplemental dataset generated");
            outputs.insert(format!("SUPP{domain}"), frame);
        }
    }

    // No cross-domain links are declared yet; the stub keeps the dataset
    // set complete for downstream tooling that expects RELREC.
    outputs.insert(
        "RELREC".to_string(),
        forge_engine::relationships::empty_relrec()?,
    );

    let validator = match &config.whitelist {
        Some(path) => Validator::new().with_whitelist(load_whitelist(path)?),
        None => Validator::new(),
    };
    let fix_result = autofix::run(
        &validator,
        &specs,
        &mut outputs,
        &refs,
        config.max_fix_iterations,
    )?;
    if !fix_result.converged {
        warn!(
            iterations = fix_result.iterations_run,
            "auto-fix loop hit its iteration bound before converging"
        );
    }

    let file_names: Vec<String> = outputs
        .keys()
        .map(|d| format!("{}.xpt", d.to_lowercase()))
        .collect();
    let define_present = config.study_folder.join("define.xml").exists()
        || config.output_dir.join("define.xml").exists();
    let findings = validator.validate_submission(
        &outputs,
        &specs,
        &refs,
        &SubmissionInput {
            tables: &outputs,
            file_names: &file_names,
            define_present,
        },
    );
    let report = ValidationReport::from_findings(findings);

    let mut files_written = Vec::new();
    if config.dry_run {
        info!("dry run, skipping all output files");
    } else {
        fs::create_dir_all(&config.output_dir)
            .with_context(|| format!("create {}", config.output_dir.display()))?;
        fs::write(
            config.output_dir.join("validation_report.json"),
            report.to_json()?,
        )
        .context("write validation report")?;
        fs::write(
            config.output_dir.join("fix_log.json"),
            serde_json::to_string_pretty(&fix_result.fix_actions)?,
        )
        .context("write fix log")?;

        if report.submission_ready || config.continue_on_errors {
            for (domain, frame) in &outputs {
                let dataset = build_dataset(domain, frame, &specs, &refs, widths.get(domain))?;
                let path = config
                    .output_dir
                    .join(format!("{}.xpt", domain.to_lowercase()));
                write_table(&path, &dataset)
                    .with_context(|| format!("write {}", path.display()))?;
                files_written.push(path);
            }
        } else {
            warn!(
                errors = report.error_count,
                "unwaived conformance errors remain, not writing datasets"
            );
        }
    }

    info!(
        datasets = outputs.len(),
        written = files_written.len(),
        errors = report.error_count,
        warnings = report.warning_count,
        fixed = fix_result.total_fixed,
        "study pipeline finished"
    );

    Ok(StudyOutcome {
        datasets: outputs.keys().cloned().collect(),
        files_written,
        execution_problems,
        fixes_applied: fix_result.total_fixed,
        report,
    })
}

/// Load every `*.json` mapping spec in a folder, keyed by uppercase domain.
pub fn load_specs(dir: &Path) -> Result<BTreeMap<String, MappingSpec>> {
    let mut specs = BTreeMap::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("read spec folder {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("read spec {}", path.display()))?;
        let spec: MappingSpec = serde_json::from_str(&text)
            .with_context(|| format!("parse spec {}", path.display()))?;
        let domain = spec.domain.to_uppercase();
        debug!(domain = %domain, variables = spec.variables.len(), "spec loaded");
        specs.insert(domain, spec);
    }
    if specs.is_empty() {
        anyhow::bail!("no mapping specs found in {}", dir.display());
    }
    Ok(specs)
}

/// Read every `*.csv` in the study folder, keyed by lowercase file stem.
///
/// All columns come in as strings; typing is the engine's concern.
pub fn read_raw_tables(dir: &Path) -> Result<HashMap<String, DataFrame>> {
    let mut tables = HashMap::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("read study folder {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_none_or(|ext| ext != "csv") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(path.clone()))
            .with_context(|| format!("open {}", path.display()))?
            .finish()
            .with_context(|| format!("read {}", path.display()))?;
        debug!(table = %stem, rows = df.height(), columns = df.width(), "raw table read");
        tables.insert(stem.to_lowercase(), df);
    }
    if tables.is_empty() {
        anyhow::bail!("no raw CSV tables found in {}", dir.display());
    }
    Ok(tables)
}

fn load_whitelist(path: &Path) -> Result<Whitelist> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read whitelist {}", path.display()))?;
    let whitelist: Whitelist = serde_json::from_str(&text)
        .with_context(|| format!("parse whitelist {}", path.display()))?;
    info!(entries = whitelist.entries.len(), "whitelist loaded");
    Ok(whitelist)
}

/// The study id: the DM spec's STUDYID constant, else any spec's, else the
/// study folder name.
fn study_identifier(specs: &BTreeMap<String, MappingSpec>, study_folder: &Path) -> String {
    let assigned = |spec: &MappingSpec| {
        spec.variable("STUDYID")
            .filter(|v| v.pattern == PatternKind::Assign)
            .and_then(|v| v.value.clone())
    };
    specs
        .get("DM")
        .and_then(assigned)
        .or_else(|| specs.values().find_map(assigned))
        .unwrap_or_else(|| {
            study_folder
                .file_name()
                .map_or_else(|| "STUDY".to_string(), |n| n.to_string_lossy().to_string())
        })
}

/// Demographics first, subject elements second, the rest alphabetically.
fn execution_order(specs: &BTreeMap<String, MappingSpec>) -> Vec<String> {
    let rank = |d: &str| match d {
        "DM" => 0u8,
        "SE" => 1,
        _ => 2,
    };
    let mut order: Vec<String> = specs.keys().cloned().collect();
    order.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| a.cmp(b)));
    order
}

/// Per-subject reference start dates from the executed DM frame.
fn reference_dates(dm: &DataFrame) -> HashMap<String, NaiveDate> {
    let lookup = column_lookup(dm);
    let mut dates = HashMap::new();
    let Some(subjects) = lookup.get("USUBJID").and_then(|c| string_values(dm, c)) else {
        return dates;
    };
    let Some(starts) = lookup.get("RFSTDTC").and_then(|c| string_values(dm, c)) else {
        return dates;
    };
    for (subject, start) in subjects.iter().zip(&starts) {
        if let Some(date) = full_date(start) {
            dates.entry(subject.clone()).or_insert(date);
        }
    }
    dates
}

/// Per-subject epoch windows from the executed SE frame. Rows without a
/// full start date are unusable as windows and are skipped.
fn element_windows(se: &DataFrame) -> HashMap<String, Vec<ElementWindow>> {
    let lookup = column_lookup(se);
    let mut windows: HashMap<String, Vec<ElementWindow>> = HashMap::new();
    let columns = (
        lookup.get("USUBJID").and_then(|c| string_values(se, c)),
        lookup.get("EPOCH").and_then(|c| string_values(se, c)),
        lookup.get("SESTDTC").and_then(|c| string_values(se, c)),
    );
    let (Some(subjects), Some(epochs), Some(starts)) = columns else {
        return windows;
    };
    let ends = lookup.get("SEENDTC").and_then(|c| string_values(se, c));
    for (row, subject) in subjects.iter().enumerate() {
        let Some(start) = starts.get(row).and_then(|s| full_date(s)) else {
            continue;
        };
        let end = ends
            .as_ref()
            .and_then(|e| e.get(row))
            .and_then(|e| full_date(e));
        windows.entry(subject.clone()).or_default().push(ElementWindow {
            epoch: epochs.get(row).cloned().unwrap_or_default(),
            start,
            end,
        });
    }
    windows
}

/// Visit schedule from a raw trial-visits table (`tv` or `visits`), when
/// the study ships one.
fn visit_schedule(raw: &HashMap<String, DataFrame>) -> Option<Vec<(String, VisitDef)>> {
    let table = raw.get("tv").or_else(|| raw.get("visits"))?;
    let lookup = column_lookup(table);
    let labels = lookup.get("VISIT").and_then(|c| string_values(table, c))?;
    let numbers = lookup.get("VISITNUM").and_then(|c| string_values(table, c))?;
    let schedule: Vec<(String, VisitDef)> = labels
        .iter()
        .zip(&numbers)
        .filter_map(|(label, number)| {
            let number: f64 = number.trim().parse().ok()?;
            Some((
                label.clone(),
                VisitDef {
                    number,
                    name: label.trim().to_uppercase(),
                },
            ))
        })
        .collect();
    if schedule.is_empty() {
        None
    } else {
        debug!(visits = schedule.len(), "visit schedule loaded");
        Some(schedule)
    }
}

fn column_lookup(df: &DataFrame) -> CaseInsensitiveLookup {
    CaseInsensitiveLookup::new(df.get_column_names().iter().map(|s| s.as_str().to_string()))
}

/// Convert one output frame to a transport dataset.
///
/// Labels come from the mapping spec when it names the variable, then from
/// the reference standard, then fall back to the variable name. Character
/// widths reuse the engine's measured widths where available.
pub fn build_dataset(
    domain: &str,
    frame: &DataFrame,
    specs: &BTreeMap<String, MappingSpec>,
    refs: &ReferenceData,
    widths: Option<&BTreeMap<String, usize>>,
) -> Result<XptDataset> {
    let spec = specs.get(domain);
    let reference = refs.domain(reference_domain(domain));

    let mut columns = Vec::with_capacity(frame.width());
    for col in frame.get_columns() {
        let name = col.name().as_str();
        let label = spec
            .and_then(|s| s.variable(name))
            .map(|v| v.label.clone())
            .filter(|l| !l.is_empty())
            .or_else(|| reference.and_then(|d| d.variable(name)).map(|v| v.label.clone()))
            .unwrap_or_else(|| name.to_string());
        let column = if col.dtype() == &DataType::Float64 {
            XptColumn::numeric(name)
        } else {
            let width = widths
                .and_then(|w| w.get(name).copied())
                .unwrap_or_else(|| measure_width(frame, name));
            XptColumn::character(name, width as u16)
        };
        columns.push(column.with_label(label));
    }

    let mut dataset = XptDataset::with_columns(domain.to_uppercase(), columns)
        .with_label(dataset_label(domain, spec, refs));
    for row in 0..frame.height() {
        let mut values = Vec::with_capacity(frame.width());
        for col in frame.get_columns() {
            let value = if col.dtype() == &DataType::Float64 {
                match col.f64()?.get(row) {
                    Some(n) => XptValue::numeric(n),
                    None => XptValue::numeric_missing(),
                }
            } else {
                XptValue::character(any_to_string(&col.get(row).unwrap_or(AnyValue::Null)))
            };
            values.push(value);
        }
        dataset.add_row(values);
    }
    Ok(dataset)
}

/// Supplemental datasets share the SUPPQUAL variable definitions.
fn reference_domain(domain: &str) -> &str {
    if domain.starts_with("SUPP") {
        "SUPPQUAL"
    } else {
        domain
    }
}

fn dataset_label(domain: &str, spec: Option<&MappingSpec>, refs: &ReferenceData) -> String {
    if let Some(label) = spec.map(|s| s.label.clone()).filter(|l| !l.is_empty()) {
        return label;
    }
    if let Some(parent) = domain.strip_prefix("SUPP") {
        return format!("Supplemental Qualifiers for {parent}");
    }
    refs.domain(domain)
        .map_or_else(|| domain.to_string(), |d| d.label.clone())
}

fn measure_width(frame: &DataFrame, name: &str) -> usize {
    string_values(frame, name)
        .map(|values| values.iter().map(String::len).max().unwrap_or(0))
        .unwrap_or(0)
        .clamp(1, forge_xpt::MAX_CHAR_LENGTH as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::Column;

    fn spec_map() -> BTreeMap<String, MappingSpec> {
        BTreeMap::new()
    }

    #[test]
    fn execution_order_puts_dm_and_se_first() {
        let mut specs = BTreeMap::new();
        for domain in ["VS", "AE", "SE", "DM", "TS"] {
            specs.insert(
                domain.to_string(),
                MappingSpec {
                    domain: domain.to_string(),
                    label: String::new(),
                    class: String::new(),
                    variables: Vec::new(),
                    transpose: None,
                    supp_variables: Vec::new(),
                },
            );
        }
        assert_eq!(execution_order(&specs), vec!["DM", "SE", "AE", "TS", "VS"]);
    }

    #[test]
    fn reference_dates_use_first_full_date_per_subject() {
        let dm = DataFrame::new(vec![
            Column::new(
                "USUBJID".into(),
                vec!["S-01-1001", "S-01-1002", "S-01-1003"],
            ),
            Column::new("RFSTDTC".into(), vec!["2024-01-10", "2024-02", ""]),
        ])
        .expect("dm");
        let dates = reference_dates(&dm);
        assert_eq!(dates.len(), 1);
        assert_eq!(
            dates["S-01-1001"],
            NaiveDate::from_ymd_opt(2024, 1, 10).expect("date")
        );
    }

    #[test]
    fn element_windows_keep_open_ends() {
        let se = DataFrame::new(vec![
            Column::new("USUBJID".into(), vec!["S-01-1001", "S-01-1001"]),
            Column::new("EPOCH".into(), vec!["SCREENING", "TREATMENT"]),
            Column::new("SESTDTC".into(), vec!["2024-01-01", "2024-01-10"]),
            Column::new("SEENDTC".into(), vec!["2024-01-09", ""]),
        ])
        .expect("se");
        let windows = element_windows(&se);
        let subject = &windows["S-01-1001"];
        assert_eq!(subject.len(), 2);
        assert!(subject[0].end.is_some());
        assert!(subject[1].end.is_none());
    }

    #[test]
    fn datasets_carry_labels_and_types() {
        let refs = ReferenceData::builtin().expect("refs");
        let frame = DataFrame::new(vec![
            Column::new("USUBJID".into(), vec!["S-01-1001"]),
            Column::new("AESEQ".into(), vec![Some(1.0f64)]),
            Column::new("AETERM".into(), vec!["HEADACHE"]),
        ])
        .expect("ae");
        let dataset = build_dataset("AE", &frame, &spec_map(), &refs, None).expect("dataset");
        assert_eq!(dataset.columns.len(), 3);
        assert_eq!(dataset.columns[0].label.as_deref(), Some("Unique Subject Identifier"));
        assert_eq!(dataset.columns[1].data_type, forge_xpt::XptType::Num);
        assert_eq!(dataset.columns[2].length, "HEADACHE".len() as u16);
        assert_eq!(dataset.num_rows(), 1);
    }

    #[test]
    fn supplemental_datasets_use_suppqual_labels() {
        let refs = ReferenceData::builtin().expect("refs");
        let frame = DataFrame::new(vec![
            Column::new("STUDYID".into(), vec!["S"]),
            Column::new("RDOMAIN".into(), vec!["AE"]),
            Column::new("QNAM".into(), vec!["AESPID"]),
        ])
        .expect("supp");
        let dataset = build_dataset("SUPPAE", &frame, &spec_map(), &refs, None).expect("dataset");
        assert_eq!(dataset.label.as_deref(), Some("Supplemental Qualifiers for AE"));
        assert_eq!(
            dataset.columns[1].label.as_deref(),
            Some("Related Domain Abbreviation")
        );
    }
}

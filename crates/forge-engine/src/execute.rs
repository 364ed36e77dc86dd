//! Mapping execution: pattern dispatch and post-processing.
//!
//! `execute` interprets one mapping spec against the raw source tables and
//! produces the finished domain frame. Variables are produced in spec order
//! as string columns; typing happens once at the end when the frame is
//! assembled. A variable that cannot be produced from the supplied data is
//! recorded as a problem and null-filled rather than aborting the run; only
//! a configuration defect on a required variable is a hard error.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use polars::prelude::{Column, DataFrame};
use tracing::{debug, warn};

use forge_model::{
    is_blank, string_values, MappingSpec, PatternKind, VariableMapping, VariableType,
};
use forge_standards::{sort_keys_for, ReferenceData};

use crate::context::{ColumnResolver, CrossTableContext};
use crate::derivation::{self, ConcatPart, Derivation, KeywordKind};
use crate::derive;
use crate::error::{EngineError, Result};
use crate::{dates, transpose};

/// Longest character value the transport format can carry.
const MAX_TEXT_WIDTH: usize = 200;

/// Why a variable could not be produced as mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    /// A declared source column does not exist in the supplied table.
    MissingColumn,
    /// Derivation rule text names no recognized keyword.
    UnknownDerivation,
    /// REFORMAT names no recognized transform.
    UnknownTransform,
    /// Row values that could not be derived (bad components, unparseable).
    InvalidValue,
}

/// One recorded production problem. Aggregated per variable, never per row.
#[derive(Debug, Clone)]
pub struct ExecutionProblem {
    pub variable: String,
    pub kind: ProblemKind,
    pub rows: usize,
    pub message: String,
}

/// The finished domain table plus everything the caller needs to report on
/// the run: production problems, text widths for the writer, and the
/// aggregated unmatched-visit tally.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub domain: String,
    pub frame: DataFrame,
    pub problems: Vec<ExecutionProblem>,
    pub column_widths: BTreeMap<String, usize>,
    pub unmatched_visits: BTreeMap<String, usize>,
}

type TextColumn = Vec<Option<String>>;

/// Working set of produced columns, in spec order.
struct Produced {
    columns: Vec<(String, TextColumn)>,
}

impl Produced {
    fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    fn get(&self, name: &str) -> Option<&TextColumn> {
        self.columns
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    fn push(&mut self, name: &str, values: TextColumn) {
        self.columns.push((name.to_string(), values));
    }
}

/// Run one mapping spec against the supplied raw tables.
pub fn execute(
    spec: &MappingSpec,
    tables: &HashMap<String, DataFrame>,
    ctx: &CrossTableContext,
    refs: &ReferenceData,
) -> Result<ExecutionOutcome> {
    let mut frame = primary_table(spec, tables)?.clone();
    if let Some(tr) = &spec.transpose {
        frame = transpose::apply(tr, &frame)?;
    }
    let resolver = ColumnResolver::new(&frame);
    let nrows = frame.height();

    let mut produced = Produced::new();
    let mut problems: Vec<ExecutionProblem> = Vec::new();
    let mut unmatched_visits: BTreeMap<String, usize> = BTreeMap::new();

    for mapping in spec.ordered_variables() {
        if let Some(reason) = mapping.structural_defect() {
            if mapping.required {
                return Err(EngineError::Structural {
                    variable: mapping.target.clone(),
                    reason: reason.to_string(),
                });
            }
            warn!(variable = %mapping.target, reason, "skipping defective mapping");
            problems.push(ExecutionProblem {
                variable: mapping.target.clone(),
                kind: ProblemKind::MissingColumn,
                rows: nrows,
                message: reason.to_string(),
            });
            produced.push(&mapping.target, vec![None; nrows]);
            continue;
        }

        let result = produce_variable(
            mapping,
            spec,
            &frame,
            &resolver,
            ctx,
            refs,
            &produced,
            nrows,
            &mut problems,
            &mut unmatched_visits,
        );
        match result {
            ProducedColumn::Values(values) => produced.push(&mapping.target, values),
            ProducedColumn::Skip => {
                debug!(variable = %mapping.target, "target not created, source column absent");
            }
        }
    }

    if !unmatched_visits.is_empty() {
        let total: usize = unmatched_visits.values().sum();
        warn!(
            domain = %spec.domain,
            distinct = unmatched_visits.len(),
            rows = total,
            labels = ?unmatched_visits.keys().collect::<Vec<_>>(),
            "visit labels not found in the visit schedule"
        );
    }

    ensure_imputation_flag_columns(spec, &mut produced, nrows);

    let order = sort_permutation(spec, &produced, nrows);
    assign_sequence_numbers(spec, &mut produced, &order);

    for (_, values) in &mut produced.columns {
        for value in values.iter_mut().flatten() {
            if !value.is_ascii() {
                *value = fold_to_ascii(value);
            }
        }
    }

    apply_permutation(&mut produced, &order);

    let column_widths = text_widths(spec, &produced);
    let frame = assemble_frame(spec, produced)?;

    Ok(ExecutionOutcome {
        domain: spec.domain.clone(),
        frame,
        problems,
        column_widths,
        unmatched_visits,
    })
}

fn primary_table<'a>(
    spec: &MappingSpec,
    tables: &'a HashMap<String, DataFrame>,
) -> Result<&'a DataFrame> {
    for mapping in &spec.variables {
        if let Some(name) = &mapping.source_table {
            if let Some(found) = tables
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
            {
                return Ok(found);
            }
        }
    }
    if tables.len() == 1 {
        return Ok(tables.values().next().unwrap_or_else(|| unreachable!()));
    }
    Err(EngineError::NoSourceTable {
        domain: spec.domain.clone(),
    })
}

enum ProducedColumn {
    Values(TextColumn),
    /// The target must not exist in the output at all.
    Skip,
}

#[allow(clippy::too_many_arguments)]
fn produce_variable(
    mapping: &VariableMapping,
    spec: &MappingSpec,
    frame: &DataFrame,
    resolver: &ColumnResolver,
    ctx: &CrossTableContext,
    refs: &ReferenceData,
    produced: &Produced,
    nrows: usize,
    problems: &mut Vec<ExecutionProblem>,
    unmatched_visits: &mut BTreeMap<String, usize>,
) -> ProducedColumn {
    let env = Env {
        frame,
        resolver,
        ctx,
        produced,
    };

    let values = match mapping.pattern {
        PatternKind::Assign => {
            let value = mapping.value.clone().unwrap_or_default();
            vec![Some(value); nrows]
        }
        PatternKind::Direct | PatternKind::Rename | PatternKind::Transpose => {
            let requested = match mapping.pattern {
                PatternKind::Transpose => mapping.target.as_str(),
                _ => mapping.source_column.as_deref().unwrap_or(""),
            };
            match env.column(requested) {
                Some(values) => values,
                None => {
                    record_missing_column(mapping, requested, nrows, problems);
                    vec![None; nrows]
                }
            }
        }
        PatternKind::Reformat => reformat(mapping, &env, nrows, problems),
        PatternKind::LookupRecode => lookup_recode(mapping, &env, refs, nrows, problems),
        PatternKind::Split | PatternKind::Combine | PatternKind::Derivation => {
            let rule = Derivation::parse(mapping.derivation.as_deref().unwrap_or(""));
            match evaluate_derivation(
                &rule,
                mapping,
                spec,
                &env,
                nrows,
                problems,
                unmatched_visits,
            ) {
                Some(values) => values,
                None => return ProducedColumn::Skip,
            }
        }
    };
    ProducedColumn::Values(values)
}

fn record_missing_column(
    mapping: &VariableMapping,
    requested: &str,
    nrows: usize,
    problems: &mut Vec<ExecutionProblem>,
) {
    warn!(variable = %mapping.target, column = requested, "source column not found");
    problems.push(ExecutionProblem {
        variable: mapping.target.clone(),
        kind: ProblemKind::MissingColumn,
        rows: nrows,
        message: format!("source column {requested} not found"),
    });
}

/// Column lookup shared by every pattern: produced targets first, then the
/// source table through the resolver.
struct Env<'a> {
    frame: &'a DataFrame,
    resolver: &'a ColumnResolver,
    ctx: &'a CrossTableContext,
    produced: &'a Produced,
}

impl Env<'_> {
    fn column(&self, requested: &str) -> Option<TextColumn> {
        if requested.is_empty() {
            return None;
        }
        if let Some(values) = self.produced.get(requested) {
            return Some(values.clone());
        }
        let actual = self.resolver.resolve(requested, self.ctx)?;
        let raw = string_values(self.frame, &actual)?;
        Some(
            raw.into_iter()
                .map(|v| {
                    let trimmed = v.trim();
                    if is_blank(trimmed) {
                        None
                    } else {
                        Some(trimmed.to_string())
                    }
                })
                .collect(),
        )
    }

    fn usubjid_column(&self, nrows: usize) -> TextColumn {
        self.column("USUBJID").unwrap_or_else(|| vec![None; nrows])
    }
}

fn reformat(
    mapping: &VariableMapping,
    env: &Env<'_>,
    nrows: usize,
    problems: &mut Vec<ExecutionProblem>,
) -> TextColumn {
    let requested = mapping.source_column.as_deref().unwrap_or("");
    let Some(values) = env.column(requested) else {
        record_missing_column(mapping, requested, nrows, problems);
        return vec![None; nrows];
    };
    let transform = mapping
        .derivation
        .as_deref()
        .or(mapping.value.as_deref())
        .unwrap_or("")
        .trim()
        .to_uppercase();
    match transform.as_str() {
        "ISO8601" | "DATE_ISO8601" | "DATETIME_ISO8601" => values
            .into_iter()
            .map(|v| v.map(|s| dates::to_iso8601(&s)))
            .collect(),
        "UPPERCASE" => values
            .into_iter()
            .map(|v| v.map(|s| s.to_uppercase()))
            .collect(),
        "TRIM" => values,
        other => {
            if !other.is_empty() {
                warn!(variable = %mapping.target, transform = other, "unknown transform, passing through");
                problems.push(ExecutionProblem {
                    variable: mapping.target.clone(),
                    kind: ProblemKind::UnknownTransform,
                    rows: nrows,
                    message: format!("unknown transform {other}"),
                });
            }
            values
        }
    }
}

fn lookup_recode(
    mapping: &VariableMapping,
    env: &Env<'_>,
    refs: &ReferenceData,
    nrows: usize,
    problems: &mut Vec<ExecutionProblem>,
) -> TextColumn {
    let requested = mapping.source_column.as_deref().unwrap_or("");
    let Some(values) = env.column(requested) else {
        record_missing_column(mapping, requested, nrows, problems);
        return vec![None; nrows];
    };
    let codelist = mapping
        .codelist
        .as_deref()
        .and_then(|code| refs.codelists().get(code));
    let Some(codelist) = codelist else {
        return values;
    };
    values
        .into_iter()
        .map(|v| {
            v.map(|s| match codelist.resolve(&s) {
                Some(term) => term.to_string(),
                None => s,
            })
        })
        .collect()
}

#[allow(clippy::too_many_lines)]
fn evaluate_derivation(
    rule: &Derivation,
    mapping: &VariableMapping,
    spec: &MappingSpec,
    env: &Env<'_>,
    nrows: usize,
    problems: &mut Vec<ExecutionProblem>,
    unmatched_visits: &mut BTreeMap<String, usize>,
) -> Option<TextColumn> {
    let values = match rule {
        Derivation::Substring { column, start, end } => map_column(env, column, |v| {
            Some(derivation::substring(v, *start, *end))
        })
        .unwrap_or_else(|| {
            record_missing_column(mapping, column, nrows, problems);
            vec![None; nrows]
        }),
        Derivation::DelimiterPart {
            column,
            delimiter,
            index,
        } => map_column(env, column, |v| {
            derivation::delimiter_part(v, delimiter, *index)
        })
        .unwrap_or_else(|| {
            record_missing_column(mapping, column, nrows, problems);
            vec![None; nrows]
        }),
        Derivation::RegexGroup {
            column,
            pattern,
            group,
        } => map_column(env, column, |v| derivation::regex_group(v, pattern, *group))
            .unwrap_or_else(|| {
                record_missing_column(mapping, column, nrows, problems);
                vec![None; nrows]
            }),
        Derivation::Concat(parts) => concat(parts, env, nrows),
        Derivation::Keyword { kind, args } => {
            return evaluate_keyword(
                *kind,
                args,
                mapping,
                spec,
                env,
                nrows,
                problems,
                unmatched_visits,
            );
        }
        Derivation::Unknown { keyword } => {
            let fallback = mapping
                .source_column
                .as_deref()
                .and_then(|col| env.column(col));
            match fallback {
                Some(values) => {
                    warn!(
                        variable = %mapping.target,
                        keyword = %keyword,
                        "unrecognized derivation, copying source column"
                    );
                    problems.push(ExecutionProblem {
                        variable: mapping.target.clone(),
                        kind: ProblemKind::UnknownDerivation,
                        rows: 0,
                        message: format!("unrecognized derivation {keyword}, copied source"),
                    });
                    values
                }
                None => {
                    warn!(
                        variable = %mapping.target,
                        keyword = %keyword,
                        "unrecognized derivation and no source column, null filling"
                    );
                    problems.push(ExecutionProblem {
                        variable: mapping.target.clone(),
                        kind: ProblemKind::UnknownDerivation,
                        rows: nrows,
                        message: format!("unrecognized derivation {keyword}, null filled"),
                    });
                    vec![None; nrows]
                }
            }
        }
    };
    Some(values)
}

fn map_column(
    env: &Env<'_>,
    column: &str,
    f: impl Fn(&str) -> Option<String>,
) -> Option<TextColumn> {
    Some(
        env.column(column)?
            .into_iter()
            .map(|v| v.as_deref().and_then(&f))
            .collect(),
    )
}

fn concat(parts: &[ConcatPart], env: &Env<'_>, nrows: usize) -> TextColumn {
    let resolved: Vec<Option<TextColumn>> = parts
        .iter()
        .map(|part| match part {
            ConcatPart::Literal(_) => None,
            ConcatPart::Column(name) => Some(env.column(name).unwrap_or_else(|| vec![None; nrows])),
        })
        .collect();

    (0..nrows)
        .map(|row| {
            let mut out = String::new();
            for (part, values) in parts.iter().zip(&resolved) {
                match (part, values) {
                    (ConcatPart::Literal(text), _) => out.push_str(text),
                    (ConcatPart::Column(_), Some(values)) => {
                        if let Some(Some(v)) = values.get(row) {
                            out.push_str(v);
                        }
                    }
                    (ConcatPart::Column(_), None) => {}
                }
            }
            if out.is_empty() { None } else { Some(out) }
        })
        .collect()
}

#[allow(clippy::too_many_arguments, clippy::too_many_lines)]
fn evaluate_keyword(
    kind: KeywordKind,
    args: &[String],
    mapping: &VariableMapping,
    spec: &MappingSpec,
    env: &Env<'_>,
    nrows: usize,
    problems: &mut Vec<ExecutionProblem>,
    unmatched_visits: &mut BTreeMap<String, usize>,
) -> Option<TextColumn> {
    let arg_column = |index: usize, default: &str| -> TextColumn {
        let requested = args.get(index).map_or(default, String::as_str);
        env.column(requested).unwrap_or_else(|| vec![None; nrows])
    };

    let values = match kind {
        KeywordKind::Usubjid => {
            let (site, subject) = if args.len() >= 3 {
                (arg_column(1, "SITEID"), arg_column(2, "SUBJID"))
            } else {
                (arg_column(0, "SITEID"), arg_column(1, "SUBJID"))
            };
            let study: TextColumn = if args.len() >= 3 {
                arg_column(0, "STUDYID")
            } else {
                vec![None; nrows]
            };
            let mut failed = 0usize;
            let mut first_error = None;
            let out: TextColumn = (0..nrows)
                .map(|row| {
                    let study_value = study
                        .get(row)
                        .and_then(Clone::clone)
                        .unwrap_or_else(|| env.ctx.study_id.clone());
                    let site_value = site.get(row).and_then(|v| v.as_deref()).unwrap_or("");
                    let subject_value =
                        subject.get(row).and_then(|v| v.as_deref()).unwrap_or("");
                    match derive::build_usubjid(&study_value, site_value, subject_value) {
                        Ok(id) => Some(id),
                        Err(reason) => {
                            failed += 1;
                            first_error.get_or_insert(reason);
                            None
                        }
                    }
                })
                .collect();
            if failed > 0 {
                warn!(
                    variable = %mapping.target,
                    rows = failed,
                    "subject identifier could not be built"
                );
                problems.push(ExecutionProblem {
                    variable: mapping.target.clone(),
                    kind: ProblemKind::InvalidValue,
                    rows: failed,
                    message: first_error.unwrap_or_else(|| "component missing".to_string()),
                });
            }
            out
        }
        KeywordKind::Iso8601 => arg_column(0, mapping.source_column.as_deref().unwrap_or(""))
            .into_iter()
            .map(|v| v.map(|s| dates::to_iso8601(&s)))
            .collect(),
        KeywordKind::StudyDay => {
            let dates_col = arg_column(0, mapping.source_column.as_deref().unwrap_or(""));
            let subjects = env.usubjid_column(nrows);
            (0..nrows)
                .map(|row| {
                    let event = dates_col.get(row)?.as_deref().and_then(dates::full_date)?;
                    let usubjid = subjects.get(row)?.as_deref()?;
                    let reference = env.ctx.reference_date(usubjid)?;
                    Some(derive::study_day(event, reference).to_string())
                })
                .collect()
        }
        KeywordKind::Epoch => {
            let dates_col = arg_column(0, mapping.source_column.as_deref().unwrap_or(""));
            let subjects = env.usubjid_column(nrows);
            (0..nrows)
                .map(|row| {
                    let date = dates_col.get(row)?.as_deref().and_then(dates::full_date)?;
                    let usubjid = subjects.get(row)?.as_deref()?;
                    derive::assign_epoch(date, env.ctx.element_windows(usubjid))
                        .map(ToString::to_string)
                })
                .collect()
        }
        KeywordKind::VisitNum | KeywordKind::VisitName => {
            let labels = arg_column(0, "VISIT");
            labels
                .into_iter()
                .map(|label| {
                    let label = label?;
                    match env.ctx.visit(&label) {
                        Some(def) => Some(match kind {
                            KeywordKind::VisitNum => format_visit_number(def.number),
                            _ => def.name.clone(),
                        }),
                        None => {
                            *unmatched_visits.entry(label).or_insert(0) += 1;
                            None
                        }
                    }
                })
                .collect()
        }
        KeywordKind::SubjectMinDate | KeywordKind::SubjectMaxDate => {
            let dates_col = arg_column(0, mapping.source_column.as_deref().unwrap_or(""));
            let subjects = env.usubjid_column(nrows);
            let mut extreme: HashMap<String, NaiveDate> = HashMap::new();
            for row in 0..nrows {
                let (Some(Some(usubjid)), Some(Some(raw))) =
                    (subjects.get(row), dates_col.get(row))
                else {
                    continue;
                };
                let Some(date) = dates::full_date(raw) else {
                    continue;
                };
                extreme
                    .entry(usubjid.clone())
                    .and_modify(|current| {
                        let better = match kind {
                            KeywordKind::SubjectMinDate => date < *current,
                            _ => date > *current,
                        };
                        if better {
                            *current = date;
                        }
                    })
                    .or_insert(date);
            }
            subjects
                .into_iter()
                .map(|usubjid| {
                    let usubjid = usubjid?;
                    extreme
                        .get(&usubjid)
                        .map(|d| d.format("%Y-%m-%d").to_string())
                })
                .collect()
        }
        KeywordKind::RaceFromCheckbox => race_from_checkbox(args, env, nrows),
        KeywordKind::YesNo => arg_column(0, mapping.source_column.as_deref().unwrap_or(""))
            .into_iter()
            .map(|v| v.as_deref().and_then(derive::yes_no).map(ToString::to_string))
            .collect(),
        KeywordKind::Stresc => {
            arg_column(0, &format!("{}ORRES", spec.domain))
        }
        KeywordKind::Stresn => arg_column(0, &format!("{}ORRES", spec.domain))
            .into_iter()
            .map(|v| {
                v.as_deref()
                    .and_then(derive::standardized_numeric)
                    .map(format_number)
            })
            .collect(),
        KeywordKind::Stresu => {
            let requested = args
                .first()
                .map(String::as_str)
                .or(mapping.source_column.as_deref())
                .unwrap_or("");
            match env.column(requested) {
                Some(values) => values,
                None => return None,
            }
        }
        KeywordKind::Nrind => {
            let values = arg_column(0, &format!("{}STRESN", spec.domain));
            let low = args.get(1).and_then(|c| env.column(c));
            let high = args.get(2).and_then(|c| env.column(c));
            (0..nrows)
                .map(|row| {
                    let parse = |col: &Option<TextColumn>| {
                        col.as_ref()
                            .and_then(|c| c.get(row))
                            .and_then(|v| v.as_deref())
                            .and_then(derive::standardized_numeric)
                    };
                    let value = values
                        .get(row)
                        .and_then(|v| v.as_deref())
                        .and_then(derive::standardized_numeric);
                    derive::range_indicator(value, parse(&low), parse(&high))
                        .map(ToString::to_string)
                })
                .collect()
        }
    };
    Some(values)
}

fn race_from_checkbox(args: &[String], env: &Env<'_>, nrows: usize) -> TextColumn {
    let columns: Vec<(&'static str, TextColumn)> = if args.is_empty() {
        env.frame
            .get_column_names()
            .iter()
            .filter_map(|name| {
                let term = derive::race_for_column(name.as_str())?;
                let values = env.column(name.as_str())?;
                Some((term, values))
            })
            .collect()
    } else {
        args.iter()
            .filter_map(|name| {
                let term = derive::race_for_column(name)?;
                let values = env.column(name)?;
                Some((term, values))
            })
            .collect()
    };

    (0..nrows)
        .map(|row| {
            let checked: Vec<&str> = columns
                .iter()
                .filter(|(_, values)| {
                    values
                        .get(row)
                        .and_then(|v| v.as_deref())
                        .is_some_and(derive::checkbox_checked)
                })
                .map(|(term, _)| *term)
                .collect();
            derive::race_from_checked(&checked)
        })
        .collect()
}

fn format_visit_number(number: f64) -> String {
    if (number - number.trunc()).abs() < f64::EPSILON {
        format!("{}", number as i64)
    } else {
        format!("{number}")
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Declared date/time imputation-flag targets that nothing populated still
/// appear in the output, empty.
fn ensure_imputation_flag_columns(spec: &MappingSpec, produced: &mut Produced, nrows: usize) {
    for mapping in &spec.variables {
        let upper = mapping.target.to_uppercase();
        if (upper.ends_with("DTF") || upper.ends_with("TMF"))
            && produced.get(&mapping.target).is_none()
        {
            produced.push(&mapping.target, vec![None; nrows]);
        }
    }
}

/// Stable sort order by the domain's key list, missing values last. The same
/// permutation drives both sequence numbering and the final row order, so
/// sequence values ascend in the written file.
fn sort_permutation(spec: &MappingSpec, produced: &Produced, nrows: usize) -> Vec<usize> {
    let keys: Vec<&TextColumn> = sort_keys_for(&spec.domain)
        .iter()
        .filter_map(|key| produced.get(key))
        .collect();
    let keys: Vec<&TextColumn> = if keys.is_empty() {
        produced.get("USUBJID").into_iter().collect()
    } else {
        keys
    };

    let mut order: Vec<usize> = (0..nrows).collect();
    order.sort_by(|&a, &b| {
        for column in &keys {
            let left = column.get(a).and_then(|v| v.as_deref());
            let right = column.get(b).and_then(|v| v.as_deref());
            let ord = match (left, right) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (Some(_), None) => std::cmp::Ordering::Less,
                (Some(l), Some(r)) => compare_values(l, r),
            };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
    order
}

/// Numeric comparison when both sides parse, lexical otherwise. Visit
/// numbers sort 2 before 10 this way.
fn compare_values(left: &str, right: &str) -> std::cmp::Ordering {
    match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(std::cmp::Ordering::Equal),
        _ => left.cmp(right),
    }
}

fn assign_sequence_numbers(spec: &MappingSpec, produced: &mut Produced, order: &[usize]) {
    let seq_name = spec.seq_variable();
    if produced.get(&seq_name).is_none() {
        return;
    }
    let subjects: TextColumn = produced
        .get("USUBJID")
        .cloned()
        .unwrap_or_else(|| vec![None; order.len()]);

    let mut counters: HashMap<String, u32> = HashMap::new();
    let mut seq = vec![None; order.len()];
    for &row in order {
        let key = subjects
            .get(row)
            .and_then(Clone::clone)
            .unwrap_or_default();
        let counter = counters.entry(key).or_insert(0);
        *counter += 1;
        seq[row] = Some(counter.to_string());
    }

    if let Some((_, values)) = produced
        .columns
        .iter_mut()
        .find(|(n, _)| n.eq_ignore_ascii_case(&seq_name))
    {
        *values = seq;
    }
}

fn apply_permutation(produced: &mut Produced, order: &[usize]) {
    for (_, values) in &mut produced.columns {
        let reordered: TextColumn = order
            .iter()
            .map(|&row| values.get(row).and_then(Clone::clone))
            .collect();
        *values = reordered;
    }
}

/// Replacements for non-ASCII characters that routinely leak out of EDC
/// exports and word processors.
fn fold_to_ascii(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\u{2018}' | '\u{2019}' | '\u{201A}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' => out.push('"'),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => out.push('-'),
            '\u{00B0}' => out.push_str("deg"),
            '\u{00B5}' | '\u{03BC}' => out.push('u'),
            '\u{00B1}' => out.push_str("+/-"),
            '\u{2264}' => out.push_str("<="),
            '\u{2265}' => out.push_str(">="),
            '\u{2026}' => out.push_str("..."),
            '\u{00A0}' => out.push(' '),
            other => out.push(other),
        }
    }
    out
}

/// Minimum sufficient byte width per text column, capped at the transport
/// maximum.
fn text_widths(spec: &MappingSpec, produced: &Produced) -> BTreeMap<String, usize> {
    let mut widths = BTreeMap::new();
    for (name, values) in &produced.columns {
        let is_char = spec
            .variable(name)
            .is_none_or(|m| m.data_type == VariableType::Char);
        if !is_char {
            continue;
        }
        let max = values
            .iter()
            .flatten()
            .map(|v| {
                if v.is_ascii() {
                    v.len()
                } else {
                    v.chars().count()
                }
            })
            .max()
            .unwrap_or(0);
        widths.insert(name.clone(), max.clamp(1, MAX_TEXT_WIDTH));
    }
    widths
}

fn assemble_frame(spec: &MappingSpec, produced: Produced) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(produced.columns.len());
    for (name, values) in produced.columns {
        let is_num = spec
            .variable(&name)
            .is_some_and(|m| m.data_type == VariableType::Num);
        if is_num {
            let numeric: Vec<Option<f64>> = values
                .iter()
                .map(|v| v.as_deref().and_then(derive::standardized_numeric))
                .collect();
            columns.push(Column::new(name.as_str().into(), numeric));
        } else {
            columns.push(Column::new(name.as_str().into(), values));
        }
    }
    Ok(DataFrame::new(columns)?)
}

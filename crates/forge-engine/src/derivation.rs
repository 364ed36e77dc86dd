//! The derivation mini-language.
//!
//! Rule text has the shape `KEYWORD` or `KEYWORD(arg, arg, ...)`. Text is
//! parsed once at spec load into a typed [`Derivation`]; nothing re-parses
//! per row. Unrecognized keywords parse into [`Derivation::Unknown`] so the
//! dispatcher can apply its fallback (source copy or null fill) explicitly.

use regex::Regex;

/// A parsed argument, remembering whether it was quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    pub text: String,
    pub quoted: bool,
}

/// One piece of a CONCAT derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcatPart {
    Column(String),
    Literal(String),
}

/// Cross-table derivations resolved by the dispatcher with context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordKind {
    Usubjid,
    Iso8601,
    StudyDay,
    Epoch,
    VisitNum,
    VisitName,
    SubjectMinDate,
    SubjectMaxDate,
    RaceFromCheckbox,
    YesNo,
    Stresc,
    Stresn,
    Stresu,
    Nrind,
}

impl KeywordKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "USUBJID" => Some(Self::Usubjid),
            "ISO8601" => Some(Self::Iso8601),
            "STUDY_DAY" => Some(Self::StudyDay),
            "EPOCH" => Some(Self::Epoch),
            "VISITNUM" => Some(Self::VisitNum),
            "VISIT" => Some(Self::VisitName),
            "SUBJECT_MIN_DATE" => Some(Self::SubjectMinDate),
            "SUBJECT_MAX_DATE" => Some(Self::SubjectMaxDate),
            "RACE_FROM_CHECKBOX" => Some(Self::RaceFromCheckbox),
            "YN" => Some(Self::YesNo),
            "STRESC" => Some(Self::Stresc),
            "STRESN" => Some(Self::Stresn),
            "STRESU" => Some(Self::Stresu),
            "NRIND" => Some(Self::Nrind),
            _ => None,
        }
    }
}

/// A derivation rule, parsed once at spec load.
#[derive(Debug, Clone)]
pub enum Derivation {
    /// Exclusive-end byte slice with clamped indices.
    Substring {
        column: String,
        start: usize,
        end: usize,
    },
    /// 0-based part of a delimiter split, null when absent.
    DelimiterPart {
        column: String,
        delimiter: String,
        index: usize,
    },
    /// A capturing group of the first match, null when unmatched.
    RegexGroup {
        column: String,
        pattern: Regex,
        group: usize,
    },
    /// Literals and column values joined positionally.
    Concat(Vec<ConcatPart>),
    /// A cross-table derivation handled by the dispatcher.
    Keyword { kind: KeywordKind, args: Vec<String> },
    /// Anything unrecognized; the dispatcher decides the fallback.
    Unknown { keyword: String },
}

impl Derivation {
    /// Parse rule text. Never fails: malformed input becomes `Unknown`.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let (name, args) = match trimmed.find('(') {
            Some(open) if trimmed.ends_with(')') => {
                let name = trimmed[..open].trim().to_uppercase();
                let inner = &trimmed[open + 1..trimmed.len() - 1];
                (name, split_args(inner))
            }
            _ => (trimmed.to_uppercase(), Vec::new()),
        };

        match name.as_str() {
            "SUBSTRING" => parse_substring(&args),
            "DELIMITER_PART" => parse_delimiter_part(&args),
            "REGEX_GROUP" => parse_regex_group(&args),
            "CONCAT" => Derivation::Concat(
                args.iter()
                    .map(|a| {
                        if a.quoted {
                            ConcatPart::Literal(a.text.clone())
                        } else {
                            ConcatPart::Column(normalize_column_ref(&a.text))
                        }
                    })
                    .collect(),
            ),
            other => match KeywordKind::from_name(other) {
                Some(kind) => Derivation::Keyword {
                    kind,
                    args: args
                        .iter()
                        .map(|a| {
                            if a.quoted {
                                a.text.clone()
                            } else {
                                normalize_column_ref(&a.text)
                            }
                        })
                        .collect(),
                },
                None => Derivation::Unknown {
                    keyword: name.clone(),
                },
            },
        }
    }
}

fn parse_substring(args: &[Arg]) -> Derivation {
    let (Some(column), Some(start), Some(end)) = (
        args.first(),
        args.get(1).and_then(|a| a.text.trim().parse().ok()),
        args.get(2).and_then(|a| a.text.trim().parse().ok()),
    ) else {
        return Derivation::Unknown {
            keyword: "SUBSTRING".to_string(),
        };
    };
    Derivation::Substring {
        column: normalize_column_ref(&column.text),
        start,
        end,
    }
}

fn parse_delimiter_part(args: &[Arg]) -> Derivation {
    let (Some(column), Some(delimiter), Some(index)) = (
        args.first(),
        args.get(1),
        args.get(2).and_then(|a| a.text.trim().parse().ok()),
    ) else {
        return Derivation::Unknown {
            keyword: "DELIMITER_PART".to_string(),
        };
    };
    Derivation::DelimiterPart {
        column: normalize_column_ref(&column.text),
        delimiter: delimiter.text.clone(),
        index,
    }
}

fn parse_regex_group(args: &[Arg]) -> Derivation {
    let (Some(column), Some(pattern)) = (args.first(), args.get(1)) else {
        return Derivation::Unknown {
            keyword: "REGEX_GROUP".to_string(),
        };
    };
    let Ok(pattern) = Regex::new(&pattern.text) else {
        return Derivation::Unknown {
            keyword: "REGEX_GROUP".to_string(),
        };
    };
    let group = args
        .get(2)
        .and_then(|a| a.text.trim().parse().ok())
        .unwrap_or(0);
    Derivation::RegexGroup {
        column: normalize_column_ref(&column.text),
        pattern,
        group,
    }
}

/// Split at top-level commas only; quoted sections pass through verbatim.
fn split_args(inner: &str) -> Vec<Arg> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut was_quoted = false;

    for ch in inner.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    was_quoted = true;
                }
                ',' => {
                    args.push(Arg {
                        text: if was_quoted {
                            std::mem::take(&mut current)
                        } else {
                            std::mem::take(&mut current).trim().to_string()
                        },
                        quoted: was_quoted,
                    });
                    was_quoted = false;
                }
                _ => current.push(ch),
            },
        }
    }
    if !current.is_empty() || was_quoted || !args.is_empty() {
        args.push(Arg {
            text: if was_quoted {
                current
            } else {
                current.trim().to_string()
            },
            quoted: was_quoted,
        });
    }
    args.retain(|a| a.quoted || !a.text.is_empty());
    args
}

/// Strip a `table.` prefix from a bare column reference. Decimal literals
/// keep their dot.
fn normalize_column_ref(arg: &str) -> String {
    let trimmed = arg.trim();
    if is_decimal_literal(trimmed) {
        return trimmed.to_string();
    }
    match trimmed.split_once('.') {
        Some((_, column)) if !column.is_empty() => column.to_string(),
        _ => trimmed.to_string(),
    }
}

fn is_decimal_literal(value: &str) -> bool {
    let mut dots = 0;
    !value.is_empty()
        && value.chars().all(|c| {
            if c == '.' {
                dots += 1;
                true
            } else {
                c.is_ascii_digit()
            }
        })
        && dots == 1
}

/// Exclusive-end byte slice with clamped indices. Falls back to char
/// boundaries when the clamped range would split a multi-byte character.
pub fn substring(value: &str, start: usize, end: usize) -> String {
    let len = value.len();
    let start = start.min(len);
    let end = end.clamp(start, len);
    value
        .get(start..end)
        .map(ToString::to_string)
        .unwrap_or_else(|| {
            String::from_utf8_lossy(&value.as_bytes()[start..end]).into_owned()
        })
}

/// 0-based delimiter part, `None` when the part does not exist.
pub fn delimiter_part(value: &str, delimiter: &str, index: usize) -> Option<String> {
    if delimiter.is_empty() {
        return None;
    }
    value.split(delimiter).nth(index).map(ToString::to_string)
}

/// A capturing group of the first match.
pub fn regex_group(value: &str, pattern: &Regex, group: usize) -> Option<String> {
    pattern
        .captures(value)?
        .get(group)
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_is_exclusive_end_and_clamped() {
        assert_eq!(substring("ABC-123", 0, 3), "ABC");
        assert_eq!(substring("ABC-123", 4, 100), "123");
        assert_eq!(substring("ABC", 10, 20), "");
        assert_eq!(substring("ABC", 2, 1), "");
    }

    #[test]
    fn delimiter_part_is_zero_based() {
        assert_eq!(delimiter_part("ABC-123", "-", 1).as_deref(), Some("123"));
        assert_eq!(delimiter_part("ABC-123", "-", 0).as_deref(), Some("ABC"));
        assert_eq!(delimiter_part("ABC-123", "-", 2), None);
    }

    #[test]
    fn regex_group_returns_first_match() {
        let pattern = Regex::new(r"(\d+)").unwrap();
        assert_eq!(
            regex_group("ABC-123", &pattern, 0).as_deref(),
            Some("123")
        );
        assert_eq!(
            regex_group("ABC-123", &pattern, 1).as_deref(),
            Some("123")
        );
        assert_eq!(regex_group("ABCDEF", &pattern, 0), None);
    }

    #[test]
    fn parse_recognizes_keywords_case_insensitively() {
        assert!(matches!(
            Derivation::parse("substring(AE.AETERM, 0, 3)"),
            Derivation::Substring { ref column, start: 0, end: 3 } if column == "AETERM"
        ));
        assert!(matches!(
            Derivation::parse("usubjid"),
            Derivation::Keyword {
                kind: KeywordKind::Usubjid,
                ..
            }
        ));
        assert!(matches!(
            Derivation::parse("Iso8601(BRTHDAT)"),
            Derivation::Keyword {
                kind: KeywordKind::Iso8601,
                ..
            }
        ));
    }

    #[test]
    fn quoted_arguments_pass_through_verbatim() {
        match Derivation::parse("DELIMITER_PART(SUBJID, \" - \", 1)") {
            Derivation::DelimiterPart {
                delimiter, index, ..
            } => {
                assert_eq!(delimiter, " - ");
                assert_eq!(index, 1);
            }
            other => panic!("unexpected parse: {other:?}"),
        }

        match Derivation::parse(r"REGEX_GROUP(AESPID, '(\d+), part', 1)") {
            Derivation::RegexGroup { pattern, group, .. } => {
                assert_eq!(pattern.as_str(), r"(\d+), part");
                assert_eq!(group, 1);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn table_prefix_is_stripped_but_decimals_kept() {
        assert_eq!(normalize_column_ref("VS.SYSBP"), "SYSBP");
        assert_eq!(normalize_column_ref("3.5"), "3.5");
        assert_eq!(normalize_column_ref("WEIGHT"), "WEIGHT");
    }

    #[test]
    fn concat_mixes_columns_and_literals() {
        match Derivation::parse("CONCAT(SITEID, \"-\", SUBJID)") {
            Derivation::Concat(parts) => {
                assert_eq!(
                    parts,
                    vec![
                        ConcatPart::Column("SITEID".to_string()),
                        ConcatPart::Literal("-".to_string()),
                        ConcatPart::Column("SUBJID".to_string()),
                    ]
                );
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn junk_parses_to_unknown() {
        assert!(matches!(
            Derivation::parse("FROBNICATE(X)"),
            Derivation::Unknown { .. }
        ));
        assert!(matches!(
            Derivation::parse("SUBSTRING(COL)"),
            Derivation::Unknown { .. }
        ));
    }
}

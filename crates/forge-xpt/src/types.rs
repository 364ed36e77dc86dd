//! Core types for XPT datasets.

/// Variable type in an XPT dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XptType {
    Num,
    Char,
}

impl XptType {
    pub fn from_ntype(ntype: i16) -> Option<Self> {
        match ntype {
            1 => Some(Self::Num),
            2 => Some(Self::Char),
            _ => None,
        }
    }

    pub fn to_ntype(self) -> i16 {
        match self {
            Self::Num => 1,
            Self::Char => 2,
        }
    }
}

/// SAS missing value code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingValue {
    /// `.`
    Standard,
    /// `._`
    Underscore,
    /// `.A` through `.Z`
    Special(char),
}

/// A numeric cell: either a value or a missing code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    Value(f64),
    Missing(MissingValue),
}

impl NumericValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing(_))
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Missing(_) => None,
        }
    }
}

/// One cell of observation data.
#[derive(Debug, Clone, PartialEq)]
pub enum XptValue {
    Char(String),
    Num(NumericValue),
}

impl XptValue {
    pub fn character(value: impl Into<String>) -> Self {
        Self::Char(value.into())
    }

    pub fn numeric(value: f64) -> Self {
        Self::Num(NumericValue::Value(value))
    }

    pub fn numeric_missing() -> Self {
        Self::Num(NumericValue::Missing(MissingValue::Standard))
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Self::Char(s) => s.trim().is_empty(),
            Self::Num(n) => n.is_missing(),
        }
    }
}

/// A variable definition.
#[derive(Debug, Clone, PartialEq)]
pub struct XptColumn {
    /// Variable name, at most 8 characters.
    pub name: String,
    /// Variable label, at most 40 characters.
    pub label: Option<String>,
    pub data_type: XptType,
    /// Storage length in bytes. Numerics are always 8.
    pub length: u16,
}

impl XptColumn {
    pub fn character(name: impl Into<String>, length: u16) -> Self {
        Self {
            name: name.into(),
            label: None,
            data_type: XptType::Char,
            length,
        }
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            data_type: XptType::Num,
            length: 8,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// An in-memory XPT dataset: one member with its columns and rows.
#[derive(Debug, Clone, PartialEq)]
pub struct XptDataset {
    /// Member (dataset) name, at most 8 characters.
    pub name: String,
    /// Dataset label, at most 40 characters.
    pub label: Option<String>,
    pub columns: Vec<XptColumn>,
    pub rows: Vec<Vec<XptValue>>,
}

impl XptDataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn with_columns(name: impl Into<String>, columns: Vec<XptColumn>) -> Self {
        Self {
            name: name.into(),
            label: None,
            columns,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn add_row(&mut self, row: Vec<XptValue>) {
        self.rows.push(row);
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Total bytes per observation.
    pub fn observation_length(&self) -> usize {
        self.columns.iter().map(|c| c.length as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_length_sums_columns() {
        let ds = XptDataset::with_columns(
            "DM",
            vec![
                XptColumn::character("USUBJID", 20),
                XptColumn::numeric("AGE"),
            ],
        );
        assert_eq!(ds.observation_length(), 28);
    }

    #[test]
    fn blank_char_counts_as_missing() {
        assert!(XptValue::character("  ").is_missing());
        assert!(!XptValue::character("X").is_missing());
        assert!(XptValue::numeric_missing().is_missing());
        assert!(!XptValue::numeric(0.0).is_missing());
    }
}

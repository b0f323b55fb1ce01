//! # Field Patterns Module
//!
//! Declarative table of the rules used to pull student details out of admit
//! card text. Each rule names a field, the label printed before it on the
//! card, and the shape of the value that follows. Adding a field means adding
//! a row here.

use regex::Regex;

use crate::admit_card_model::Field;

/// What sits between a label and its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// `LABEL : value`, spaces around the colon optional
    Colon,
    /// `LABEL value`, at least one whitespace character between
    Space,
    /// `LABEL value`, whitespace optional
    Gap,
}

/// Shape of the value following a label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// Rest of the line, trimmed
    FirstLine,
    /// A run of word characters
    Word,
    /// A run of ASCII digits
    Digits,
    /// Free text up to the first terminator phrase, may span lines.
    /// Whitespace inside is collapsed to single spaces.
    Block {
        terminators: &'static [&'static str],
    },
}

/// One row of the extraction table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub field: Field,
    pub label: &'static str,
    pub separator: Separator,
    pub shape: ValueShape,
}

impl FieldRule {
    pub const fn new(field: Field, label: &'static str, separator: Separator, shape: ValueShape) -> Self {
        Self {
            field,
            label,
            separator,
            shape,
        }
    }

    /// Regex source for this rule; capture group 1 holds the raw value
    pub fn pattern(&self) -> String {
        let separator = match self.separator {
            Separator::Colon => r"\s*:\s*",
            Separator::Space => r"\s+",
            Separator::Gap => r"\s*",
        };
        let value = match self.shape {
            ValueShape::FirstLine => "(.*)".to_string(),
            ValueShape::Word => r"(\w+)".to_string(),
            ValueShape::Digits => "([0-9]+)".to_string(),
            ValueShape::Block { terminators } => {
                let alternatives = terminators
                    .iter()
                    .map(|t| regex::escape(t))
                    .collect::<Vec<_>>()
                    .join("|");
                format!("(?s:(.*?))(?:{alternatives})")
            }
        };
        format!("{}{}{}", regex::escape(self.label), separator, value)
    }

    pub fn compile(&self) -> Result<Regex, regex::Error> {
        Regex::new(&self.pattern())
    }

    /// Turn a raw capture into the stored value
    pub fn clean(&self, raw: &str) -> String {
        match self.shape {
            ValueShape::FirstLine => raw.lines().next().unwrap_or("").trim().to_string(),
            ValueShape::Word | ValueShape::Digits => raw.trim().to_string(),
            ValueShape::Block { .. } => raw.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

/// Phrases that end the exam centre block on the card
pub const CENTER_TERMINATORS: &[&str] = &["Print Date", "To,", "The Centre", "NAME OF EXAMINATION"];

/// Extraction rules for the admit card layout
pub const DEFAULT_RULES: &[FieldRule] = &[
    FieldRule::new(Field::Roll, "Roll no is", Separator::Space, ValueShape::Word),
    FieldRule::new(Field::Name, "NAME OF CANDIDATE", Separator::Colon, ValueShape::FirstLine),
    FieldRule::new(Field::Father, "FATHER'S NAME", Separator::Colon, ValueShape::FirstLine),
    FieldRule::new(Field::Mother, "MOTHER'S NAME", Separator::Colon, ValueShape::FirstLine),
    FieldRule::new(Field::Email, "EMAIL ID", Separator::Colon, ValueShape::FirstLine),
    FieldRule::new(Field::AbcId, "ABC ID", Separator::Colon, ValueShape::Digits),
    FieldRule::new(Field::College, "COLLEGE NAME", Separator::Colon, ValueShape::FirstLine),
    FieldRule::new(
        Field::Center,
        "Exam Centre is",
        Separator::Gap,
        ValueShape::Block {
            terminators: CENTER_TERMINATORS,
        },
    ),
];

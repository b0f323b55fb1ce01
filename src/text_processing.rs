//! # Text Processing Module
//!
//! Turns the text of an admit card into a [`StudentRecord`].
//!
//! ## Features
//!
//! - Table-driven extraction, one rule per field (see [`crate::field_patterns`])
//! - Every rule searches the whole text on its own; a miss never blocks the others
//! - Unreadable documents yield the all-sentinel record instead of an error

use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::admit_card_model::StudentRecord;
use crate::field_patterns::{FieldRule, DEFAULT_RULES};

struct CompiledRule {
    rule: FieldRule,
    regex: Regex,
}

lazy_static! {
    static ref DEFAULT_EXTRACTOR: StudentRecordExtractor =
        StudentRecordExtractor::with_rules(DEFAULT_RULES).expect("Default field patterns should be valid");
}

/// Extracts student details from admit card text
#[derive(Clone)]
pub struct StudentRecordExtractor {
    rules: std::sync::Arc<Vec<CompiledRule>>,
}

impl StudentRecordExtractor {
    /// Create an extractor using the default admit card layout
    ///
    /// # Examples
    ///
    /// ```rust
    /// use admit_card_bot::admit_card_model::Field;
    /// use admit_card_bot::text_processing::StudentRecordExtractor;
    ///
    /// let extractor = StudentRecordExtractor::new();
    /// let record = extractor.extract_from_text("NAME OF CANDIDATE : JOHN DOE\n");
    /// assert_eq!(record.get(Field::Name), "JOHN DOE");
    /// ```
    pub fn new() -> Self {
        DEFAULT_EXTRACTOR.clone()
    }

    /// Create an extractor from a custom rule table
    pub fn with_rules(rules: &[FieldRule]) -> Result<Self, regex::Error> {
        let compiled = rules
            .iter()
            .map(|rule| {
                Ok(CompiledRule {
                    rule: *rule,
                    regex: rule.compile()?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        debug!(rules = compiled.len(), "Compiled field extraction rules");
        Ok(Self {
            rules: std::sync::Arc::new(compiled),
        })
    }

    /// Apply every rule to the text and collect the first match of each
    pub fn extract_from_text(&self, text: &str) -> StudentRecord {
        let mut record = StudentRecord::not_found();
        for compiled in self.rules.iter() {
            let Some(raw) = compiled.regex.captures(text).and_then(|caps| caps.get(1)) else {
                debug!(field = compiled.rule.field.key(), "No match for field");
                continue;
            };
            record.set(compiled.rule.field, compiled.rule.clean(raw.as_str()));
        }
        record
    }

    /// Read a downloaded document and extract its fields.
    ///
    /// Never fails: a document that cannot be read gives the all-sentinel record.
    pub fn extract_from_document(&self, path: &Path) -> StudentRecord {
        match crate::pdf::extract_text_from_pdf(path) {
            Ok(text) => {
                let record = self.extract_from_text(&text);
                info!(
                    path = %path.display(),
                    fields_found = record.found_count(),
                    "Admit card fields extracted"
                );
                record
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read admit card, using empty record");
                StudentRecord::not_found()
            }
        }
    }
}

impl Default for StudentRecordExtractor {
    fn default() -> Self {
        Self::new()
    }
}

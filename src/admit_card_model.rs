//! # Admit Card Data Model
//!
//! Core types flowing through the admit card pipeline: the validated form
//! number, the fixed-shape student record, and the owned handle to a
//! downloaded document.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::errors::AdmitCardError;

/// Placeholder stored for every field the document did not yield
pub const NOT_FOUND: &str = "Not Found";

/// A form number as typed by the candidate.
///
/// Only the shape is checked here (non-empty, ASCII digits). Whether the
/// number belongs to a real candidate is for the portal to decide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormNumber(String);

impl FormNumber {
    /// Parse user input, trimming surrounding whitespace
    ///
    /// # Examples
    ///
    /// ```rust
    /// use admit_card_bot::admit_card_model::FormNumber;
    ///
    /// assert_eq!(FormNumber::parse(" 0012345 ").unwrap().as_str(), "0012345");
    /// assert!(FormNumber::parse("abc123").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self, AdmitCardError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AdmitCardError::InputInvalid(input.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name the downloaded admit card is stored under
    pub fn document_file_name(&self) -> String {
        format!("admit_card_{}.pdf", self.0)
    }
}

impl std::fmt::Display for FormNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fields extracted from an admit card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Name,
    Father,
    Mother,
    Email,
    AbcId,
    Roll,
    College,
    Center,
}

impl Field {
    /// Every field, in record order
    pub const ALL: [Field; 8] = [
        Field::Name,
        Field::Father,
        Field::Mother,
        Field::Email,
        Field::AbcId,
        Field::Roll,
        Field::College,
        Field::Center,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Father => "father",
            Field::Mother => "mother",
            Field::Email => "email",
            Field::AbcId => "abc_id",
            Field::Roll => "roll",
            Field::College => "college",
            Field::Center => "center",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Student details read from an admit card.
///
/// Always holds all eight fields; anything the document did not yield is
/// [`NOT_FOUND`]. Serializes to a JSON object with exactly the eight keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRecord {
    values: [String; 8],
}

impl StudentRecord {
    /// A record with every field set to the sentinel
    pub fn not_found() -> Self {
        Self {
            values: std::array::from_fn(|_| NOT_FOUND.to_string()),
        }
    }

    pub fn get(&self, field: Field) -> &str {
        &self.values[field.index()]
    }

    /// Whether the field holds an extracted value rather than the sentinel
    pub fn is_found(&self, field: Field) -> bool {
        self.get(field) != NOT_FOUND
    }

    /// Number of fields holding an extracted value
    pub fn found_count(&self) -> usize {
        Field::ALL.iter().filter(|f| self.is_found(**f)).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> + '_ {
        Field::ALL.iter().map(move |f| (*f, self.get(*f)))
    }

    /// Store a value; empty values leave the sentinel in place
    pub(crate) fn set(&mut self, field: Field, value: String) {
        if !value.is_empty() {
            self.values[field.index()] = value;
        }
    }
}

impl Default for StudentRecord {
    fn default() -> Self {
        Self::not_found()
    }
}

impl Serialize for StudentRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Field::ALL.len()))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field.key(), value)?;
        }
        map.end()
    }
}

/// Exclusive handle to a downloaded admit card on local storage.
///
/// The file is removed when the handle is dropped, whether or not it was
/// delivered.
#[derive(Debug)]
pub struct DownloadedDocument {
    path: PathBuf,
}

impl DownloadedDocument {
    /// Take ownership of an existing file
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "admit_card.pdf".to_string())
    }
}

impl Drop for DownloadedDocument {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Downloaded document removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!(path = %self.path.display(), error = %e, "Failed to remove downloaded document"),
        }
    }
}

/// A retrieved admit card together with the details read from it
#[derive(Debug)]
pub struct AdmitCard {
    pub form_number: FormNumber,
    pub document: DownloadedDocument,
    pub record: StudentRecord,
}

//! OCR field normalization for PAN and AADHAR cards.
//!
//! The identifier is the only hard requirement. Every other field is
//! best-effort and comes back as [`FieldValue::NotFound`] when missing.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::identity::RawIdentifier;
use crate::types::{DocumentDetails, DocumentType, FieldValue};

/// Field name → recognized text, as produced by the OCR collaborator.
pub type RawFields = BTreeMap<String, String>;

pub const FIELD_NAME: &str = "Name";
pub const FIELD_FATHER_NAME: &str = "Father's Name";
pub const FIELD_GENDER: &str = "Gender";
pub const FIELD_DOB: &str = "DOB";
pub const FIELD_ID: &str = "ID";

/// Date formats tried in order; the first successful parse wins.
///
/// `%d/%m/%Y` comes first, so `01/02/2020` is the 1st of February.
/// chrono's `%b` also accepts full month names; `%B` is kept for readability.
pub const DEFAULT_DATE_FORMATS: [&str; 6] = [
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d %B %Y",
];

/// chrono's `%Y` also accepts 1-3 digit years; truncated OCR like `01/02/20`
/// must not become year 20.
const FOUR_DIGIT_YEARS: std::ops::RangeInclusive<i32> = 1000..=9999;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FieldError {
    #[error("required field '{0}' missing from OCR output")]
    RequiredFieldMissing(&'static str),
}

/// Structured fields extracted from one document.
#[derive(Debug, PartialEq)]
pub struct IdentityFields {
    pub id: RawIdentifier,
    pub name: FieldValue,
    /// `None` when no date format matched: DOB unknown, not an error.
    pub dob: Option<NaiveDate>,
    pub details: DocumentDetails,
}

pub struct FieldNormalizer {
    date_formats: Vec<String>,
}

impl Default for FieldNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect())
    }
}

impl FieldNormalizer {
    /// Build a normalizer trying `date_formats` (chrono syntax) in the given order.
    pub fn new(date_formats: Vec<String>) -> Self {
        Self { date_formats }
    }

    pub fn normalize(
        &self,
        raw: &RawFields,
        doc_type: DocumentType,
    ) -> Result<IdentityFields, FieldError> {
        let id = lookup(raw, FIELD_ID)
            .map(RawIdentifier::new)
            .ok_or(FieldError::RequiredFieldMissing(FIELD_ID))?;

        let name = lookup(raw, FIELD_NAME).into();
        let dob = lookup(raw, FIELD_DOB).and_then(|s| self.parse_date(&s));
        let details = match doc_type {
            DocumentType::Pan => DocumentDetails::Pan {
                father_name: lookup(raw, FIELD_FATHER_NAME).into(),
            },
            DocumentType::Aadhar => DocumentDetails::Aadhar {
                gender: lookup(raw, FIELD_GENDER).into(),
            },
        };

        Ok(IdentityFields { id, name, dob, details })
    }

    /// Parse `raw` with the first matching format, in priority order.
    pub fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        let parsed = self.date_formats.iter().find_map(|format| {
            NaiveDate::parse_from_str(raw, format)
                .ok()
                .filter(|date| FOUR_DIGIT_YEARS.contains(&date.year()))
                .map(|date| (format, date))
        });

        match parsed {
            Some((format, date)) => {
                tracing::debug!(format = %format, %date, "date of birth parsed");
                Some(date)
            }
            None => {
                tracing::debug!("date of birth did not match any known format");
                None
            }
        }
    }
}

/// Trimmed, non-empty value for `field`. Exact key first, then case-insensitive.
fn lookup(raw: &RawFields, field: &str) -> Option<String> {
    raw.get(field)
        .or_else(|| {
            raw.iter()
                .find(|(key, _)| key.trim().eq_ignore_ascii_case(field))
                .map(|(_, value)| value)
        })
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

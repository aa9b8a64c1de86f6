use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fields::DEFAULT_DATE_FORMATS;
use crate::types::{DocumentType, MAX_COSINE_DISTANCE};

/// Cosine-distance threshold calibrated for FaceNet-512. Re-derive it when
/// the embedding model changes.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.70;

/// Side of the square face crop handed to the embedder.
pub const DEFAULT_CANONICAL_FACE_SIZE: u32 = 224;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("match threshold {0} outside [0, {MAX_COSINE_DISTANCE}]")]
    InvalidThreshold(f32),
    #[error("canonical face size must be positive")]
    InvalidFaceSize,
    #[error("at least one date format is required")]
    NoDateFormats,
    #[error("invalid table name '{0}': use letters, digits and underscores")]
    InvalidTableName(String),
    #[error("PAN and AADHAR records cannot share table '{0}'")]
    SharedTable(String),
}

/// Settings injected into the registration pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub match_threshold: f32,
    pub canonical_face_size: u32,
    /// chrono formats tried in order; the first that parses wins.
    pub date_formats: Vec<String>,
    pub tables: TableNames,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            canonical_face_size: DEFAULT_CANONICAL_FACE_SIZE,
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect(),
            tables: TableNames::default(),
        }
    }
}

impl RegistrationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=MAX_COSINE_DISTANCE).contains(&self.match_threshold) {
            return Err(ConfigError::InvalidThreshold(self.match_threshold));
        }
        if self.canonical_face_size == 0 {
            return Err(ConfigError::InvalidFaceSize);
        }
        if self.date_formats.is_empty() {
            return Err(ConfigError::NoDateFormats);
        }
        self.tables.validate()
    }
}

/// Storage table per document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub pan: String,
    pub aadhar: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            pan: "users".to_string(),
            aadhar: "aadhar".to_string(),
        }
    }
}

impl TableNames {
    pub fn for_document(&self, doc_type: DocumentType) -> &str {
        match doc_type {
            DocumentType::Pan => &self.pan,
            DocumentType::Aadhar => &self.aadhar,
        }
    }

    /// Reverse lookup: which document type a table holds.
    pub fn document_for(&self, table: &str) -> Option<DocumentType> {
        if table == self.pan {
            Some(DocumentType::Pan)
        } else if table == self.aadhar {
            Some(DocumentType::Aadhar)
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in [&self.pan, &self.aadhar] {
            if !is_sql_identifier(name) {
                return Err(ConfigError::InvalidTableName(name.clone()));
            }
        }
        if self.pan.eq_ignore_ascii_case(&self.aadhar) {
            return Err(ConfigError::SharedTable(self.pan.clone()));
        }
        Ok(())
    }
}

/// Table names are interpolated into SQL, so only plain identifiers are allowed.
fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

use std::path::PathBuf;

use ekyc_core::{FaceImage, OcrError, RawFields, TextRecognizer};

/// Text recognizer backed by a JSON object of labelled fields written by an
/// external OCR step, e.g. `{"Name": "...", "DOB": "05/11/1988", "ID": "..."}`.
pub struct FieldsFileRecognizer {
    path: PathBuf,
}

impl FieldsFileRecognizer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TextRecognizer for FieldsFileRecognizer {
    fn recognize(&mut self, _document: &FaceImage) -> Result<RawFields, OcrError> {
        let text = std::fs::read_to_string(&self.path)?;
        let fields: RawFields = serde_json::from_str(&text)
            .map_err(|e| OcrError::Failed(format!("{}: {e}", self.path.display())))?;
        tracing::debug!(path = %self.path.display(), count = fields.len(), "fields read");
        Ok(fields)
    }
}

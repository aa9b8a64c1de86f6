use thiserror::Error;

use crate::fields::RawFields;
use crate::types::FaceImage;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("text recognition failed: {0}")]
    Failed(String),
    #[error("text recognition I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// OCR collaborator: reads labelled fields off a document image.
///
/// May return an empty map when nothing was recognized.
pub trait TextRecognizer {
    fn recognize(&mut self, document: &FaceImage) -> Result<RawFields, OcrError>;
}

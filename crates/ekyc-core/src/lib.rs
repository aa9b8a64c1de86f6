//! ekyc-core — Identity-document onboarding decisions.
//!
//! Verifies a selfie against the face on an ID card (SCRFD detection and
//! FaceNet-512 embeddings via ONNX Runtime), normalizes OCR fields, hashes
//! the document identifier and admits each identity into the registry at
//! most once.

pub mod config;
pub mod detector;
pub mod diagnostics;
pub mod embedder;
pub mod fields;
pub mod identity;
pub mod matcher;
pub mod ocr;
pub mod registration;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, RegistrationConfig, TableNames};
pub use detector::{FaceDetector, ScrfdDetector};
pub use embedder::{FaceEmbedder, OnnxFaceEmbedder};
pub use fields::{FieldNormalizer, IdentityFields, RawFields};
pub use identity::{IdentityKey, RawIdentifier};
pub use matcher::{FaceMatch, FaceMatcher, ImageRole};
pub use ocr::{OcrError, TextRecognizer};
pub use registration::{
    RegistrationCoordinator, RegistrationReport, RegistrationState, RejectReason,
};
pub use store::{DuplicateGuard, RecordStore, StoreError};
pub use types::{
    BoundingBox, DocumentDetails, DocumentType, DuplicateCheckResult, Embedding, FaceImage,
    FieldValue, IdentityRecord, MatchDecision,
};

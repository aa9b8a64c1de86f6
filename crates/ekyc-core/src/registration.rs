//! Registration pipeline.
//!
//! One attempt runs every stage at most once, strictly forward:
//!
//! ```text
//! ReceivedInputs → FaceVerified → FieldsNormalized → KeyDerived
//!     → DuplicateChecked → Admitted
//! ```
//!
//! Every failure ends the attempt in `Rejected` with a reason code. Nothing is
//! retried; the caller asks the applicant to start over.

use serde::Serialize;

use crate::config::{ConfigError, RegistrationConfig};
use crate::detector::FaceDetector;
use crate::embedder::FaceEmbedder;
use crate::fields::{FieldNormalizer, IdentityFields};
use crate::identity::IdentityKey;
use crate::matcher::{FaceMatch, FaceMatcher};
use crate::ocr::TextRecognizer;
use crate::store::{DuplicateGuard, RecordStore, StoreError};
use crate::types::{DocumentType, FaceImage, IdentityRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistrationState {
    ReceivedInputs,
    FaceVerified,
    FieldsNormalized,
    KeyDerived,
    DuplicateChecked,
    Admitted,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    FaceMismatch,
    EmbeddingServiceFailure,
    OcrFailure,
    OcrEmptyResult,
    MissingIdentifier,
    DuplicateRecord,
    StoreUnavailable,
}

impl RejectReason {
    /// Message for the applicant.
    pub fn message(&self) -> &'static str {
        match self {
            RejectReason::FaceMismatch => {
                "Face verification failed. Please try again with clearer images."
            }
            RejectReason::EmbeddingServiceFailure => {
                "Face verification is unavailable right now. Please try again later."
            }
            RejectReason::OcrFailure | RejectReason::OcrEmptyResult => {
                "No text could be read from the ID card. Please try a clearer picture."
            }
            RejectReason::MissingIdentifier => {
                "The ID number could not be read from the ID card. Please try a clearer picture."
            }
            RejectReason::DuplicateRecord => "This ID is already registered.",
            RejectReason::StoreUnavailable => {
                "The registry could not be reached. Please try again later."
            }
        }
    }
}

/// Trace of one registration attempt.
#[derive(Debug)]
pub struct RegistrationReport {
    pub doc_type: DocumentType,
    /// States visited, in order. The last entry is terminal.
    pub history: Vec<RegistrationState>,
    pub face: FaceMatch,
    /// Record built from the document once the identity key was derived.
    /// Persisted iff the attempt was admitted.
    pub candidate: Option<IdentityRecord>,
    /// Registry entry that made this attempt a duplicate.
    pub existing: Option<IdentityRecord>,
    /// Underlying error text for the rejection, for logs and operators.
    pub detail: Option<String>,
}

impl RegistrationReport {
    pub fn state(&self) -> RegistrationState {
        self.history
            .last()
            .copied()
            .unwrap_or(RegistrationState::ReceivedInputs)
    }

    pub fn is_admitted(&self) -> bool {
        self.state() == RegistrationState::Admitted
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self.state() {
            RegistrationState::Rejected(reason) => Some(reason),
            _ => None,
        }
    }

    fn advance(&mut self, state: RegistrationState) {
        tracing::debug!(?state, "registration advanced");
        self.history.push(state);
    }

    fn reject(mut self, reason: RejectReason, detail: Option<String>) -> Self {
        tracing::warn!(?reason, detail = detail.as_deref().unwrap_or(""), "registration rejected");
        self.history.push(RegistrationState::Rejected(reason));
        self.detail = detail;
        self
    }
}

/// Sequences face matching, OCR, normalization, key derivation, the
/// duplicate check and admission.
pub struct RegistrationCoordinator<D, E, R, S> {
    config: RegistrationConfig,
    matcher: FaceMatcher<D, E>,
    normalizer: FieldNormalizer,
    recognizer: R,
    store: S,
}

impl<D, E, R, S> RegistrationCoordinator<D, E, R, S>
where
    D: FaceDetector,
    E: FaceEmbedder,
    R: TextRecognizer,
    S: RecordStore,
{
    pub fn new(
        config: RegistrationConfig,
        detector: D,
        embedder: E,
        recognizer: R,
        store: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let matcher = FaceMatcher::new(
            detector,
            embedder,
            config.match_threshold,
            config.canonical_face_size,
        );
        let normalizer = FieldNormalizer::new(config.date_formats.clone());
        Ok(Self {
            config,
            matcher,
            normalizer,
            recognizer,
            store,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one registration attempt.
    pub fn register(
        &mut self,
        doc_type: DocumentType,
        id_card: &FaceImage,
        selfie: &FaceImage,
    ) -> RegistrationReport {
        tracing::info!(%doc_type, "registration started");

        let face = self.matcher.compare(id_card, selfie);
        let mut report = RegistrationReport {
            doc_type,
            history: vec![RegistrationState::ReceivedInputs],
            face,
            candidate: None,
            existing: None,
            detail: None,
        };

        if !report.face.decision.verified {
            let (reason, detail) = match &report.face.failure {
                Some(err) => (RejectReason::EmbeddingServiceFailure, Some(err.to_string())),
                None => (RejectReason::FaceMismatch, None),
            };
            return report.reject(reason, detail);
        }
        report.advance(RegistrationState::FaceVerified);

        let raw = match self.recognizer.recognize(id_card) {
            Ok(raw) => raw,
            Err(err) => return report.reject(RejectReason::OcrFailure, Some(err.to_string())),
        };
        if raw.is_empty() {
            return report.reject(RejectReason::OcrEmptyResult, None);
        }

        let fields = self.normalizer.normalize(&raw, doc_type);
        let IdentityFields { id, name, dob, details } = match fields {
            Ok(fields) => fields,
            Err(err) => {
                return report.reject(RejectReason::MissingIdentifier, Some(err.to_string()))
            }
        };
        if dob.is_none() {
            tracing::info!("date of birth unknown; continuing without it");
        }
        report.advance(RegistrationState::FieldsNormalized);

        let key = IdentityKey::derive(id);
        report.advance(RegistrationState::KeyDerived);

        let candidate = IdentityRecord {
            id: key,
            name,
            dob,
            embedding: report.face.selfie_embedding.clone(),
            details,
            created_at: None,
        };

        let guard = DuplicateGuard::new(&self.config.tables);
        let check = match guard.check(&self.store, &candidate.id, doc_type) {
            Ok(check) => check,
            Err(err) => {
                report.candidate = Some(candidate);
                return report.reject(RejectReason::StoreUnavailable, Some(err.to_string()));
            }
        };
        report.advance(RegistrationState::DuplicateChecked);

        if check.exists {
            report.existing = check.existing_record;
            report.candidate = Some(candidate);
            return report.reject(RejectReason::DuplicateRecord, None);
        }

        let table = self.config.tables.for_document(doc_type);
        let inserted = self.store.insert(table, &candidate);
        let key = candidate.id.clone();
        report.candidate = Some(candidate);

        match inserted {
            Ok(()) => {
                tracing::info!(table, key = %key, "record admitted");
                report.advance(RegistrationState::Admitted);
                report
            }
            // Lost a race with a concurrent attempt for the same identifier.
            Err(err @ StoreError::UniquenessViolation(_)) => {
                report.reject(RejectReason::DuplicateRecord, Some(err.to_string()))
            }
            Err(err) => report.reject(RejectReason::StoreUnavailable, Some(err.to_string())),
        }
    }
}

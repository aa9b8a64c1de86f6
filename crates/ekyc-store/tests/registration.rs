//! End-to-end registration against a real SQLite registry, with stub face
//! and text models.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ekyc_core::detector::DetectorError;
use ekyc_core::embedder::EmbedderError;
use ekyc_core::types::EMBEDDING_DIM;
use ekyc_core::{
    BoundingBox, DocumentType, Embedding, FaceDetector, FaceEmbedder, FaceImage, FieldValue,
    IdentityKey, OcrError, RawFields, RawIdentifier, RecordStore, RegistrationConfig,
    RegistrationCoordinator, RegistrationState, RejectReason, TableNames, TextRecognizer,
};
use ekyc_store::SqliteRecordStore;
use image::{Rgb, RgbImage};

/// Reports the whole frame as one face.
struct WholeFrame;

impl FaceDetector for WholeFrame {
    fn detect(&mut self, image: &FaceImage) -> Result<Vec<BoundingBox>, DetectorError> {
        Ok(vec![BoundingBox {
            x: 0.0,
            y: 0.0,
            width: image.width() as f32,
            height: image.height() as f32,
            confidence: 0.99,
        }])
    }
}

/// Embeds a face by its mean color, so same-colored photos match.
struct ColorEmbedder;

impl FaceEmbedder for ColorEmbedder {
    fn embed(&mut self, face: &FaceImage) -> Result<Embedding, EmbedderError> {
        let Rgb([r, g, b]) = *face.pixels().get_pixel(face.width() / 2, face.height() / 2);
        let mut values = vec![0.0f32; EMBEDDING_DIM];
        values[0] = r as f32;
        values[1] = g as f32;
        values[2] = b as f32;
        Ok(Embedding::new(values))
    }
}

struct FixedText(RawFields);

impl FixedText {
    fn new(fields: &[(&str, &str)]) -> Self {
        Self(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        )
    }
}

impl TextRecognizer for FixedText {
    fn recognize(&mut self, _document: &FaceImage) -> Result<RawFields, OcrError> {
        Ok(self.0.clone())
    }
}

fn photo(color: [u8; 3]) -> FaceImage {
    FaceImage::new(RgbImage::from_pixel(120, 160, Rgb(color)))
}

fn coordinator(
    fields: &[(&str, &str)],
) -> RegistrationCoordinator<WholeFrame, ColorEmbedder, FixedText, SqliteRecordStore> {
    let store = SqliteRecordStore::open_in_memory(TableNames::default()).unwrap();
    RegistrationCoordinator::new(
        RegistrationConfig::default(),
        WholeFrame,
        ColorEmbedder,
        FixedText::new(fields),
        store,
    )
    .unwrap()
}

const SKIN: [u8; 3] = [200, 160, 130];

#[test]
fn test_register_pan_then_duplicate() {
    let mut ekyc = coordinator(&[
        ("Name", "RAHUL SHARMA"),
        ("Father's Name", "SURESH SHARMA"),
        ("DOB", "05/11/1988"),
        ("ID", "ABCDE1234F"),
    ]);

    let first = ekyc.register(DocumentType::Pan, &photo(SKIN), &photo(SKIN));
    assert!(first.is_admitted(), "{:?}", first.history);

    let key = IdentityKey::derive(RawIdentifier::new("ABCDE1234F"));
    let stored = ekyc.store().get("users", &key).unwrap().unwrap();
    assert_eq!(stored.name, FieldValue::Found("RAHUL SHARMA".into()));
    assert_eq!(stored.dob, NaiveDate::from_ymd_opt(1988, 11, 5));
    assert!(stored.embedding.is_some());

    let second = ekyc.register(DocumentType::Pan, &photo(SKIN), &photo(SKIN));
    assert_eq!(second.state(), RegistrationState::Rejected(RejectReason::DuplicateRecord));
    assert_eq!(second.existing.as_ref().map(|r| &r.id), Some(&key));
    assert_eq!(ekyc.store().count("users").unwrap(), 1);
}

#[test]
fn test_aadhar_with_unparseable_dob() {
    let mut ekyc = coordinator(&[
        ("Name", "PRIYA NAIR"),
        ("Gender", "FEMALE"),
        ("DOB", "sometime in 1990"),
        ("ID", "1234 5678 9012"),
    ]);

    let report = ekyc.register(DocumentType::Aadhar, &photo(SKIN), &photo(SKIN));
    assert!(report.is_admitted());

    let key = IdentityKey::derive(RawIdentifier::new("1234 5678 9012"));
    let stored = ekyc.store().get("aadhar", &key).unwrap().unwrap();
    assert_eq!(stored.dob, None);
    assert_eq!(ekyc.store().count("users").unwrap(), 0);
}

#[test]
fn test_face_mismatch_writes_nothing() {
    let mut ekyc = coordinator(&[("Name", "A"), ("ID", "ABCDE1234F")]);

    let report = ekyc.register(DocumentType::Pan, &photo([255, 0, 0]), &photo([0, 0, 255]));
    assert_eq!(report.state(), RegistrationState::Rejected(RejectReason::FaceMismatch));
    assert!(report.face.decision.distance > report.face.decision.threshold);
    assert_eq!(ekyc.store().count("users").unwrap(), 0);
}

#[test]
fn test_missing_identifier_writes_nothing() {
    let mut ekyc = coordinator(&[("Name", "RAHUL SHARMA"), ("DOB", "05/11/1988")]);

    let report = ekyc.register(DocumentType::Pan, &photo(SKIN), &photo(SKIN));
    assert_eq!(report.state(), RegistrationState::Rejected(RejectReason::MissingIdentifier));
    assert_eq!(ekyc.store().count("users").unwrap(), 0);
}

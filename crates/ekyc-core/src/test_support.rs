//! Stub collaborators shared by the unit tests.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};

use image::{Rgb, RgbImage};

use crate::detector::{DetectorError, FaceDetector};
use crate::embedder::{EmbedderError, FaceEmbedder};
use crate::fields::RawFields;
use crate::identity::{IdentityKey, RawIdentifier};
use crate::ocr::{OcrError, TextRecognizer};
use crate::store::{RecordStore, StoreError};
use crate::types::{
    BoundingBox, DocumentDetails, DocumentType, Embedding, FaceImage, FieldValue, IdentityRecord,
    EMBEDDING_DIM,
};

pub fn image(width: u32, height: u32) -> FaceImage {
    FaceImage::new(RgbImage::from_pixel(width, height, Rgb([120, 110, 100])))
}

/// Two unit embeddings whose cosine distance is `distance` (in [0, 2]).
pub fn embedding_pair(distance: f32) -> (Embedding, Embedding) {
    let cos = 1.0 - distance;
    let sin = (1.0 - cos * cos).max(0.0).sqrt();
    let mut a = vec![0.0f32; EMBEDDING_DIM];
    let mut b = vec![0.0f32; EMBEDDING_DIM];
    a[0] = 1.0;
    b[0] = cos;
    b[1] = sin;
    (Embedding::new(a), Embedding::new(b))
}

pub fn record(raw_id: &str, doc_type: DocumentType) -> IdentityRecord {
    let details = match doc_type {
        DocumentType::Pan => DocumentDetails::Pan { father_name: FieldValue::NotFound },
        DocumentType::Aadhar => DocumentDetails::Aadhar {
            gender: FieldValue::Found("MALE".into()),
        },
    };
    IdentityRecord {
        id: IdentityKey::derive(RawIdentifier::new(raw_id)),
        name: FieldValue::Found("TEST USER".into()),
        dob: None,
        embedding: None,
        details,
        created_at: None,
    }
}

enum DetectorMode {
    Regions(Vec<BoundingBox>),
    WholeImage,
    Failing,
}

pub struct FixedDetector {
    mode: DetectorMode,
}

impl FixedDetector {
    pub fn new(regions: Vec<BoundingBox>) -> Self {
        Self { mode: DetectorMode::Regions(regions) }
    }

    /// Reports one face covering the whole image.
    pub fn whole_face() -> Self {
        Self { mode: DetectorMode::WholeImage }
    }

    pub fn failing() -> Self {
        Self { mode: DetectorMode::Failing }
    }
}

impl FaceDetector for FixedDetector {
    fn detect(&mut self, image: &FaceImage) -> Result<Vec<BoundingBox>, DetectorError> {
        match &self.mode {
            DetectorMode::Regions(regions) => Ok(regions.clone()),
            DetectorMode::WholeImage => Ok(vec![BoundingBox {
                x: 0.0,
                y: 0.0,
                width: image.width() as f32,
                height: image.height() as f32,
                confidence: 0.99,
            }]),
            DetectorMode::Failing => Err(DetectorError::InferenceFailed("stub".into())),
        }
    }
}

/// Hands out queued results in order: ID card first, then selfie.
pub struct QueueEmbedder {
    queue: VecDeque<Result<Embedding, EmbedderError>>,
    pub seen_sizes: Vec<(u32, u32)>,
}

impl QueueEmbedder {
    pub fn new(results: Vec<Result<Embedding, EmbedderError>>) -> Self {
        Self { queue: results.into(), seen_sizes: Vec::new() }
    }
}

impl FaceEmbedder for QueueEmbedder {
    fn embed(&mut self, face: &FaceImage) -> Result<Embedding, EmbedderError> {
        self.seen_sizes.push((face.width(), face.height()));
        self.queue
            .pop_front()
            .unwrap_or_else(|| Err(EmbedderError::InferenceFailed("queue exhausted".into())))
    }
}

/// Returns the same fields on every call; `None` simulates an OCR outage.
pub struct FixedRecognizer {
    fields: Option<RawFields>,
    pub calls: usize,
}

impl FixedRecognizer {
    pub fn fields(pairs: &[(&str, &str)]) -> Self {
        let fields = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { fields: Some(fields), calls: 0 }
    }

    pub fn failing() -> Self {
        Self { fields: None, calls: 0 }
    }
}

impl TextRecognizer for FixedRecognizer {
    fn recognize(&mut self, _document: &FaceImage) -> Result<RawFields, OcrError> {
        self.calls += 1;
        self.fields
            .clone()
            .ok_or_else(|| OcrError::Failed("engine offline".into()))
    }
}

/// In-memory store with primary-key uniqueness and call counters.
#[derive(Default)]
pub struct MemoryStore {
    tables: HashMap<String, HashMap<IdentityKey, IdentityRecord>>,
    unavailable: bool,
    blind_lookups: bool,
    pub gets: Cell<usize>,
    pub inserts: usize,
}

impl MemoryStore {
    pub fn unavailable() -> Self {
        Self { unavailable: true, ..Default::default() }
    }

    /// Lookups always miss; only the insert constraint catches duplicates.
    pub fn blind() -> Self {
        Self { blind_lookups: true, ..Default::default() }
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, HashMap::len)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, table: &str, key: &IdentityKey) -> Result<Option<IdentityRecord>, StoreError> {
        self.gets.set(self.gets.get() + 1);
        self.check_available()?;
        if self.blind_lookups {
            return Ok(None);
        }
        Ok(self.tables.get(table).and_then(|t| t.get(key)).cloned())
    }

    fn insert(&mut self, table: &str, record: &IdentityRecord) -> Result<(), StoreError> {
        self.inserts += 1;
        self.check_available()?;
        let rows = self.tables.entry(table.to_string()).or_default();
        if rows.contains_key(&record.id) {
            return Err(StoreError::UniquenessViolation(record.id.clone()));
        }
        rows.insert(record.id.clone(), record.clone());
        Ok(())
    }
}

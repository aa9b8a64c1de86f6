use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use image::imageops::FilterType;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::IdentityKey;

/// Dimension of the embedding vectors produced by the FaceNet-512 model.
pub const EMBEDDING_DIM: usize = 512;

/// Largest possible cosine distance (opposite vectors).
pub const MAX_COSINE_DISTANCE: f32 = 2.0;

/// Sentinel shown for best-effort fields the OCR output did not contain.
pub const NOT_FOUND: &str = "Not found";

/// Identity document variant. Selects the field schema and the storage table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "PAN")]
    Pan,
    #[serde(rename = "AADHAR")]
    Aadhar,
}

impl DocumentType {
    /// Tag persisted in the `id_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pan => "PAN",
            DocumentType::Aadhar => "AADHAR",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown document type '{0}' (expected PAN or AADHAR)")]
pub struct UnknownDocumentType(pub String);

impl FromStr for DocumentType {
    type Err = UnknownDocumentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PAN" => Ok(DocumentType::Pan),
            "AADHAR" | "AADHAAR" => Ok(DocumentType::Aadhar),
            _ => Err(UnknownDocumentType(s.to_string())),
        }
    }
}

/// Decoded RGB image handed between the acquisition layer and the collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceImage {
    pixels: RgbImage,
}

impl FaceImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    /// Decode an image file of any format supported by the `image` crate.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, image::ImageError> {
        Ok(Self::new(image::open(path)?.to_rgb8()))
    }

    /// Wrap packed RGB8 bytes. Returns `None` if the length does not match.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(Self::new)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Crop to `region`, clamped to the image bounds.
    ///
    /// Returns `None` when nothing of the region lies inside the image.
    pub fn crop(&self, region: &BoundingBox) -> Option<FaceImage> {
        let x0 = region.x.max(0.0).floor();
        let y0 = region.y.max(0.0).floor();
        let x1 = (region.x + region.width).min(self.width() as f32).ceil();
        let y1 = (region.y + region.height).min(self.height() as f32).ceil();

        if !(x1 > x0 && y1 > y0) {
            return None;
        }

        let (x, y) = (x0 as u32, y0 as u32);
        let (w, h) = ((x1 - x0) as u32, (y1 - y0) as u32);
        let cropped = image::imageops::crop_imm(&self.pixels, x, y, w, h).to_image();
        Some(FaceImage::new(cropped))
    }

    /// Bilinear resize to a `size`×`size` square.
    pub fn resized(&self, size: u32) -> FaceImage {
        FaceImage::new(image::imageops::resize(
            &self.pixels,
            size,
            size,
            FilterType::Triangle,
        ))
    }
}

/// Axis-aligned face region reported by a detector, in source-image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face embedding vector. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True for a full-length vector of finite values.
    pub fn is_well_formed(&self) -> bool {
        self.values.len() == EMBEDDING_DIM && self.values.iter().all(|v| v.is_finite())
    }

    /// Cosine similarity in [-1, 1]. Zero vectors have similarity 0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Cosine distance in [0, 2]. Lower = more similar.
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }
}

/// Binary face-match decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchDecision {
    pub verified: bool,
    pub distance: f32,
    pub threshold: f32,
}

impl MatchDecision {
    /// `verified` holds iff `distance <= threshold`. NaN never verifies.
    pub fn from_distance(distance: f32, threshold: f32) -> Self {
        Self {
            verified: distance <= threshold,
            distance,
            threshold,
        }
    }

    /// Decision used when no distance could be computed.
    pub fn unavailable(threshold: f32) -> Self {
        Self {
            verified: false,
            distance: MAX_COSINE_DISTANCE,
            threshold,
        }
    }
}

/// A best-effort text field: either read from the document or explicitly missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum FieldValue {
    Found(String),
    NotFound,
}

impl FieldValue {
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            FieldValue::Found(value) => Some(value),
            FieldValue::NotFound => None,
        }
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(v) => FieldValue::Found(v),
            None => FieldValue::NotFound,
        }
    }
}

impl From<FieldValue> for Option<String> {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Found(v) => Some(v),
            FieldValue::NotFound => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_deref().unwrap_or(NOT_FOUND))
    }
}

/// Fields that exist only on one document variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "id_type")]
pub enum DocumentDetails {
    #[serde(rename = "PAN")]
    Pan { father_name: FieldValue },
    #[serde(rename = "AADHAR")]
    Aadhar { gender: FieldValue },
}

impl DocumentDetails {
    pub fn document_type(&self) -> DocumentType {
        match self {
            DocumentDetails::Pan { .. } => DocumentType::Pan,
            DocumentDetails::Aadhar { .. } => DocumentType::Aadhar,
        }
    }
}

/// A registry entry. `id` is always the derived identity key, never the raw identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: IdentityKey,
    pub name: FieldValue,
    pub dob: Option<NaiveDate>,
    pub embedding: Option<Embedding>,
    #[serde(flatten)]
    pub details: DocumentDetails,
    /// Populated by the store on read; `None` for records not yet persisted.
    pub created_at: Option<NaiveDateTime>,
}

impl IdentityRecord {
    pub fn id_type(&self) -> DocumentType {
        self.details.document_type()
    }
}

/// Outcome of a duplicate lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateCheckResult {
    pub exists: bool,
    pub existing_record: Option<IdentityRecord>,
}

impl From<Option<IdentityRecord>> for DuplicateCheckResult {
    fn from(existing_record: Option<IdentityRecord>) -> Self {
        Self {
            exists: existing_record.is_some(),
            existing_record,
        }
    }
}

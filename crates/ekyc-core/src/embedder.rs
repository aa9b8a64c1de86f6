//! FaceNet-512 face embedder via ONNX Runtime.
//!
//! Takes canonical face crops and produces 512-dimensional, L2-normalized
//! embeddings.

use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

use crate::types::{Embedding, FaceImage, EMBEDDING_DIM};

// FaceNet expects 160x160 NHWC input, unlike SCRFD.
const FACENET_INPUT_SIZE: usize = 160;
const FACENET_MEAN: f32 = 127.5;
const FACENET_STD: f32 = 128.0;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("malformed embedding: expected {EMBEDDING_DIM} finite values, got {0}")]
    Malformed(usize),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Turns a face image into an embedding vector.
pub trait FaceEmbedder {
    fn embed(&mut self, face: &FaceImage) -> Result<Embedding, EmbedderError>;
}

/// FaceNet-512 (`facenet512.onnx`) embedder.
pub struct OnnxFaceEmbedder {
    session: Session,
}

impl OnnxFaceEmbedder {
    pub fn load(model_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded FaceNet-512 model"
        );

        Ok(Self { session })
    }

    /// Resize to the model input and normalize into a NHWC float tensor.
    fn preprocess(face: &FaceImage) -> Array4<f32> {
        let size = FACENET_INPUT_SIZE as u32;
        let resized = image::imageops::resize(face.pixels(), size, size, FilterType::Triangle);

        let mut tensor = Array4::<f32>::zeros((1, FACENET_INPUT_SIZE, FACENET_INPUT_SIZE, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = (pixel[c] as f32 - FACENET_MEAN) / FACENET_STD;
                tensor[[0, y as usize, x as usize, c]] = value;
            }
        }
        tensor
    }
}

impl FaceEmbedder for OnnxFaceEmbedder {
    fn embed(&mut self, face: &FaceImage) -> Result<Embedding, EmbedderError> {
        let input = Self::preprocess(face);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        l2_normalize(raw.to_vec())
    }
}

/// Validate dimension and scale to unit length.
fn l2_normalize(raw: Vec<f32>) -> Result<Embedding, EmbedderError> {
    if raw.len() != EMBEDDING_DIM || raw.iter().any(|v| !v.is_finite()) {
        return Err(EmbedderError::Malformed(raw.len()));
    }

    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    let values = if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw
    };
    Ok(Embedding::new(values))
}

//! Face-match decision: detect → crop → canonicalize → embed → cosine distance.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::detector::{select_largest, FaceDetector};
use crate::embedder::{EmbedderError, FaceEmbedder};
use crate::types::{Embedding, FaceImage, MatchDecision};

/// Which of the two inputs an image is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageRole {
    IdCard,
    Selfie,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::IdCard => f.write_str("ID card"),
            ImageRole::Selfie => f.write_str("selfie"),
        }
    }
}

#[derive(Error, Debug)]
pub enum FaceMatchError {
    #[error("embedding service failed on {role} image: {source}")]
    EmbeddingServiceFailure {
        role: ImageRole,
        #[source]
        source: EmbedderError,
    },
}

/// Everything one comparison produced.
#[derive(Debug)]
pub struct FaceMatch {
    pub decision: MatchDecision,
    /// Images with no detected face. The whole image was embedded instead.
    pub face_not_detected: Vec<ImageRole>,
    /// Set when the embedder failed; `decision.verified` is then false.
    pub failure: Option<FaceMatchError>,
    pub selfie_embedding: Option<Embedding>,
    /// Canonical crops as handed to the embedder.
    pub id_face: FaceImage,
    pub selfie_face: FaceImage,
}

pub struct FaceMatcher<D, E> {
    detector: D,
    embedder: E,
    threshold: f32,
    canonical_size: u32,
}

impl<D: FaceDetector, E: FaceEmbedder> FaceMatcher<D, E> {
    pub fn new(detector: D, embedder: E, threshold: f32, canonical_size: u32) -> Self {
        Self {
            detector,
            embedder,
            threshold,
            canonical_size,
        }
    }

    /// Compare the face on the ID card against the selfie.
    ///
    /// Never fails: missing faces fall back to the whole image and embedder
    /// failures yield an unverified decision with `failure` set.
    pub fn compare(&mut self, id_card: &FaceImage, selfie: &FaceImage) -> FaceMatch {
        let mut face_not_detected = Vec::new();

        let (id_face, id_found) = self.canonical_face(id_card, ImageRole::IdCard);
        let (selfie_face, selfie_found) = self.canonical_face(selfie, ImageRole::Selfie);
        if !id_found {
            face_not_detected.push(ImageRole::IdCard);
        }
        if !selfie_found {
            face_not_detected.push(ImageRole::Selfie);
        }

        let embeddings = self
            .embed(&id_face, ImageRole::IdCard)
            .and_then(|id| Ok((id, self.embed(&selfie_face, ImageRole::Selfie)?)));

        let (decision, failure, selfie_embedding) = match embeddings {
            Ok((id_embedding, selfie_embedding)) => {
                let decision = self.decide(&id_embedding, &selfie_embedding);
                (decision, None, Some(selfie_embedding))
            }
            Err(err) => {
                tracing::error!(error = %err, "face embedding failed; treating as mismatch");
                (MatchDecision::unavailable(self.threshold), Some(err), None)
            }
        };

        tracing::info!(
            verified = decision.verified,
            distance = decision.distance,
            threshold = decision.threshold,
            "face comparison complete"
        );

        FaceMatch {
            decision,
            face_not_detected,
            failure,
            selfie_embedding,
            id_face,
            selfie_face,
        }
    }

    /// Apply the distance threshold to two embeddings.
    pub fn decide(&self, a: &Embedding, b: &Embedding) -> MatchDecision {
        MatchDecision::from_distance(a.cosine_distance(b), self.threshold)
    }

    /// Crop the largest detected face, or use the whole image when none is
    /// found, then resize to the canonical square. Returns whether a face
    /// was found.
    fn canonical_face(&mut self, image: &FaceImage, role: ImageRole) -> (FaceImage, bool) {
        let regions = match self.detector.detect(image) {
            Ok(regions) => regions,
            Err(err) => {
                tracing::warn!(%role, error = %err, "face detector failed; using whole image");
                Vec::new()
            }
        };

        let crop = select_largest(&regions).and_then(|region| {
            tracing::debug!(%role, candidates = regions.len(), ?region, "face selected");
            image.crop(region)
        });

        match crop {
            Some(face) => (face.resized(self.canonical_size), true),
            None => {
                tracing::warn!(%role, "no face detected; using whole image");
                (image.resized(self.canonical_size), false)
            }
        }
    }

    fn embed(&mut self, face: &FaceImage, role: ImageRole) -> Result<Embedding, FaceMatchError> {
        let embedding = self
            .embedder
            .embed(face)
            .map_err(|source| FaceMatchError::EmbeddingServiceFailure { role, source })?;

        if !embedding.is_well_formed() {
            return Err(FaceMatchError::EmbeddingServiceFailure {
                role,
                source: EmbedderError::Malformed(embedding.len()),
            });
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{embedding_pair, image, FixedDetector, QueueEmbedder};
    use crate::types::{BoundingBox, MAX_COSINE_DISTANCE};

    fn matcher(
        detector: FixedDetector,
        embedder: QueueEmbedder,
        threshold: f32,
    ) -> FaceMatcher<FixedDetector, QueueEmbedder> {
        FaceMatcher::new(detector, embedder, threshold, 224)
    }

    #[test]
    fn test_match_below_threshold() {
        let (a, b) = embedding_pair(0.3);
        let embedder = QueueEmbedder::new(vec![Ok(a), Ok(b)]);
        let mut m = matcher(FixedDetector::whole_face(), embedder, 0.70);
        let result = m.compare(&image(400, 300), &image(640, 480));

        assert!(result.decision.verified);
        assert!((result.decision.distance - 0.3).abs() < 1e-4);
        assert_eq!(result.decision.threshold, 0.70);
        assert!(result.failure.is_none());
        assert!(result.face_not_detected.is_empty());
        assert!(result.selfie_embedding.is_some());
    }

    #[test]
    fn test_mismatch_above_threshold() {
        let (a, b) = embedding_pair(0.95);
        let embedder = QueueEmbedder::new(vec![Ok(a), Ok(b)]);
        let mut m = matcher(FixedDetector::whole_face(), embedder, 0.70);
        let result = m.compare(&image(100, 100), &image(100, 100));
        assert!(!result.decision.verified);
        assert!((result.decision.distance - 0.95).abs() < 1e-4);
    }

    #[test]
    fn test_threshold_monotonicity() {
        let distance = 0.42;
        let mut previous = true;
        for threshold in [1.0, 0.8, 0.5, 0.43, 0.41, 0.2, 0.0] {
            let (a, b) = embedding_pair(distance);
            let embedder = QueueEmbedder::new(vec![Ok(a), Ok(b)]);
            let mut m = matcher(FixedDetector::whole_face(), embedder, threshold);
            let verified = m.compare(&image(64, 64), &image(64, 64)).decision.verified;
            assert!(previous || !verified, "verified flipped back to true at {threshold}");
            assert_eq!(verified, threshold >= distance, "threshold {threshold}");
            previous = verified;
        }
    }

    #[test]
    fn test_no_face_falls_back_to_whole_image() {
        let (a, b) = embedding_pair(0.1);
        let embedder = QueueEmbedder::new(vec![Ok(a), Ok(b)]);
        let mut m = matcher(FixedDetector::new(vec![]), embedder, 0.70);
        let result = m.compare(&image(300, 200), &image(120, 90));

        assert_eq!(result.face_not_detected, vec![ImageRole::IdCard, ImageRole::Selfie]);
        assert!(result.decision.verified);
        assert_eq!((result.id_face.width(), result.id_face.height()), (224, 224));
    }

    #[test]
    fn test_detector_failure_falls_back_to_whole_image() {
        let (a, b) = embedding_pair(0.1);
        let mut m = matcher(FixedDetector::failing(), QueueEmbedder::new(vec![Ok(a), Ok(b)]), 0.70);
        let result = m.compare(&image(50, 50), &image(50, 50));
        assert_eq!(result.face_not_detected.len(), 2);
        assert!(result.decision.verified);
    }

    #[test]
    fn test_largest_region_is_cropped_and_canonicalized() {
        let detector = FixedDetector::new(vec![
            BoundingBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0, confidence: 0.99 },
            BoundingBox { x: 20.0, y: 20.0, width: 60.0, height: 40.0, confidence: 0.6 },
        ]);
        let (a, b) = embedding_pair(0.2);
        let embedder = QueueEmbedder::new(vec![Ok(a), Ok(b)]);
        let mut m = matcher(detector, embedder, 0.70);
        let result = m.compare(&image(200, 100), &image(200, 100));

        assert!(result.face_not_detected.is_empty());
        assert_eq!((result.selfie_face.width(), result.selfie_face.height()), (224, 224));
        // Embedder only ever sees canonical crops.
        assert_eq!(m.embedder.seen_sizes, vec![(224, 224), (224, 224)]);
    }

    #[test]
    fn test_embedder_failure_degrades_to_mismatch() {
        let (a, _) = embedding_pair(0.0);
        let embedder = QueueEmbedder::new(vec![
            Ok(a),
            Err(EmbedderError::InferenceFailed("service unreachable".into())),
        ]);
        let mut m = matcher(FixedDetector::whole_face(), embedder, 0.70);
        let result = m.compare(&image(64, 64), &image(64, 64));

        assert!(!result.decision.verified);
        assert_eq!(result.decision.distance, MAX_COSINE_DISTANCE);
        assert!(result.selfie_embedding.is_none());
        assert!(matches!(
            result.failure,
            Some(FaceMatchError::EmbeddingServiceFailure { role: ImageRole::Selfie, .. })
        ));
    }

    #[test]
    fn test_malformed_embedding_is_a_failure() {
        let short = Embedding::new(vec![1.0; 128]);
        let embedder = QueueEmbedder::new(vec![Ok(short.clone()), Ok(short)]);
        let mut m = matcher(FixedDetector::whole_face(), embedder, 0.70);
        let result = m.compare(&image(64, 64), &image(64, 64));

        assert!(!result.decision.verified);
        match result.failure {
            Some(FaceMatchError::EmbeddingServiceFailure {
                role,
                source: EmbedderError::Malformed(len),
            }) => {
                assert_eq!(role, ImageRole::IdCard);
                assert_eq!(len, 128);
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }
}

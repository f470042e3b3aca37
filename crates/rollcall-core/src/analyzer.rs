//! InsightFace `buffalo_l` pipeline: SCRFD detection, alignment, ArcFace.

use crate::detector::FaceDetector;
use crate::provider::{EmbeddingProvider, ProviderError};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::ProbeFace;
use image::DynamicImage;
use std::path::Path;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// ONNX-backed [`EmbeddingProvider`].
pub struct FaceAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FaceAnalyzer {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path, detection_threshold: f32) -> Result<Self, ProviderError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE), detection_threshold)?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl EmbeddingProvider for FaceAnalyzer {
    fn detect_and_embed(&mut self, image: &DynamicImage) -> Result<Vec<ProbeFace>, ProviderError> {
        let rgb = image.to_rgb8();
        let boxes = self.detector.detect(&rgb)?;
        tracing::debug!(faces = boxes.len(), width = rgb.width(), height = rgb.height(), "detected faces");

        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            match self.recognizer.extract(&rgb, &bbox) {
                Ok(embedding) => faces.push(ProbeFace {
                    embedding,
                    bbox: Some(bbox),
                }),
                Err(RecognizerError::NoLandmarks) => {
                    tracing::warn!(confidence = bbox.confidence, "face without landmarks skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(faces)
    }
}

//! The face detection + embedding boundary.

use crate::detector::DetectorError;
use crate::recognizer::RecognizerError;
use crate::types::ProbeFace;
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("failed to read image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds faces in an image and produces one embedding per face.
///
/// Implementations must be deterministic for a fixed image and fixed
/// configuration, return faces in detection order (most confident first),
/// and produce embeddings of one fixed dimensionality.
pub trait EmbeddingProvider {
    fn detect_and_embed(&mut self, image: &DynamicImage) -> Result<Vec<ProbeFace>, ProviderError>;
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<P> {
    fn detect_and_embed(&mut self, image: &DynamicImage) -> Result<Vec<ProbeFace>, ProviderError> {
        (**self).detect_and_embed(image)
    }
}

/// Decode an image file (format guessed from content).
pub fn open_image(path: &Path) -> Result<DynamicImage, ProviderError> {
    image::ImageReader::open(path)
        .map_err(|e| ProviderError::Image {
            path: path.display().to_string(),
            source: image::ImageError::IoError(e),
        })?
        .with_guessed_format()
        .map_err(|e| ProviderError::Image {
            path: path.display().to_string(),
            source: image::ImageError::IoError(e),
        })?
        .decode()
        .map_err(|source| ProviderError::Image {
            path: path.display().to_string(),
            source,
        })
}

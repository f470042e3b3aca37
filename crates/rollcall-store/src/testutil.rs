//! Deterministic provider for filesystem tests: faces are keyed on the
//! colour of the image's top-left pixel.
//!
//! Enabled for other crates' tests through the `test-util` feature.

use image::{DynamicImage, ImageError, Rgb, RgbImage};
use rollcall_core::{Embedding, EmbeddingProvider, ProbeFace, ProviderError};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;

#[derive(Default, Clone)]
pub struct ColorProvider {
    faces: HashMap<[u8; 3], Vec<Vec<f32>>>,
    failing: HashSet<[u8; 3]>,
    /// Number of `detect_and_embed` calls so far.
    pub calls: usize,
}

impl ColorProvider {
    pub fn with(mut self, color: [u8; 3], faces: Vec<Vec<f32>>) -> Self {
        self.faces.insert(color, faces);
        self
    }

    /// Make images of `color` fail inside the provider.
    pub fn failing(mut self, color: [u8; 3]) -> Self {
        self.failing.insert(color);
        self
    }
}

impl EmbeddingProvider for ColorProvider {
    fn detect_and_embed(&mut self, image: &DynamicImage) -> Result<Vec<ProbeFace>, ProviderError> {
        self.calls += 1;
        let key = image.to_rgb8().get_pixel(0, 0).0;
        if self.failing.contains(&key) {
            return Err(ProviderError::Image {
                path: format!("<pixel {key:?}>"),
                source: ImageError::IoError(io::Error::new(io::ErrorKind::Other, "inference failed")),
            });
        }
        Ok(self
            .faces
            .get(&key)
            .into_iter()
            .flatten()
            .map(|v| ProbeFace::new(Embedding::new(v.clone())))
            .collect())
    }
}

/// Write a small solid-colour image; format follows the extension.
pub fn write_image(path: &Path, color: [u8; 3]) {
    RgbImage::from_pixel(8, 8, Rgb(color)).save(path).unwrap();
}

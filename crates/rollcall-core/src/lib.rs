//! rollcall-core — Roster matching and attendance sessions.
//!
//! Faces are found and embedded by an [`EmbeddingProvider`]. The bundled
//! provider, [`FaceAnalyzer`], runs SCRFD detection and ArcFace recognition
//! via ONNX Runtime. Matching is a linear cosine-similarity scan over the
//! roster, not a nearest-neighbour index.

pub mod alignment;
pub mod analyzer;
pub mod detector;
pub mod matcher;
pub mod provider;
pub mod recognizer;
pub mod session;
pub mod types;

pub use analyzer::FaceAnalyzer;
pub use detector::SCRFD_DEFAULT_CONFIDENCE_THRESHOLD;
pub use matcher::{CosineMatcher, MatchError, Matcher, DEFAULT_SIMILARITY_THRESHOLD};
pub use provider::{open_image, EmbeddingProvider, ProviderError};
pub use session::{AttendanceSession, FaceProgress, SessionError, SessionOutcome};
pub use types::{
    BoundingBox, Embedding, Identity, IdentityError, MatchResult, ProbeFace, RollNumber, Roster,
    RosterEntry,
};

use std::path::PathBuf;

/// Default directory holding `det_10g.onnx` and `w600k_r50.onnx`.
///
/// `$XDG_DATA_HOME/rollcall/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("models")
}

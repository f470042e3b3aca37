//! One attendance run over a single query image.

use crate::matcher::{MatchError, Matcher};
use crate::provider::{open_image, EmbeddingProvider, ProviderError};
use crate::types::{Identity, MatchResult, Roster};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Emitted after each face has been scored.
#[derive(Debug, Clone)]
pub struct FaceProgress {
    /// 1-based count of faces processed so far.
    pub processed: usize,
    pub total: usize,
    pub result: MatchResult,
}

impl FaceProgress {
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f32 * 100.0 / self.total as f32
        }
    }
}

/// Deduplicated attendees plus the per-face results in detection order.
#[derive(Debug, Clone, Default)]
pub struct SessionOutcome {
    pub attendees: BTreeSet<Identity>,
    pub results: Vec<MatchResult>,
}

/// Matches every face in a query image against a roster snapshot.
pub struct AttendanceSession<'a, M: Matcher> {
    roster: &'a Roster,
    matcher: &'a M,
    threshold: f32,
}

impl<'a, M: Matcher> AttendanceSession<'a, M> {
    pub fn new(roster: &'a Roster, matcher: &'a M, threshold: f32) -> Self {
        Self {
            roster,
            matcher,
            threshold,
        }
    }

    /// Load the image at `image_path` and run the session on it.
    pub fn run<P, F>(
        &self,
        provider: &mut P,
        image_path: &Path,
        progress: F,
    ) -> Result<SessionOutcome, SessionError>
    where
        P: EmbeddingProvider + ?Sized,
        F: FnMut(&FaceProgress),
    {
        let image = open_image(image_path)?;
        self.run_image(provider, &image, progress)
    }

    /// Detect faces once, then match each face in detection order.
    ///
    /// Zero faces is a valid outcome (nobody present). A face whose embedding
    /// dimension disagrees with the roster counts as unmatched.
    pub fn run_image<P, F>(
        &self,
        provider: &mut P,
        image: &image::DynamicImage,
        mut progress: F,
    ) -> Result<SessionOutcome, SessionError>
    where
        P: EmbeddingProvider + ?Sized,
        F: FnMut(&FaceProgress),
    {
        let faces = provider.detect_and_embed(image)?;
        let total = faces.len();

        if total == 0 {
            tracing::warn!("no faces detected in query image");
            return Ok(SessionOutcome::default());
        }

        tracing::info!(faces = total, roster = self.roster.len(), "matching faces");

        let mut outcome = SessionOutcome {
            attendees: BTreeSet::new(),
            results: Vec::with_capacity(total),
        };

        for (i, face) in faces.iter().enumerate() {
            let result = match self
                .matcher
                .compare(i, &face.embedding, self.roster, self.threshold)
            {
                Ok(r) => r,
                Err(err @ MatchError::DimensionMismatch { .. }) => {
                    tracing::warn!(face = i, error = %err, "skipping face");
                    MatchResult::no_match(i, 0.0)
                }
            };

            tracing::debug!(
                face = i,
                score = result.score,
                identity = ?result.identity.as_ref().map(|id| id.to_string()),
                "face scored"
            );

            if let Some(identity) = &result.identity {
                if !outcome.attendees.insert(identity.clone()) {
                    tracing::debug!(face = i, %identity, "identity already present");
                }
            }

            progress(&FaceProgress {
                processed: i + 1,
                total,
                result: result.clone(),
            });
            outcome.results.push(result);
        }

        Ok(outcome)
    }
}

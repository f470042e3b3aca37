//! Probe-to-roster matching.
//!
//! [`CosineMatcher`] is a linear scan over every roster entry: O(|roster|)
//! per probe, which is fine for classroom-sized rosters. There is no
//! nearest-neighbour index.

use crate::types::{Embedding, MatchResult, RollNumber, Roster};
use thiserror::Error;

/// Acceptance boundary for "same identity". A match needs a score strictly above it.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("embedding dimension mismatch: probe has {probe}, reference for roll {roll} has {reference}")]
    DimensionMismatch {
        roll: RollNumber,
        probe: usize,
        reference: usize,
    },
}

/// Strategy for comparing a probe embedding against the roster.
pub trait Matcher {
    fn compare(
        &self,
        probe_index: usize,
        probe: &Embedding,
        roster: &Roster,
        threshold: f32,
    ) -> Result<MatchResult, MatchError>;
}

/// Cosine similarity matcher.
///
/// Picks the maximum-similarity entry; ties go to the first entry in roster
/// order, i.e. the lowest roll number.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(
        &self,
        probe_index: usize,
        probe: &Embedding,
        roster: &Roster,
        threshold: f32,
    ) -> Result<MatchResult, MatchError> {
        if let Some(bad) = roster.entries().iter().find(|e| e.embedding.dim() != probe.dim()) {
            return Err(MatchError::DimensionMismatch {
                roll: bad.identity.roll.clone(),
                probe: probe.dim(),
                reference: bad.embedding.dim(),
            });
        }

        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in roster.entries().iter().enumerate() {
            let sim = probe.similarity(&entry.embedding);
            // Strict comparison keeps the earliest entry on ties.
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        Ok(match best_idx {
            Some(idx) if best_sim > threshold => MatchResult {
                probe_index,
                identity: Some(roster.entries()[idx].identity.clone()),
                score: best_sim,
            },
            Some(_) => MatchResult::no_match(probe_index, best_sim),
            None => MatchResult::no_match(probe_index, 0.0),
        })
    }
}

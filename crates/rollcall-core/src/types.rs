use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Separator between name and roll in a reference image filename.
pub const NAME_ROLL_SEPARATOR: char = '_';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("roll identifier {0:?} is not a non-negative integer")]
    MalformedRollIdentifier(String),
    #[error("name must not be empty")]
    EmptyName,
    #[error("name {0:?} must not contain '_' or path separators")]
    InvalidName(String),
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Dimensionality of the vector.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. A zero vector has
    /// similarity 0.0 with everything. Callers must check dimensions first;
    /// extra trailing values on the longer side are ignored.
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
}

/// Integer-backed roll identifier.
///
/// Validated once at ingestion. The original text is kept for display and
/// file naming; equality, hashing and ordering use the numeric value, so
/// `"07"` and `"7"` denote the same roll.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RollNumber {
    value: u64,
    text: String,
}

impl RollNumber {
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for RollNumber {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        // u64::from_str accepts a leading '+'; roll numbers are digits only.
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdentityError::MalformedRollIdentifier(s.to_string()));
        }
        let value = text
            .parse::<u64>()
            .map_err(|_| IdentityError::MalformedRollIdentifier(s.to_string()))?;
        Ok(Self {
            value,
            text: text.to_string(),
        })
    }
}

impl From<u64> for RollNumber {
    fn from(value: u64) -> Self {
        Self {
            value,
            text: value.to_string(),
        }
    }
}

impl TryFrom<String> for RollNumber {
    type Error = IdentityError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RollNumber> for String {
    fn from(roll: RollNumber) -> Self {
        roll.text
    }
}

impl PartialEq for RollNumber {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for RollNumber {}

impl Hash for RollNumber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl PartialOrd for RollNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RollNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl fmt::Display for RollNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// An enrolled person. Ordered by roll, then name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    pub roll: RollNumber,
    pub name: String,
}

impl Identity {
    /// Build an identity from raw caller input, validating both parts.
    pub fn parse(name: &str, roll: &str) -> Result<Self, IdentityError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IdentityError::EmptyName);
        }
        if name.contains(NAME_ROLL_SEPARATOR) || name.contains(['/', '\\']) {
            return Err(IdentityError::InvalidName(name.to_string()));
        }
        Ok(Self {
            roll: roll.parse()?,
            name: name.to_string(),
        })
    }

    /// Parse a reference image file stem of the form `<name>_<roll>`.
    pub fn from_file_stem(stem: &str) -> Result<Self, IdentityError> {
        let mut parts = stem.split(NAME_ROLL_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(roll), None) => Self::parse(name, roll),
            _ => Err(IdentityError::InvalidName(stem.to_string())),
        }
    }

    /// File stem under which this identity's reference image is stored.
    pub fn file_stem(&self) -> String {
        format!("{}{NAME_ROLL_SEPARATOR}{}", self.name, self.roll)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Roll No: {})", self.name, self.roll)
    }
}

/// One detected face in a query image.
#[derive(Debug, Clone)]
pub struct ProbeFace {
    pub embedding: Embedding,
    pub bbox: Option<BoundingBox>,
}

impl ProbeFace {
    pub fn new(embedding: Embedding) -> Self {
        Self {
            embedding,
            bbox: None,
        }
    }
}

/// An enrolled identity with its reference embedding.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub identity: Identity,
    pub embedding: Embedding,
}

/// Enrolled identities in ascending roll order, at most one per roll.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    /// Sort entries by roll. For duplicate rolls the first entry in input
    /// order is kept and the rest are dropped with a warning.
    pub fn from_entries(mut entries: Vec<RosterEntry>) -> Self {
        entries.sort_by(|a, b| a.identity.roll.cmp(&b.identity.roll));
        let mut kept: Vec<RosterEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(prev) = kept.last() {
                if prev.identity.roll == entry.identity.roll {
                    tracing::warn!(
                        kept = %prev.identity,
                        dropped = %entry.identity,
                        "duplicate roll number in roster; keeping first entry"
                    );
                    continue;
                }
            }
            kept.push(entry);
        }
        Self { entries: kept }
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.entries.iter().map(|e| &e.identity)
    }
}

/// Outcome of matching one probe face against the roster.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub probe_index: usize,
    /// Best-matching identity, if its score cleared the threshold.
    pub identity: Option<Identity>,
    /// Cosine similarity of the best candidate [-1, 1]; 0.0 for an empty roster.
    pub score: f32,
}

impl MatchResult {
    pub fn no_match(probe_index: usize, score: f32) -> Self {
        Self {
            probe_index,
            identity: None,
            score,
        }
    }

    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }
}

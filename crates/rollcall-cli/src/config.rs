use rollcall_core::{DEFAULT_SIMILARITY_THRESHOLD, SCRFD_DEFAULT_CONFIDENCE_THRESHOLD};
use rollcall_store::DuplicatePolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{key} = {value} is out of range ({range})")]
    OutOfRange {
        key: &'static str,
        value: f32,
        range: &'static str,
    },
}

/// Runtime configuration.
///
/// Layered as: defaults, optional TOML file, `ROLLCALL_*` environment
/// variables, then command-line flags (applied by the caller).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory of `<name>_<roll>.<ext>` reference images.
    pub known_faces_dir: PathBuf,
    /// Directory receiving `Attendance_<date>.csv` records.
    pub attendance_dir: PathBuf,
    /// Directory containing `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    /// Cosine similarity a match must exceed.
    pub similarity_threshold: f32,
    /// SCRFD score a detection must exceed.
    pub detection_threshold: f32,
    /// Enrolling an already-used roll number: reject or replace.
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            known_faces_dir: PathBuf::from("known_faces"),
            attendance_dir: PathBuf::from("Attendance"),
            model_dir: rollcall_core::default_model_dir(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            detection_threshold: SCRFD_DEFAULT_CONFIDENCE_THRESHOLD,
            duplicate_policy: DuplicatePolicy::Reject,
        }
    }
}

impl Config {
    /// Load from `path` (or `ROLLCALL_CONFIG`, if set) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os("ROLLCALL_CONFIG").map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Override fields from `ROLLCALL_*` variables looked up through `var`.
    /// Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("ROLLCALL_KNOWN_FACES_DIR") {
            self.known_faces_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_ATTENDANCE_DIR") {
            self.attendance_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = parsed(&var, "ROLLCALL_SIMILARITY_THRESHOLD") {
            self.similarity_threshold = v;
        }
        if let Some(v) = parsed(&var, "ROLLCALL_DETECTION_THRESHOLD") {
            self.detection_threshold = v;
        }
        if let Some(v) = var("ROLLCALL_DUPLICATE_POLICY") {
            match v.to_ascii_lowercase().as_str() {
                "reject" => self.duplicate_policy = DuplicatePolicy::Reject,
                "replace" => self.duplicate_policy = DuplicatePolicy::Replace,
                _ => tracing::warn!(value = %v, "ignoring ROLLCALL_DUPLICATE_POLICY"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::OutOfRange {
                key: "similarity_threshold",
                value: self.similarity_threshold,
                range: "-1.0..=1.0",
            });
        }
        if !(self.detection_threshold > 0.0 && self.detection_threshold < 1.0) {
            return Err(ConfigError::OutOfRange {
                key: "detection_threshold",
                value: self.detection_threshold,
                range: "0.0 < t < 1.0",
            });
        }
        Ok(())
    }
}

fn parsed(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<f32> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable value");
            None
        }
    }
}

//! Directory-backed roster of reference images.
//!
//! Each enrolled identity is one image file named `<name>_<roll>.<ext>`.
//! The filename is both the key and the only record of the identity, so
//! nothing is cached: every [`RosterStore::load`] re-reads the directory and
//! re-derives each reference embedding.

use crate::atomic::write_atomic;
use rollcall_core::{
    open_image, EmbeddingProvider, Identity, IdentityError, ProviderError, RollNumber, Roster,
    RosterEntry,
};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Reference image extensions recognised in the roster directory.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("cannot parse name and roll number from {file}: {source}")]
    EnrollmentCorrupt {
        file: String,
        #[source]
        source: IdentityError,
    },
    #[error("no face detected in {path}")]
    NoFaceDetected { path: PathBuf },
    #[error("{count} faces detected in {path}; enrollment needs exactly one")]
    MultipleFacesDetected { path: PathBuf, count: usize },
    #[error("roll number {roll} is already enrolled as {existing}")]
    DuplicateRoll { roll: RollNumber, existing: PathBuf },
    #[error("unsupported image type {path} (expected .jpg, .jpeg or .png)")]
    UnsupportedImage { path: PathBuf },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl RosterError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What to do when enrolling a roll number that is already on file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    Replace,
}

/// A reference image whose filename parsed into an identity.
#[derive(Debug, Clone)]
pub struct StoredFace {
    pub identity: Identity,
    pub path: PathBuf,
}

pub struct RosterStore {
    dir: PathBuf,
}

impl RosterStore {
    /// Open (creating if needed) the roster directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, RosterError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(RosterError::io(&dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List parseable reference images in (roll, filename) order.
    ///
    /// Files without an image extension are ignored. Image files whose names
    /// do not parse are logged and skipped.
    pub fn scan(&self) -> Result<Vec<StoredFace>, RosterError> {
        let mut faces = Vec::new();
        for dirent in fs::read_dir(&self.dir).map_err(RosterError::io(&self.dir))? {
            let path = dirent.map_err(RosterError::io(&self.dir))?.path();
            if !path.is_file() || image_extension(&path).is_none() {
                continue;
            }
            match parse_reference_name(&path) {
                Ok(identity) => faces.push(StoredFace { identity, path }),
                Err(err) => tracing::warn!(error = %err, "skipping roster entry"),
            }
        }
        faces.sort_by(|a, b| {
            a.identity
                .roll
                .cmp(&b.identity.roll)
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(faces)
    }

    /// Build a fresh roster snapshot, embedding every stored reference image.
    ///
    /// Entries that cannot be decoded, fail in the provider or contain no
    /// face are skipped with a warning. If an image holds several faces, the first (most confident)
    /// one is used. Later files repeating a roll number are dropped.
    pub fn load<P>(&self, provider: &mut P) -> Result<Roster, RosterError>
    where
        P: EmbeddingProvider + ?Sized,
    {
        let stored = self.scan()?;
        let mut entries = Vec::with_capacity(stored.len());

        for face in stored {
            let image = match open_image(&face.path) {
                Ok(image) => image,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable roster image");
                    continue;
                }
            };

            let mut detected = match provider.detect_and_embed(&image) {
                Ok(faces) => faces,
                Err(err) => {
                    tracing::warn!(path = %face.path.display(), error = %err, "skipping roster entry");
                    continue;
                }
            };
            if detected.is_empty() {
                tracing::warn!(
                    error = %RosterError::NoFaceDetected { path: face.path.clone() },
                    "skipping roster entry"
                );
                continue;
            }
            if detected.len() > 1 {
                tracing::warn!(
                    path = %face.path.display(),
                    faces = detected.len(),
                    "several faces in reference image; using the first"
                );
            }

            entries.push(RosterEntry {
                identity: face.identity,
                embedding: detected.swap_remove(0).embedding,
            });
        }

        let roster = Roster::from_entries(entries);
        tracing::info!(dir = %self.dir.display(), entries = roster.len(), "roster loaded");
        Ok(roster)
    }

    /// Store `source` as the reference image for `identity`.
    ///
    /// The image must contain exactly one face. The source bytes are copied
    /// unchanged under `<name>_<roll>.<ext>`. The new entry is visible to the
    /// next [`load`](Self::load).
    pub fn enroll<P>(
        &self,
        provider: &mut P,
        identity: &Identity,
        source: &Path,
        policy: DuplicatePolicy,
    ) -> Result<PathBuf, RosterError>
    where
        P: EmbeddingProvider + ?Sized,
    {
        let ext = image_extension(source).ok_or_else(|| RosterError::UnsupportedImage {
            path: source.to_path_buf(),
        })?;

        let image = open_image(source)?;
        match provider.detect_and_embed(&image)?.len() {
            0 => {
                return Err(RosterError::NoFaceDetected {
                    path: source.to_path_buf(),
                })
            }
            1 => {}
            count => {
                return Err(RosterError::MultipleFacesDetected {
                    path: source.to_path_buf(),
                    count,
                })
            }
        }

        let target = self.dir.join(format!("{}.{ext}", identity.file_stem()));
        let existing: Vec<PathBuf> = self
            .scan()?
            .into_iter()
            .filter(|f| f.identity.roll == identity.roll)
            .map(|f| f.path)
            .collect();

        if let (DuplicatePolicy::Reject, Some(first)) = (policy, existing.first()) {
            return Err(RosterError::DuplicateRoll {
                roll: identity.roll.clone(),
                existing: first.clone(),
            });
        }

        let bytes = fs::read(source).map_err(RosterError::io(source))?;
        commit_reference(&target, &bytes, &existing, |old| fs::remove_file(old))?;

        tracing::info!(%identity, path = %target.display(), "enrolled");
        Ok(target)
    }
}

/// Write `target`, then remove the `stale` references it replaces.
///
/// If a stale file cannot be removed, the new file is removed again so the
/// roll keeps a single reference: the old one.
fn commit_reference(
    target: &Path,
    bytes: &[u8],
    stale: &[PathBuf],
    mut remove: impl FnMut(&Path) -> io::Result<()>,
) -> Result<(), RosterError> {
    let overwritten = stale.iter().any(|p| p == target);
    write_atomic(target, bytes).map_err(RosterError::io(target))?;

    for old in stale.iter().filter(|p| p.as_path() != target) {
        tracing::info!(path = %old.display(), "removing replaced reference image");
        if let Err(source) = remove(old) {
            if !overwritten {
                if let Err(err) = fs::remove_file(target) {
                    tracing::warn!(path = %target.display(), error = %err, "failed to roll back new reference image");
                }
            }
            return Err(RosterError::Io {
                path: old.clone(),
                source,
            });
        }
    }
    Ok(())
}

/// Lower-cased extension if it is a recognised image type.
fn image_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

fn parse_reference_name(path: &Path) -> Result<Identity, RosterError> {
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    Identity::from_file_stem(stem).map_err(|source| RosterError::EnrollmentCorrupt { file, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{write_image, ColorProvider};

    const RED: [u8; 3] = [200, 0, 0];
    const GREEN: [u8; 3] = [0, 200, 0];
    const BLUE: [u8; 3] = [0, 0, 200];
    const GREY: [u8; 3] = [90, 90, 90];

    fn provider() -> ColorProvider {
        ColorProvider::default()
            .with(RED, vec![vec![1.0, 0.0]])
            .with(GREEN, vec![vec![0.0, 1.0]])
            .with(BLUE, vec![vec![0.6, 0.8], vec![0.0, 1.0]])
    }

    fn names(roster: &Roster) -> Vec<String> {
        roster.identities().map(|i| i.name.clone()).collect()
    }

    #[test]
    fn test_load_orders_by_numeric_roll() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("Carol_10.png"), RED);
        write_image(&dir.path().join("Alice_2.png"), GREEN);
        write_image(&dir.path().join("Bob_1.png"), RED);

        let store = RosterStore::open(dir.path()).unwrap();
        let roster = store.load(&mut provider()).unwrap();
        assert_eq!(names(&roster), ["Bob", "Alice", "Carol"]);

        let again = store.load(&mut provider()).unwrap();
        assert_eq!(names(&again), names(&roster));
    }

    #[test]
    fn test_load_skips_corrupt_names_and_other_files() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("Alice_1.png"), RED);
        write_image(&dir.path().join("NoRoll.png"), RED);
        write_image(&dir.path().join("Bob_two.png"), RED);
        write_image(&dir.path().join("Too_many_3.png"), RED);
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        fs::write(dir.path().join("Broken_4.png"), "not an image").unwrap();

        let store = RosterStore::open(dir.path()).unwrap();
        let roster = store.load(&mut provider()).unwrap();
        assert_eq!(names(&roster), ["Alice"]);
    }

    #[test]
    fn test_load_skips_images_without_faces() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("Alice_1.png"), RED);
        write_image(&dir.path().join("Ghost_2.png"), GREY);

        let store = RosterStore::open(dir.path()).unwrap();
        let roster = store.load(&mut provider()).unwrap();
        assert_eq!(names(&roster), ["Alice"]);
    }

    #[test]
    fn test_load_uses_first_face_of_multi_face_reference() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("Pair_5.png"), BLUE);

        let store = RosterStore::open(dir.path()).unwrap();
        let roster = store.load(&mut provider()).unwrap();
        assert_eq!(roster.entries()[0].embedding.values, vec![0.6, 0.8]);
    }

    #[test]
    fn test_load_keeps_first_file_for_duplicate_roll() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("Bob_3.png"), GREEN);
        write_image(&dir.path().join("Alice_03.png"), RED);

        let store = RosterStore::open(dir.path()).unwrap();
        let roster = store.load(&mut provider()).unwrap();
        assert_eq!(names(&roster), ["Alice"]);
    }

    #[test]
    fn test_scan_does_not_run_provider() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("Alice_1.png"), RED);
        let store = RosterStore::open(dir.path()).unwrap();
        let faces = store.scan().unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].identity.name, "Alice");
    }

    #[test]
    fn test_enroll_then_load() {
        let src = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let photo = src.path().join("upload.PNG");
        write_image(&photo, GREEN);

        let store = RosterStore::open(dir.path()).unwrap();
        let mut provider = provider();
        let identity = Identity::parse("Dana", "7").unwrap();
        let path = store
            .enroll(&mut provider, &identity, &photo, DuplicatePolicy::Reject)
            .unwrap();
        assert_eq!(path, dir.path().join("Dana_7.png"));
        assert_eq!(fs::read(&path).unwrap(), fs::read(&photo).unwrap());

        let roster = store.load(&mut provider).unwrap();
        assert_eq!(names(&roster), ["Dana"]);
    }

    #[test]
    fn test_enroll_rejects_no_face() {
        let src = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let photo = src.path().join("empty.png");
        write_image(&photo, GREY);

        let store = RosterStore::open(dir.path()).unwrap();
        let identity = Identity::parse("Dana", "7").unwrap();
        let err = store
            .enroll(&mut provider(), &identity, &photo, DuplicatePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, RosterError::NoFaceDetected { .. }));
        assert!(store.scan().unwrap().is_empty());
    }

    #[test]
    fn test_enroll_rejects_multiple_faces() {
        let src = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let photo = src.path().join("pair.png");
        write_image(&photo, BLUE);

        let store = RosterStore::open(dir.path()).unwrap();
        let identity = Identity::parse("Dana", "7").unwrap();
        let err = store
            .enroll(&mut provider(), &identity, &photo, DuplicatePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, RosterError::MultipleFacesDetected { count: 2, .. }));
    }

    #[test]
    fn test_enroll_rejects_unsupported_extension() {
        let src = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let photo = src.path().join("face.bmp");
        write_image(&photo, RED);

        let store = RosterStore::open(dir.path()).unwrap();
        let identity = Identity::parse("Dana", "7").unwrap();
        let err = store
            .enroll(&mut provider(), &identity, &photo, DuplicatePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, RosterError::UnsupportedImage { .. }));
    }

    #[test]
    fn test_enroll_duplicate_roll_rejected() {
        let src = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let photo = src.path().join("face.png");
        write_image(&photo, RED);
        write_image(&dir.path().join("Alice_1.png"), GREEN);

        let store = RosterStore::open(dir.path()).unwrap();
        let identity = Identity::parse("Impostor", "01").unwrap();
        let err = store
            .enroll(&mut provider(), &identity, &photo, DuplicatePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, RosterError::DuplicateRoll { .. }));
        assert_eq!(store.scan().unwrap()[0].identity.name, "Alice");
    }

    #[test]
    fn test_enroll_duplicate_roll_replaced() {
        let src = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let photo = src.path().join("face.png");
        write_image(&photo, RED);
        write_image(&dir.path().join("Alicia_1.png"), GREEN);

        let store = RosterStore::open(dir.path()).unwrap();
        let identity = Identity::parse("Alice", "1").unwrap();
        store
            .enroll(&mut provider(), &identity, &photo, DuplicatePolicy::Replace)
            .unwrap();

        let faces = store.scan().unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].identity.name, "Alice");
        assert!(!dir.path().join("Alicia_1.png").exists());
    }

    #[test]
    fn test_enroll_replace_same_file() {
        let src = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let photo = src.path().join("face.png");
        write_image(&photo, RED);
        write_image(&dir.path().join("Alice_1.png"), GREEN);

        let store = RosterStore::open(dir.path()).unwrap();
        let identity = Identity::parse("Alice", "1").unwrap();
        let path = store
            .enroll(&mut provider(), &identity, &photo, DuplicatePolicy::Replace)
            .unwrap();

        assert!(path.exists());
        let roster = store.load(&mut provider()).unwrap();
        assert_eq!(roster.entries()[0].embedding.values, vec![1.0, 0.0]);
    }

    #[test]
    fn test_load_skips_entry_that_fails_in_provider() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("Alice_1.png"), RED);
        write_image(&dir.path().join("Bob_2.png"), BLUE);
        write_image(&dir.path().join("Carol_3.png"), GREEN);

        let store = RosterStore::open(dir.path()).unwrap();
        let mut provider = provider().failing(BLUE);
        let roster = store.load(&mut provider).unwrap();
        assert_eq!(names(&roster), ["Alice", "Carol"]);
    }

    #[test]
    fn test_every_load_re_embeds_all_references() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("Alice_1.png"), RED);
        write_image(&dir.path().join("Bob_2.png"), GREEN);

        let store = RosterStore::open(dir.path()).unwrap();
        let mut provider = provider();
        store.load(&mut provider).unwrap();
        assert_eq!(provider.calls, 2);
        store.load(&mut provider).unwrap();
        assert_eq!(provider.calls, 4);
    }

    #[test]
    fn test_failed_replace_keeps_old_reference_only() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("Alicia_1.png");
        let target = dir.path().join("Alice_1.png");
        write_image(&old, GREEN);

        let err = commit_reference(&target, b"new", &[old.clone()], |_| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        })
        .unwrap_err();
        assert!(matches!(err, RosterError::Io { ref path, .. } if *path == old));

        assert!(old.exists());
        assert!(!target.exists());
        let store = RosterStore::open(dir.path()).unwrap();
        let faces = store.scan().unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].identity.name, "Alicia");
    }

    #[test]
    fn test_replace_removes_every_stale_reference() {
        let dir = tempfile::tempdir().unwrap();
        let stale = [dir.path().join("Alicia_1.png"), dir.path().join("Ali_01.jpg")];
        for path in &stale {
            fs::write(path, b"old").unwrap();
        }
        let target = dir.path().join("Alice_1.png");

        let mut removed = Vec::new();
        commit_reference(&target, b"new", &stale, |p| {
            removed.push(p.to_path_buf());
            fs::remove_file(p)
        })
        .unwrap();

        assert_eq!(removed, stale);
        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(stale.iter().all(|p| !p.exists()));
    }
}

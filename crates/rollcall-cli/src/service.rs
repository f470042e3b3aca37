//! Caller-facing operations: enroll a student, mark attendance from a photo.

use chrono::NaiveDateTime;
use rollcall_core::{
    AttendanceSession, CosineMatcher, EmbeddingProvider, FaceProgress, Identity, IdentityError,
    MatchResult, SessionError,
};
use rollcall_store::{AttendanceWriter, DuplicatePolicy, RosterError, RosterStore, WriterError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid identity: {0}")]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Writer(#[from] WriterError),
}

/// Result of one attendance run.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceReport {
    pub count: usize,
    pub output: PathBuf,
    pub attendees: Vec<Identity>,
    pub faces: Vec<MatchResult>,
}

/// Roster store, matcher and writer bundled with one embedding provider.
pub struct Attendance<P> {
    provider: P,
    roster: RosterStore,
    writer: AttendanceWriter,
    matcher: CosineMatcher,
    threshold: f32,
    duplicate_policy: DuplicatePolicy,
}

impl<P: EmbeddingProvider> Attendance<P> {
    pub fn new(
        provider: P,
        roster: RosterStore,
        writer: AttendanceWriter,
        threshold: f32,
        duplicate_policy: DuplicatePolicy,
    ) -> Self {
        Self {
            provider,
            roster,
            writer,
            matcher: CosineMatcher,
            threshold,
            duplicate_policy,
        }
    }

    /// Enroll `name`/`roll` from the single face in `image`.
    ///
    /// `replace` overrides the configured duplicate policy for this call.
    pub fn enroll(
        &mut self,
        name: &str,
        roll: &str,
        image: &Path,
        replace: bool,
    ) -> Result<PathBuf, ServiceError> {
        let identity = Identity::parse(name, roll)?;
        let policy = if replace {
            DuplicatePolicy::Replace
        } else {
            self.duplicate_policy
        };
        Ok(self.roster.enroll(&mut self.provider, &identity, image, policy)?)
    }

    /// Mark attendance from `image` with the current local time.
    pub fn mark_attendance<F>(&mut self, image: &Path, progress: F) -> Result<AttendanceReport, ServiceError>
    where
        F: FnMut(&FaceProgress),
    {
        let now = chrono::Local::now().naive_local();
        self.mark_attendance_at(image, now, progress)
    }

    /// Reload the roster, match every face in `image`, and write the record for `now`.
    pub fn mark_attendance_at<F>(
        &mut self,
        image: &Path,
        now: NaiveDateTime,
        progress: F,
    ) -> Result<AttendanceReport, ServiceError>
    where
        F: FnMut(&FaceProgress),
    {
        let roster = self.roster.load(&mut self.provider)?;
        if roster.is_empty() {
            tracing::warn!(dir = %self.roster.dir().display(), "roster is empty; nobody can be matched");
        }

        let session = AttendanceSession::new(&roster, &self.matcher, self.threshold);
        let outcome = session.run(&mut self.provider, image, progress)?;

        let output = self.writer.write(&outcome.attendees, now)?;
        let attendees: Vec<Identity> = outcome.attendees.into_iter().collect();

        tracing::info!(
            image = %image.display(),
            faces = outcome.results.len(),
            attendees = attendees.len(),
            "attendance marked"
        );

        Ok(AttendanceReport {
            count: attendees.len(),
            output,
            attendees,
            faces: outcome.results,
        })
    }
}

//! rollcall-store — File-backed roster and attendance records.
//!
//! The roster is a directory of reference images named `<name>_<roll>.<ext>`.
//! Attendance is one CSV per calendar day, replaced on every run.

pub mod atomic;
pub mod roster;
pub mod writer;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use roster::{DuplicatePolicy, RosterError, RosterStore, StoredFace};
pub use writer::{AttendanceRecord, AttendanceWriter, WriterError};

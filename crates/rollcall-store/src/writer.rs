//! Dated attendance records.
//!
//! One CSV per calendar day, `Attendance_<YYYY-MM-DD>.csv`, columns
//! `Name, Roll No, Date, Time`. Every write replaces the whole file, so the
//! latest run of the day is authoritative.

use crate::atomic::write_atomic;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rollcall_core::{Identity, IdentityError};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HEADER: [&str; 4] = ["Name", "Roll No", "Date", "Time"];
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("bad record in {path}: {reason}")]
    BadRecord { path: PathBuf, reason: String },
    #[error("bad identity in {path}: {source}")]
    Identity {
        path: PathBuf,
        #[source]
        source: IdentityError,
    },
}

/// One CSV row.
#[derive(Debug, Serialize, Deserialize)]
struct Row {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Roll No")]
    roll: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Time")]
    time: String,
}

/// One attendee as read back from a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub identity: Identity,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

pub struct AttendanceWriter {
    dir: PathBuf,
}

impl AttendanceWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("Attendance_{}.csv", date.format(DATE_FORMAT)))
    }

    /// Write the day's record for `attendees`, replacing any earlier one.
    ///
    /// Rows are sorted by ascending roll number and all share the single
    /// `when` stamp. An empty attendee set writes the header row only.
    pub fn write<'a, I>(&self, attendees: I, when: NaiveDateTime) -> Result<PathBuf, WriterError>
    where
        I: IntoIterator<Item = &'a Identity>,
    {
        let path = self.path_for(when.date());
        let date = when.format(DATE_FORMAT).to_string();
        let time = when.format(TIME_FORMAT).to_string();

        let mut sorted: Vec<&Identity> = attendees.into_iter().collect();
        sorted.sort();
        sorted.dedup_by(|a, b| a.roll == b.roll);

        let csv_err = |source| WriterError::Csv {
            path: path.clone(),
            source,
        };

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        wtr.write_record(HEADER).map_err(csv_err)?;
        for identity in &sorted {
            wtr.serialize(Row {
                name: identity.name.clone(),
                roll: identity.roll.to_string(),
                date: date.clone(),
                time: time.clone(),
            })
            .map_err(csv_err)?;
        }
        let bytes = wtr.into_inner().map_err(|e| WriterError::Io {
            path: path.clone(),
            source: io::Error::new(e.error().kind(), e.to_string()),
        })?;

        std::fs::create_dir_all(&self.dir).map_err(|source| WriterError::Io {
            path: self.dir.clone(),
            source,
        })?;
        write_atomic(&path, &bytes).map_err(|source| WriterError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), attendees = sorted.len(), "attendance written");
        Ok(path)
    }

    /// Read back the record for `date`. `None` if no run happened that day.
    pub fn read(&self, date: NaiveDate) -> Result<Option<Vec<AttendanceRecord>>, WriterError> {
        let path = self.path_for(date);
        if !path.exists() {
            return Ok(None);
        }

        let mut rdr = csv::Reader::from_path(&path).map_err(|source| WriterError::Csv {
            path: path.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for row in rdr.deserialize::<Row>() {
            let row = row.map_err(|source| WriterError::Csv {
                path: path.clone(),
                source,
            })?;
            let identity = Identity::parse(&row.name, &row.roll).map_err(|source| {
                WriterError::Identity {
                    path: path.clone(),
                    source,
                }
            })?;
            let bad = |reason: String| WriterError::BadRecord {
                path: path.clone(),
                reason,
            };
            records.push(AttendanceRecord {
                identity,
                date: NaiveDate::parse_from_str(&row.date, DATE_FORMAT)
                    .map_err(|e| bad(format!("date {:?}: {e}", row.date)))?,
                time: NaiveTime::parse_from_str(&row.time, TIME_FORMAT)
                    .map_err(|e| bad(format!("time {:?}: {e}", row.time)))?,
            });
        }
        Ok(Some(records))
    }
}

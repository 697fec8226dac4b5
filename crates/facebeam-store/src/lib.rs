//! facebeam-store — SQLite persistence for FaceBeam.
//!
//! Holds the student roster, the weekly timetable and the append-only
//! attendance log, and derives dashboards and CSV reports from them.
//!
//! # Storage layout
//!
//! | table        | purpose                                                   |
//! |--------------|-----------------------------------------------------------|
//! | `subjects`   | subject id and unique name                                |
//! | `students`   | roster: unique name, photo file, admission details        |
//! | `timetable`  | weekly slots: subject, day (0 = Monday), `HH:MM` start/end|
//! | `attendance` | one row per credited (student, session), `YYYY-MM-DD HH:MM:SS` |

pub mod attendance;
pub mod dashboard;
pub mod db;
pub mod reports;
mod schema;
pub mod students;
pub mod timetable;

pub use dashboard::{LiveClass, Status};
pub use db::Database;
pub use reports::{PivotReport, StatusRow};
pub use students::{NewStudent, Student};
pub use timetable::{Subject, TimetableFile};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("already exists: {0}")]
    Duplicate(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid data: {0}")]
    Invalid(String),
    #[error("invalid timetable file: {0}")]
    Timetable(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DbError> for facebeam_core::StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Duplicate(m) => Self::Duplicate(m),
            DbError::NotFound(m) => Self::NotFound(m),
            DbError::Invalid(m) | DbError::Timetable(m) => Self::Invalid(m),
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Format used for attendance timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format used for report and query dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

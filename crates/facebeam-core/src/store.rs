//! Durable attendance store contract.

use crate::schedule::SubjectId;
use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend: {0}")]
    Backend(String),
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid data: {0}")]
    Invalid(String),
}

/// One "student was present" event. Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub student_name: String,
    pub subject_id: SubjectId,
    pub student_db_id: i64,
    pub timestamp: NaiveDateTime,
}

/// Roster lookup and attendance writes needed by the recognition loop.
pub trait AttendanceStore {
    /// Roster id of the student with this name, if registered.
    fn lookup_student_db_id(&self, name: &str) -> Result<Option<i64>, StoreError>;

    fn insert_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError>;
}

impl<S: AttendanceStore + ?Sized> AttendanceStore for &S {
    fn lookup_student_db_id(&self, name: &str) -> Result<Option<i64>, StoreError> {
        (**self).lookup_student_db_id(name)
    }

    fn insert_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        (**self).insert_attendance(record)
    }
}

impl<S: AttendanceStore + ?Sized> AttendanceStore for Box<S> {
    fn lookup_student_db_id(&self, name: &str) -> Result<Option<i64>, StoreError> {
        (**self).lookup_student_db_id(name)
    }

    fn insert_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        (**self).insert_attendance(record)
    }
}

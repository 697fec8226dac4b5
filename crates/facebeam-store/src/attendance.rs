//! Append-only attendance log.

use crate::{Database, DbError, DATE_FORMAT, TIMESTAMP_FORMAT};
use chrono::{NaiveDate, NaiveDateTime};
use facebeam_core::{AttendanceRecord, AttendanceStore, StoreError};
use rusqlite::params;

impl Database {
    /// Append one attendance row. Returns its row id.
    pub fn insert_attendance(&self, record: &AttendanceRecord) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO attendance (name, timestamp, subject_id, student_db_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.student_name,
                record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                record.subject_id,
                record.student_db_id,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(
            id,
            name = %record.student_name,
            subject_id = record.subject_id,
            "attendance row inserted"
        );
        Ok(id)
    }

    /// Attendance rows whose timestamp falls on `date`, oldest first.
    ///
    /// Rows without a subject or roster id are not returned.
    pub fn attendance_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, subject_id, student_db_id, timestamp FROM attendance
             WHERE date(timestamp) = ?1
               AND subject_id IS NOT NULL AND student_db_id IS NOT NULL
             ORDER BY timestamp, id",
        )?;
        let rows = stmt.query_map(params![date.format(DATE_FORMAT).to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (student_name, subject_id, student_db_id, ts) = row?;
            let timestamp = NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT)
                .map_err(|e| DbError::Invalid(format!("attendance timestamp '{ts}': {e}")))?;
            records.push(AttendanceRecord {
                student_name,
                subject_id,
                student_db_id,
                timestamp,
            });
        }
        Ok(records)
    }
}

impl AttendanceStore for Database {
    fn lookup_student_db_id(&self, name: &str) -> Result<Option<i64>, StoreError> {
        Ok(Database::lookup_student_db_id(self, name)?)
    }

    fn insert_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        Database::insert_attendance(self, record)?;
        Ok(())
    }
}

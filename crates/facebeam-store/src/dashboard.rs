//! Live-class and per-student views derived from the log.

use crate::{Database, DbError, DATE_FORMAT};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use facebeam_core::schedule::SubjectId;
use rusqlite::params;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Present,
    Absent,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The class in session right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveClass {
    pub subject_id: SubjectId,
    pub subject_name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl Database {
    pub fn live_class(&self, now: NaiveDateTime) -> Result<Option<LiveClass>, DbError> {
        let Some(session) = self.timetable()?.current_session(now) else {
            return Ok(None);
        };
        let subject_name = self
            .subject_name(session.subject_id)?
            .unwrap_or_else(|| format!("Subject {}", session.subject_id));
        Ok(Some(LiveClass {
            subject_id: session.subject_id,
            subject_name,
            start_time: session.start_time,
            end_time: session.end_time,
        }))
    }

    /// Registered students with no record for the live class today.
    ///
    /// Empty when no class is in session.
    pub fn absentees(&self, now: NaiveDateTime) -> Result<Vec<String>, DbError> {
        let Some(live) = self.live_class(now)? else {
            return Ok(Vec::new());
        };
        let mut stmt = self.conn.prepare(
            "SELECT s.name FROM students s
             WHERE NOT EXISTS (
                 SELECT 1 FROM attendance a
                 WHERE a.student_db_id = s.id
                   AND a.subject_id = ?1
                   AND date(a.timestamp) = ?2
             )
             ORDER BY s.name",
        )?;
        let date = now.date().format(DATE_FORMAT).to_string();
        let rows = stmt.query_map(params![live.subject_id, date], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn student_status(
        &self,
        name: &str,
        subject_id: SubjectId,
        date: NaiveDate,
    ) -> Result<Status, DbError> {
        let student = self
            .student(name)?
            .ok_or_else(|| DbError::NotFound(format!("student '{name}'")))?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM attendance
             WHERE student_db_id = ?1 AND subject_id = ?2 AND date(timestamp) = ?3",
            params![student.id, subject_id, date.format(DATE_FORMAT).to_string()],
            |row| row.get(0),
        )?;
        Ok(if count > 0 { Status::Present } else { Status::Absent })
    }

    /// Share of held classes the student attended, in percent.
    ///
    /// Classes held are estimated as (distinct days with any record / 5)
    /// times the number of weekly slots. Both the day count and the estimate
    /// are floored at 1.
    pub fn attendance_percentage(&self, name: &str) -> Result<f64, DbError> {
        let student = self
            .student(name)?
            .ok_or_else(|| DbError::NotFound(format!("student '{name}'")))?;

        let days: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT date(timestamp)) FROM attendance",
            [],
            |row| row.get(0),
        )?;
        let weekly: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM timetable", [], |row| row.get(0))?;
        let attended: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM attendance WHERE student_db_id = ?1",
            params![student.id],
            |row| row.get(0),
        )?;

        let days = days.max(1) as f64;
        let mut held = days / 5.0 * weekly as f64;
        if held <= 0.0 {
            held = 1.0;
        }
        let pct = attended as f64 / held * 100.0;
        Ok((pct * 100.0).round() / 100.0)
    }
}

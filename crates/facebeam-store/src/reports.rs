//! Daily attendance reports and their CSV form.

use crate::dashboard::Status;
use crate::timetable::Subject;
use crate::{Database, DbError, DATE_FORMAT};
use chrono::NaiveDate;
use facebeam_core::schedule::{day_of_week, SubjectId};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;

/// One (subject, student) line of the status report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRow {
    pub date: NaiveDate,
    pub subject_name: String,
    pub student_name: String,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRow {
    pub student_name: String,
    /// One entry per column of [`PivotReport::subjects`].
    pub statuses: Vec<Status>,
}

/// Students down, scheduled subjects across.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotReport {
    pub date: NaiveDate,
    pub subjects: Vec<String>,
    pub rows: Vec<PivotRow>,
}

impl PivotReport {
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty() || self.rows.is_empty()
    }

    pub fn write_csv<W: Write>(&self, out: W) -> Result<(), DbError> {
        let mut wtr = csv::Writer::from_writer(out);
        let mut header = vec!["Student Name"];
        header.extend(self.subjects.iter().map(String::as_str));
        wtr.write_record(&header)?;
        for row in &self.rows {
            let mut record = vec![row.student_name.as_str()];
            record.extend(row.statuses.iter().map(|s| s.as_str()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

pub fn write_status_csv<W: Write>(rows: &[StatusRow], out: W) -> Result<(), DbError> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(["Date", "Subject Name", "Student Name", "Status"])?;
    for row in rows {
        let date = row.date.format(DATE_FORMAT).to_string();
        wtr.write_record([
            date.as_str(),
            row.subject_name.as_str(),
            row.student_name.as_str(),
            row.status.as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

impl Database {
    /// Subjects scheduled on `date`'s weekday, by first start time, each once.
    pub fn scheduled_subjects(&self, date: NaiveDate) -> Result<Vec<Subject>, DbError> {
        let mut seen = HashSet::new();
        let mut subjects = Vec::new();
        for slot in self.timetable()?.slots_on(day_of_week(date)) {
            if !seen.insert(slot.subject_id) {
                continue;
            }
            let name = self
                .subject_name(slot.subject_id)?
                .unwrap_or_else(|| format!("Subject {}", slot.subject_id));
            subjects.push(Subject {
                id: slot.subject_id,
                name,
            });
        }
        Ok(subjects)
    }

    fn present_on(&self, date: NaiveDate) -> Result<HashSet<(i64, SubjectId)>, DbError> {
        Ok(self
            .attendance_on(date)?
            .into_iter()
            .map(|r| (r.student_db_id, r.subject_id))
            .collect())
    }

    /// One row per scheduled subject and registered student.
    ///
    /// Empty when there are no students or nothing is scheduled.
    pub fn status_report(&self, date: NaiveDate) -> Result<Vec<StatusRow>, DbError> {
        let students = self.students()?;
        let subjects = self.scheduled_subjects(date)?;
        if students.is_empty() || subjects.is_empty() {
            return Ok(Vec::new());
        }
        let present = self.present_on(date)?;

        let mut rows = Vec::with_capacity(students.len() * subjects.len());
        for subject in &subjects {
            for student in &students {
                let status = if present.contains(&(student.id, subject.id)) {
                    Status::Present
                } else {
                    Status::Absent
                };
                rows.push(StatusRow {
                    date,
                    subject_name: subject.name.clone(),
                    student_name: student.name.clone(),
                    status,
                });
            }
        }
        tracing::debug!(%date, rows = rows.len(), "status report built");
        Ok(rows)
    }

    pub fn pivot_report(&self, date: NaiveDate) -> Result<PivotReport, DbError> {
        let students = self.students()?;
        let subjects = self.scheduled_subjects(date)?;
        if students.is_empty() || subjects.is_empty() {
            return Ok(PivotReport {
                date,
                subjects: Vec::new(),
                rows: Vec::new(),
            });
        }
        let present = self.present_on(date)?;

        let rows = students
            .iter()
            .map(|student| PivotRow {
                student_name: student.name.clone(),
                statuses: subjects
                    .iter()
                    .map(|subject| {
                        if present.contains(&(student.id, subject.id)) {
                            Status::Present
                        } else {
                            Status::Absent
                        }
                    })
                    .collect(),
            })
            .collect();

        Ok(PivotReport {
            date,
            subjects: subjects.into_iter().map(|s| s.name).collect(),
            rows,
        })
    }
}

//! Student roster.

use crate::{Database, DbError};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

/// Registration details for a new student.
#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub name: String,
    pub image_path: String,
    pub student_id: Option<String>,
    pub section: Option<String>,
    pub year: Option<String>,
    pub roll_number: Option<String>,
    pub branch: Option<String>,
    pub college_id: Option<String>,
}

/// A registered student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub image_path: String,
    pub student_id: Option<String>,
    pub section: Option<String>,
    pub year: Option<String>,
    pub roll_number: Option<String>,
    pub branch: Option<String>,
    pub college_id: Option<String>,
}

const STUDENT_COLUMNS: &str =
    "id, name, image_path, student_id, section, year, roll_number, branch, college_id";

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        name: row.get(1)?,
        image_path: row.get(2)?,
        student_id: row.get(3)?,
        section: row.get(4)?,
        year: row.get(5)?,
        roll_number: row.get(6)?,
        branch: row.get(7)?,
        college_id: row.get(8)?,
    })
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl Database {
    /// Register a student. Returns the new row id.
    pub fn add_student(&self, student: &NewStudent) -> Result<i64, DbError> {
        if student.name.trim().is_empty() {
            return Err(DbError::Invalid("student name is empty".into()));
        }

        let result = self.conn.execute(
            "INSERT INTO students
                (name, image_path, student_id, section, year, roll_number, branch, college_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                student.name,
                student.image_path,
                student.student_id,
                student.section,
                student.year,
                student.roll_number,
                student.branch,
                student.college_id,
            ],
        );

        match result {
            Ok(_) => {
                let id = self.conn.last_insert_rowid();
                tracing::info!(id, name = %student.name, "student registered");
                Ok(id)
            }
            Err(e) if is_constraint_violation(&e) => Err(DbError::Duplicate(format!(
                "student name '{}' or student id already registered",
                student.name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// All registered students, ordered by name.
    pub fn students(&self) -> Result<Vec<Student>, DbError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {STUDENT_COLUMNS} FROM students ORDER BY name, id"))?;
        let rows = stmt.query_map([], student_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Look up a student by name (case-insensitive).
    pub fn student(&self, name: &str) -> Result<Option<Student>, DbError> {
        let student = self
            .conn
            .query_row(
                &format!(
                    "SELECT {STUDENT_COLUMNS} FROM students
                     WHERE name = ?1 COLLATE NOCASE ORDER BY id LIMIT 1"
                ),
                params![name],
                student_from_row,
            )
            .optional()?;
        Ok(student)
    }

    /// Row id of the student whose name matches `name` case-insensitively.
    pub fn lookup_student_db_id(&self, name: &str) -> Result<Option<i64>, DbError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM students WHERE name = ?1 COLLATE NOCASE ORDER BY id LIMIT 1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }
}

//! Subjects and the weekly timetable.

use crate::{Database, DbError};
use facebeam_core::schedule::{parse_hhmm, ScheduledSlot, SubjectId, Timetable};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
}

/// One `[[slot]]` entry in a timetable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub subject_id: SubjectId,
    /// 0 = Monday ... 6 = Sunday.
    pub day: u8,
    pub start: String,
    pub end: String,
}

/// Timetable definition loaded from TOML.
///
/// ```toml
/// [[subject]]
/// id = 1
/// name = "DataBase Management System"
///
/// [[slot]]
/// subject_id = 1
/// day = 0
/// start = "08:50"
/// end = "09:40"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetableFile {
    #[serde(rename = "subject", default)]
    pub subjects: Vec<Subject>,
    #[serde(rename = "slot", default)]
    pub slots: Vec<SlotEntry>,
}

impl TimetableFile {
    pub fn load(path: &Path) -> Result<Self, DbError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, DbError> {
        let file: Self = toml::from_str(text).map_err(|e| DbError::Timetable(e.to_string()))?;
        file.validate()?;
        Ok(file)
    }

    /// Check ids, names, days and times. Returns the parsed slots.
    pub fn validate(&self) -> Result<Vec<ScheduledSlot>, DbError> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for subject in &self.subjects {
            if subject.name.trim().is_empty() {
                return Err(DbError::Timetable(format!("subject {} has an empty name", subject.id)));
            }
            if !ids.insert(subject.id) {
                return Err(DbError::Timetable(format!("duplicate subject id {}", subject.id)));
            }
            if !names.insert(subject.name.as_str()) {
                return Err(DbError::Timetable(format!("duplicate subject name '{}'", subject.name)));
            }
        }

        self.slots
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let bad = |msg: String| DbError::Timetable(format!("slot {}: {msg}", i + 1));
                if !ids.contains(&entry.subject_id) {
                    return Err(bad(format!("unknown subject id {}", entry.subject_id)));
                }
                if entry.day > 6 {
                    return Err(bad(format!("day {} out of range 0..=6", entry.day)));
                }
                let start = parse_hhmm(&entry.start)
                    .ok_or_else(|| bad(format!("invalid start time '{}'", entry.start)))?;
                let end = parse_hhmm(&entry.end)
                    .ok_or_else(|| bad(format!("invalid end time '{}'", entry.end)))?;
                if start > end {
                    return Err(bad(format!("start {} after end {}", entry.start, entry.end)));
                }
                Ok(ScheduledSlot {
                    subject_id: entry.subject_id,
                    day_of_week: entry.day,
                    start_time: start,
                    end_time: end,
                })
            })
            .collect()
    }
}

impl Database {
    pub fn subjects(&self) -> Result<Vec<Subject>, DbError> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM subjects ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Subject {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn subject_name(&self, id: SubjectId) -> Result<Option<String>, DbError> {
        use rusqlite::OptionalExtension;
        let name = self
            .conn
            .query_row("SELECT name FROM subjects WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(name)
    }

    /// Load every weekly slot. Rows with unparseable times are an error.
    pub fn timetable(&self) -> Result<Timetable, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT subject_id, day_of_week, start_time, end_time FROM timetable ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, SubjectId>(0)?,
                row.get::<_, u8>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut slots = Vec::new();
        for row in rows {
            let (subject_id, day_of_week, start, end) = row?;
            let (Some(start_time), Some(end_time)) = (parse_hhmm(&start), parse_hhmm(&end)) else {
                return Err(DbError::Invalid(format!(
                    "timetable slot for subject {subject_id} has bad times '{start}'-'{end}'"
                )));
            };
            slots.push(ScheduledSlot {
                subject_id,
                day_of_week,
                start_time,
                end_time,
            });
        }
        Ok(Timetable::new(slots))
    }

    /// Replace the weekly timetable with `file` in one transaction.
    ///
    /// Subjects in the file are inserted or renamed. Subjects missing from
    /// the file are removed unless attendance still references them.
    pub fn import_timetable(&mut self, file: &TimetableFile) -> Result<usize, DbError> {
        let slots = file.validate()?;
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM timetable", [])?;

        let keep: HashSet<SubjectId> = file.subjects.iter().map(|s| s.id).collect();
        let existing: Vec<SubjectId> = {
            let mut stmt = tx.prepare("SELECT id FROM subjects")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        for id in existing.into_iter().filter(|id| !keep.contains(id)) {
            let removed = tx.execute(
                "DELETE FROM subjects WHERE id = ?1
                 AND NOT EXISTS (SELECT 1 FROM attendance WHERE subject_id = ?1)",
                params![id],
            )?;
            if removed == 0 {
                tracing::warn!(subject_id = id, "subject has attendance records; kept");
            }
        }

        for subject in &file.subjects {
            tx.execute(
                "INSERT INTO subjects (id, name) VALUES (?1, ?2)
                 ON CONFLICT (id) DO UPDATE SET name = excluded.name",
                params![subject.id, subject.name],
            )?;
        }

        for slot in &slots {
            tx.execute(
                "INSERT INTO timetable (subject_id, day_of_week, start_time, end_time)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    slot.subject_id,
                    slot.day_of_week,
                    slot.start_time.format("%H:%M").to_string(),
                    slot.end_time.format("%H:%M").to_string(),
                ],
            )?;
        }

        tx.commit()?;
        tracing::info!(subjects = file.subjects.len(), slots = slots.len(), "timetable imported");
        Ok(slots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded;
    use chrono::NaiveDate;

    const SMALL: &str = r#"
[[subject]]
id = 10
name = "Compilers"

[[subject]]
id = 11
name = "Networks"

[[slot]]
subject_id = 10
day = 0
start = "09:00"
end = "10:00"

[[slot]]
subject_id = 11
day = 0
start = "10:00"
end = "11:00"
"#;

    #[test]
    fn test_seeded_timetable_resolves_monday_morning() {
        let db = seeded();
        let timetable = db.timetable().unwrap();
        // 2024-01-01 is a Monday.
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        assert_eq!(timetable.current_subject(now), Some(1));
        assert_eq!(db.subject_name(1).unwrap().as_deref(), Some("DataBase Management System"));
        // 09:40 is inside both the first and second period; the earlier start wins.
        assert_eq!(timetable.current_subject(now.date().and_hms_opt(9, 40, 0).unwrap()), Some(1));
        assert_eq!(timetable.current_subject(now.date().and_hms_opt(9, 41, 0).unwrap()), Some(5));
    }

    #[test]
    fn test_parse_and_import() {
        let mut db = seeded();
        let file = TimetableFile::parse(SMALL).unwrap();
        assert_eq!(db.import_timetable(&file).unwrap(), 2);

        let subjects = db.subjects().unwrap();
        assert_eq!(
            subjects.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![10, 11]
        );
        let timetable = db.timetable().unwrap();
        assert_eq!(timetable.slots().len(), 2);
        assert_eq!(timetable.slots()[0].start_time.format("%H:%M").to_string(), "09:00");
    }

    #[test]
    fn test_import_keeps_referenced_subjects() {
        let mut db = seeded();
        db.conn
            .execute(
                "INSERT INTO attendance (name, timestamp, subject_id) VALUES ('A', '2024-01-01 09:00:00', 1)",
                [],
            )
            .unwrap();
        db.import_timetable(&TimetableFile::parse(SMALL).unwrap()).unwrap();

        let ids: Vec<_> = db.subjects().unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 10, 11]);
        assert!(db.timetable().unwrap().slots().iter().all(|s| s.subject_id >= 10));
    }

    #[test]
    fn test_validation_errors() {
        let unknown = r#"
[[slot]]
subject_id = 3
day = 0
start = "09:00"
end = "10:00"
"#;
        assert!(matches!(TimetableFile::parse(unknown), Err(DbError::Timetable(_))));

        let bad_day = SMALL.replacen("day = 0", "day = 7", 1);
        assert!(matches!(TimetableFile::parse(&bad_day), Err(DbError::Timetable(_))));

        let bad_time = SMALL.replacen("\"09:00\"", "\"9am\"", 1);
        assert!(matches!(TimetableFile::parse(&bad_time), Err(DbError::Timetable(_))));

        let backwards = SMALL.replacen("end = \"10:00\"", "end = \"08:00\"", 1);
        assert!(matches!(TimetableFile::parse(&backwards), Err(DbError::Timetable(_))));

        let dup = SMALL.replacen("id = 11", "id = 10", 1);
        assert!(matches!(TimetableFile::parse(&dup), Err(DbError::Timetable(_))));

        assert!(matches!(TimetableFile::parse("not toml ["), Err(DbError::Timetable(_))));
    }

    #[test]
    fn test_failed_import_leaves_timetable_untouched() {
        let mut db = seeded();
        let bad = TimetableFile {
            subjects: vec![],
            slots: vec![SlotEntry {
                subject_id: 1,
                day: 0,
                start: "09:00".into(),
                end: "10:00".into(),
            }],
        };
        assert!(db.import_timetable(&bad).is_err());
        assert_eq!(db.timetable().unwrap().slots().len(), 25);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timetable.toml");
        std::fs::write(&path, SMALL).unwrap();
        let file = TimetableFile::load(&path).unwrap();
        assert_eq!(file.subjects.len(), 2);
        assert_eq!(file.slots[1].subject_id, 11);
    }
}

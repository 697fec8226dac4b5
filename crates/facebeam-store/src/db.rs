use crate::schema::{DEFAULT_SLOTS, DEFAULT_SUBJECTS, SCHEMA};
use crate::DbError;
use rusqlite::{params, Connection};
use std::path::Path;

/// SQLite-backed FaceBeam database.
pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    /// Open (or create) a database file and make sure the schema exists.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::warn!(error = %e, "failed to enable WAL mode");
        }
        let db = Self::with_connection(conn)?;
        tracing::info!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DbError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create tables and indexes that do not exist yet.
    pub fn init_schema(&self) -> Result<(), DbError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Insert the default subjects and weekly timetable.
    ///
    /// Subjects are inserted if missing; slots only when the timetable is
    /// empty. Returns the number of slots inserted.
    pub fn seed_default_timetable(&mut self) -> Result<usize, DbError> {
        let tx = self.conn.transaction()?;

        for (id, name) in DEFAULT_SUBJECTS {
            tx.execute(
                "INSERT OR IGNORE INTO subjects (id, name) VALUES (?1, ?2)",
                params![id, name],
            )?;
        }

        let existing: i64 = tx.query_row("SELECT COUNT(*) FROM timetable", [], |row| row.get(0))?;
        let mut inserted = 0;
        if existing == 0 {
            for (subject_id, day, start, end) in DEFAULT_SLOTS {
                tx.execute(
                    "INSERT INTO timetable (subject_id, day_of_week, start_time, end_time)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![subject_id, day, start, end],
                )?;
                inserted += 1;
            }
        } else {
            tracing::info!(existing, "timetable already populated; seed skipped");
        }

        tx.commit()?;
        Ok(inserted)
    }
}

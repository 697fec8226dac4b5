pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS subjects (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS students (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    image_path  TEXT NOT NULL,
    student_id  TEXT UNIQUE,
    section     TEXT,
    year        TEXT,
    roll_number TEXT,
    branch      TEXT,
    college_id  TEXT
);

CREATE TABLE IF NOT EXISTS timetable (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id  INTEGER NOT NULL REFERENCES subjects (id),
    day_of_week INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
    start_time  TEXT NOT NULL,
    end_time    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    timestamp     TEXT NOT NULL,
    subject_id    INTEGER REFERENCES subjects (id),
    student_db_id INTEGER REFERENCES students (id)
);

CREATE INDEX IF NOT EXISTS idx_attendance_subject_time
    ON attendance (subject_id, timestamp);
";

/// Default subjects: (id, name).
pub(crate) const DEFAULT_SUBJECTS: [(i64, &str); 6] = [
    (1, "DataBase Management System"),
    (2, "Design and Analysis of Algorithm"),
    (3, "Web Technology"),
    (4, "Application of Soft Computing"),
    (5, "Object Oriented System Design"),
    (6, "Constitution of India, Law and Engg."),
];

/// Default weekly slots: (subject_id, day_of_week, start, end).
pub(crate) const DEFAULT_SLOTS: [(i64, u8, &str, &str); 25] = [
    (1, 0, "08:50", "09:40"),
    (5, 0, "09:40", "10:30"),
    (3, 0, "10:30", "11:20"),
    (4, 0, "11:20", "12:10"),
    (2, 0, "12:10", "13:00"),
    (1, 0, "14:40", "16:20"), // DBMS lab
    (3, 1, "08:50", "09:40"),
    (1, 1, "09:40", "10:30"),
    (3, 1, "10:30", "11:20"),
    (5, 1, "11:20", "12:10"),
    (4, 1, "12:10", "13:00"),
    (4, 2, "08:50", "09:40"),
    (5, 2, "09:40", "10:30"),
    (2, 2, "10:30", "11:20"),
    (6, 2, "11:20", "12:10"),
    (3, 2, "12:10", "13:00"),
    (2, 2, "14:40", "16:20"), // DAA lab
    (2, 3, "08:50", "09:40"),
    (1, 3, "09:40", "10:30"),
    (4, 3, "11:20", "12:10"),
    (3, 3, "13:50", "15:30"), // WT lab
    (1, 4, "09:40", "10:30"),
    (2, 4, "10:30", "11:20"),
    (6, 4, "11:20", "12:10"),
    (1, 5, "12:40", "13:40"),
];

use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::{EngineError, EngineResult};

pub const DB_FILE_NAME: &str = "training.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE_NAME))?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS companies(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS training_groups(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            company_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            FOREIGN KEY(company_id) REFERENCES companies(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_groups_company ON training_groups(company_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            company_id TEXT,
            FOREIGN KEY(company_id) REFERENCES companies(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedules(
            group_id TEXT PRIMARY KEY,
            range_start TEXT NOT NULL,
            range_end TEXT NOT NULL,
            days_json TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(group_id) REFERENCES training_groups(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            teacher_attendance INTEGER,
            activities TEXT NOT NULL DEFAULT '',
            observations TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            FOREIGN KEY(group_id) REFERENCES training_groups(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    // Workspaces created before ad-hoc classes were tracked lack `origin`.
    ensure_classes_origin(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_group_date ON classes(group_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_date ON classes(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            status TEXT NOT NULL,
            minutes_attended INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(class_id) REFERENCES classes(id) ON DELETE CASCADE,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(class_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            title TEXT NOT NULL,
            date TEXT,
            max_score REAL,
            FOREIGN KEY(group_id) REFERENCES training_groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exams_group ON exams(group_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_results(
            id TEXT PRIMARY KEY,
            exam_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            score REAL NOT NULL,
            feedback TEXT,
            FOREIGN KEY(exam_id) REFERENCES exams(id) ON DELETE CASCADE,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_results_exam ON exam_results(exam_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_results_student ON exam_results(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            group_id TEXT NOT NULL,
            attendance_percentage REAL,
            average_score REAL,
            status TEXT NOT NULL DEFAULT 'active',
            start_date TEXT NOT NULL,
            end_date TEXT,
            observations TEXT NOT NULL DEFAULT '',
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(group_id) REFERENCES training_groups(id),
            UNIQUE(student_id, group_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_group ON enrollments(group_id)",
        [],
    )?;

    Ok(())
}

fn ensure_classes_origin(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "classes", "origin")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE classes ADD COLUMN origin TEXT NOT NULL DEFAULT 'single'",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Run `op` inside one IMMEDIATE transaction. Busy/locked failures restart the
/// whole transaction up to `retries` more times; anything else rolls back.
pub fn with_tx<T, F>(conn: &Connection, retries: u32, mut op: F) -> EngineResult<T>
where
    F: FnMut(&Connection) -> EngineResult<T>,
{
    let mut attempt: u32 = 0;
    loop {
        let result = rusqlite::Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
            .map_err(EngineError::from)
            .and_then(|tx| match op(&*tx) {
                Ok(v) => tx.commit().map(|_| v).map_err(EngineError::from),
                Err(e) => Err(e),
            });
        match result {
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                warn!(attempt, error = %e, "transaction hit a busy store, retrying");
                std::thread::sleep(Duration::from_millis(25 * u64::from(attempt)));
            }
            other => return other,
        }
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open");
        drop(conn);
        let conn = open_db(dir.path()).expect("reopen");
        assert!(table_has_column(&conn, "classes", "origin").expect("pragma"));
    }

    #[test]
    fn settings_roundtrip() {
        let conn = open_in_memory().expect("db");
        assert!(settings_get_json(&conn, "store").expect("get").is_none());
        settings_set_json(&conn, "store", &serde_json::json!({ "busyRetries": 1 })).expect("set");
        let v = settings_get_json(&conn, "store").expect("get").expect("some");
        assert_eq!(v["busyRetries"], 1);
    }

    #[test]
    fn failed_op_rolls_back() {
        let conn = open_in_memory().expect("db");
        let res: EngineResult<()> = with_tx(&conn, 0, |tx| {
            tx.execute("INSERT INTO companies(id, name) VALUES('c1', 'Acme')", [])?;
            Err(EngineError::validation("boom"))
        });
        assert!(res.is_err());
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM companies", [], |r| r.get(0))
            .expect("count");
        assert_eq!(n, 0);
    }

    fn busy() -> EngineError {
        EngineError::Store(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ))
    }

    fn company_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM companies", [], |r| r.get(0))
            .expect("count")
    }

    #[test]
    fn busy_store_restarts_the_transaction() {
        let conn = open_in_memory().expect("db");
        let mut calls = 0;
        with_tx(&conn, 2, |tx| {
            calls += 1;
            tx.execute("INSERT INTO companies(id, name) VALUES('c1', 'Acme')", [])?;
            if calls == 1 {
                return Err(busy());
            }
            Ok(())
        })
        .expect("second attempt commits");
        assert_eq!(calls, 2);
        assert_eq!(company_count(&conn), 1);
    }

    #[test]
    fn busy_store_gives_up_after_retries() {
        let conn = open_in_memory().expect("db");
        let mut calls = 0;
        let res: EngineResult<()> = with_tx(&conn, 2, |tx| {
            calls += 1;
            tx.execute("INSERT INTO companies(id, name) VALUES('c1', 'Acme')", [])?;
            Err(busy())
        });
        assert!(matches!(res, Err(ref e) if e.is_transient()));
        assert_eq!(calls, 3);
        assert_eq!(company_count(&conn), 0);
    }
}

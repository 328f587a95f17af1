//! Storage module - SQLite runtime state and history for the local host

use crate::models::*;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub struct Database {
    conn: Mutex<Connection>,
}

/// Fixed-width RFC 3339 so stored timestamps sort as text
fn timestamp_text(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl Database {
    /// Open or create database at path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn: Mutex::new(conn) };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn: Mutex::new(conn) };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS task_runtime (
                path TEXT PRIMARY KEY,
                state TEXT NOT NULL DEFAULT '"ready"',
                last_run_at_utc TEXT,
                last_result INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_path TEXT NOT NULL,
                timestamp_utc TEXT NOT NULL,
                event_id INTEGER NOT NULL,
                result_label TEXT NOT NULL,
                exit_code TEXT NOT NULL DEFAULT '',
                message TEXT NOT NULL DEFAULT '',
                user_name TEXT NOT NULL DEFAULT '',
                activity_id TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_history_task_path ON history(task_path);
            CREATE INDEX IF NOT EXISTS idx_history_timestamp ON history(timestamp_utc);
        "#,
        )?;
        Ok(())
    }

    // === Runtime state ===

    /// Stored state, last run and last result; the next run time is derived
    /// from the definition and never stored.
    pub fn get_runtime(&self, path: &str) -> Result<Option<TaskRuntime>> {
        let conn = self.lock()?;
        let runtime = conn
            .query_row(
                "SELECT state, last_run_at_utc, last_result FROM task_runtime WHERE path = ?1",
                params![path],
                |row| {
                    Ok(TaskRuntime {
                        state: serde_json::from_str(&row.get::<_, String>(0)?).unwrap_or_default(),
                        last_run_time: row
                            .get::<_, Option<String>>(1)?
                            .and_then(|s| parse_timestamp(&s)),
                        last_result: row.get(2)?,
                        next_run_time: None,
                    })
                },
            )
            .optional()?;
        Ok(runtime)
    }

    pub fn save_runtime(&self, path: &str, runtime: &TaskRuntime) -> Result<()> {
        let conn = self.lock()?;
        let state = serde_json::to_string(&runtime.state).unwrap_or_else(|_| "\"unknown\"".to_string());
        conn.execute(
            "INSERT INTO task_runtime (path, state, last_run_at_utc, last_result)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
                state = excluded.state,
                last_run_at_utc = excluded.last_run_at_utc,
                last_result = excluded.last_result",
            params![
                path,
                state,
                runtime.last_run_time.as_ref().map(timestamp_text),
                runtime.last_result,
            ],
        )?;
        Ok(())
    }

    pub fn delete_runtime(&self, path: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM task_runtime WHERE path = ?1", params![path])?;
        Ok(())
    }

    // === History ===

    pub fn insert_history(&self, path: &str, entry: &HistoryEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO history (task_path, timestamp_utc, event_id, result_label, exit_code,
                message, user_name, activity_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                path,
                timestamp_text(&entry.timestamp),
                entry.event_id,
                entry.result_label,
                entry.exit_code,
                entry.message,
                entry.user,
                entry.activity_id.map(|id| id.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Newest first, at most `limit` entries
    pub fn get_history(&self, path: &str, limit: u32) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp_utc, event_id, result_label, exit_code, message, user_name, activity_id
             FROM history WHERE task_path = ?1
             ORDER BY timestamp_utc DESC, id DESC LIMIT ?2",
        )?;

        let entries = stmt
            .query_map(params![path, limit], |row| {
                Ok(HistoryEntry {
                    timestamp: parse_timestamp(&row.get::<_, String>(0)?).unwrap_or_default(),
                    event_id: row.get(1)?,
                    result_label: row.get(2)?,
                    exit_code: row.get(3)?,
                    message: row.get(4)?,
                    user: row.get(5)?,
                    activity_id: row
                        .get::<_, Option<String>>(6)?
                        .and_then(|s| uuid::Uuid::parse_str(&s).ok()),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(event_id: u32, timestamp: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            timestamp,
            event_id,
            result_label: crate::history::event_label(event_id),
            exit_code: "0".to_string(),
            message: String::new(),
            user: "tester".to_string(),
            activity_id: Some(uuid::Uuid::new_v4()),
        }
    }

    #[test]
    fn test_runtime_upsert() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_runtime(r"\a").unwrap(), None);

        let now = Utc::now();
        let runtime = TaskRuntime {
            state: TaskState::Running,
            last_run_time: Some(now),
            last_result: 0x41301,
            next_run_time: None,
        };
        db.save_runtime(r"\a", &runtime).unwrap();
        db.save_runtime(
            r"\a",
            &TaskRuntime {
                state: TaskState::Ready,
                ..runtime.clone()
            },
        )
        .unwrap();

        let stored = db.get_runtime(r"\a").unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Ready);
        assert_eq!(stored.last_result, 0x41301);
        assert_eq!(
            stored.last_run_time.map(|t| t.timestamp_micros()),
            Some(now.timestamp_micros())
        );

        db.delete_runtime(r"\a").unwrap();
        assert_eq!(db.get_runtime(r"\a").unwrap(), None);
    }

    #[test]
    fn test_history_newest_first_with_limit() {
        let db = Database::open_in_memory().unwrap();
        let base = Utc::now();
        for (i, id) in [106, 110, 100].into_iter().enumerate() {
            db.insert_history(r"\a", &entry(id, base + Duration::seconds(i as i64))).unwrap();
        }
        db.insert_history(r"\b", &entry(141, base)).unwrap();

        let history = db.get_history(r"\a", 10).unwrap();
        let ids: Vec<u32> = history.iter().map(|e| e.event_id).collect();
        assert_eq!(ids, [100, 110, 106]);
        assert_eq!(history[0].user, "tester");
        assert!(history[0].activity_id.is_some());

        assert_eq!(db.get_history(r"\a", 2).unwrap().len(), 2);
    }
}

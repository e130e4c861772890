//! SQLite-backed session store.
//!
//! Provides persistent storage for:
//! - The active session record (key-value table)
//! - Completed session entries (append-only)
//! - Daily usage aggregates
//!
//! Change broadcasts are process-local. Other processes sharing the same
//! database file are noticed through [`SqliteStore::data_version`], and the
//! scheduler's reconcile loop catches anything missed.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

use super::{
    active_record, announce, data_dir, decode_record, encode, Finalized, SessionStore,
    StoreChange, CHANGE_CHANNEL_CAPACITY, RECORD_KEY,
};
use crate::collaborators::{UsageDelta, UsageRecorder};
use crate::error::StoreError;
use crate::session::{CompletedSessionEntry, SessionRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: String,
    pub focus_minutes: u64,
    pub focus_sessions: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub days: u64,
    pub focus_minutes: u64,
    pub focus_sessions: u64,
    pub completed_entries: u64,
    pub interrupted_entries: u64,
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StoreChange>,
}

impl SqliteStore {
    /// Open the database at `<data_dir>/focusroom.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_default() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Self::open(dir.join("focusroom.db"))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(2))?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        migrate(&conn)?;
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn kv_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn kv_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock().execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn kv_take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let value = tx
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        tx.commit()?;
        Ok(value)
    }

    /// Write the record inside one IMMEDIATE transaction, so the check holds
    /// against other processes sharing the file too.
    fn record_write_if<F>(&self, record: &SessionRecord, allowed: F) -> Result<bool, StoreError>
    where
        F: FnOnce(Option<SessionRecord>) -> bool,
    {
        let raw = encode(RECORD_KEY, record)?;

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = stored_record(&tx)?;
        if !allowed(active_record(current.as_deref())) {
            return Ok(false);
        }
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![RECORD_KEY, raw],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn finalize_sync(
        &self,
        session_id: &str,
        entry: Option<&CompletedSessionEntry>,
    ) -> Result<Finalized, StoreError> {
        let payload = entry.map(|e| encode("completed_sessions", e)).transpose()?;

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let matches = stored_record(&tx)?
            .as_deref()
            .and_then(|r| decode_record(r).ok())
            .is_some_and(|r| r.id == session_id);
        if !matches {
            return Ok(Finalized::Missed);
        }

        let mut appended = false;
        if let (Some(entry), Some(payload)) = (entry, payload) {
            let status = match entry.status {
                crate::session::EntryStatus::Completed => "completed",
                crate::session::EntryStatus::Interrupted => "interrupted",
            };
            appended = tx.execute(
                "INSERT OR IGNORE INTO completed_sessions
                    (id, date, status, actual_minutes, ended_at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.id,
                    entry.date,
                    status,
                    entry.actual_duration_minutes,
                    entry.ended_at.to_rfc3339(),
                    payload,
                ],
            )? > 0;
        }
        tx.execute("DELETE FROM kv WHERE key = ?1", params![RECORD_KEY])?;
        tx.commit()?;
        Ok(Finalized::Removed { appended })
    }

    fn entries_sync(&self) -> Result<Vec<CompletedSessionEntry>, StoreError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT payload FROM completed_sessions ORDER BY ended_at, rowid")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut entries = Vec::new();
        for row in rows {
            let payload = row?;
            match serde_json::from_str::<CompletedSessionEntry>(&payload) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(error = %e, "skipping undecodable session entry"),
            }
        }
        Ok(entries)
    }

    fn add_usage_sync(&self, date: &str, delta: UsageDelta) -> Result<(), StoreError> {
        self.lock().execute(
            "INSERT INTO daily_usage (date, focus_minutes, focus_sessions)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(date) DO UPDATE SET
                focus_minutes = focus_minutes + excluded.focus_minutes,
                focus_sessions = focus_sessions + excluded.focus_sessions",
            params![date, delta.focus_minutes, delta.focus_sessions],
        )?;
        Ok(())
    }

    /// SQLite's `data_version` for this connection. It changes whenever
    /// another connection commits to the same file, and never for writes made
    /// through this store.
    pub fn data_version(&self) -> Result<i64, StoreError> {
        let version = self
            .lock()
            .query_row("PRAGMA data_version", [], |row| row.get::<_, i64>(0))?;
        Ok(version)
    }

    pub fn usage_for(&self, date: &str) -> Result<DailyUsage, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT focus_minutes, focus_sessions FROM daily_usage WHERE date = ?1",
                params![date],
                |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
            )
            .optional()?;
        let (focus_minutes, focus_sessions) = row.unwrap_or((0, 0));
        Ok(DailyUsage {
            date: date.to_string(),
            focus_minutes,
            focus_sessions,
        })
    }

    pub fn usage_totals(&self) -> Result<UsageTotals, StoreError> {
        let conn = self.lock();
        let (days, focus_minutes, focus_sessions) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(focus_minutes), 0), COALESCE(SUM(focus_sessions), 0)
             FROM daily_usage",
            [],
            |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, u64>(1)?,
                    row.get::<_, u64>(2)?,
                ))
            },
        )?;

        let mut totals = UsageTotals {
            days,
            focus_minutes,
            focus_sessions,
            ..UsageTotals::default()
        };
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM completed_sessions GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            match status.as_str() {
                "completed" => totals.completed_entries += count,
                "interrupted" => totals.interrupted_entries += count,
                _ => {}
            }
        }
        Ok(totals)
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn load_record(&self) -> Result<Option<SessionRecord>, StoreError> {
        self.kv_get(RECORD_KEY)?
            .as_deref()
            .map(decode_record)
            .transpose()
    }

    async fn save_record(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.kv_set(RECORD_KEY, &encode(RECORD_KEY, record)?)?;
        announce(&self.changes, StoreChange::RecordSaved(record.clone()));
        Ok(())
    }

    async fn create_record(&self, record: &SessionRecord) -> Result<bool, StoreError> {
        let created = self.record_write_if(record, |current| current.is_none())?;
        if created {
            announce(&self.changes, StoreChange::RecordSaved(record.clone()));
        }
        Ok(created)
    }

    async fn update_record(&self, record: &SessionRecord) -> Result<bool, StoreError> {
        let updated =
            self.record_write_if(record, |current| current.is_some_and(|r| r.id == record.id))?;
        if updated {
            announce(&self.changes, StoreChange::RecordSaved(record.clone()));
        }
        Ok(updated)
    }

    async fn remove_record(&self) -> Result<Option<SessionRecord>, StoreError> {
        let raw = self.kv_take(RECORD_KEY)?;
        let removed = raw.as_deref().and_then(|r| decode_record(r).ok());
        if raw.is_some() {
            announce(
                &self.changes,
                StoreChange::RecordRemoved {
                    session_id: removed.as_ref().map(|r| r.id.clone()).unwrap_or_default(),
                },
            );
        }
        Ok(removed)
    }

    async fn finalize_record(
        &self,
        session_id: &str,
        entry: Option<&CompletedSessionEntry>,
    ) -> Result<Finalized, StoreError> {
        let finalized = self.finalize_sync(session_id, entry)?;
        if let (Finalized::Removed { appended: true }, Some(entry)) = (finalized, entry) {
            announce(
                &self.changes,
                StoreChange::EntryAppended {
                    id: entry.id.clone(),
                },
            );
        }
        if finalized.removed() {
            announce(
                &self.changes,
                StoreChange::RecordRemoved {
                    session_id: session_id.to_string(),
                },
            );
        }
        Ok(finalized)
    }

    async fn entries(&self) -> Result<Vec<CompletedSessionEntry>, StoreError> {
        self.entries_sync()
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.kv_get(key)
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.kv_set(key, value)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl UsageRecorder for SqliteStore {
    async fn add_daily_usage(&self, date: &str, delta: UsageDelta) -> Result<(), StoreError> {
        self.add_usage_sync(date, delta)
    }
}

fn stored_record(tx: &Transaction<'_>) -> Result<Option<String>, StoreError> {
    let raw = tx
        .query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![RECORD_KEY],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(raw)
}

/// Apply all pending migrations.
fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )?;

    let current: i32 = conn
        .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
        .optional()?
        .unwrap_or(0);

    if current < 1 {
        migrate_v1(conn)?;
    }
    Ok(())
}

/// Migration v1: key-value record table, completed sessions, daily usage.
fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS completed_sessions (
            id             TEXT PRIMARY KEY,
            date           TEXT NOT NULL,
            status         TEXT NOT NULL,
            actual_minutes INTEGER NOT NULL,
            ended_at       TEXT NOT NULL,
            payload        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS daily_usage (
            date           TEXT PRIMARY KEY,
            focus_minutes  INTEGER NOT NULL DEFAULT 0,
            focus_sessions INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_completed_sessions_date ON completed_sessions(date);

        DELETE FROM schema_version;
        INSERT INTO schema_version (version) VALUES (1);",
    )?;
    tx.commit()?;
    Ok(())
}

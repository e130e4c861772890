//! Durable session store and change broadcast.
//!
//! The store holds the single active [`SessionRecord`], the append-only list
//! of [`CompletedSessionEntry`] values, and a few small values. It is the only
//! thing trusted across a restart. Every write is announced on a broadcast
//! channel so surfaces can reconcile no matter who wrote.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{DailyUsage, SqliteStore, UsageTotals};

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::session::{CompletedSessionEntry, SessionRecord};

/// Well-known key of the active session record.
pub const RECORD_KEY: &str = "focusSession";
/// Focus length most recently started, used when chaining out of a break.
pub const LAST_FOCUS_MINUTES_KEY: &str = "lastFocusMinutes";

pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    RecordSaved(SessionRecord),
    RecordRemoved { session_id: String },
    EntryAppended { id: String },
}

/// Result of [`SessionStore::finalize_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalized {
    /// The stored record no longer carries the expected id.
    Missed,
    Removed {
        /// `false` when no entry was given or its id was already logged.
        appended: bool,
    },
}

impl Finalized {
    pub fn removed(self) -> bool {
        matches!(self, Finalized::Removed { .. })
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read the active record. A value that fails to decode is reported as
    /// [`StoreError::Corrupt`].
    async fn load_record(&self) -> Result<Option<SessionRecord>, StoreError>;

    /// Unconditional write. Session transitions go through
    /// [`create_record`](Self::create_record) and
    /// [`update_record`](Self::update_record) instead.
    async fn save_record(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Write `record` only if no active record is stored. Corrupt and
    /// inactive records count as absent and are replaced.
    ///
    /// Returns `false` when another session already holds the slot.
    async fn create_record(&self, record: &SessionRecord) -> Result<bool, StoreError>;

    /// Overwrite the stored record only if it is still the active record with
    /// `record.id`.
    ///
    /// Returns `false` when the session was finalized or replaced meanwhile.
    async fn update_record(&self, record: &SessionRecord) -> Result<bool, StoreError>;

    /// Remove whatever record is stored, returning it if it decoded.
    async fn remove_record(&self) -> Result<Option<SessionRecord>, StoreError>;

    /// Append `entry` (if any) and remove the record in one step, but only if
    /// the stored record still carries `session_id`. Appending an entry whose
    /// id already exists is a no-op, reported as `appended: false`.
    async fn finalize_record(
        &self,
        session_id: &str,
        entry: Option<&CompletedSessionEntry>,
    ) -> Result<Finalized, StoreError>;

    /// All completed entries, oldest first.
    async fn entries(&self) -> Result<Vec<CompletedSessionEntry>, StoreError>;

    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

pub(crate) fn decode_record(raw: &str) -> Result<SessionRecord, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
        key: RECORD_KEY.to_string(),
        message: e.to_string(),
    })
}

/// The stored record, if it decodes and is still active.
pub(crate) fn active_record(raw: Option<&str>) -> Option<SessionRecord> {
    raw.and_then(|r| decode_record(r).ok())
        .filter(|r| r.is_active)
}

pub(crate) fn encode<T: serde::Serialize>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        message: e.to_string(),
    })
}

pub(crate) fn announce(tx: &broadcast::Sender<StoreChange>, change: StoreChange) {
    match tx.send(change) {
        Ok(count) => tracing::trace!("store change sent to {count} subscribers"),
        Err(_) => tracing::trace!("no subscribers for store change"),
    }
}

/// Returns the data directory.
///
/// `FOCUSROOM_DATA_DIR` wins when set. Otherwise `~/.config/focusroom[-dev]/`,
/// with `FOCUSROOM_ENV=dev` selecting the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os("FOCUSROOM_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("FOCUSROOM_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("focusroom-dev")
            } else {
                base_dir.join("focusroom")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

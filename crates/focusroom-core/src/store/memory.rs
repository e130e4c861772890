//! In-process store, used by tests and by hosts that bring their own
//! persistence layer.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

use super::{
    active_record, announce, decode_record, encode, Finalized, SessionStore, StoreChange,
    CHANGE_CHANNEL_CAPACITY, RECORD_KEY,
};
use crate::collaborators::{UsageDelta, UsageRecorder};
use crate::error::StoreError;
use crate::session::{CompletedSessionEntry, SessionRecord};

#[derive(Debug, Default)]
struct MemoryState {
    /// Serialized, so corrupt data can be planted.
    record: Option<String>,
    entries: Vec<CompletedSessionEntry>,
    values: HashMap<String, String>,
    usage: HashMap<String, UsageDelta>,
}

#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(MemoryState::default()),
            changes,
        }
    }

    /// Store raw text under the record key, bypassing validation.
    pub async fn put_raw_record(&self, raw: impl Into<String>) {
        self.state.write().await.record = Some(raw.into());
    }

    pub async fn usage_for(&self, date: &str) -> UsageDelta {
        self.state
            .read()
            .await
            .usage
            .get(date)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load_record(&self) -> Result<Option<SessionRecord>, StoreError> {
        let state = self.state.read().await;
        state.record.as_deref().map(decode_record).transpose()
    }

    async fn save_record(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let raw = encode(RECORD_KEY, record)?;
        self.state.write().await.record = Some(raw);
        announce(&self.changes, StoreChange::RecordSaved(record.clone()));
        Ok(())
    }

    async fn create_record(&self, record: &SessionRecord) -> Result<bool, StoreError> {
        let raw = encode(RECORD_KEY, record)?;
        {
            let mut state = self.state.write().await;
            if active_record(state.record.as_deref()).is_some() {
                return Ok(false);
            }
            state.record = Some(raw);
        }
        announce(&self.changes, StoreChange::RecordSaved(record.clone()));
        Ok(true)
    }

    async fn update_record(&self, record: &SessionRecord) -> Result<bool, StoreError> {
        let raw = encode(RECORD_KEY, record)?;
        {
            let mut state = self.state.write().await;
            let current = active_record(state.record.as_deref());
            if !current.is_some_and(|r| r.id == record.id) {
                return Ok(false);
            }
            state.record = Some(raw);
        }
        announce(&self.changes, StoreChange::RecordSaved(record.clone()));
        Ok(true)
    }

    async fn remove_record(&self) -> Result<Option<SessionRecord>, StoreError> {
        let raw = self.state.write().await.record.take();
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
        let appended = {
            let mut state = self.state.write().await;
            let matches = state
                .record
                .as_deref()
                .and_then(|raw| decode_record(raw).ok())
                .is_some_and(|r| r.id == session_id);
            if !matches {
                return Ok(Finalized::Missed);
            }

            let appended = match entry {
                Some(entry) if !state.entries.iter().any(|e| e.id == entry.id) => {
                    state.entries.push(entry.clone());
                    Some(entry.id.clone())
                }
                _ => None,
            };
            state.record = None;
            appended
        };

        let finalized = Finalized::Removed {
            appended: appended.is_some(),
        };
        if let Some(id) = appended {
            announce(&self.changes, StoreChange::EntryAppended { id });
        }
        announce(
            &self.changes,
            StoreChange::RecordRemoved {
                session_id: session_id.to_string(),
            },
        );
        Ok(finalized)
    }

    async fn entries(&self) -> Result<Vec<CompletedSessionEntry>, StoreError> {
        Ok(self.state.read().await.entries.clone())
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state.read().await.values.get(key).cloned())
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .values
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl UsageRecorder for MemoryStore {
    async fn add_daily_usage(&self, date: &str, delta: UsageDelta) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let day = state.usage.entry(date.to_string()).or_default();
        day.focus_minutes = day.focus_minutes.saturating_add(delta.focus_minutes);
        day.focus_sessions = day.focus_sessions.saturating_add(delta.focus_sessions);
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::SessionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Completed,
    Interrupted,
}

/// Session category derived from the planned duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Open,
    Short,
    Pomodoro,
    Long,
}

impl SessionKind {
    pub fn from_planned(planned_minutes: Option<u32>) -> Self {
        match planned_minutes {
            None => SessionKind::Open,
            Some(m) if m <= 15 => SessionKind::Short,
            Some(m) if m <= 30 => SessionKind::Pomodoro,
            Some(_) => SessionKind::Long,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Open => "open",
            SessionKind::Short => "short",
            SessionKind::Pomodoro => "pomodoro",
            SessionKind::Long => "long",
        }
    }
}

/// One finished (or stopped and credited) focus session. Write-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSessionEntry {
    /// Same as the originating session id.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub planned_duration_minutes: Option<u32>,
    pub actual_duration_minutes: u32,
    pub boredom_level: Option<u8>,
    pub task_id: Option<String>,
    pub task_title: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// `YYYY-MM-DD` bucket of `ended_at`.
    pub date: String,
    pub status: EntryStatus,
}

impl CompletedSessionEntry {
    pub fn from_record(
        record: &SessionRecord,
        running_secs: u64,
        ended_at_ms: i64,
        status: EntryStatus,
    ) -> Self {
        let ended_at = datetime_from_ms(ended_at_ms);
        let planned = if record.is_open_ended {
            None
        } else {
            record.selected_minutes
        };
        Self {
            id: record.id.clone(),
            kind: SessionKind::from_planned(planned),
            planned_duration_minutes: planned,
            actual_duration_minutes: minutes_from_secs(running_secs),
            boredom_level: record.boredom_level,
            task_id: record.task_id.clone(),
            task_title: record.task_title.clone(),
            started_at: datetime_from_ms(record.started_at),
            ended_at,
            date: date_bucket(ended_at),
            status,
        }
    }
}

/// Whole minutes, rounded to nearest.
pub fn minutes_from_secs(secs: u64) -> u32 {
    u32::try_from(secs.saturating_add(30) / 60).unwrap_or(u32::MAX)
}

pub fn date_bucket(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

pub fn datetime_from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

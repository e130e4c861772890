//! The persisted session record.
//!
//! One record describes the open focus or break interval. All remaining and
//! elapsed time is derived from its timestamps; nothing about a running
//! session lives only in memory.

use serde::{Deserialize, Serialize};

use super::phase::SessionPhase;
use crate::error::TransitionError;

/// Upper bound for a fixed-length session (one day).
pub const MAX_SESSION_MINUTES: u32 = 24 * 60;

const MS_PER_SEC: i64 = 1000;

/// Planned length of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionLength {
    Fixed(u32),
    OpenEnded,
}

impl SessionLength {
    pub fn minutes(&self) -> Option<u32> {
        match self {
            SessionLength::Fixed(m) => Some(*m),
            SessionLength::OpenEnded => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub is_active: bool,
    pub is_paused: bool,
    pub is_break: bool,
    pub is_open_ended: bool,
    #[serde(default)]
    pub selected_minutes: Option<u32>,
    /// Epoch ms when the session was first started.
    pub started_at: i64,
    /// Epoch ms when the current running sub-interval began.
    pub start_timestamp: i64,
    /// Epoch ms when a running fixed-length session is due.
    #[serde(default)]
    pub end_timestamp: Option<i64>,
    #[serde(default)]
    pub remaining_seconds: u64,
    #[serde(default)]
    pub paused_remaining_seconds: Option<u64>,
    #[serde(default)]
    pub paused_at: Option<i64>,
    /// Open-ended running time folded in from earlier sub-intervals.
    #[serde(default)]
    pub elapsed_seconds: u64,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub task_title: Option<String>,
    #[serde(default)]
    pub boredom_level: Option<u8>,
}

impl SessionRecord {
    /// Build a freshly started, running record.
    pub fn begin(id: String, length: SessionLength, is_break: bool, now_ms: i64) -> Self {
        let (selected_minutes, end_timestamp, remaining_seconds) = match length {
            SessionLength::Fixed(minutes) => {
                let secs = u64::from(minutes) * 60;
                (Some(minutes), Some(now_ms + secs as i64 * MS_PER_SEC), secs)
            }
            SessionLength::OpenEnded => (None, None, 0),
        };

        Self {
            id,
            is_active: true,
            is_paused: false,
            is_break,
            is_open_ended: length == SessionLength::OpenEnded,
            selected_minutes,
            started_at: now_ms,
            start_timestamp: now_ms,
            end_timestamp,
            remaining_seconds,
            paused_remaining_seconds: None,
            paused_at: None,
            elapsed_seconds: 0,
            task_id: None,
            task_title: None,
            boredom_level: None,
        }
    }

    pub fn with_task(mut self, task_id: Option<String>, task_title: Option<String>) -> Self {
        self.task_id = task_id;
        self.task_title = task_title;
        self
    }

    pub fn with_boredom(mut self, level: Option<u8>) -> Self {
        self.boredom_level = level;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::of(Some(self))
    }

    pub fn is_running(&self) -> bool {
        self.is_active && !self.is_paused
    }

    pub fn length(&self) -> SessionLength {
        match (self.is_open_ended, self.selected_minutes) {
            (false, Some(m)) => SessionLength::Fixed(m),
            _ => SessionLength::OpenEnded,
        }
    }

    pub fn planned_secs(&self) -> Option<u64> {
        if self.is_open_ended {
            return None;
        }
        self.selected_minutes.map(|m| u64::from(m) * 60)
    }

    /// Remaining seconds at `now_ms`, clamped at zero. `None` when open-ended.
    pub fn remaining_secs_at(&self, now_ms: i64) -> Option<u64> {
        if self.is_open_ended {
            return None;
        }
        if self.is_paused {
            return Some(
                self.paused_remaining_seconds
                    .unwrap_or(self.remaining_seconds),
            );
        }
        match self.end_timestamp {
            Some(end) => Some(ceil_secs(end - now_ms)),
            None => Some(self.remaining_seconds),
        }
    }

    /// Running time at `now_ms`, excluding every paused interval.
    pub fn running_secs_at(&self, now_ms: i64) -> u64 {
        match self.planned_secs() {
            Some(planned) => {
                let remaining = self.remaining_secs_at(now_ms).unwrap_or(0);
                planned.saturating_sub(remaining)
            }
            None => {
                let current = if self.is_running() {
                    floor_secs(now_ms - self.start_timestamp)
                } else {
                    0
                };
                self.elapsed_seconds.saturating_add(current)
            }
        }
    }

    /// Milliseconds until the deadline; `None` when there is no deadline.
    pub fn ms_until_due(&self, now_ms: i64) -> Option<i64> {
        if !self.is_running() || self.is_open_ended {
            return None;
        }
        self.end_timestamp.map(|end| end - now_ms)
    }

    pub fn is_due_at(&self, now_ms: i64) -> bool {
        self.ms_until_due(now_ms).is_some_and(|ms| ms <= 0)
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Freeze time. Fixed sessions snapshot what is left and drop the deadline.
    pub fn pause(&mut self, now_ms: i64) -> Result<(), TransitionError> {
        self.phase().apply(super::PhaseAction::Pause)?;

        if self.is_open_ended {
            self.elapsed_seconds = self.running_secs_at(now_ms);
        } else {
            let remaining = self.remaining_secs_at(now_ms).unwrap_or(0);
            self.paused_remaining_seconds = Some(remaining);
            self.remaining_seconds = remaining;
            self.end_timestamp = None;
        }
        self.is_paused = true;
        self.paused_at = Some(now_ms);
        Ok(())
    }

    /// Unfreeze time. Fixed sessions get a new deadline from the snapshot.
    pub fn resume(&mut self, now_ms: i64) -> Result<(), TransitionError> {
        self.phase().apply(super::PhaseAction::Resume {
            is_break: self.is_break,
        })?;

        if !self.is_open_ended {
            let remaining = self
                .paused_remaining_seconds
                .take()
                .unwrap_or(self.remaining_seconds);
            self.remaining_seconds = remaining;
            self.end_timestamp = Some(now_ms + remaining as i64 * MS_PER_SEC);
        }
        self.start_timestamp = now_ms;
        self.is_paused = false;
        self.paused_at = None;
        Ok(())
    }

    /// Bring `remaining_seconds` / `elapsed_seconds` up to `now_ms`.
    pub fn refresh(&mut self, now_ms: i64) {
        if self.is_open_ended {
            if self.is_running() {
                self.elapsed_seconds = self.running_secs_at(now_ms);
                self.start_timestamp = now_ms;
            }
        } else if let Some(remaining) = self.remaining_secs_at(now_ms) {
            self.remaining_seconds = remaining;
        }
    }
}

fn ceil_secs(ms: i64) -> u64 {
    if ms <= 0 {
        0
    } else {
        ((ms + MS_PER_SEC - 1) / MS_PER_SEC) as u64
    }
}

fn floor_secs(ms: i64) -> u64 {
    if ms <= 0 {
        0
    } else {
        (ms / MS_PER_SEC) as u64
    }
}

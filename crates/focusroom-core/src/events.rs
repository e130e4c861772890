use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::EntryStatus;

/// Every session transition produces an Event.
/// Overlays and other surfaces receive them through the overlay broadcaster;
/// the CLI prints them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SessionStarted {
        session_id: String,
        is_break: bool,
        planned_minutes: Option<u32>,
        at: DateTime<Utc>,
    },
    SessionPaused {
        session_id: String,
        remaining_secs: Option<u64>,
        at: DateTime<Utc>,
    },
    SessionResumed {
        session_id: String,
        remaining_secs: Option<u64>,
        at: DateTime<Utc>,
    },
    /// Deadline reached and finalized by the authoritative completion path.
    SessionCompleted {
        session_id: String,
        is_break: bool,
        actual_minutes: u32,
        at: DateTime<Utc>,
    },
    /// Ended early by a user.
    SessionStopped {
        session_id: String,
        is_break: bool,
        status: Option<EntryStatus>,
        credited_minutes: u32,
        at: DateTime<Utc>,
    },
    /// A break was started automatically after a focus session.
    BreakChained {
        session_id: String,
        break_minutes: u32,
        at: DateTime<Utc>,
    },
    /// A focus session was started automatically after a break.
    FocusChained {
        session_id: String,
        focus_minutes: u32,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn session_id(&self) -> &str {
        match self {
            Event::SessionStarted { session_id, .. }
            | Event::SessionPaused { session_id, .. }
            | Event::SessionResumed { session_id, .. }
            | Event::SessionCompleted { session_id, .. }
            | Event::SessionStopped { session_id, .. }
            | Event::BreakChained { session_id, .. }
            | Event::FocusChained { session_id, .. } => session_id,
        }
    }

    /// Whether focus mode should be shown after this event.
    pub fn focus_mode_active(&self) -> bool {
        matches!(
            self,
            Event::SessionStarted { .. }
                | Event::SessionResumed { .. }
                | Event::SessionPaused { .. }
                | Event::BreakChained { .. }
                | Event::FocusChained { .. }
        )
    }
}

mod entry;
mod phase;
mod record;

pub use entry::{
    date_bucket, datetime_from_ms, minutes_from_secs, CompletedSessionEntry, EntryStatus,
    SessionKind,
};
pub use phase::{CompletionTicket, PhaseAction, PhaseGate, SessionPhase};
pub use record::{SessionLength, SessionRecord, MAX_SESSION_MINUTES};

//! Session phase state machine.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running      -> Paused -> Running      -> Completing      -> Idle
//! Idle -> BreakRunning -> Paused -> BreakRunning -> BreakCompleting -> Idle
//! Running | Paused | BreakRunning -> Idle (stop)
//! ```
//!
//! The persisted record only ever says Idle, Running, Paused or BreakRunning.
//! The two completing phases exist per process, held by a [`PhaseGate`]
//! while that process finalizes a session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

use super::record::SessionRecord;
use crate::error::TransitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Running,
    Paused,
    Completing,
    BreakRunning,
    BreakCompleting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseAction {
    Start { is_break: bool },
    Pause,
    Resume { is_break: bool },
    Complete,
    Finish,
    Stop,
}

impl PhaseAction {
    pub fn name(&self) -> &'static str {
        match self {
            PhaseAction::Start { .. } => "start",
            PhaseAction::Pause => "pause",
            PhaseAction::Resume { .. } => "resume",
            PhaseAction::Complete => "complete",
            PhaseAction::Finish => "finish",
            PhaseAction::Stop => "stop",
        }
    }
}

impl SessionPhase {
    /// Phase described by a persisted record (`None` means no record).
    pub fn of(record: Option<&SessionRecord>) -> Self {
        match record {
            Some(r) if r.is_active => {
                if r.is_paused {
                    SessionPhase::Paused
                } else if r.is_break {
                    SessionPhase::BreakRunning
                } else {
                    SessionPhase::Running
                }
            }
            _ => SessionPhase::Idle,
        }
    }

    pub fn apply(self, action: PhaseAction) -> Result<SessionPhase, TransitionError> {
        use PhaseAction as A;
        use SessionPhase as P;

        let next = match (self, action) {
            (P::Idle, A::Start { is_break: false }) => P::Running,
            (P::Idle, A::Start { is_break: true }) => P::BreakRunning,
            (P::Running | P::BreakRunning, A::Pause) => P::Paused,
            (P::Paused, A::Resume { is_break: false }) => P::Running,
            (P::Paused, A::Resume { is_break: true }) => P::BreakRunning,
            (P::Running, A::Complete) => P::Completing,
            (P::BreakRunning, A::Complete) => P::BreakCompleting,
            (P::Completing | P::BreakCompleting, A::Finish) => P::Idle,
            (P::Running | P::Paused | P::BreakRunning, A::Stop) => P::Idle,
            (from, action) => {
                return Err(TransitionError::InvalidTransition {
                    from,
                    action: action.name(),
                })
            }
        };
        Ok(next)
    }

    pub fn is_completing(self) -> bool {
        matches!(self, SessionPhase::Completing | SessionPhase::BreakCompleting)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Running => "running",
            SessionPhase::Paused => "paused",
            SessionPhase::Completing => "completing",
            SessionPhase::BreakRunning => "on a break",
            SessionPhase::BreakCompleting => "completing a break",
        };
        f.write_str(s)
    }
}

/// Per-process completion guard.
///
/// Never persisted. A process holds at most one completion at a time; the
/// ticket returned by [`PhaseGate::try_begin_completion`] releases the gate
/// when dropped.
#[derive(Debug, Default)]
pub struct PhaseGate {
    in_flight: Mutex<Option<SessionPhase>>,
}

impl PhaseGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// The phase this process should act on: an in-flight completion wins
    /// over whatever the record says.
    pub fn effective(&self, record: Option<&SessionRecord>) -> SessionPhase {
        self.current().unwrap_or_else(|| SessionPhase::of(record))
    }

    pub fn current(&self) -> Option<SessionPhase> {
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the gate for completing `record`.
    ///
    /// Returns `Ok(None)` when this process is already completing something.
    pub fn try_begin_completion(
        &self,
        record: &SessionRecord,
    ) -> Result<Option<CompletionTicket<'_>>, TransitionError> {
        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Ok(None);
        }
        let phase = record.phase().apply(PhaseAction::Complete)?;
        *slot = Some(phase);
        Ok(Some(CompletionTicket { gate: self, phase }))
    }
}

#[derive(Debug)]
pub struct CompletionTicket<'a> {
    gate: &'a PhaseGate,
    phase: SessionPhase,
}

impl CompletionTicket<'_> {
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }
}

impl Drop for CompletionTicket<'_> {
    fn drop(&mut self) {
        let mut slot = self.gate.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionLength;

    fn running(is_break: bool) -> SessionRecord {
        SessionRecord::begin("s".into(), SessionLength::Fixed(5), is_break, 0)
    }

    #[test]
    fn valid_transitions() {
        let p = SessionPhase::Idle
            .apply(PhaseAction::Start { is_break: false })
            .unwrap();
        assert_eq!(p, SessionPhase::Running);
        let p = p.apply(PhaseAction::Pause).unwrap();
        assert_eq!(p, SessionPhase::Paused);
        let p = p.apply(PhaseAction::Resume { is_break: true }).unwrap();
        assert_eq!(p, SessionPhase::BreakRunning);
        let p = p.apply(PhaseAction::Complete).unwrap();
        assert_eq!(p, SessionPhase::BreakCompleting);
        assert_eq!(p.apply(PhaseAction::Finish).unwrap(), SessionPhase::Idle);
    }

    #[test]
    fn rejects_invalid_transitions() {
        assert!(SessionPhase::Idle.apply(PhaseAction::Pause).is_err());
        assert!(SessionPhase::Paused.apply(PhaseAction::Complete).is_err());
        assert!(SessionPhase::Completing.apply(PhaseAction::Stop).is_err());
        assert!(SessionPhase::Running
            .apply(PhaseAction::Start { is_break: false })
            .is_err());
    }

    #[test]
    fn gate_blocks_reentrant_completion() {
        let gate = PhaseGate::new();
        let record = running(false);
        let ticket = gate.try_begin_completion(&record).unwrap();
        assert!(ticket.is_some());
        assert_eq!(gate.effective(Some(&record)), SessionPhase::Completing);
        assert!(gate.try_begin_completion(&record).unwrap().is_none());
        drop(ticket);
        assert_eq!(gate.effective(Some(&record)), SessionPhase::Running);
        assert!(gate.try_begin_completion(&record).unwrap().is_some());
    }

    #[test]
    fn gate_tracks_break_completion() {
        let gate = PhaseGate::new();
        let ticket = gate.try_begin_completion(&running(true)).unwrap().unwrap();
        assert_eq!(ticket.phase(), SessionPhase::BreakCompleting);
    }

    #[test]
    fn phase_of_record() {
        assert_eq!(SessionPhase::of(None), SessionPhase::Idle);
        let mut r = running(false);
        r.is_active = false;
        assert_eq!(SessionPhase::of(Some(&r)), SessionPhase::Idle);
    }
}

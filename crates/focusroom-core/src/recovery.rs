//! Startup recovery of an interrupted session.
//!
//! Classifies whatever record survived a restart: nothing to do, a session
//! the user should confirm, or an overdue session that is completed right
//! away through the normal completion path.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::session::SessionRecord;
use crate::timer::{CompletionOutcome, SessionController, StopOptions, StopOutcome};

/// Time left (or spent) on a recovered session at the moment of recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoveredTime {
    Running { remaining_secs: u64 },
    Paused { remaining_secs: Option<u64>, elapsed_secs: u64 },
    OpenEnded { elapsed_secs: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// No session survived, or it could not be read.
    ColdStart,
    /// A live session survived; ask whether to resume or discard it.
    Prompt {
        record: SessionRecord,
        time: RecoveredTime,
    },
    /// The session came due while nothing was running.
    FastForwarded { completion: CompletionOutcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    Resume,
    Discard,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum RecoveryResolution {
    Resumed { record: SessionRecord },
    Discarded { stop: StopOutcome },
    /// The prompted session is no longer the active one.
    Gone,
}

pub struct RecoveryManager {
    controller: Arc<SessionController>,
}

impl RecoveryManager {
    pub fn new(controller: Arc<SessionController>) -> Self {
        Self { controller }
    }

    pub async fn run(&self) -> Result<RecoveryOutcome> {
        let Some(mut record) = self.controller.current().await? else {
            return Ok(RecoveryOutcome::ColdStart);
        };

        if !record.is_paused && !record.is_open_ended {
            match self.controller.complete_if_due().await? {
                CompletionOutcome::NoSession => return Ok(RecoveryOutcome::ColdStart),
                CompletionOutcome::NotDue { .. }
                | CompletionOutcome::Paused { .. }
                | CompletionOutcome::OpenEnded { .. } => {
                    // Re-read: the pass may have rebuilt a missing deadline.
                    match self.controller.current().await? {
                        Some(fresh) => record = fresh,
                        None => return Ok(RecoveryOutcome::ColdStart),
                    }
                }
                completion => {
                    info!(session_id = %record.id, "session came due while away");
                    return Ok(RecoveryOutcome::FastForwarded { completion });
                }
            }
        }

        let now = self.controller.now_ms();
        let elapsed_secs = record.running_secs_at(now);
        let time = if record.is_paused {
            RecoveredTime::Paused {
                remaining_secs: record.remaining_secs_at(now),
                elapsed_secs,
            }
        } else if record.is_open_ended {
            RecoveredTime::OpenEnded { elapsed_secs }
        } else {
            RecoveredTime::Running {
                remaining_secs: record.remaining_secs_at(now).unwrap_or(0),
            }
        };
        info!(session_id = %record.id, ?time, "recovered session");
        Ok(RecoveryOutcome::Prompt { record, time })
    }

    /// Apply the user's answer to a [`RecoveryOutcome::Prompt`]. Resuming
    /// keeps the record exactly as stored; discarding stops it without credit.
    pub async fn resolve(
        &self,
        session_id: &str,
        choice: RecoveryChoice,
    ) -> Result<RecoveryResolution> {
        match self.controller.current().await? {
            Some(record) if record.id == session_id => match choice {
                RecoveryChoice::Resume => Ok(RecoveryResolution::Resumed { record }),
                RecoveryChoice::Discard => {
                    let stop = self.controller.stop(StopOptions::discard()).await?;
                    Ok(RecoveryResolution::Discarded { stop })
                }
            },
            _ => Ok(RecoveryResolution::Gone),
        }
    }
}

//! Session transitions shared by every surface and by the scheduler.
//!
//! Every operation starts from a fresh read of the store. Nothing cached in
//! memory is trusted except the per-process [`PhaseGate`], which only ever
//! says "this process is finalizing a session right now".

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::collaborators::{Collaborators, NotificationKind, NotifyOptions, UsageDelta};
use crate::config::Config;
use crate::error::{CoreError, Result, StoreError, TransitionError};
use crate::events::Event;
use crate::session::{
    date_bucket, datetime_from_ms, minutes_from_secs, CompletedSessionEntry, EntryStatus,
    PhaseAction, PhaseGate, SessionLength, SessionPhase, SessionRecord, MAX_SESSION_MINUTES,
};
use crate::store::{Finalized, SessionStore, StoreChange, LAST_FOCUS_MINUTES_KEY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub length: SessionLength,
    pub is_break: bool,
    pub task_id: Option<String>,
    pub task_title: Option<String>,
    pub boredom_level: Option<u8>,
}

impl StartRequest {
    pub fn focus(minutes: u32) -> Self {
        Self::new(SessionLength::Fixed(minutes), false)
    }

    pub fn open_ended() -> Self {
        Self::new(SessionLength::OpenEnded, false)
    }

    pub fn break_of(minutes: u32) -> Self {
        Self::new(SessionLength::Fixed(minutes), true)
    }

    fn new(length: SessionLength, is_break: bool) -> Self {
        Self {
            length,
            is_break,
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

    fn validate(&self) -> Result<(), TransitionError> {
        if let SessionLength::Fixed(minutes) = self.length {
            if minutes == 0 || minutes > MAX_SESSION_MINUTES {
                return Err(TransitionError::InvalidDuration(minutes));
            }
        }
        if let Some(level) = self.boredom_level {
            if !(1..=5).contains(&level) {
                return Err(TransitionError::InvalidBoredomLevel(level));
            }
        }
        Ok(())
    }
}

/// Credit given for an early stop. Both flags are independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StopOptions {
    /// Add the elapsed minutes to daily usage.
    pub add_time: bool,
    /// Count a full session (entry status `completed`).
    pub count_as_completed: bool,
}

impl StopOptions {
    /// Stop without any credit.
    pub fn discard() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StopOutcome {
    NothingToStop,
    Stopped {
        /// Final state of the record, refreshed to the stop instant.
        record: SessionRecord,
        entry: Option<CompletedSessionEntry>,
        credited: UsageDelta,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CompletionOutcome {
    NoSession,
    Paused {
        session_id: String,
    },
    OpenEnded {
        session_id: String,
    },
    NotDue {
        session_id: String,
        due_in_ms: i64,
    },
    /// This process is already finalizing a session.
    AlreadyCompleting,
    /// Another writer removed the record first.
    AlreadyFinalized,
    Completed {
        session_id: String,
        was_break: bool,
        entry: Option<CompletedSessionEntry>,
        chained: Option<SessionRecord>,
    },
}

impl CompletionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CompletionOutcome::Completed { .. })
    }
}

pub struct SessionController {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    collaborators: Collaborators,
    config: Config,
    gate: PhaseGate,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
        config: Config,
    ) -> Self {
        Self {
            store,
            clock,
            collaborators,
            config,
            gate: PhaseGate::new(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.store.subscribe()
    }

    /// Fresh read of the active record. Missing, inactive and undecodable
    /// records all mean "no session".
    pub async fn current(&self) -> Result<Option<SessionRecord>> {
        match self.store.load_record().await {
            Ok(Some(record)) if record.is_active => Ok(Some(record)),
            Ok(_) => Ok(None),
            Err(StoreError::Corrupt { key, message }) => {
                warn!(%key, %message, "ignoring corrupt session record");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn phase(&self) -> Result<SessionPhase> {
        let record = self.current().await?;
        Ok(self.gate.effective(record.as_ref()))
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a session. The "no active session" rule is checked again when
    /// the record is written, so concurrent starts cannot both win.
    pub async fn start(&self, request: StartRequest) -> Result<SessionRecord> {
        if self.current().await?.is_some() {
            return Err(TransitionError::AlreadyActive.into());
        }
        self.gate.effective(None).apply(PhaseAction::Start {
            is_break: request.is_break,
        })?;
        self.begin(request).await
    }

    pub async fn pause(&self) -> Result<SessionRecord> {
        let mut record = self
            .current()
            .await?
            .ok_or(TransitionError::NoActiveSession)?;
        self.gate
            .effective(Some(&record))
            .apply(PhaseAction::Pause)?;

        let now = self.now_ms();
        record.pause(now)?;
        if !self.store.update_record(&record).await? {
            debug!(session_id = %record.id, "session ended before pause was written");
            return Err(TransitionError::NoActiveSession.into());
        }

        info!(session_id = %record.id, remaining = ?record.paused_remaining_seconds, "session paused");
        self.collaborators.overlay.broadcast(&Event::SessionPaused {
            session_id: record.id.clone(),
            remaining_secs: record.remaining_secs_at(now),
            at: datetime_from_ms(now),
        });
        Ok(record)
    }

    pub async fn resume(&self) -> Result<SessionRecord> {
        let mut record = self
            .current()
            .await?
            .ok_or(TransitionError::NoActiveSession)?;
        self.gate.effective(Some(&record)).apply(PhaseAction::Resume {
            is_break: record.is_break,
        })?;

        let now = self.now_ms();
        record.resume(now)?;
        if !self.store.update_record(&record).await? {
            debug!(session_id = %record.id, "session ended before resume was written");
            return Err(TransitionError::NoActiveSession.into());
        }

        info!(session_id = %record.id, end = ?record.end_timestamp, "session resumed");
        self.collaborators.overlay.broadcast(&Event::SessionResumed {
            session_id: record.id.clone(),
            remaining_secs: record.remaining_secs_at(now),
            at: datetime_from_ms(now),
        });
        Ok(record)
    }

    /// End the session early. Never chains into another session.
    pub async fn stop(&self, options: StopOptions) -> Result<StopOutcome> {
        let Some(mut record) = self.current().await? else {
            debug!("stop requested with no active session");
            return Ok(StopOutcome::NothingToStop);
        };
        self.gate.effective(Some(&record)).apply(PhaseAction::Stop)?;

        let now = self.now_ms();
        record.refresh(now);
        let running_secs = record.running_secs_at(now);
        let minutes = minutes_from_secs(running_secs);

        let (entry, credited) = if record.is_break {
            (None, UsageDelta::default())
        } else {
            let credited = UsageDelta {
                focus_minutes: if options.add_time { minutes } else { 0 },
                focus_sessions: u32::from(options.count_as_completed),
            };
            let status = if options.count_as_completed {
                EntryStatus::Completed
            } else {
                EntryStatus::Interrupted
            };
            let entry = (options.add_time || options.count_as_completed)
                .then(|| CompletedSessionEntry::from_record(&record, running_secs, now, status));
            (entry, credited)
        };

        let credited = match self.store.finalize_record(&record.id, entry.as_ref()).await? {
            Finalized::Missed => {
                debug!(session_id = %record.id, "session was finalized elsewhere before stop");
                return Ok(StopOutcome::NothingToStop);
            }
            Finalized::Removed { appended: false } if entry.is_some() => {
                warn!(session_id = %record.id, "session was already logged, not crediting again");
                UsageDelta::default()
            }
            Finalized::Removed { .. } => credited,
        };

        info!(
            session_id = %record.id,
            running_secs,
            add_time = options.add_time,
            count_as_completed = options.count_as_completed,
            "session stopped"
        );
        if !credited.is_empty() {
            self.record_usage(&date_bucket(datetime_from_ms(now)), credited)
                .await;
        }
        self.collaborators.overlay.broadcast(&Event::SessionStopped {
            session_id: record.id.clone(),
            is_break: record.is_break,
            status: entry.as_ref().map(|e| e.status),
            credited_minutes: credited.focus_minutes,
            at: datetime_from_ms(now),
        });

        Ok(StopOutcome::Stopped {
            record,
            entry,
            credited,
        })
    }

    /// The authoritative completion path. Safe to call any number of times;
    /// only a due session is finalized, and only once.
    pub async fn complete_if_due(&self) -> Result<CompletionOutcome> {
        let Some(mut record) = self.current().await? else {
            return Ok(CompletionOutcome::NoSession);
        };
        if record.is_paused {
            return Ok(CompletionOutcome::Paused {
                session_id: record.id,
            });
        }
        if record.is_open_ended {
            return Ok(CompletionOutcome::OpenEnded {
                session_id: record.id,
            });
        }

        let now = self.now_ms();
        match record.ms_until_due(now) {
            Some(ms) if ms > 0 => {
                return Ok(CompletionOutcome::NotDue {
                    session_id: record.id,
                    due_in_ms: ms,
                })
            }
            Some(_) => {}
            None => {
                // Running fixed session without a deadline: rebuild it.
                let due_in_ms = record.remaining_seconds as i64 * 1000;
                record.end_timestamp = Some(now + due_in_ms);
                warn!(session_id = %record.id, "restoring missing deadline");
                if !self.store.update_record(&record).await? {
                    return Ok(CompletionOutcome::AlreadyFinalized);
                }
                return Ok(CompletionOutcome::NotDue {
                    session_id: record.id,
                    due_in_ms,
                });
            }
        }

        let Some(ticket) = self.gate.try_begin_completion(&record)? else {
            debug!(session_id = %record.id, "completion already in flight");
            return Ok(CompletionOutcome::AlreadyCompleting);
        };
        debug_assert!(ticket.phase().is_completing());
        let outcome = self.finalize_due(&record, now).await;
        let settled = ticket.phase().apply(PhaseAction::Finish)?;
        drop(ticket);
        debug!(session_id = %record.id, phase = %settled, "completion pass finished");
        outcome
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn begin(&self, request: StartRequest) -> Result<SessionRecord> {
        request.validate()?;

        let now = self.now_ms();
        let record = SessionRecord::begin(
            Uuid::new_v4().to_string(),
            request.length,
            request.is_break,
            now,
        )
        .with_task(request.task_id, request.task_title)
        .with_boredom(request.boredom_level);

        if !self.store.create_record(&record).await? {
            return Err(TransitionError::AlreadyActive.into());
        }

        if let (false, SessionLength::Fixed(minutes)) = (record.is_break, request.length) {
            if let Err(e) = self
                .store
                .set_value(LAST_FOCUS_MINUTES_KEY, &minutes.to_string())
                .await
            {
                warn!(error = %e, "failed to remember focus length");
            }
        }

        info!(
            session_id = %record.id,
            is_break = record.is_break,
            minutes = ?record.selected_minutes,
            "session started"
        );
        self.collaborators.overlay.broadcast(&Event::SessionStarted {
            session_id: record.id.clone(),
            is_break: record.is_break,
            planned_minutes: record.selected_minutes,
            at: datetime_from_ms(now),
        });
        Ok(record)
    }

    async fn finalize_due(&self, record: &SessionRecord, now: i64) -> Result<CompletionOutcome> {
        let ended_at = record.end_timestamp.unwrap_or(now).min(now);
        let planned_secs = record.planned_secs().unwrap_or(0);
        let entry = (!record.is_break).then(|| {
            CompletedSessionEntry::from_record(record, planned_secs, ended_at, EntryStatus::Completed)
        });

        match self.store.finalize_record(&record.id, entry.as_ref()).await? {
            Finalized::Missed => {
                debug!(session_id = %record.id, "session already finalized");
                return Ok(CompletionOutcome::AlreadyFinalized);
            }
            // A stale write brought back a session that was already logged.
            Finalized::Removed { appended: false } if entry.is_some() => {
                warn!(session_id = %record.id, "dropping resurrected session without side effects");
                return Ok(CompletionOutcome::AlreadyFinalized);
            }
            Finalized::Removed { .. } => {}
        }
        info!(session_id = %record.id, is_break = record.is_break, "session completed");

        if let Some(entry) = &entry {
            self.record_usage(
                &entry.date,
                UsageDelta {
                    focus_minutes: entry.actual_duration_minutes,
                    focus_sessions: 1,
                },
            )
            .await;
            self.collaborators.credit.award_completion_credit(entry);
        }
        self.notify_completion(record);
        self.collaborators.overlay.broadcast(&Event::SessionCompleted {
            session_id: record.id.clone(),
            is_break: record.is_break,
            actual_minutes: minutes_from_secs(planned_secs),
            at: datetime_from_ms(now),
        });

        let chained = match self.chain_after(record).await {
            Ok(chained) => chained,
            Err(e) => {
                warn!(error = %e, "failed to start chained session");
                None
            }
        };

        Ok(CompletionOutcome::Completed {
            session_id: record.id.clone(),
            was_break: record.is_break,
            entry,
            chained,
        })
    }

    async fn chain_after(&self, finished: &SessionRecord) -> Result<Option<SessionRecord>> {
        let timer = &self.config.timer;
        let request = if !finished.is_break && timer.auto_start_breaks {
            StartRequest::break_of(timer.break_minutes)
        } else if finished.is_break && timer.auto_start_next_session {
            StartRequest::focus(self.last_focus_minutes().await)
        } else {
            return Ok(None);
        };

        let minutes = request.length.minutes().unwrap_or(0);
        let record = match self.begin(request).await {
            Ok(record) => record,
            Err(CoreError::Transition(TransitionError::AlreadyActive)) => {
                debug!("another session is already active, not chaining");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let at = datetime_from_ms(record.started_at);
        let event = if record.is_break {
            Event::BreakChained {
                session_id: record.id.clone(),
                break_minutes: minutes,
                at,
            }
        } else {
            Event::FocusChained {
                session_id: record.id.clone(),
                focus_minutes: minutes,
                at,
            }
        };
        self.collaborators.overlay.broadcast(&event);
        Ok(Some(record))
    }

    async fn last_focus_minutes(&self) -> u32 {
        let fallback = self.config.timer.default_focus_minutes;
        match self.store.get_value(LAST_FOCUS_MINUTES_KEY).await {
            Ok(Some(raw)) => raw.parse().unwrap_or(fallback),
            Ok(None) => fallback,
            Err(e) => {
                warn!(error = %e, "failed to read last focus length");
                fallback
            }
        }
    }

    fn notify_completion(&self, record: &SessionRecord) {
        let notifications = &self.config.notifications;
        if !notifications.enabled {
            return;
        }

        let (kind, title, message, dedupe_key) = if record.is_break {
            (
                NotificationKind::BreakComplete,
                "Break over",
                "Time to get back to it.".to_string(),
                format!("break-complete-{}", record.id),
            )
        } else {
            let minutes = record.selected_minutes.unwrap_or(0);
            (
                NotificationKind::SessionComplete,
                "Focus session complete",
                format!("{minutes} minutes of focus logged."),
                format!("session-complete-{}", record.id),
            )
        };

        self.collaborators.notifier.notify(
            kind,
            title,
            &message,
            NotifyOptions {
                dedupe_key,
                require_interaction: notifications.require_interaction,
            },
        );
    }

    /// Usage is secondary bookkeeping: failures are logged, never raised.
    async fn record_usage(&self, date: &str, delta: UsageDelta) {
        if let Err(e) = self.collaborators.usage.add_daily_usage(date, delta).await {
            warn!(error = %e, %date, "failed to record daily usage");
        }
    }
}

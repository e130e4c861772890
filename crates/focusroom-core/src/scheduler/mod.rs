//! Durable completion scheduler.
//!
//! Keeps one wake alarm aligned with the active record's deadline and, when
//! it fires, runs the authoritative completion path. The alarm is always
//! derived from the store, so a lost or duplicated wake is harmless: a
//! re-sync arms it again and a second completion finds nothing to do.

mod wake;

pub use wake::{
    scheduler_channel, ManualWakeTimer, SchedulerHandle, SchedulerInbox, SchedulerSignal,
    TokioWakeTimer, WakeTimer,
};

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::session::SessionRecord;
use crate::store::StoreChange;
use crate::timer::{CompletionOutcome, SessionController};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SchedulerAction {
    Armed { session_id: String, at_ms: i64 },
    Disarmed,
    Completed { completion: CompletionOutcome },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "wake", rename_all = "snake_case")]
pub enum WakeOutcome {
    /// Nothing running with a deadline.
    Ignored,
    /// Fired early; armed again for the same deadline.
    Rearmed { at_ms: i64 },
    Completed { completion: CompletionOutcome },
}

pub struct CompletionScheduler {
    controller: Arc<SessionController>,
    wake: Arc<dyn WakeTimer>,
}

impl CompletionScheduler {
    pub fn new(controller: Arc<SessionController>, wake: Arc<dyn WakeTimer>) -> Self {
        Self { controller, wake }
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    pub fn wake_timer(&self) -> &Arc<dyn WakeTimer> {
        &self.wake
    }

    /// Align the alarm with the store. A session that is already due is
    /// completed on the spot.
    pub async fn sync(&self) -> Result<SchedulerAction> {
        let mut current = self.controller.current().await?;
        if current
            .as_ref()
            .is_some_and(|r| r.is_running() && !r.is_open_ended && r.end_timestamp.is_none())
        {
            // The completion path rebuilds a lost deadline.
            self.controller.complete_if_due().await?;
            current = self.controller.current().await?;
        }

        let now = self.controller.now_ms();
        match current {
            Some(record) if has_deadline(&record) && record.is_due_at(now) => {
                let completion = self.complete().await?;
                Ok(SchedulerAction::Completed { completion })
            }
            Some(record) if has_deadline(&record) => {
                let at_ms = self.arm_for(&record, now);
                Ok(SchedulerAction::Armed {
                    session_id: record.id,
                    at_ms,
                })
            }
            _ => {
                self.wake.disarm();
                Ok(SchedulerAction::Disarmed)
            }
        }
    }

    /// Handle a fired alarm.
    pub async fn on_wake(&self) -> Result<WakeOutcome> {
        let now = self.controller.now_ms();
        let Some(record) = self
            .controller
            .current()
            .await?
            .filter(has_deadline)
        else {
            debug!("wake with nothing running");
            self.wake.disarm();
            return Ok(WakeOutcome::Ignored);
        };

        if !record.is_due_at(now) {
            let at_ms = self.arm_for(&record, now);
            debug!(session_id = %record.id, at_ms, "early wake, re-armed");
            return Ok(WakeOutcome::Rearmed { at_ms });
        }

        let completion = self.complete().await?;
        Ok(WakeOutcome::Completed { completion })
    }

    /// Startup pass: complete anything that came due while nothing was
    /// running, otherwise arm for the live deadline.
    pub async fn restore(&self) -> Result<SchedulerAction> {
        let action = self.sync().await?;
        info!(?action, "scheduler restored");
        Ok(action)
    }

    /// Serve wake and sync signals, store changes, and the optional periodic
    /// reconcile until `shutdown` flips or every signal source closes.
    pub async fn run(
        self: Arc<Self>,
        mut inbox: SchedulerInbox,
        mut changes: broadcast::Receiver<StoreChange>,
        reconcile_every: Option<Duration>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if let Err(e) = self.restore().await {
            warn!(error = %e, "scheduler restore failed");
        }

        let mut reconcile = reconcile_every.map(|period| {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            tokio::select! {
                signal = inbox.recv() => match signal {
                    Some(SchedulerSignal::Wake) => log_result("wake", self.on_wake().await),
                    Some(SchedulerSignal::Sync) => log_result("sync", self.sync().await),
                    None => break,
                },
                change = changes.recv() => match change {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        log_result("change", self.sync().await)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = next_tick(&mut reconcile) => log_result("reconcile", self.sync().await),
                _ = shutdown.changed() => break,
            }
        }

        self.wake.disarm();
        info!("scheduler stopped");
    }

    async fn complete(&self) -> Result<CompletionOutcome> {
        let completion = self.controller.complete_if_due().await?;
        self.wake.disarm();
        // A chained session needs its own alarm.
        if let Some(next) = self.controller.current().await?.filter(has_deadline) {
            let now = self.controller.now_ms();
            self.arm_for(&next, now);
        }
        Ok(completion)
    }

    /// Never arm closer than the safety margin.
    fn arm_for(&self, record: &SessionRecord, now: i64) -> i64 {
        let margin = i64::try_from(self.controller.config().timer.wake_margin_ms).unwrap_or(0);
        let end = record.end_timestamp.unwrap_or(now);
        let at_ms = end.max(now + margin);
        self.wake.arm(at_ms);
        at_ms
    }
}

fn has_deadline(record: &SessionRecord) -> bool {
    record.is_running() && !record.is_open_ended && record.end_timestamp.is_some()
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn log_result<T: std::fmt::Debug>(source: &str, result: Result<T>) {
    match result {
        Ok(outcome) => debug!(source, ?outcome, "scheduler pass"),
        Err(e) => warn!(source, error = %e, "scheduler pass failed"),
    }
}

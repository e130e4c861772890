//! Cosmetic countdown published on a watch channel.
//!
//! The ticker only ever reads the timestamps of the record it follows; it
//! never writes and never decides completion.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::clock::Clock;
use crate::session::SessionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewStatus {
    Idle,
    Running,
    Paused,
}

/// What a surface renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    pub status: ViewStatus,
    pub session_id: Option<String>,
    pub is_break: bool,
    pub is_open_ended: bool,
    /// `None` for open-ended sessions.
    pub remaining_secs: Option<u64>,
    pub elapsed_secs: u64,
    /// Remaining time for fixed sessions, elapsed time for open-ended ones.
    pub clock: String,
    pub task_title: Option<String>,
}

impl TimerView {
    pub fn idle() -> Self {
        Self {
            status: ViewStatus::Idle,
            session_id: None,
            is_break: false,
            is_open_ended: false,
            remaining_secs: None,
            elapsed_secs: 0,
            clock: format_clock(0),
            task_title: None,
        }
    }

    pub fn from_record(record: &SessionRecord, now_ms: i64) -> Self {
        let remaining_secs = record.remaining_secs_at(now_ms);
        let elapsed_secs = record.running_secs_at(now_ms);
        let status = if record.is_paused {
            ViewStatus::Paused
        } else {
            ViewStatus::Running
        };

        Self {
            status,
            session_id: Some(record.id.clone()),
            is_break: record.is_break,
            is_open_ended: record.is_open_ended,
            remaining_secs,
            elapsed_secs,
            clock: format_clock(remaining_secs.unwrap_or(elapsed_secs)),
            task_title: record.task_title.clone(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == ViewStatus::Idle
    }
}

/// `MM:SS`, or `H:MM:SS` from one hour up.
pub fn format_clock(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

pub struct DisplayTicker {
    clock: Arc<dyn Clock>,
    period: Duration,
    tx: Arc<watch::Sender<TimerView>>,
    task: Mutex<Option<JoinHandle<()>>>,
    ticks: Arc<AtomicU64>,
}

impl DisplayTicker {
    pub fn new(clock: Arc<dyn Clock>, period: Duration) -> Self {
        let (tx, _rx) = watch::channel(TimerView::idle());
        Self {
            clock,
            period,
            tx: Arc::new(tx),
            task: Mutex::new(None),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerView> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> TimerView {
        self.tx.borrow().clone()
    }

    /// Render `record` now and, if it is running, keep rendering it every
    /// period. Replaces whatever was followed before.
    pub fn follow(&self, record: &SessionRecord) {
        self.cancel();
        self.tx
            .send_replace(TimerView::from_record(record, self.clock.now_ms()));
        if !record.is_running() {
            return;
        }

        let record = record.clone();
        let tx = Arc::clone(&self.tx);
        let clock = Arc::clone(&self.clock);
        let ticks = Arc::clone(&self.ticks);
        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                ticks.fetch_add(1, Ordering::Relaxed);
                tx.send_replace(TimerView::from_record(&record, clock.now_ms()));
            }
        });
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stop ticking and show the idle view.
    pub fn halt(&self) {
        self.cancel();
        self.tx.send_if_modified(|view| {
            if view.is_idle() {
                false
            } else {
                *view = TimerView::idle();
                true
            }
        });
    }

    pub fn is_ticking(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Ticks published since creation.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn cancel(&self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}

impl Drop for DisplayTicker {
    fn drop(&mut self) {
        self.cancel();
    }
}

//! Wake timers and the signal channel that feeds the scheduler loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::clock::Clock;

/// A one-shot alarm at an absolute instant. Arming replaces any previous
/// alarm; firing delivers [`SchedulerSignal::Wake`].
pub trait WakeTimer: Send + Sync {
    fn arm(&self, at_ms: i64);
    fn disarm(&self);
    fn armed_at(&self) -> Option<i64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerSignal {
    /// Re-derive the alarm from the store.
    Sync,
    /// The alarm fired.
    Wake,
}

#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerSignal>,
}

#[derive(Debug)]
pub struct SchedulerInbox {
    rx: mpsc::UnboundedReceiver<SchedulerSignal>,
}

pub fn scheduler_channel() -> (SchedulerHandle, SchedulerInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SchedulerHandle { tx }, SchedulerInbox { rx })
}

impl SchedulerHandle {
    pub fn request_sync(&self) {
        self.send(SchedulerSignal::Sync);
    }

    pub fn wake(&self) {
        self.send(SchedulerSignal::Wake);
    }

    fn send(&self, signal: SchedulerSignal) {
        if self.tx.send(signal).is_err() {
            debug!(?signal, "scheduler is not running");
        }
    }
}

impl SchedulerInbox {
    pub async fn recv(&mut self) -> Option<SchedulerSignal> {
        self.rx.recv().await
    }
}

struct Armed {
    at_ms: i64,
    task: JoinHandle<()>,
}

/// Wake timer backed by a tokio sleep task.
///
/// The deadline is converted to a delay when armed. A host that can be
/// suspended should also run the periodic reconcile so a late wake is
/// caught up.
pub struct TokioWakeTimer {
    clock: Arc<dyn Clock>,
    handle: SchedulerHandle,
    slot: Mutex<Option<Armed>>,
}

impl TokioWakeTimer {
    pub fn new(clock: Arc<dyn Clock>, handle: SchedulerHandle) -> Self {
        Self {
            clock,
            handle,
            slot: Mutex::new(None),
        }
    }
}

impl WakeTimer for TokioWakeTimer {
    fn arm(&self, at_ms: i64) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(armed) = slot.as_ref() {
            if armed.at_ms == at_ms && !armed.task.is_finished() {
                return;
            }
        }
        if let Some(old) = slot.take() {
            old.task.abort();
        }

        let delay = u64::try_from(at_ms - self.clock.now_ms()).unwrap_or(0);
        let handle = self.handle.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            handle.wake();
        });
        trace!(at_ms, delay_ms = delay, "wake timer armed");
        *slot = Some(Armed { at_ms, task });
    }

    fn disarm(&self) {
        if let Some(old) = self.slot.lock().unwrap_or_else(|e| e.into_inner()).take() {
            old.task.abort();
            trace!(at_ms = old.at_ms, "wake timer disarmed");
        }
    }

    fn armed_at(&self) -> Option<i64> {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|armed| armed.at_ms)
    }
}

impl Drop for TokioWakeTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Wake timer that only records what it was asked to do. Tests fire it by
/// calling the scheduler's `on_wake` directly.
#[derive(Debug, Default)]
pub struct ManualWakeTimer {
    armed: Mutex<Option<i64>>,
    arms: AtomicUsize,
    disarms: AtomicUsize,
}

impl ManualWakeTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm_count(&self) -> usize {
        self.arms.load(Ordering::Relaxed)
    }

    pub fn disarm_count(&self) -> usize {
        self.disarms.load(Ordering::Relaxed)
    }

    /// Whether an armed alarm would have fired by `now_ms`.
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.armed_at().is_some_and(|at| at <= now_ms)
    }
}

impl WakeTimer for ManualWakeTimer {
    fn arm(&self, at_ms: i64) {
        *self.armed.lock().unwrap_or_else(|e| e.into_inner()) = Some(at_ms);
        self.arms.fetch_add(1, Ordering::Relaxed);
    }

    fn disarm(&self) {
        *self.armed.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.disarms.fetch_add(1, Ordering::Relaxed);
    }

    fn armed_at(&self) -> Option<i64> {
        *self.armed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test(start_paused = true)]
    async fn tokio_timer_delivers_wake() {
        let clock = Arc::new(ManualClock::new(1_000));
        let (handle, mut inbox) = scheduler_channel();
        let timer = TokioWakeTimer::new(clock, handle);

        timer.arm(6_000);
        assert_eq!(timer.armed_at(), Some(6_000));
        tokio::time::sleep(Duration::from_millis(5_001)).await;
        assert_eq!(inbox.recv().await, Some(SchedulerSignal::Wake));
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_timer_stays_silent() {
        let clock = Arc::new(ManualClock::new(0));
        let (handle, mut inbox) = scheduler_channel();
        let timer = TokioWakeTimer::new(clock, handle.clone());

        timer.arm(1_000);
        timer.disarm();
        assert_eq!(timer.armed_at(), None);
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.request_sync();
        assert_eq!(inbox.recv().await, Some(SchedulerSignal::Sync));
    }

    #[test]
    fn manual_timer_tracks_calls() {
        let timer = ManualWakeTimer::new();
        timer.arm(10);
        timer.arm(20);
        assert!(!timer.is_due(19));
        assert!(timer.is_due(20));
        timer.disarm();
        assert_eq!(timer.arm_count(), 2);
        assert_eq!(timer.disarm_count(), 1);
        assert_eq!(timer.armed_at(), None);
    }
}

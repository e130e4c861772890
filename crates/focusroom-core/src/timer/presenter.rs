//! Per-surface timer presenter.
//!
//! A surface (CLI, tray, overlay) owns one presenter. It forwards commands to
//! the shared [`SessionController`], keeps a [`DisplayTicker`] following the
//! stored record, and pokes the scheduler after every local write.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::controller::{SessionController, StartRequest, StopOptions, StopOutcome};
use super::display::{DisplayTicker, TimerView};
use crate::error::Result;
use crate::recovery::{RecoveryChoice, RecoveryManager, RecoveryOutcome, RecoveryResolution};
use crate::scheduler::SchedulerHandle;
use crate::session::SessionRecord;

pub struct TimerPresenter {
    controller: Arc<SessionController>,
    scheduler: Option<SchedulerHandle>,
    display: Arc<DisplayTicker>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl TimerPresenter {
    pub fn new(controller: Arc<SessionController>, scheduler: Option<SchedulerHandle>) -> Self {
        let period = Duration::from_millis(controller.config().timer.display_tick_ms.max(1));
        let display = Arc::new(DisplayTicker::new(Arc::clone(controller.clock()), period));
        Self {
            controller,
            scheduler,
            display,
            watcher: Mutex::new(None),
        }
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    pub fn view(&self) -> watch::Receiver<TimerView> {
        self.display.subscribe()
    }

    pub fn snapshot(&self) -> TimerView {
        self.display.current()
    }

    pub fn is_ticking(&self) -> bool {
        self.display.is_ticking()
    }

    pub fn tick_count(&self) -> u64 {
        self.display.tick_count()
    }

    pub async fn start(&self, request: StartRequest) -> Result<SessionRecord> {
        let record = self.controller.start(request).await?;
        self.display.follow(&record);
        self.signal();
        Ok(record)
    }

    pub async fn pause(&self) -> Result<SessionRecord> {
        let record = self.controller.pause().await?;
        self.display.follow(&record);
        self.signal();
        Ok(record)
    }

    pub async fn resume(&self) -> Result<SessionRecord> {
        let record = self.controller.resume().await?;
        self.display.follow(&record);
        self.signal();
        Ok(record)
    }

    pub async fn stop(&self, options: StopOptions) -> Result<StopOutcome> {
        let outcome = self.controller.stop(options).await?;
        self.display.halt();
        self.signal();
        Ok(outcome)
    }

    /// Re-render from a fresh read of the store.
    pub async fn refresh(&self) -> Result<()> {
        reconcile(&self.controller, &self.display).await
    }

    /// Follow the store: reconcile now and again on every change, whoever
    /// made it.
    pub async fn attach(&self) -> Result<()> {
        let mut changes = self.controller.subscribe();
        self.refresh().await?;

        let controller = Arc::clone(&self.controller);
        let display = Arc::clone(&self.display);
        let handle = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        if let Err(e) = reconcile(&controller, &display).await {
                            warn!(error = %e, "failed to reconcile timer view");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        if let Some(old) = self
            .watcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle)
        {
            old.abort();
        }
        Ok(())
    }

    pub fn detach(&self) {
        if let Some(handle) = self.watcher.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        self.display.halt();
    }

    pub async fn recover(&self) -> Result<RecoveryOutcome> {
        let outcome = RecoveryManager::new(Arc::clone(&self.controller))
            .run()
            .await?;
        match &outcome {
            RecoveryOutcome::Prompt { record, .. } => self.display.follow(record),
            RecoveryOutcome::FastForwarded { .. } => {
                self.refresh().await?;
                self.signal();
            }
            RecoveryOutcome::ColdStart => self.display.halt(),
        }
        Ok(outcome)
    }

    pub async fn resolve_recovery(
        &self,
        session_id: &str,
        choice: RecoveryChoice,
    ) -> Result<RecoveryResolution> {
        let resolution = RecoveryManager::new(Arc::clone(&self.controller))
            .resolve(session_id, choice)
            .await?;
        self.refresh().await?;
        self.signal();
        Ok(resolution)
    }

    fn signal(&self) {
        match &self.scheduler {
            Some(handle) => handle.request_sync(),
            None => debug!("no scheduler attached to presenter"),
        }
    }
}

impl Drop for TimerPresenter {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}

async fn reconcile(controller: &SessionController, display: &DisplayTicker) -> Result<()> {
    match controller.current().await? {
        Some(record) => display.follow(&record),
        None => display.halt(),
    }
    Ok(())
}

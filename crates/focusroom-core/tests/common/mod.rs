//! Shared harness for the session engine integration tests.
//!
//! Wires a controller, scheduler and presenter over an in-memory store, a
//! manual clock and a manual wake timer, with collaborators that record
//! every call.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use focusroom_core::collaborators::{
    Collaborators, CreditAwarder, NotificationKind, Notifier, NotifyOptions, OverlayBroadcaster,
    UsageDelta, UsageRecorder,
};
use focusroom_core::{
    CompletedSessionEntry, CompletionScheduler, Config, Event, Finalized, ManualClock,
    ManualWakeTimer, MemoryStore, RecoveryManager, SessionController, SessionRecord, SessionStore,
    StoreChange, StoreError, TimerPresenter,
};
use tokio::sync::broadcast;

/// 2024-03-01T09:00:00Z
pub const T0: i64 = 1_709_283_600_000;
pub const TODAY: &str = "2024-03-01";

// ============================================================================
// Recording collaborators
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub options: NotifyOptions,
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub credits: Mutex<Vec<CompletedSessionEntry>>,
    pub notifications: Mutex<Vec<Notification>>,
    pub events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn credits(&self) -> Vec<CompletedSessionEntry> {
        self.credits.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl CreditAwarder for Recorder {
    fn award_completion_credit(&self, summary: &CompletedSessionEntry) {
        self.credits.lock().unwrap().push(summary.clone());
    }
}

impl Notifier for Recorder {
    fn notify(&self, kind: NotificationKind, title: &str, message: &str, options: NotifyOptions) {
        self.notifications.lock().unwrap().push(Notification {
            kind,
            title: title.to_string(),
            message: message.to_string(),
            options,
        });
    }
}

impl OverlayBroadcaster for Recorder {
    fn broadcast(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Usage recorder whose backing store is always down.
#[derive(Debug, Default)]
pub struct FailingUsage {
    pub attempts: Mutex<u32>,
}

#[async_trait]
impl UsageRecorder for FailingUsage {
    async fn add_daily_usage(&self, _date: &str, _delta: UsageDelta) -> Result<(), StoreError> {
        *self.attempts.lock().unwrap() += 1;
        Err(StoreError::Locked)
    }
}

// ============================================================================
// Interleaving store
// ============================================================================

/// Shares a [`MemoryStore`] but yields to the scheduler after every record
/// read, so a joined task gets to act between another task's read and write.
pub struct YieldingStore {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl SessionStore for YieldingStore {
    async fn load_record(&self) -> Result<Option<SessionRecord>, StoreError> {
        let record = self.inner.load_record().await;
        tokio::task::yield_now().await;
        record
    }

    async fn save_record(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.inner.save_record(record).await
    }

    async fn create_record(&self, record: &SessionRecord) -> Result<bool, StoreError> {
        self.inner.create_record(record).await
    }

    async fn update_record(&self, record: &SessionRecord) -> Result<bool, StoreError> {
        self.inner.update_record(record).await
    }

    async fn remove_record(&self) -> Result<Option<SessionRecord>, StoreError> {
        self.inner.remove_record().await
    }

    async fn finalize_record(
        &self,
        session_id: &str,
        entry: Option<&CompletedSessionEntry>,
    ) -> Result<Finalized, StoreError> {
        self.inner.finalize_record(session_id, entry).await
    }

    async fn entries(&self) -> Result<Vec<CompletedSessionEntry>, StoreError> {
        self.inner.entries().await
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_value(key).await
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set_value(key, value).await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.subscribe()
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub recorder: Arc<Recorder>,
    pub wake: Arc<ManualWakeTimer>,
    pub controller: Arc<SessionController>,
    pub scheduler: CompletionScheduler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::build(config, Arc::clone(&store), store)
    }

    pub fn with_usage(usage: Arc<dyn UsageRecorder>) -> Self {
        Self::build(Config::default(), Arc::new(MemoryStore::new()), usage)
    }

    /// Second controller over the same store and clock, as another process
    /// (or another surface with its own gate) would have.
    pub fn sibling(&self) -> Arc<SessionController> {
        Arc::new(SessionController::new(
            self.store.clone(),
            self.clock.clone(),
            self.collaborators(self.store.clone()),
            self.controller.config().clone(),
        ))
    }

    /// Like [`sibling`](Self::sibling), but every record read yields first.
    pub fn yielding_sibling(&self) -> Arc<SessionController> {
        let store = YieldingStore {
            inner: Arc::clone(&self.store),
        };
        Arc::new(SessionController::new(
            Arc::new(store),
            self.clock.clone(),
            self.collaborators(self.store.clone()),
            self.controller.config().clone(),
        ))
    }

    pub fn presenter(&self) -> TimerPresenter {
        TimerPresenter::new(Arc::clone(&self.controller), None)
    }

    pub fn recovery(&self) -> RecoveryManager {
        RecoveryManager::new(Arc::clone(&self.controller))
    }

    pub async fn usage_today(&self) -> UsageDelta {
        self.store.usage_for(TODAY).await
    }

    pub async fn entries(&self) -> Vec<CompletedSessionEntry> {
        self.store.entries().await.unwrap()
    }

    fn build(config: Config, store: Arc<MemoryStore>, usage: Arc<dyn UsageRecorder>) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let recorder = Arc::new(Recorder::default());
        let wake = Arc::new(ManualWakeTimer::new());
        let collaborators = Collaborators {
            credit: recorder.clone(),
            notifier: recorder.clone(),
            overlay: recorder.clone(),
            usage,
        };
        let controller = Arc::new(SessionController::new(
            store.clone(),
            clock.clone(),
            collaborators,
            config,
        ));
        let scheduler = CompletionScheduler::new(Arc::clone(&controller), wake.clone());
        Self {
            store,
            clock,
            recorder,
            wake,
            controller,
            scheduler,
        }
    }

    fn collaborators(&self, usage: Arc<dyn UsageRecorder>) -> Collaborators {
        Collaborators {
            credit: self.recorder.clone(),
            notifier: self.recorder.clone(),
            overlay: self.recorder.clone(),
            usage,
        }
    }
}

pub fn chaining_config(auto_break: bool, auto_focus: bool) -> Config {
    let mut config = Config::default();
    config.timer.auto_start_breaks = auto_break;
    config.timer.auto_start_next_session = auto_focus;
    config
}

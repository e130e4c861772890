//! # Focusroom Core Library
//!
//! Timed focus and break sessions that survive process suspension and
//! restarts. The active session lives in a durable store as timestamps; every
//! surface and the background scheduler derive their decisions from a fresh
//! read of it.
//!
//! ## Architecture
//!
//! - **Session**: the persisted record, the completed-session log and the
//!   phase state machine
//! - **Store**: durable record storage with a change broadcast (SQLite or
//!   in-memory)
//! - **Timer**: the shared transition engine plus per-surface presenters
//! - **Scheduler**: a wake alarm that performs authoritative completion
//! - **Recovery**: classification of a session found at startup
//!
//! ## Key Components
//!
//! - [`SessionController`]: start, pause, resume, stop and completion
//! - [`CompletionScheduler`]: alarm handling and periodic reconcile
//! - [`TimerPresenter`]: what a surface drives and renders
//! - [`RecoveryManager`]: startup recovery
//! - [`Config`]: application configuration management

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod recovery;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    Collaborators, CreditAwarder, LogNotifier, LogOverlay, NotificationKind, Notifier,
    NotifyOptions, OverlayBroadcaster, UsageDelta, UsageRecorder,
};
pub use config::{Config, NotificationsConfig, TimerConfig};
pub use error::{ConfigError, CoreError, Result, StoreError, TransitionError};
pub use events::Event;
pub use recovery::{
    RecoveredTime, RecoveryChoice, RecoveryManager, RecoveryOutcome, RecoveryResolution,
};
pub use scheduler::{
    scheduler_channel, CompletionScheduler, ManualWakeTimer, SchedulerAction, SchedulerHandle,
    SchedulerInbox, TokioWakeTimer, WakeOutcome, WakeTimer,
};
pub use session::{
    CompletedSessionEntry, EntryStatus, SessionKind, SessionLength, SessionPhase, SessionRecord,
};
pub use store::{data_dir, Finalized, MemoryStore, SessionStore, SqliteStore, StoreChange};
pub use timer::{
    CompletionOutcome, SessionController, StartRequest, StopOptions, StopOutcome, TimerPresenter,
    TimerView, ViewStatus,
};

//! Interfaces to the systems the session engine drives but does not own.
//!
//! XP awarding, notifications, overlay toggling and aggregate usage all live
//! elsewhere. The engine calls them through these traits; the defaults do
//! nothing or log through `tracing`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::StoreError;
use crate::events::Event;
use crate::session::CompletedSessionEntry;

pub trait CreditAwarder: Send + Sync {
    /// Called once per authoritatively completed focus session.
    fn award_completion_credit(&self, summary: &CompletedSessionEntry);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SessionComplete,
    BreakComplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyOptions {
    /// Derived from the session id so a repeated completion cannot alert twice.
    pub dedupe_key: String,
    pub require_interaction: bool,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NotificationKind, title: &str, message: &str, options: NotifyOptions);
}

pub trait OverlayBroadcaster: Send + Sync {
    /// Fire-and-forget: tell every open surface a session started or ended.
    fn broadcast(&self, event: &Event);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDelta {
    pub focus_minutes: u32,
    pub focus_sessions: u32,
}

impl UsageDelta {
    pub fn is_empty(&self) -> bool {
        self.focus_minutes == 0 && self.focus_sessions == 0
    }
}

#[async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn add_daily_usage(&self, date: &str, delta: UsageDelta) -> Result<(), StoreError>;
}

/// The full set of collaborators handed to a controller.
#[derive(Clone)]
pub struct Collaborators {
    pub credit: Arc<dyn CreditAwarder>,
    pub notifier: Arc<dyn Notifier>,
    pub overlay: Arc<dyn OverlayBroadcaster>,
    pub usage: Arc<dyn UsageRecorder>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            credit: Arc::new(Noop),
            notifier: Arc::new(LogNotifier),
            overlay: Arc::new(LogOverlay),
            usage: Arc::new(Noop),
        }
    }
}

impl Collaborators {
    pub fn with_usage(mut self, usage: Arc<dyn UsageRecorder>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_overlay(mut self, overlay: Arc<dyn OverlayBroadcaster>) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn with_credit(mut self, credit: Arc<dyn CreditAwarder>) -> Self {
        self.credit = credit;
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl CreditAwarder for Noop {
    fn award_completion_credit(&self, _summary: &CompletedSessionEntry) {}
}

impl Notifier for Noop {
    fn notify(&self, _kind: NotificationKind, _title: &str, _message: &str, _options: NotifyOptions) {}
}

impl OverlayBroadcaster for Noop {
    fn broadcast(&self, _event: &Event) {}
}

#[async_trait]
impl UsageRecorder for Noop {
    async fn add_daily_usage(&self, _date: &str, _delta: UsageDelta) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Writes notifications to the log instead of a desktop toast.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, kind: NotificationKind, title: &str, message: &str, options: NotifyOptions) {
        tracing::info!(
            ?kind,
            dedupe_key = %options.dedupe_key,
            require_interaction = options.require_interaction,
            "{title}: {message}"
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogOverlay;

impl OverlayBroadcaster for LogOverlay {
    fn broadcast(&self, event: &Event) {
        tracing::debug!(
            session_id = %event.session_id(),
            focus_mode = event.focus_mode_active(),
            "overlay broadcast"
        );
    }
}

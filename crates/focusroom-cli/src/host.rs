//! Wiring shared by every command: SQLite store, configuration, system
//! clock and CLI collaborators.

use std::sync::Arc;

use focusroom_core::collaborators::{Collaborators, LogNotifier, Noop, OverlayBroadcaster};
use focusroom_core::{Config, Event, SessionController, SqliteStore, SystemClock, TimerPresenter};

/// Echoes every session event to stderr as one JSON line.
struct EventEcho;

impl OverlayBroadcaster for EventEcho {
    fn broadcast(&self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(json) => eprintln!("event: {json}"),
            Err(e) => tracing::warn!(error = %e, "failed to encode event"),
        }
    }
}

pub struct Host {
    pub store: Arc<SqliteStore>,
    pub controller: Arc<SessionController>,
}

impl Host {
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load_or_default();
        let store = Arc::new(SqliteStore::open_default()?);
        let collaborators = Collaborators {
            credit: Arc::new(Noop),
            notifier: Arc::new(LogNotifier),
            overlay: Arc::new(EventEcho),
            usage: store.clone(),
        };
        let controller = Arc::new(SessionController::new(
            store.clone(),
            Arc::new(SystemClock),
            collaborators,
            config,
        ));
        Ok(Self { store, controller })
    }

    pub fn config(&self) -> &Config {
        self.controller.config()
    }

    /// A one-shot surface. The CLI has no scheduler of its own; a running
    /// daemon notices the commit within a second and re-arms.
    pub fn presenter(&self) -> TimerPresenter {
        TimerPresenter::new(Arc::clone(&self.controller), None)
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

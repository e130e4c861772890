use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use focusroom_core::{
    scheduler_channel, CompletionScheduler, SchedulerHandle, SqliteStore, TokioWakeTimer,
    WakeTimer,
};

use crate::host::{print_json, Host};

/// How often the daemon checks the database for writes from other processes.
const EXTERNAL_WRITE_POLL: Duration = Duration::from_secs(1);

#[derive(Args)]
pub struct DaemonArgs {
    /// Restore once (completing anything overdue) and exit
    #[arg(long)]
    once: bool,
}

pub async fn run(args: DaemonArgs) -> Result<(), Box<dyn std::error::Error>> {
    let host = Host::open()?;
    let (handle, inbox) = scheduler_channel();
    let wake = Arc::new(TokioWakeTimer::new(
        Arc::clone(host.controller.clock()),
        handle.clone(),
    ));
    let scheduler = Arc::new(CompletionScheduler::new(Arc::clone(&host.controller), wake));

    if args.once {
        let action = scheduler.restore().await?;
        scheduler.wake_timer().disarm();
        print_json(&action)?;
        return Ok(());
    }

    let reconcile_every = match host.config().timer.reconcile_interval_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let changes = host.controller.subscribe();
    let watcher = tokio::spawn(watch_external_writes(
        Arc::clone(&host.store),
        handle,
        shutdown_rx.clone(),
    ));
    let task = tokio::spawn(Arc::clone(&scheduler).run(inbox, changes, reconcile_every, shutdown_rx));

    tracing::info!(?reconcile_every, "daemon running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    task.await?;
    watcher.await?;
    Ok(())
}

/// Ask the scheduler to sync whenever another process (a CLI `start` or
/// `resume`, say) commits to the database.
async fn watch_external_writes(
    store: Arc<SqliteStore>,
    handle: SchedulerHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut seen = store.data_version().ok();
    let mut poll = tokio::time::interval(EXTERNAL_WRITE_POLL);
    loop {
        tokio::select! {
            _ = poll.tick() => {}
            _ = shutdown.changed() => break,
        }
        match store.data_version() {
            Ok(version) if Some(version) != seen => {
                tracing::debug!(version, "database changed by another process");
                seen = Some(version);
                handle.request_sync();
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to read database version"),
        }
    }
}

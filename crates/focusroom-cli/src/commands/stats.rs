use clap::Subcommand;
use focusroom_core::session::date_bucket;
use focusroom_core::{EntryStatus, SessionStore};
use serde::Serialize;

use crate::host::{print_json, Host};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's stats
    Today,
    /// All-time stats
    All,
}

#[derive(Serialize)]
struct TodayStats {
    date: String,
    focus_minutes: u64,
    focus_sessions: u64,
    completed_entries: usize,
    interrupted_entries: usize,
}

pub async fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let host = Host::open()?;

    match action {
        StatsAction::Today => {
            let date = date_bucket(chrono::Utc::now());
            let usage = host.store.usage_for(&date)?;
            let entries = host.store.entries().await?;
            let (completed, interrupted) = entries
                .iter()
                .filter(|e| e.date == date)
                .fold((0, 0), |(c, i), e| match e.status {
                    EntryStatus::Completed => (c + 1, i),
                    EntryStatus::Interrupted => (c, i + 1),
                });
            print_json(&TodayStats {
                date,
                focus_minutes: usage.focus_minutes,
                focus_sessions: usage.focus_sessions,
                completed_entries: completed,
                interrupted_entries: interrupted,
            })?;
        }
        StatsAction::All => {
            let totals = host.store.usage_totals()?;
            print_json(&totals)?;
        }
    }
    Ok(())
}

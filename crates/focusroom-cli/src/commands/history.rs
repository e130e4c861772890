use clap::Args;
use focusroom_core::SessionStore;

use crate::host::{print_json, Host};

#[derive(Args)]
pub struct HistoryArgs {
    /// Show at most this many entries, newest first
    #[arg(long, default_value = "20")]
    limit: usize,
}

pub async fn run(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let host = Host::open()?;
    let mut entries = host.store.entries().await?;
    entries.reverse();
    entries.truncate(args.limit);
    print_json(&entries)
}

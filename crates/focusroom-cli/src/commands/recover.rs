use clap::Args;
use focusroom_core::{RecoveryChoice, RecoveryOutcome};

use crate::host::{print_json, Host};

#[derive(Args)]
pub struct RecoverArgs {
    /// Keep the recovered session as it was
    #[arg(long, conflicts_with = "discard")]
    resume: bool,
    /// Drop the recovered session without credit
    #[arg(long)]
    discard: bool,
}

impl RecoverArgs {
    fn choice(&self) -> Option<RecoveryChoice> {
        match (self.resume, self.discard) {
            (true, _) => Some(RecoveryChoice::Resume),
            (_, true) => Some(RecoveryChoice::Discard),
            _ => None,
        }
    }
}

pub async fn run(args: RecoverArgs) -> Result<(), Box<dyn std::error::Error>> {
    let host = Host::open()?;
    let presenter = host.presenter();

    let outcome = presenter.recover().await?;
    match (&outcome, args.choice()) {
        (RecoveryOutcome::Prompt { record, .. }, Some(choice)) => {
            let resolution = presenter.resolve_recovery(&record.id, choice).await?;
            print_json(&resolution)?;
        }
        _ => print_json(&outcome)?,
    }

    presenter.detach();
    Ok(())
}

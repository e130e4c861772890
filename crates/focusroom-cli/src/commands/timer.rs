use clap::{Args, Subcommand};
use focusroom_core::{SessionLength, StartRequest, StopOptions};

use crate::host::{print_json, Host};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a focus session or a break
    Start(StartArgs),
    /// Pause the running session
    Pause,
    /// Resume the paused session
    Resume,
    /// End the session early
    Stop {
        /// Add the elapsed minutes to today's focus time
        #[arg(long)]
        add_time: bool,
        /// Count the session as completed
        #[arg(long)]
        count: bool,
    },
    /// Print the current timer view as JSON, completing an overdue session first
    Status,
}

#[derive(Args)]
pub struct StartArgs {
    /// Session length in minutes (defaults from config)
    #[arg(long, conflicts_with = "open_ended")]
    minutes: Option<u32>,
    /// Count up with no deadline
    #[arg(long)]
    open_ended: bool,
    /// Start a break instead of a focus session
    #[arg(long = "break", conflicts_with = "open_ended")]
    is_break: bool,
    /// Task ID to attach
    #[arg(long)]
    task_id: Option<String>,
    /// Task title to attach
    #[arg(long)]
    task_title: Option<String>,
    /// Boredom rating, 1 to 5
    #[arg(long)]
    boredom: Option<u8>,
}

impl StartArgs {
    fn into_request(self, host: &Host) -> StartRequest {
        let timer = &host.config().timer;
        let length = if self.open_ended {
            SessionLength::OpenEnded
        } else if self.is_break {
            SessionLength::Fixed(self.minutes.unwrap_or(timer.break_minutes))
        } else {
            SessionLength::Fixed(self.minutes.unwrap_or(timer.default_focus_minutes))
        };
        let base = match (length, self.is_break) {
            (SessionLength::OpenEnded, _) => StartRequest::open_ended(),
            (SessionLength::Fixed(m), true) => StartRequest::break_of(m),
            (SessionLength::Fixed(m), false) => StartRequest::focus(m),
        };
        base.with_task(self.task_id, self.task_title)
            .with_boredom(self.boredom)
    }
}

pub async fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let host = Host::open()?;
    let presenter = host.presenter();

    match action {
        TimerAction::Start(args) => {
            let record = presenter.start(args.into_request(&host)).await?;
            print_json(&record)?;
        }
        TimerAction::Pause => {
            let record = presenter.pause().await?;
            print_json(&record)?;
        }
        TimerAction::Resume => {
            let record = presenter.resume().await?;
            print_json(&record)?;
        }
        TimerAction::Stop { add_time, count } => {
            let outcome = presenter
                .stop(StopOptions {
                    add_time,
                    count_as_completed: count,
                })
                .await?;
            print_json(&outcome)?;
        }
        TimerAction::Status => {
            let completion = host.controller.complete_if_due().await?;
            if completion.is_completed() {
                tracing::info!(?completion, "completed overdue session");
            }
            presenter.refresh().await?;
            print_json(&presenter.snapshot())?;
        }
    }

    presenter.detach();
    Ok(())
}

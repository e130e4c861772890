use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod host;

#[derive(Parser)]
#[command(name = "focusroom", version, about = "Focusroom CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Recover a session left behind by an earlier run
    Recover(commands::recover::RecoverArgs),
    /// Run the completion scheduler in the foreground
    Daemon(commands::daemon::DaemonArgs),
    /// Focus statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Completed session log
    History(commands::history::HistoryArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_env("FOCUSROOM_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let default_level = match cli.command {
        Commands::Daemon(_) => "info",
        _ => "warn",
    };
    init_logging(default_level);

    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action).await,
        Commands::Recover(args) => commands::recover::run(args).await,
        Commands::Daemon(args) => commands::daemon::run(args).await,
        Commands::Stats { action } => commands::stats::run(action).await,
        Commands::History(args) => commands::history::run(args).await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary data directory.

use serde_json::Value;
use std::process::Command;
use tempfile::TempDir;

struct Cli {
    dir: TempDir,
}

impl Cli {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    /// Run a CLI command and return (stdout, stderr, exit code).
    fn run(&self, args: &[&str]) -> (String, String, i32) {
        let output = Command::new(env!("CARGO_BIN_EXE_focusroom"))
            .args(args)
            .env("FOCUSROOM_DATA_DIR", self.dir.path())
            .env_remove("FOCUSROOM_LOG")
            .output()
            .expect("Failed to execute CLI command");

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);
        (stdout, stderr, code)
    }

    /// Run a CLI command, expect success and parse stdout as JSON.
    fn json(&self, args: &[&str]) -> Value {
        let (stdout, stderr, code) = self.run(args);
        assert_eq!(code, 0, "{args:?} failed: {stderr}");
        serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("bad JSON from {args:?}: {e}\n{stdout}"))
    }
}

#[test]
fn test_status_when_idle() {
    let cli = Cli::new();
    let view = cli.json(&["timer", "status"]);
    assert_eq!(view["status"], "idle");
    assert_eq!(view["clock"], "00:00");
}

#[test]
fn test_timer_lifecycle() {
    let cli = Cli::new();

    let record = cli.json(&["timer", "start", "--minutes", "25", "--task-title", "Draft"]);
    assert_eq!(record["selectedMinutes"], 25);
    assert_eq!(record["isBreak"], false);
    assert_eq!(record["taskTitle"], "Draft");

    let view = cli.json(&["timer", "status"]);
    assert_eq!(view["status"], "running");
    assert_eq!(view["sessionId"], record["id"]);

    let paused = cli.json(&["timer", "pause"]);
    assert_eq!(paused["isPaused"], true);
    assert_eq!(cli.json(&["timer", "status"])["status"], "paused");

    let resumed = cli.json(&["timer", "resume"]);
    assert_eq!(resumed["isPaused"], false);

    let stop = cli.json(&["timer", "stop", "--add-time", "--count"]);
    assert_eq!(stop["result"], "stopped");
    assert_eq!(stop["entry"]["status"], "completed");
    assert_eq!(stop["credited"]["focus_sessions"], 1);

    let history = cli.json(&["history"]);
    assert_eq!(history.as_array().map(Vec::len), Some(1));
    assert_eq!(history[0]["id"], record["id"]);

    let today = cli.json(&["stats", "today"]);
    assert_eq!(today["focus_sessions"], 1);
    assert_eq!(today["completed_entries"], 1);
}

#[test]
fn test_second_start_is_rejected() {
    let cli = Cli::new();
    cli.json(&["timer", "start"]);
    let (_, stderr, code) = cli.run(&["timer", "start", "--break"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"), "{stderr}");
    assert!(stderr.contains("already active"), "{stderr}");
}

#[test]
fn test_invalid_minutes_are_rejected() {
    let cli = Cli::new();
    let (_, stderr, code) = cli.run(&["timer", "start", "--minutes", "0"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("invalid session length"), "{stderr}");
}

#[test]
fn test_stop_without_session() {
    let cli = Cli::new();
    let stop = cli.json(&["timer", "stop"]);
    assert_eq!(stop["result"], "nothing_to_stop");
}

#[test]
fn test_open_ended_stop_is_interrupted() {
    let cli = Cli::new();
    let record = cli.json(&["timer", "start", "--open-ended"]);
    assert_eq!(record["isOpenEnded"], true);
    assert_eq!(cli.json(&["timer", "status"])["isOpenEnded"], true);

    let stop = cli.json(&["timer", "stop", "--add-time"]);
    assert_eq!(stop["entry"]["status"], "interrupted");
    assert_eq!(stop["entry"]["type"], "open");
    assert_eq!(stop["credited"]["focus_sessions"], 0);
}

#[test]
fn test_recover_prompt_and_discard() {
    let cli = Cli::new();
    assert_eq!(cli.json(&["recover"])["outcome"], "cold_start");

    cli.json(&["timer", "start", "--minutes", "50"]);
    let prompt = cli.json(&["recover"]);
    assert_eq!(prompt["outcome"], "prompt");
    assert_eq!(prompt["time"]["kind"], "running");

    let resolution = cli.json(&["recover", "--discard"]);
    assert_eq!(resolution["resolution"], "discarded");
    assert_eq!(cli.json(&["timer", "status"])["status"], "idle");
    assert_eq!(cli.json(&["history"]).as_array().map(Vec::len), Some(0));
}

#[test]
fn test_recover_resume_keeps_session() {
    let cli = Cli::new();
    let record = cli.json(&["timer", "start", "--break", "--minutes", "10"]);
    let resolution = cli.json(&["recover", "--resume"]);
    assert_eq!(resolution["resolution"], "resumed");
    assert_eq!(resolution["record"]["id"], record["id"]);
    assert_eq!(cli.json(&["timer", "status"])["isBreak"], true);
}

#[test]
fn test_daemon_once_arms_for_running_session() {
    let cli = Cli::new();
    assert_eq!(cli.json(&["daemon", "--once"])["action"], "disarmed");

    cli.json(&["timer", "start", "--minutes", "30"]);
    let action = cli.json(&["daemon", "--once"]);
    assert_eq!(action["action"], "armed");
}

#[test]
fn test_config_get_set_reset() {
    let cli = Cli::new();
    let (stdout, _, code) = cli.run(&["config", "get", "timer.break_minutes"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "5");

    let (stdout, _, code) = cli.run(&["config", "set", "timer.break_minutes", "12"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");
    let (stdout, _, _) = cli.run(&["config", "get", "timer.break_minutes"]);
    assert_eq!(stdout.trim(), "12");

    let record = cli.json(&["timer", "start", "--break"]);
    assert_eq!(record["selectedMinutes"], 12);

    let list = cli.json(&["config", "list"]);
    assert_eq!(list["timer"]["break_minutes"], 12);

    let (_, _, code) = cli.run(&["config", "reset"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = cli.run(&["config", "get", "timer.break_minutes"]);
    assert_eq!(stdout.trim(), "5");
}

#[test]
fn test_config_unknown_key_fails() {
    let cli = Cli::new();
    let (_, stderr, code) = cli.run(&["config", "get", "timer.nope"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown key"), "{stderr}");

    let (_, _, code) = cli.run(&["config", "set", "timer.nope", "1"]);
    assert_eq!(code, 1);
}

//! Integration tests for session start, pause, resume and stop.

mod common;

use common::{Harness, T0, TODAY};
use focusroom_core::{
    CoreError, EntryStatus, Event, SchedulerAction, SessionKind, SessionPhase, SessionStore,
    StartRequest, StopOptions, StopOutcome, TransitionError, WakeOutcome, WakeTimer, Clock,
};
use proptest::prelude::*;

const MIN: i64 = 60_000;

fn transition_err(result: Result<impl std::fmt::Debug, CoreError>) -> TransitionError {
    match result {
        Err(CoreError::Transition(e)) => e,
        other => panic!("expected transition error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_start_writes_record_with_deadline() {
    let h = Harness::new();
    let record = h
        .controller
        .start(
            StartRequest::focus(25)
                .with_task(Some("t-1".into()), Some("Write report".into()))
                .with_boredom(Some(2)),
        )
        .await
        .unwrap();

    assert!(record.is_active && !record.is_paused && !record.is_break);
    assert_eq!(record.started_at, T0);
    assert_eq!(record.start_timestamp, T0);
    assert_eq!(record.end_timestamp, Some(T0 + 25 * MIN));
    assert_eq!(record.remaining_seconds, 1500);
    assert_eq!(record.task_title.as_deref(), Some("Write report"));

    let stored = h.store.load_record().await.unwrap().unwrap();
    assert_eq!(stored, record);
    assert_eq!(
        h.store.get_value("lastFocusMinutes").await.unwrap().as_deref(),
        Some("25")
    );
    assert!(matches!(
        h.recorder.events().as_slice(),
        [Event::SessionStarted { planned_minutes: Some(25), is_break: false, .. }]
    ));
}

#[tokio::test]
async fn test_start_rejects_second_session() {
    let h = Harness::new();
    h.controller.start(StartRequest::focus(25)).await.unwrap();
    let err = transition_err(h.controller.start(StartRequest::break_of(5)).await);
    assert_eq!(err, TransitionError::AlreadyActive);
}

#[tokio::test]
async fn test_concurrent_starts_admit_one_session() {
    let h = Harness::new();
    let a = h.yielding_sibling();
    let b = h.yielding_sibling();

    // Both read an empty slot before either writes.
    let (first, second) = tokio::join!(
        a.start(StartRequest::focus(25)),
        b.start(StartRequest::focus(50))
    );
    let winner = first.expect("first start wins");
    assert_eq!(transition_err(second), TransitionError::AlreadyActive);

    let stored = h.controller.current().await.unwrap().unwrap();
    assert_eq!(stored, winner);
    assert_eq!(stored.selected_minutes, Some(25));
    let started = h
        .recorder
        .events()
        .iter()
        .filter(|e| matches!(e, Event::SessionStarted { .. }))
        .count();
    assert_eq!(started, 1);
}

#[tokio::test]
async fn test_start_validates_input() {
    let h = Harness::new();
    assert_eq!(
        transition_err(h.controller.start(StartRequest::focus(0)).await),
        TransitionError::InvalidDuration(0)
    );
    assert_eq!(
        transition_err(h.controller.start(StartRequest::focus(1441)).await),
        TransitionError::InvalidDuration(1441)
    );
    assert_eq!(
        transition_err(
            h.controller
                .start(StartRequest::focus(25).with_boredom(Some(6)))
                .await
        ),
        TransitionError::InvalidBoredomLevel(6)
    );
    assert!(h.controller.current().await.unwrap().is_none());
}

#[tokio::test]
async fn test_break_does_not_overwrite_last_focus_length() {
    let h = Harness::new();
    h.controller.start(StartRequest::focus(50)).await.unwrap();
    h.controller.stop(StopOptions::discard()).await.unwrap();
    h.controller.start(StartRequest::break_of(10)).await.unwrap();
    assert_eq!(
        h.store.get_value("lastFocusMinutes").await.unwrap().as_deref(),
        Some("50")
    );
}

/// Test: 25 minute session, paused at 10, resumed at 15, is due at 30.
#[tokio::test]
async fn test_pause_resume_moves_deadline() {
    let h = Harness::new();
    h.controller.start(StartRequest::focus(25)).await.unwrap();
    assert!(matches!(
        h.scheduler.sync().await.unwrap(),
        SchedulerAction::Armed { at_ms, .. } if at_ms == T0 + 25 * MIN
    ));

    h.clock.set(T0 + 10 * MIN);
    let paused = h.controller.pause().await.unwrap();
    assert_eq!(paused.paused_remaining_seconds, Some(900));
    assert_eq!(paused.end_timestamp, None);
    assert_eq!(h.scheduler.sync().await.unwrap(), SchedulerAction::Disarmed);
    assert_eq!(h.wake.armed_at(), None);

    h.clock.set(T0 + 15 * MIN);
    let resumed = h.controller.resume().await.unwrap();
    assert_eq!(resumed.end_timestamp, Some(T0 + 30 * MIN));
    h.scheduler.sync().await.unwrap();
    assert_eq!(h.wake.armed_at(), Some(T0 + 30 * MIN));

    h.clock.set(T0 + 30 * MIN);
    assert!(h.wake.is_due(h.clock.now_ms()));
    let outcome = h.scheduler.on_wake().await.unwrap();
    assert!(matches!(outcome, WakeOutcome::Completed { ref completion } if completion.is_completed()));

    let entries = h.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, EntryStatus::Completed);
    assert_eq!(entries[0].actual_duration_minutes, 25);
    assert_eq!(entries[0].planned_duration_minutes, Some(25));
    assert_eq!(entries[0].kind, SessionKind::Pomodoro);

    let usage = h.usage_today().await;
    assert_eq!((usage.focus_minutes, usage.focus_sessions), (25, 1));
}

#[tokio::test]
async fn test_pause_and_resume_reject_wrong_phase() {
    let h = Harness::new();
    assert_eq!(
        transition_err(h.controller.pause().await),
        TransitionError::NoActiveSession
    );

    h.controller.start(StartRequest::focus(25)).await.unwrap();
    assert!(matches!(
        transition_err(h.controller.resume().await),
        TransitionError::InvalidTransition { from: SessionPhase::Running, action: "resume" }
    ));

    h.controller.pause().await.unwrap();
    assert!(matches!(
        transition_err(h.controller.pause().await),
        TransitionError::InvalidTransition { from: SessionPhase::Paused, action: "pause" }
    ));
    assert_eq!(h.controller.phase().await.unwrap(), SessionPhase::Paused);
}

/// Test: open-ended session stopped at 42 minutes with time but no session credit.
#[tokio::test]
async fn test_open_ended_stop_credits_time_only() {
    let h = Harness::new();
    h.controller
        .start(StartRequest::open_ended())
        .await
        .unwrap();
    assert_eq!(h.scheduler.sync().await.unwrap(), SchedulerAction::Disarmed);

    h.clock.set(T0 + 42 * MIN);
    let outcome = h
        .controller
        .stop(StopOptions {
            add_time: true,
            count_as_completed: false,
        })
        .await
        .unwrap();

    let StopOutcome::Stopped { entry, credited, .. } = outcome else {
        panic!("expected a stopped session");
    };
    let entry = entry.unwrap();
    assert_eq!(entry.status, EntryStatus::Interrupted);
    assert_eq!(entry.actual_duration_minutes, 42);
    assert_eq!(entry.planned_duration_minutes, None);
    assert_eq!(entry.kind, SessionKind::Open);
    assert_eq!(entry.date, TODAY);
    assert_eq!((credited.focus_minutes, credited.focus_sessions), (42, 0));

    let usage = h.usage_today().await;
    assert_eq!((usage.focus_minutes, usage.focus_sessions), (42, 0));
    assert!(h.controller.current().await.unwrap().is_none());
    assert!(h.recorder.credits().is_empty());
    assert!(h.recorder.notifications().is_empty());
}

#[tokio::test]
async fn test_stop_counts_paused_time_out() {
    let h = Harness::new();
    h.controller.start(StartRequest::focus(25)).await.unwrap();
    h.clock.set(T0 + 5 * MIN);
    h.controller.pause().await.unwrap();
    h.clock.set(T0 + 60 * MIN);

    let outcome = h
        .controller
        .stop(StopOptions {
            add_time: true,
            count_as_completed: true,
        })
        .await
        .unwrap();
    let StopOutcome::Stopped { record, entry, .. } = outcome else {
        panic!("expected a stopped session");
    };
    assert_eq!(record.remaining_seconds, 20 * 60);
    let entry = entry.unwrap();
    assert_eq!(entry.status, EntryStatus::Completed);
    assert_eq!(entry.actual_duration_minutes, 5);

    let usage = h.usage_today().await;
    assert_eq!((usage.focus_minutes, usage.focus_sessions), (5, 1));
}

#[tokio::test]
async fn test_stop_without_credit_leaves_no_trace() {
    let h = Harness::new();
    h.controller.start(StartRequest::focus(25)).await.unwrap();
    h.clock.advance_mins(3);
    let outcome = h.controller.stop(StopOptions::discard()).await.unwrap();
    assert!(matches!(outcome, StopOutcome::Stopped { entry: None, .. }));
    assert!(h.entries().await.is_empty());
    assert!(h.usage_today().await.is_empty());
}

#[tokio::test]
async fn test_stopping_a_break_records_nothing() {
    let h = Harness::new();
    h.controller.start(StartRequest::break_of(5)).await.unwrap();
    h.clock.advance_mins(2);
    let outcome = h
        .controller
        .stop(StopOptions {
            add_time: true,
            count_as_completed: true,
        })
        .await
        .unwrap();
    assert!(matches!(outcome, StopOutcome::Stopped { entry: None, .. }));
    assert!(h.entries().await.is_empty());
    assert!(h.usage_today().await.is_empty());
}

#[tokio::test]
async fn test_stop_with_nothing_active() {
    let h = Harness::new();
    assert_eq!(
        h.controller.stop(StopOptions::discard()).await.unwrap(),
        StopOutcome::NothingToStop
    );
}

#[tokio::test]
async fn test_corrupt_record_reads_as_idle() {
    let h = Harness::new();
    h.store.put_raw_record("{\"id\": 7").await;
    assert!(h.controller.current().await.unwrap().is_none());
    assert_eq!(h.controller.phase().await.unwrap(), SessionPhase::Idle);

    // A fresh start replaces the unreadable value.
    let record = h.controller.start(StartRequest::focus(25)).await.unwrap();
    assert_eq!(h.controller.current().await.unwrap(), Some(record));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Time spent paused never counts towards a fixed session.
    #[test]
    fn prop_pause_resume_conserves_running_time(
        minutes in 1u32..120,
        pauses in prop::collection::vec((0i64..600_000, 0i64..3_600_000), 0..6),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let h = Harness::new();
            h.controller.start(StartRequest::focus(minutes)).await.unwrap();

            let mut ran_ms = 0i64;
            for (run, pause) in pauses {
                h.clock.advance_ms(run);
                ran_ms += run;
                if h.controller.current().await.unwrap().is_none() {
                    break;
                }
                h.controller.pause().await.unwrap();
                h.clock.advance_ms(pause);
                h.controller.resume().await.unwrap();
            }

            if let Some(record) = h.controller.current().await.unwrap() {
                let planned_ms = i64::from(minutes) * 60_000;
                let deadline = record.end_timestamp.unwrap();
                let now = h.clock.now_ms();
                // Each pause snapshot rounds remaining time up to a whole second.
                let slack = 1_000 * 6;
                let expected = (planned_ms - ran_ms).max(0);
                prop_assert!(deadline - now >= expected);
                prop_assert!(deadline - now <= expected + slack);
            }
            Ok(())
        })?;
    }
}

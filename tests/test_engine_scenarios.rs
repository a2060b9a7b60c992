//! Time-driven scenarios for the monitor engine.
//!
//! The tokio clock is paused so the one-minute grace delay elapses
//! instantly; wall-clock inputs are passed explicitly.

mod helpers;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use std::time::Duration;

use helpers::*;
use tidewatch::models::{MonitorState, PollOutcome, ScanError};
use tidewatch::monitor::countdown::local_to_utc;
use tidewatch::monitor::{CountdownTick, PollTrigger};

#[tokio::test(start_paused = true)]
async fn test_new_entry_arms_action_and_drives_countdown() {
    let logs = LogDir::new();
    logs.write("chat.log", &[marker("10:00:00", 15)], at(10, 0, 1));
    let h = Harness::new(engine_config(logs.path()));

    let outcome = h.engine.poll(PollTrigger::Scheduled, at(10, 0, 5)).await.unwrap();
    let PollOutcome::Armed { entry, fire_at } = outcome else {
        panic!("expected an armed action, got {outcome:?}");
    };
    assert_eq!(entry.timestamp, at(10, 0, 0));
    assert_eq!(entry.minutes_until_event, 15);
    assert_eq!(fire_at, at(10, 1, 5));

    let state = h.store.snapshot();
    assert_eq!(state.last_processed_timestamp, at(10, 0, 0));
    assert_eq!(state.last_processed_file, "chat.log");
    assert_eq!(state.last_found_entry, marker("10:00:00", 15));
    assert_eq!(state.next_event_time_utc, Some(local_to_utc(at(10, 15, 0))));
    assert_eq!(state.next_event_minutes, Some(15));

    assert!(h.engine.action_pending().await);
    assert!(h.invoker.calls().is_empty());

    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;
    assert_eq!(h.invoker.calls(), vec![ACTION]);
    assert!(!h.engine.action_pending().await);

    assert_eq!(
        h.engine.countdown_tick(local_to_utc(at(10, 13, 0))).await,
        CountdownTick::Counting {
            remaining: ChronoDuration::minutes(2)
        }
    );
    assert!(matches!(
        h.engine.countdown_tick(local_to_utc(at(10, 14, 0))).await,
        CountdownTick::PreEvent { .. }
    ));
    assert!(matches!(
        h.engine.countdown_tick(local_to_utc(at(10, 14, 30))).await,
        CountdownTick::Counting { .. }
    ));
    settle().await;
    assert_eq!(h.invoker.calls(), vec![ACTION, PRE_EVENT_ACTION]);

    assert!(matches!(
        h.engine.countdown_tick(local_to_utc(at(10, 15, 1))).await,
        CountdownTick::Expired { .. }
    ));
    let state = h.store.snapshot();
    assert_eq!(state.next_event_time_utc, None);
    assert_eq!(state.next_event_minutes, None);
    assert_eq!(state.last_processed_file, "chat.log");

    assert_eq!(
        h.engine.countdown_tick(local_to_utc(at(10, 15, 2))).await,
        CountdownTick::Idle
    );
}

#[tokio::test(start_paused = true)]
async fn test_repeated_polls_do_not_rearm_or_rewrite_state() {
    let logs = LogDir::new();
    logs.write("chat.log", &[marker("10:00:00", 15)], at(10, 0, 1));
    let h = Harness::new(engine_config(logs.path()));

    h.engine.poll(PollTrigger::Scheduled, at(10, 0, 5)).await.unwrap();
    let saves = h.store.save_count();

    let second = h.engine.poll(PollTrigger::Scheduled, at(10, 0, 30)).await.unwrap();
    assert_eq!(second, PollOutcome::SkippedPending);
    assert_eq!(h.store.save_count(), saves);

    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;

    let third = h.engine.poll(PollTrigger::Scheduled, at(10, 5, 0)).await.unwrap();
    assert!(matches!(third, PollOutcome::AlreadySeen { .. }));
    assert_eq!(h.store.save_count(), saves);
    assert_eq!(h.invoker.calls().len(), 1);
    assert!(!h.engine.action_pending().await);
}

#[tokio::test(start_paused = true)]
async fn test_forced_check_while_pending_reports_without_arming() {
    let logs = LogDir::new();
    logs.write("chat.log", &[marker("10:00:00", 15)], at(10, 0, 1));
    let h = Harness::new(engine_config(logs.path()));

    h.engine.poll(PollTrigger::Scheduled, at(10, 0, 5)).await.unwrap();
    logs.append("chat.log", &marker("10:00:30", 20), at(10, 0, 31));

    let report = h.engine.force_check(at(10, 0, 40)).await.unwrap();
    let PollOutcome::DeferredWhilePending { entry } = &report.outcome else {
        panic!("expected a deferred entry, got {:?}", report.outcome);
    };
    assert_eq!(entry.timestamp, at(10, 0, 30));
    assert!(report.status.action_pending);
    assert_eq!(report.status.pending_fire_at, Some(at(10, 1, 5)));

    // Baseline untouched, countdown follows the newer entry
    assert_eq!(h.store.snapshot().last_processed_timestamp, at(10, 0, 0));
    assert_eq!(report.status.next_event_local, Some(at(10, 20, 30)));
    assert_eq!(report.status.next_event_minutes, Some(20));

    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;
    assert_eq!(h.invoker.calls(), vec![ACTION]);

    // The deferred entry is picked up by the next regular poll
    let outcome = h.engine.poll(PollTrigger::Scheduled, at(10, 5, 0)).await.unwrap();
    assert!(matches!(outcome, PollOutcome::Armed { ref entry, .. } if entry.timestamp == at(10, 0, 30)));
}

#[tokio::test(start_paused = true)]
async fn test_disabled_schedule_only_yields_to_forced_checks() {
    let logs = LogDir::new();
    logs.write("chat.log", &[marker("10:00:00", 15)], at(10, 0, 1));
    let mut config = engine_config(logs.path());
    config.schedule.enabled = false;
    let h = Harness::new(config);

    let outcome = h.engine.poll(PollTrigger::Scheduled, at(10, 0, 5)).await.unwrap();
    assert_eq!(outcome, PollOutcome::Disabled);
    assert_eq!(h.store.save_count(), 0);

    let report = h.engine.force_check(at(10, 0, 6)).await.unwrap();
    assert!(matches!(report.outcome, PollOutcome::Armed { .. }));
    assert!(!report.status.enabled);
    assert!(report.status.action_pending);
}

#[tokio::test(start_paused = true)]
async fn test_scan_failures_leave_state_untouched() {
    let logs = LogDir::new();
    let h = Harness::new(engine_config(&logs.path().join("missing")));

    let err = h.engine.poll(PollTrigger::Scheduled, at(10, 0, 5)).await.unwrap_err();
    assert!(matches!(err, ScanError::DirectoryNotFound(_)));

    let h = Harness::new(engine_config(logs.path()));
    let err = h.engine.poll(PollTrigger::Scheduled, at(10, 0, 5)).await.unwrap_err();
    assert!(matches!(err, ScanError::NoLogFiles { .. }));

    logs.write("chat.log", &["[10:00:00.000 N] [Party] hello".to_string()], at(10, 0, 1));
    let outcome = h.engine.poll(PollTrigger::Scheduled, at(10, 0, 5)).await.unwrap();
    assert_eq!(outcome, PollOutcome::NoCandidate);

    assert_eq!(h.store.save_count(), 0);
    assert!(!h.engine.action_pending().await);
}

#[tokio::test(start_paused = true)]
async fn test_reset_makes_latest_entry_new_again() {
    let logs = LogDir::new();
    logs.write("chat.log", &[marker("10:00:00", 15)], at(10, 0, 1));
    let h = Harness::new(engine_config(logs.path()));

    h.engine.poll(PollTrigger::Scheduled, at(10, 0, 5)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;

    h.engine.reset().await.unwrap();
    let state = h.store.snapshot();
    assert_eq!(state.last_processed_timestamp, MonitorState::default().last_processed_timestamp);
    assert!(state.last_processed_file.is_empty());
    assert!(state.next_event_time_utc.is_some());

    let outcome = h.engine.poll(PollTrigger::Scheduled, at(10, 5, 0)).await.unwrap();
    assert!(matches!(outcome, PollOutcome::Armed { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_keeps_only_the_processed_file() {
    let logs = LogDir::new();
    let old = logs.write("old.log", &[marker("09:00:00", 30)], at(9, 0, 1));
    let current = logs.write("chat.log", &[marker("10:00:00", 15)], at(10, 0, 1));
    let mut config = engine_config(logs.path());
    config.schedule.delete_old_files = true;
    let h = Harness::new(config);

    let outcome = h.engine.poll(PollTrigger::Scheduled, at(10, 0, 5)).await.unwrap();
    assert_eq!(outcome.entry().map(|e| e.source_file.as_str()), Some("chat.log"));
    assert!(!old.exists());
    assert!(current.exists());
}

#[tokio::test(start_paused = true)]
async fn test_latest_entry_across_midnight() {
    let logs = LogDir::new();
    let may_11 = |h, m, s| {
        NaiveDate::from_ymd_opt(2024, 5, 11)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    };
    logs.write("before.log", &[marker("23:58:00", 30)], at(23, 58, 1));
    logs.write("after.log", &[marker("00:02:00", 10)], may_11(0, 2, 1));
    let h = Harness::new(engine_config(logs.path()));

    let outcome = h.engine.poll(PollTrigger::Scheduled, may_11(0, 5, 0)).await.unwrap();
    let entry = outcome.entry().unwrap();
    assert_eq!(entry.source_file, "after.log");
    assert_eq!(entry.timestamp, may_11(0, 2, 0));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_action_in_grace_delay() {
    let logs = LogDir::new();
    logs.write("chat.log", &[marker("10:00:00", 15)], at(10, 0, 1));
    let h = Harness::new(engine_config(logs.path()));

    h.engine.poll(PollTrigger::Scheduled, at(10, 0, 5)).await.unwrap();
    h.engine.shutdown().await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    settle().await;
    assert!(h.invoker.calls().is_empty());
    assert!(!h.engine.action_pending().await);
    // Recorded before the action was cancelled
    assert_eq!(h.store.snapshot().last_processed_file, "chat.log");
}

#[tokio::test(start_paused = true)]
async fn test_countdown_restored_from_state() {
    let logs = LogDir::new();
    let state = MonitorState {
        next_event_time_utc: Some(local_to_utc(at(10, 15, 0))),
        next_event_minutes: Some(15),
        ..MonitorState::default()
    };
    let h = Harness::with_state(engine_config(logs.path()), state);

    let status = h.engine.status(local_to_utc(at(10, 14, 0))).await;
    assert_eq!(status.next_event_local, Some(at(10, 15, 0)));
    assert_eq!(status.remaining_seconds, Some(60));
    assert!(!status.pre_event_fired);
    assert_eq!(status.last_processed_timestamp, None);
}

#[tokio::test(start_paused = true)]
async fn test_loops_run_and_stop_on_shutdown() {
    let logs = LogDir::new();
    logs.write("chat.log", &[marker("10:00:00", 15)], at(10, 0, 1));
    let h = Harness::new(engine_config(logs.path()));

    let poll_task = tokio::spawn(h.engine.clone().run_poll_loop());
    let countdown_task = tokio::spawn(h.engine.clone().run_countdown_loop());

    // First interval tick completes immediately
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.store.snapshot().last_processed_file, "chat.log");
    assert!(h.engine.action_pending().await);

    h.engine.shutdown().await;
    poll_task.await.unwrap();
    countdown_task.await.unwrap();
    assert!(h.invoker.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_spares_file_with_deferred_entry() {
    let logs = LogDir::new();
    let first = logs.write("a.log", &[marker("10:00:00", 15)], at(10, 0, 1));
    let mut config = engine_config(logs.path());
    config.schedule.delete_old_files = true;
    let h = Harness::new(config);

    h.engine.poll(PollTrigger::Scheduled, at(10, 0, 5)).await.unwrap();
    let second = logs.write("b.log", &[marker("10:00:30", 20)], at(10, 0, 31));

    let report = h.engine.force_check(at(10, 0, 40)).await.unwrap();
    assert!(matches!(
        report.outcome,
        PollOutcome::DeferredWhilePending { ref entry } if entry.source_file == "b.log"
    ));
    assert!(first.exists());
    assert!(second.exists());

    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;
    assert_eq!(h.invoker.calls(), vec![ACTION]);

    let outcome = h.engine.poll(PollTrigger::Scheduled, at(10, 5, 0)).await.unwrap();
    assert!(matches!(outcome, PollOutcome::Armed { ref entry, .. } if entry.source_file == "b.log"));
    assert!(!first.exists());
    assert!(second.exists());
}

#[tokio::test(start_paused = true)]
async fn test_failed_action_returns_to_idle() {
    let logs = LogDir::new();
    logs.write("chat.log", &[marker("10:00:00", 15)], at(10, 0, 1));
    let h = Harness::with_parts(
        engine_config(logs.path()),
        MonitorState::default(),
        RecordingInvoker::failing(),
    );

    h.engine.poll(PollTrigger::Scheduled, at(10, 0, 5)).await.unwrap();
    assert!(h.engine.action_pending().await);

    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;
    assert_eq!(h.invoker.calls(), vec![ACTION]);
    assert!(!h.engine.action_pending().await);

    // Baseline still advanced; a new entry arms again
    logs.append("chat.log", &marker("10:03:00", 10), at(10, 3, 1));
    let outcome = h.engine.poll(PollTrigger::Scheduled, at(10, 3, 5)).await.unwrap();
    assert!(matches!(outcome, PollOutcome::Armed { ref entry, .. } if entry.timestamp == at(10, 3, 0)));
}

#[tokio::test(start_paused = true)]
async fn test_retarget_after_expiry_is_persisted() {
    let logs = LogDir::new();
    let state = MonitorState {
        next_event_time_utc: Some(local_to_utc(at(10, 15, 0))),
        next_event_minutes: Some(15),
        ..MonitorState::default()
    };
    logs.write("chat.log", &[marker("10:20:00", 30)], at(10, 20, 1));
    let h = Harness::with_state(engine_config(logs.path()), state);

    assert!(matches!(
        h.engine.countdown_tick(local_to_utc(at(10, 16, 0))).await,
        CountdownTick::Expired { .. }
    ));
    assert_eq!(h.store.snapshot().next_event_time_utc, None);

    h.engine.poll(PollTrigger::Scheduled, at(10, 20, 5)).await.unwrap();
    let saved = h.store.snapshot();
    let status = h.engine.status(local_to_utc(at(10, 20, 5))).await;
    assert_eq!(saved.next_event_time_utc, Some(local_to_utc(at(10, 50, 0))));
    assert_eq!(saved.next_event_time_utc, status.next_event_utc);
    assert_eq!(saved.next_event_minutes, Some(30));
}

// Real clock: the countdown loop reads wall time
#[tokio::test]
async fn test_countdown_loop_fires_pre_event_once_and_clears_target() {
    let logs = LogDir::new();
    let state = MonitorState {
        next_event_time_utc: Some(Utc::now() + ChronoDuration::milliseconds(1500)),
        next_event_minutes: Some(1),
        ..MonitorState::default()
    };
    let h = Harness::with_state(engine_config(logs.path()), state);
    let countdown_task = tokio::spawn(h.engine.clone().run_countdown_loop());

    let mut cleared = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if h.engine.status(Utc::now()).await.next_event_utc.is_none() {
            cleared = true;
            break;
        }
    }
    assert!(cleared, "countdown target never expired");

    h.engine.shutdown().await;
    countdown_task.await.unwrap();
    assert_eq!(h.invoker.calls(), vec![PRE_EVENT_ACTION]);
    assert_eq!(h.store.snapshot().next_event_time_utc, None);
    assert_eq!(h.store.snapshot().next_event_minutes, None);
}

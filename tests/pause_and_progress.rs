mod common;
use crate::common::Harness;

use std::sync::Arc;
use std::time::Duration;

use blogpilot::engine::{EngineOptions, RetryPolicy, RunStatus};
use blogpilot::errors::BlogpilotError;
use blogpilot::types::RunState;
use blogpilot_test_utils::builders::{TaskSpecBuilder, fast_options};
use blogpilot_test_utils::{eventually, with_timeout};

#[tokio::test]
async fn pause_holds_dispatch_until_resume() {
    let h = Harness::new(fast_options(1));
    let specs = vec![
        TaskSpecBuilder::scripted(&["ok"]).delay_ms(200).build(),
        TaskSpecBuilder::scripted(&["ok"]).build(),
        TaskSpecBuilder::scripted(&["ok"]).build(),
    ];
    let scheduler = Arc::clone(&h.scheduler);
    let run = tokio::spawn(async move { scheduler.start(specs).await });

    eventually(Duration::from_secs(2), || h.tally.start_order() == vec![0]).await;
    h.scheduler.pause().unwrap();
    assert_eq!(h.scheduler.state(), RunState::Paused);

    // The in-flight task still finishes.
    eventually(Duration::from_secs(2), || h.scheduler.progress().completed == 1).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.tally.start_order(), vec![0]);

    let progress = h.scheduler.progress();
    assert_eq!(progress.state, RunState::Paused);
    assert_eq!(progress.total, 3);
    assert_eq!(progress.running, 0);
    assert_eq!(progress.pending, 2);

    h.scheduler.resume().unwrap();
    let summary = with_timeout(run).await.unwrap().unwrap();
    assert_eq!(summary.status(), RunStatus::Completed);
    assert_eq!(summary.succeeded(), 3);
    assert_eq!(h.tally.start_order(), vec![0, 1, 2]);
    assert_eq!(h.scheduler.state(), RunState::Completed);
}

#[tokio::test]
async fn retries_of_an_in_flight_task_continue_while_paused() {
    let options = EngineOptions {
        retry: RetryPolicy::fixed(3, Duration::from_millis(50)),
        ..fast_options(1)
    };
    let h = Harness::new(options);
    let specs = vec![
        TaskSpecBuilder::scripted(&["transient", "ok"]).build(),
        TaskSpecBuilder::scripted(&["ok"]).build(),
    ];
    let scheduler = Arc::clone(&h.scheduler);
    let run = tokio::spawn(async move { scheduler.start(specs).await });

    eventually(Duration::from_secs(2), || h.tally.attempts_of(0) == 1).await;
    h.scheduler.pause().unwrap();
    eventually(Duration::from_secs(2), || h.tally.attempts_of(0) == 2).await;
    eventually(Duration::from_secs(2), || h.scheduler.progress().completed == 1).await;
    assert_eq!(h.tally.attempts_of(1), 0);

    h.scheduler.resume().unwrap();
    let summary = with_timeout(run).await.unwrap().unwrap();
    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.reports()[0].attempts(), 2);
}

#[tokio::test]
async fn cancel_while_paused_skips_the_rest() {
    let h = Harness::new(fast_options(1));
    let specs = vec![
        TaskSpecBuilder::scripted(&["ok"]).delay_ms(100).build(),
        TaskSpecBuilder::scripted(&["ok"]).build(),
    ];
    let scheduler = Arc::clone(&h.scheduler);
    let run = tokio::spawn(async move { scheduler.start(specs).await });

    eventually(Duration::from_secs(2), || h.tally.start_order() == vec![0]).await;
    h.scheduler.pause().unwrap();
    eventually(Duration::from_secs(2), || h.scheduler.progress().completed == 1).await;
    h.scheduler.cancel();

    let summary = with_timeout(run).await.unwrap().unwrap();
    assert_eq!(summary.status(), RunStatus::Cancelled);
    assert!(summary.reports()[0].is_success());
    assert!(summary.reports()[1].is_skipped());
    assert_eq!(h.scheduler.state(), RunState::Cancelled);
    assert_eq!(h.browser.close_count(), 1);
}

#[tokio::test]
async fn pause_and_resume_need_the_matching_state() {
    let h = Harness::new(fast_options(1));
    assert!(matches!(
        h.scheduler.pause(),
        Err(BlogpilotError::InvalidState {
            expected: RunState::Running,
            actual: RunState::Idle
        })
    ));
    assert!(matches!(
        h.scheduler.resume(),
        Err(BlogpilotError::InvalidState {
            expected: RunState::Paused,
            actual: RunState::Idle
        })
    ));

    h.run(vec![TaskSpecBuilder::scripted(&["ok"]).build()])
        .await
        .unwrap();
    assert!(h.scheduler.pause().is_err());
    assert_eq!(h.scheduler.state(), RunState::Completed);
}

#[tokio::test]
async fn a_paused_run_cannot_be_reset() {
    let h = Harness::new(fast_options(1));
    let specs = vec![
        TaskSpecBuilder::scripted(&["ok"]).delay_ms(100).build(),
        TaskSpecBuilder::scripted(&["ok"]).build(),
    ];
    let scheduler = Arc::clone(&h.scheduler);
    let run = tokio::spawn(async move { scheduler.start(specs).await });

    eventually(Duration::from_secs(2), || h.scheduler.state() == RunState::Running).await;
    h.scheduler.pause().unwrap();
    assert!(matches!(
        h.scheduler.reset(),
        Err(BlogpilotError::InvalidState {
            actual: RunState::Paused,
            ..
        })
    ));

    h.scheduler.resume().unwrap();
    let summary = with_timeout(run).await.unwrap().unwrap();
    assert_eq!(summary.status(), RunStatus::Completed);
}

#[tokio::test]
async fn progress_after_a_finished_run() {
    let h = Harness::new(fast_options(2));
    h.run(vec![
        TaskSpecBuilder::scripted(&["ok"]).build(),
        TaskSpecBuilder::scripted(&["permanent"]).build(),
        TaskSpecBuilder::scripted(&["ok"]).build(),
    ])
    .await
    .unwrap();

    let progress = h.scheduler.progress();
    assert_eq!(progress.state, RunState::Completed);
    assert_eq!(progress.total, 3);
    assert_eq!(progress.completed, 2);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.running, 0);
    assert_eq!(progress.pending, 0);
    assert_eq!(progress.percent_done(), 100.0);
    assert!((progress.success_rate() - 200.0 / 3.0).abs() < 1e-9);

    h.scheduler.reset().unwrap();
    let progress = h.scheduler.progress();
    assert_eq!(progress.state, RunState::Idle);
    assert_eq!(progress.total, 0);
}

#[tokio::test]
async fn progress_counts_skipped_specs_as_pending() {
    let h = Harness::new(fast_options(1));
    h.run(vec![
        TaskSpecBuilder::scripted(&["fatal"]).build(),
        TaskSpecBuilder::scripted(&["ok"]).build(),
        TaskSpecBuilder::scripted(&["ok"]).build(),
    ])
    .await
    .unwrap();

    let progress = h.scheduler.progress();
    assert_eq!(progress.state, RunState::Failed);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.completed, 0);
    assert_eq!(progress.pending, 2);
}

#[tokio::test]
async fn progress_counts_uninstantiable_tasks_as_failed() {
    let h = Harness::new(fast_options(1));
    h.run(vec![
        TaskSpecBuilder::new("wait").param("duration_secs", 0).build(),
        TaskSpecBuilder::scripted(&["ok"]).build(),
    ])
    .await
    .unwrap();

    let progress = h.scheduler.progress();
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.completed, 1);
}

#[tokio::test]
async fn huge_concurrency_is_clamped_instead_of_panicking() {
    let h = Harness::new(fast_options(usize::MAX));
    let summary = h
        .run(vec![
            TaskSpecBuilder::scripted(&["ok"]).build(),
            TaskSpecBuilder::scripted(&["ok"]).build(),
        ])
        .await
        .unwrap();
    assert_eq!(summary.succeeded(), 2);
}

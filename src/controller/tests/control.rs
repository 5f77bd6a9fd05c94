use super::drain;
use crate::controller::test_helpers::*;
use crate::error::{Error, UpstreamError};
use crate::storage::ObjectStore;
use crate::types::{Cursor, Event, JobRequest, JobStatus};
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_controls_from_idle_are_illegal() {
    let (controller, _store) = create_test_controller(fast_config(10), FakeProvider::new(1));

    for result in [
        controller.pause().await,
        controller.resume().await,
        controller.cancel().await,
    ] {
        assert!(matches!(
            result,
            Err(Error::IllegalState { ref current, .. }) if current == "idle"
        ));
    }
    assert_eq!(controller.progress().await.status, JobStatus::Idle);
}

#[tokio::test]
async fn test_resume_requires_paused_and_pause_requires_running() {
    let provider = FakeProvider::new(4).with_item_delay(Duration::from_millis(20));
    let (controller, _store) = create_test_controller(fast_config(10), provider);

    controller
        .start(JobRequest::new(["A"], ["x"]))
        .await
        .unwrap();

    let err = controller.resume().await.unwrap_err();
    assert!(matches!(err, Error::IllegalState { ref operation, .. } if operation == "resume"));

    controller.pause().await.unwrap();
    let err = controller.pause().await.unwrap_err();
    assert!(matches!(err, Error::IllegalState { ref current, .. } if current == "paused"));

    controller.resume().await.unwrap();
    assert_eq!(controller.progress().await.status, JobStatus::Running);

    let progress = wait_for_terminal(&controller).await;
    assert_eq!(progress.status, JobStatus::Finished);

    let err = controller.cancel().await.unwrap_err();
    assert!(matches!(err, Error::IllegalState { ref current, .. } if current == "finished"));
}

#[tokio::test]
async fn test_pause_then_resume_neither_skips_nor_duplicates_units() {
    let provider = FakeProvider::new(2).with_item_delay(Duration::from_millis(5));
    let (controller, _store) = create_test_controller(fast_config(3), provider.clone());
    let mut rx = controller.subscribe();

    controller
        .start(JobRequest::new(["A", "B"], ["x", "y"]))
        .await
        .unwrap();
    controller.pause().await.unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    let paused = controller.progress().await;
    assert_eq!(paused.status, JobStatus::Paused);
    assert!(paused.completed_units < paused.total_units);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(
        controller.progress().await.completed_units,
        paused.completed_units,
        "no progress while paused"
    );

    controller.resume().await.unwrap();
    let done = wait_for_terminal(&controller).await;
    controller.wait_until_stopped().await;

    assert_eq!(done.status, JobStatus::Finished);
    assert_eq!(done.completed_units, 4);

    let cursors: Vec<Cursor> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            Event::UnitCompleted { cursor, .. } => Some(cursor),
            _ => None,
        })
        .collect();
    let unique: HashSet<_> = cursors.iter().map(|c| (c.primary_index, c.secondary_index)).collect();
    assert_eq!(cursors.len(), 4);
    assert_eq!(unique.len(), 4);
    assert_eq!(provider.searches().len(), 4, "each unit searched exactly once");
}

#[tokio::test]
async fn test_cancel_during_pause_goes_straight_to_cancelled() {
    let provider = FakeProvider::new(3).with_item_delay(Duration::from_millis(10));
    let (controller, _store) = create_test_controller(fast_config(10), provider);
    let mut rx = controller.subscribe();

    controller
        .start(JobRequest::new(["A"], ["x", "y"]))
        .await
        .unwrap();
    controller.pause().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    controller.cancel().await.unwrap();
    assert_eq!(controller.progress().await.status, JobStatus::Cancelling);

    let done = wait_for_terminal(&controller).await;
    assert_eq!(done.status, JobStatus::Cancelled);
    assert_eq!(done.message, "Cancelled");

    let statuses: Vec<JobStatus> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            Event::StatusChanged { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            JobStatus::Running,
            JobStatus::Paused,
            JobStatus::Cancelling,
            JobStatus::Cancelled
        ]
    );
}

#[tokio::test]
async fn test_cancel_interrupts_backoff_sleep() {
    let provider = FakeProvider::new(1)
        .fail_search("x", "A", UpstreamError::Server { status: 503 })
        .fail_search("x", "A", UpstreamError::Server { status: 503 });
    let mut config = fast_config(10);
    config.retry.initial_delay = Duration::from_secs(30);
    config.retry.max_delay = Duration::from_secs(30);
    let (controller, _store) = create_test_controller(config, provider);

    controller
        .start(JobRequest::new(["A"], ["x"]))
        .await
        .unwrap();
    wait_for(&controller, |p| p.message.contains("sleeping")).await;
    assert!(controller.progress().await.message.starts_with("Server error 503"));

    let started = Instant::now();
    controller.cancel().await.unwrap();
    let done = wait_for_terminal(&controller).await;

    assert_eq!(done.status, JobStatus::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_cancel_mid_unit_stops_between_items() {
    let provider = FakeProvider::new(50).with_item_delay(Duration::from_millis(10));
    let (controller, store) = create_test_controller(fast_config(1), provider);

    let job_id = controller
        .start(JobRequest::new(["A"], ["x"]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    controller.cancel().await.unwrap();

    let done = wait_for_terminal(&controller).await;
    assert_eq!(done.status, JobStatus::Cancelled);
    assert_eq!(done.completed_units, 0, "the interrupted unit does not count");

    let parts = store
        .list_prefix(&format!("reddit_scrapes/{job_id}/a/part-"))
        .await
        .unwrap();
    assert!(!parts.is_empty() && parts.len() < 50, "stopped mid-unit: {}", parts.len());
}

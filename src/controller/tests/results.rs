use crate::controller::test_helpers::*;
use crate::error::Error;
use crate::storage::ObjectStore;
use crate::types::{JobRequest, JobStatus};
use crate::writer::CSV_FIELDS;

#[tokio::test]
async fn test_listing_before_any_job_is_empty() {
    let (controller, _store) = create_test_controller(fast_config(7), FakeProvider::new(1));

    let listing = controller.list_results().await;
    assert!(listing.job_id.is_none());
    assert!(listing.prefix.is_none());
    assert!(listing.files.is_empty());
    assert_eq!(listing.status, JobStatus::Idle);
    assert_eq!(listing.chunk_rows, 7);
}

#[tokio::test]
async fn test_listing_reports_paths_and_part_counts() {
    let (controller, _store) = create_test_controller(fast_config(2), FakeProvider::new(5));

    let job_id = controller
        .start(JobRequest::new(["Stephen Curry", "Kevin Durant"], ["x"]))
        .await
        .unwrap();
    wait_for_terminal(&controller).await;

    let listing = controller.list_results().await;
    assert_eq!(listing.job_id.as_deref(), Some(job_id.as_str()));
    assert_eq!(
        listing.prefix.as_deref(),
        Some(format!("reddit_scrapes/{job_id}").as_str())
    );
    assert_eq!(listing.message, "Finished");

    let curry = &listing.files[0];
    assert_eq!(curry.target, "Stephen Curry");
    assert_eq!(curry.slug, "stephen-curry");
    assert_eq!(
        curry.final_artifact_path,
        format!("reddit_scrapes/{job_id}/stephen-curry.csv")
    );
    // 2 + 2 at the threshold, 1 when the unit completed
    assert_eq!(curry.part_count, 3);
}

#[tokio::test]
async fn test_unknown_slug_is_not_found() {
    let (controller, _store) = create_test_controller(fast_config(2), FakeProvider::new(1));

    let err = controller.finalize_and_fetch("a").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    controller
        .start(JobRequest::new(["A"], ["x"]))
        .await
        .unwrap();
    wait_for_terminal(&controller).await;

    let err = controller.finalize_and_signed_url("nobody").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_fetch_composes_once_and_is_idempotent() {
    let (controller, store) = create_test_controller(fast_config(2), FakeProvider::new(3));

    controller
        .start(JobRequest::new(["A"], ["x"]))
        .await
        .unwrap();
    wait_for_terminal(&controller).await;

    let first = controller.finalize_and_fetch("a").await.unwrap();
    let calls = store.compose_calls();
    assert_eq!(calls, 1);

    let second = controller.finalize_and_fetch("a").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(store.compose_calls(), calls);

    let text = String::from_utf8(first).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(CSV_FIELDS.join(",").as_str()));
    assert_eq!(lines.count(), 3);
}

#[tokio::test]
async fn test_signed_url_points_at_artifact() {
    let (controller, _store) = create_test_controller(fast_config(2), FakeProvider::new(1));

    let job_id = controller
        .start(JobRequest::new(["A"], ["x"]))
        .await
        .unwrap();
    wait_for_terminal(&controller).await;

    let url = controller.finalize_and_signed_url("a").await.unwrap();
    assert_eq!(url, format!("memory://reddit_scrapes/{job_id}/a.csv?ttl=3600"));
}

#[tokio::test]
async fn test_many_parts_compose_in_order() {
    let provider = FakeProvider::new(40);
    let (controller, store) = create_test_controller(fast_config(1), provider);

    let job_id = controller
        .start(JobRequest::new(["A"], ["x"]))
        .await
        .unwrap();
    wait_for_terminal(&controller).await;

    assert_eq!(controller.list_results().await.files[0].part_count, 40);

    controller.finalize_and_fetch("a").await.unwrap();
    // Header + 40 parts exceeds one compose call
    assert!(store.compose_calls() > 1);

    let records = read_csv(&store, &format!("reddit_scrapes/{job_id}/a.csv")).await;
    assert_eq!(records.len(), 41);
    let ids: Vec<String> = records[1..].iter().map(|r| r[1].to_string()).collect();
    let expected: Vec<String> = (0..40).map(|n| format!("x:A:{n}")).collect();
    assert_eq!(ids, expected);
}

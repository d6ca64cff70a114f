//! Execution lane admission: per-backend caps counted regardless of status.

mod test_harness;

use tempfile::TempDir;

use daa_sim::config::ServiceConfig;
use daa_sim::error::DaaError;
use test_harness::*;

fn capped_service(max_lanes: usize) -> TestService {
    let root = TempDir::new().expect("temp dir");
    let config = ServiceConfig::new(root.path().join("jobs")).with_max_execution_lanes(max_lanes);
    TestService::with_config(root, config)
}

#[tokio::test]
async fn test_lane_limit_counts_terminal_jobs() {
    let harness = capped_service(2);

    for _ in 0..2 {
        let id = fresh_id();
        harness
            .service
            .execute_job(harness.request(&id, "sampler", &flip_input(10)))
            .await
            .unwrap();
        harness.wait_terminal(&id).await;
    }

    // Both jobs are done but still occupy their lanes.
    let err = harness
        .service
        .execute_job(harness.request(&fresh_id(), "sampler", &flip_input(10)))
        .await
        .unwrap_err();
    assert!(matches!(err, DaaError::ExecutionLanesLimitReached(_)));
    assert_eq!(err.code(), Some("1232"));
}

#[tokio::test]
async fn test_delete_releases_a_lane() {
    let harness = capped_service(1);

    let first = fresh_id();
    harness
        .service
        .execute_job(harness.request(&first, "sampler", &flip_input(10)))
        .await
        .unwrap();
    harness.wait_terminal(&first).await;

    assert!(harness
        .service
        .execute_job(harness.request(&fresh_id(), "sampler", &flip_input(10)))
        .await
        .is_err());

    harness.service.delete_job(&first).await.unwrap();

    let second = fresh_id();
    harness
        .service
        .execute_job(harness.request(&second, "sampler", &flip_input(10)))
        .await
        .unwrap();
    harness.wait_terminal(&second).await;
}

#[tokio::test]
async fn test_lanes_are_per_backend() {
    let harness = capped_service(1);

    let id = fresh_id();
    harness
        .service
        .execute_job(harness.request(&id, "sampler", &flip_input(10)))
        .await
        .unwrap();
    harness.wait_terminal(&id).await;

    // The default backend is full; a different backend still has room.
    let mut request = harness.request(&fresh_id(), "sampler", &flip_input(10));
    request.backend = Some("falcon_27".to_string());
    let record = harness.service.execute_job(request).await.unwrap();
    harness.wait_terminal(&record.id).await;
}

#[tokio::test]
async fn test_rejected_submission_occupies_no_lane() {
    let harness = capped_service(1);

    // A malformed submission is turned away before admission bookkeeping.
    let mut bad = flip_input(10);
    bad["version"] = serde_json::json!(1);
    assert!(harness
        .service
        .execute_job(harness.request(&fresh_id(), "sampler", &bad))
        .await
        .is_err());

    let id = fresh_id();
    harness
        .service
        .execute_job(harness.request(&id, "sampler", &flip_input(10)))
        .await
        .unwrap();
    harness.wait_terminal(&id).await;
}

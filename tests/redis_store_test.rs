mod common;

use attendance_core::{AttendanceStatus, FailureKind, RedisAttendanceStore};
use common::*;
use futures_util::future::join_all;
use std::env;
use std::error::Error;
use std::sync::Arc;

// Runs against a real Redis when REDIS_URL is set, e.g. in CI.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redis_backed_attendance() -> Result<(), Box<dyn Error>> {
    let Ok(redis_url) = env::var("REDIS_URL") else {
        eprintln!("Skipping Redis integration test: REDIS_URL not set");
        return Ok(());
    };

    // Fresh session id so reruns do not see earlier records.
    let session = format!("it-{}", uuid::Uuid::new_v4());
    let store = Arc::new(RedisAttendanceStore::open(&redis_url)?);
    let h = Harness::with_store_and_sessions(store, &[session.as_str()]).await;

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let orchestrator = h.orchestrator.clone();
            let req = request(
                valid_token(SUBJECT_A, &session),
                SUBJECT_A_ID,
                north_of_anchor(20.0),
            );
            tokio::spawn(async move { orchestrator.mark_attendance(&req).await })
        })
        .collect();

    let mut accepted = 0;
    for joined in join_all(handles).await {
        let decision = joined?;
        if decision.is_accepted() {
            assert_eq!(decision.status(), Some(AttendanceStatus::Present));
            accepted += 1;
        } else {
            assert_eq!(
                decision.failure_kind(),
                Some(FailureKind::DuplicateAttendance)
            );
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(h.record_count(&session).await, 1);

    Ok(())
}

//! Job lifecycle tests against both store backends.

mod common;

use std::sync::Arc;

use common::{RecordingMerger, ScriptedExtractor, TestHarness};
use extrack::db::Database;
use extrack::{
    ErrorCategory, JobStatus, JobTracker, PipelineError, ProgressEvent, SqliteStore,
    TrackerError,
};

fn harnesses() -> Vec<(&'static str, TestHarness)> {
    vec![
        ("memory", TestHarness::memory()),
        ("sqlite", TestHarness::sqlite()),
    ]
}

#[tokio::test]
async fn test_full_run_completes_job() {
    for (name, harness) in harnesses() {
        let job = harness.tracker.create_job(11, 900).await.unwrap();
        let extractor = ScriptedExtractor::new();
        let merger = RecordingMerger::returning(vec![31, 32, 33]);

        let outcome = harness
            .runner()
            .run(&job.job_id, 12, &extractor, &merger)
            .await
            .unwrap();

        let labels: Vec<_> = merger.seen().iter().map(|c| c.text.clone()).collect();
        assert_eq!(
            labels,
            vec!["pages 1-4", "pages 4-8", "pages 8-12"],
            "backend {}",
            name
        );
        assert_eq!(outcome.result_ids, vec![31, 32, 33]);

        let record = harness.tracker.get_job(&job.job_id).await.unwrap();
        assert_eq!(record.status, JobStatus::Completed, "backend {}", name);
        assert_eq!(record.progress, 100);
        assert_eq!(record.result_ids, Some(vec![31, 32, 33]));
        assert!(harness.tracker.get_active_job(11).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_failed_run_records_category() {
    for (name, harness) in harnesses() {
        let job = harness.tracker.create_job(12, 901).await.unwrap();
        let extractor = ScriptedExtractor::new()
            .failing(1, 5, "database transaction aborted")
            .failing(4, 5, "database transaction aborted");

        let err = harness
            .runner()
            .run(&job.job_id, 12, &extractor, &RecordingMerger::returning(vec![]))
            .await
            .unwrap_err();
        assert!(
            matches!(err, PipelineError::TooManyFailures { failed: 2, .. }),
            "backend {}: {}",
            name,
            err
        );
        // Database failures are not retried.
        assert_eq!(extractor.calls(), 3);

        let record = harness.tracker.get_job(&job.job_id).await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        let info = record.error_info.unwrap();
        assert_eq!(info.category, ErrorCategory::Database);
        assert!(info.message.contains("2 of 3 chunks failed"));
    }
}

#[tokio::test]
async fn test_cancel_then_late_events_are_ignored() {
    for (name, harness) in harnesses() {
        let job = harness.tracker.create_job(13, 902).await.unwrap();
        harness
            .tracker
            .apply_event(&job.job_id, &ProgressEvent::started("go"))
            .await
            .unwrap();

        let cancelled = harness.tracker.cancel_job(&job.job_id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled, "backend {}", name);
        assert!(harness.tracker.is_cancelled(&job.job_id).await);

        let late = ProgressEvent::complete("too late", vec![1]);
        let record = harness.tracker.apply_event(&job.job_id, &late).await.unwrap();
        assert_eq!(record, cancelled);

        // Cancelling again is a no-op.
        let again = harness.tracker.cancel_job(&job.job_id).await.unwrap();
        assert_eq!(again, cancelled);

        // The owner is free to start over.
        harness.tracker.create_job(13, 903).await.unwrap();
    }
}

#[tokio::test]
async fn test_trackers_sharing_a_store_enforce_one_active_job() {
    for (name, harness) in harnesses() {
        let other = harness.second_tracker();

        let job = harness.tracker.create_job(14, 1).await.unwrap();
        let err = other.create_job(14, 2).await.unwrap_err();
        assert!(
            matches!(err, TrackerError::AlreadyActive(ref id) if *id == job.job_id),
            "backend {}",
            name
        );

        let seen = other.get_job(&job.job_id).await.unwrap();
        assert_eq!(seen, job);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_across_sqlite_handles() {
    let harness = TestHarness::sqlite();
    let path = harness.database_path().unwrap();

    let trackers: Vec<Arc<JobTracker>> = (0..4)
        .map(|_| {
            let store = SqliteStore::new(Database::open(&path).unwrap());
            Arc::new(JobTracker::new(Arc::new(store), harness.config.ttl))
        })
        .collect();

    let handles: Vec<_> = trackers
        .iter()
        .enumerate()
        .map(|(i, tracker)| {
            let tracker = Arc::clone(tracker);
            tokio::spawn(async move { tracker.create_job(15, i as u64).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_subscriber_streams_run() {
    let harness = TestHarness::memory();
    let mut rx = harness.tracker.subscribe();

    let job = harness.tracker.create_job(16, 5).await.unwrap();
    harness
        .runner()
        .run(
            &job.job_id,
            4,
            &ScriptedExtractor::new(),
            &RecordingMerger::returning(vec![8]),
        )
        .await
        .unwrap();

    let mut statuses = Vec::new();
    while let Ok(record) = rx.try_recv() {
        statuses.push(record.status);
    }
    assert_eq!(statuses.first(), Some(&JobStatus::Pending));
    assert_eq!(statuses.last(), Some(&JobStatus::Completed));
    assert!(statuses.contains(&JobStatus::Processing));
}

mod common;

use common::{FOLDER, Harness, id, options, processed, tracker};
use ferry_engine::error::ErrorKind;
use ferry_engine::{MigrationEvent, Options, RateLimiter, RetryPolicy};
use ferry_progress::{FileRecord, FileStatus, MigrationRun, ProgressStore, ProgressTracker};
use ferry_remote::error::ErrorKind as RemoteErrorKind;
use ferry_remote::records::MockRecords;
use ferry_remote::source::MockSource;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

fn record(filename: &str, status: FileStatus, exhausted: bool) -> FileRecord {
    let mut record = FileRecord::new(filename, filename);
    record.status = status;
    record.exhausted = exhausted;
    record
}

#[tokio::test]
async fn test_resume_reprocesses_exactly_the_unfinished_files() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = ProgressStore::new(temp_dir.path());
    let mut run = MigrationRun::new(FOLDER);
    let statuses = [
        ("1.jpg", FileStatus::Pending, false),
        ("2.jpg", FileStatus::Downloaded, false),
        ("3.jpg", FileStatus::Uploaded, false),
        ("4.jpg", FileStatus::Failed, false),
        ("5.jpg", FileStatus::Failed, true),
        ("6.jpg", FileStatus::Completed, false),
        ("7.jpg", FileStatus::Orphan, false),
        ("8.jpg", FileStatus::NeedsReview, false),
        ("9.jpg", FileStatus::Partial, false),
    ];
    let mut source = MockSource::default();
    let mut records = MockRecords::default();
    for (filename, status, exhausted) in statuses {
        run.files.insert(id(filename), record(filename, status, exhausted));
        source = source.with_file(FOLDER, filename, b"jpeg");
        let identifier: u64 = filename.trim_end_matches(".jpg").parse().unwrap();
        records = records.with_target(identifier, format!("target-{identifier}"));
    }
    store.save(&run).await.unwrap();

    let loaded = store.load_existing(FOLDER).await.unwrap();
    let tracker = ProgressTracker::new(store.clone(), loaded, 100);
    let harness = Harness::new(source, records);
    let engine = harness.engine(options());
    let events = common::events(engine.resume(&tracker)).await;

    let reprocessed: BTreeSet<String> = processed(&events).into_iter().map(|(file_id, _)| file_id).collect();
    let expected: BTreeSet<String> = ["1.jpg", "2.jpg", "3.jpg", "4.jpg"].into_iter().map(id).collect();
    assert_eq!(reprocessed, expected);
    assert!(matches!(events[1], MigrationEvent::DiscoveryComplete(4)));
    assert_eq!(harness.source.list_count(), 0);

    // The final snapshot is on disk.
    let saved = store.load_existing(FOLDER).await.unwrap();
    assert_eq!(saved.summary.completed, 5);
    assert_eq!(saved.files[&id("5.jpg")].status, FileStatus::Failed);
}

#[tokio::test]
async fn test_uploaded_file_is_not_uploaded_again() {
    let mut uploaded = record("6000.jpg", FileStatus::Uploaded, false);
    uploaded.identifiers = vec![6000];
    uploaded.resolved_targets.insert(6000, "ghi-789".into());
    uploaded.object_url = Some("mock://media/ghi-789/6000.jpg".into());
    let mut run = MigrationRun::new(FOLDER);
    run.files.insert(id("6000.jpg"), uploaded);
    let tracker = ProgressTracker::ephemeral(run);
    let harness = Harness::new(
        MockSource::default().with_file(FOLDER, "6000.jpg", b"jpeg"),
        MockRecords::default().with_target(6000, "ghi-789"),
    );
    let engine = harness.engine(options());
    common::events(engine.resume(&tracker)).await;

    assert_eq!(harness.source.total_downloads(), 0);
    assert_eq!(harness.store.put_count(), 0);
    assert!(harness.records.lookups().is_empty());
    assert_eq!(harness.records.created()[0].object_url, "mock://media/ghi-789/6000.jpg");
    assert_eq!(tracker.get(&id("6000.jpg")).await.unwrap().status, FileStatus::Completed);
}

#[tokio::test]
async fn test_rerunning_with_skip_existing_writes_nothing_new() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = ProgressStore::new(temp_dir.path());
    let harness = Harness::new(
        MockSource::default().with_file(FOLDER, "6000-6001.jpg", b"jpeg").with_file(FOLDER, "7000.png", b"png"),
        MockRecords::default().with_target(6000, "a").with_target(6001, "b").with_target(7000, "c"),
    );
    let options = Options { skip_existing: true, ..options() };

    let first = ProgressTracker::new(store.clone(), store.load_or_new(FOLDER).await.unwrap(), 10);
    common::events(harness.engine(options.clone()).migrate(FOLDER, &first)).await;
    assert_eq!(harness.store.put_count(), 2);
    assert_eq!(harness.records.created().len(), 3);

    let second = ProgressTracker::new(store.clone(), store.load_or_new(FOLDER).await.unwrap(), 10);
    let events = common::events(harness.engine(options).migrate(FOLDER, &second)).await;
    assert!(processed(&events).is_empty());
    assert_eq!(harness.store.put_count(), 2);
    assert_eq!(harness.records.created().len(), 3);
    assert_eq!(second.summary().await.completed, 2);
}

#[tokio::test]
async fn test_skip_existing_completes_fully_linked_files_without_calls() {
    let mut linked = record("6000-6001.jpg", FileStatus::Uploaded, false);
    linked.identifiers = vec![6000, 6001];
    linked.created_records.insert(6000, "r1".into());
    linked.created_records.insert(6001, "r2".into());
    let mut run = MigrationRun::new(FOLDER);
    run.files.insert(id("6000-6001.jpg"), linked);
    let tracker = ProgressTracker::ephemeral(run);
    let harness = Harness::new(MockSource::default(), MockRecords::default());
    let engine = harness.engine(Options { skip_existing: true, ..options() });
    common::events(engine.resume(&tracker)).await;

    assert_eq!(tracker.get(&id("6000-6001.jpg")).await.unwrap().status, FileStatus::Completed);
    assert!(harness.records.lookups().is_empty());
    assert_eq!(harness.records.url_checks(), 0);
}

#[tokio::test]
async fn test_skip_existing_checks_record_service_by_url() {
    let harness = Harness::new(
        MockSource::default().with_file(FOLDER, "6000.jpg", b"jpeg"),
        MockRecords::default().with_target(6000, "ghi-789").with_existing_url("mock://media/ghi-789/6000.jpg"),
    );
    let engine = harness.engine(Options { skip_existing: true, ..options() });
    let tracker = tracker();
    common::events(engine.migrate(FOLDER, &tracker)).await;

    let record = tracker.get(&id("6000.jpg")).await.unwrap();
    assert_eq!(record.status, FileStatus::Completed);
    assert_eq!(record.object_url.as_deref(), Some("mock://media/ghi-789/6000.jpg"));
    assert_eq!(harness.source.total_downloads(), 0);
    assert_eq!(harness.store.put_count(), 0);
    assert!(harness.records.create_calls().is_empty());
}

#[tokio::test]
async fn test_failed_url_check_falls_through() {
    let harness = Harness::new(
        MockSource::default().with_file(FOLDER, "6000.jpg", b"jpeg"),
        MockRecords::default()
            .with_target(6000, "ghi-789")
            .fail_url_checks(|| RemoteErrorKind::Unavailable("502".into())),
    );
    let engine = harness.engine(Options { skip_existing: true, ..options() });
    let tracker = tracker();
    common::events(engine.migrate(FOLDER, &tracker)).await;

    assert_eq!(harness.records.url_checks(), 1);
    assert_eq!(tracker.get(&id("6000.jpg")).await.unwrap().status, FileStatus::Completed);
    assert_eq!(harness.store.put_count(), 1);
}

#[tokio::test]
async fn test_dry_run_never_transfers_or_creates() {
    let harness = Harness::new(
        MockSource::default().with_file(FOLDER, "6000.jpg", b"jpeg").with_file(FOLDER, "6602.jpg", b"jpeg"),
        MockRecords::default().with_target(6000, "ghi-789"),
    );
    let engine = harness.engine(Options { dry_run: true, ..options() });
    let tracker = tracker();
    common::events(engine.migrate(FOLDER, &tracker)).await;

    assert_eq!(harness.records.lookups().len(), 2);
    assert_eq!(harness.source.total_downloads(), 0);
    assert_eq!(harness.store.put_count(), 0);
    assert!(harness.records.create_calls().is_empty());
    let resolvable = tracker.get(&id("6000.jpg")).await.unwrap();
    assert_eq!(resolvable.status, FileStatus::Pending);
    assert_eq!(resolvable.resolved_targets.get(&6000).map(String::as_str), Some("ghi-789"));
    assert_eq!(tracker.get(&id("6602.jpg")).await.unwrap().status, FileStatus::Orphan);
}

#[tokio::test]
async fn test_authentication_failure_stops_the_run() {
    let harness = Harness::new(
        MockSource::default()
            .with_file(FOLDER, "1.jpg", b"x")
            .with_file(FOLDER, "2.jpg", b"x")
            .with_file(FOLDER, "3.jpg", b"x"),
        MockRecords::default()
            .with_target(2, "b")
            .with_target(3, "c")
            .fail_all_lookups(1, || RemoteErrorKind::Unauthenticated("token expired".into())),
    );
    let engine = harness.engine(Options { concurrency: 1, ..options() });
    let tracker = tracker();
    let events = common::collect(engine.migrate(FOLDER, &tracker)).await;

    let err = events.last().unwrap().as_ref().unwrap_err();
    assert!(matches!(&**err, ErrorKind::Fatal(_)));
    assert!(err.is_fatal());
    // No file started after the failure.
    assert_eq!(harness.records.lookups(), vec![1]);
    let failed = tracker.get(&id("1.jpg")).await.unwrap();
    assert_eq!(failed.status, FileStatus::Failed);
    assert!(failed.is_resumable());
    assert_eq!(tracker.get(&id("2.jpg")).await.unwrap().status, FileStatus::Pending);
    assert!(engine.cancellation_token().is_cancelled());
}

#[tokio::test]
async fn test_listing_authentication_failure_is_fatal() {
    let harness = Harness::new(
        MockSource::default().fail_listing(|| RemoteErrorKind::PermissionDenied("folder".into())),
        MockRecords::default(),
    );
    let engine = harness.engine(options());
    let tracker = tracker();
    let events = common::collect(engine.migrate(FOLDER, &tracker)).await;
    assert!(matches!(&**events.last().unwrap().as_ref().unwrap_err(), ErrorKind::Fatal(_)));
}

#[tokio::test]
async fn test_listing_retries_transient_failures() {
    let harness = Harness::new(
        MockSource::default().fail_listing(|| RemoteErrorKind::Timeout),
        MockRecords::default(),
    );
    let engine = harness.engine(options());
    let err = engine.scan(FOLDER, &tracker()).await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::Listing(_)));
    assert_eq!(harness.source.list_count(), 3);
}

#[tokio::test]
async fn test_cancelled_run_starts_nothing() {
    let harness = Harness::new(
        MockSource::default().with_file(FOLDER, "6000.jpg", b"jpeg"),
        MockRecords::default().with_target(6000, "ghi-789"),
    );
    let engine = harness.engine(options());
    engine.cancellation_token().cancel();
    let tracker = tracker();
    let events = common::events(engine.migrate(FOLDER, &tracker)).await;

    assert!(processed(&events).is_empty());
    assert!(matches!(events.last(), Some(MigrationEvent::Interrupted(summary)) if summary.pending == 1));
    assert!(harness.records.lookups().is_empty());
}

#[tokio::test]
async fn test_cancellation_during_backoff_leaves_file_resumable() {
    let file = id("6000.jpg");
    let harness = Harness::new(
        MockSource::default().with_file(FOLDER, "6000.jpg", b"jpeg").fail_all_downloads(&file, || RemoteErrorKind::Timeout),
        MockRecords::default().with_target(6000, "ghi-789"),
    );
    let slow_retries = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_secs(30),
        max_delay: Duration::from_secs(60),
    };
    let engine = harness.engine(Options { retry: slow_retries, ..options() });
    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });
    let tracker = tracker();
    let started = Instant::now();
    let events = common::events(engine.migrate(FOLDER, &tracker)).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(matches!(events.last(), Some(MigrationEvent::Interrupted(_))));
    let record = tracker.get(&file).await.unwrap();
    assert_eq!(record.status, FileStatus::Failed);
    assert!(!record.exhausted);
    assert!(record.error.as_deref().unwrap().starts_with("Interrupted"));
    assert_eq!(harness.source.download_count(&file), 1);
}

#[tokio::test]
async fn test_scan_registers_new_files_only() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = ProgressStore::new(temp_dir.path());
    let harness = Harness::new(
        MockSource::default()
            .with_file(FOLDER, "1.jpg", b"x")
            .with_file(FOLDER, "2a.jpg", b"x")
            .with_file(FOLDER, "3-4.mov", b"x")
            .with_file(FOLDER, "notes.txt", b"x"),
        MockRecords::default(),
    );
    let engine = harness.engine(options());
    let tracker = ProgressTracker::new(store.clone(), MigrationRun::new(FOLDER), 10);

    let report = engine.scan(FOLDER, &tracker).await.unwrap();
    assert_eq!((report.total, report.new), (4, 4));
    assert_eq!((report.single, report.multiple, report.range, report.invalid), (1, 1, 1, 1));

    let mut done = tracker.get(&id("1.jpg")).await.unwrap();
    done.transition(FileStatus::Completed);
    tracker.upsert(&id("1.jpg"), done).await.unwrap();
    let report = engine.scan(FOLDER, &tracker).await.unwrap();
    assert_eq!((report.total, report.new), (4, 0));
    assert_eq!(tracker.get(&id("1.jpg")).await.unwrap().status, FileStatus::Completed);

    let saved = store.load_existing(FOLDER).await.unwrap();
    assert_eq!(saved.total_files, 4);
    assert_eq!(saved.files[&id("3-4.mov")].identifiers, vec![3, 4]);
    assert_eq!(saved.files[&id("notes.txt")].status, FileStatus::NeedsReview);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_downloads_are_rate_limited() {
    let mut source = MockSource::default();
    let mut records = MockRecords::default();
    for identifier in 1..=5u64 {
        source = source.with_file(FOLDER, &format!("{identifier}.jpg"), b"x");
        records = records.with_target(identifier, format!("t{identifier}"));
    }
    let harness = Harness::new(source, records);
    // One token per listing and download, one every 50ms after the first.
    let limiter = RateLimiter::new(20.0, 1).unwrap();
    let engine = ferry_engine::Engine::new(
        harness.source.clone(),
        harness.store.clone(),
        harness.records.clone(),
        limiter,
        Options { concurrency: 5, ..options() },
    );
    let tracker = tracker();
    let started = Instant::now();
    common::events(engine.migrate(FOLDER, &tracker)).await;

    assert!(started.elapsed() >= Duration::from_millis(200), "finished in {:?}", started.elapsed());
    assert_eq!(tracker.summary().await.completed, 5);
}
